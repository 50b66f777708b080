use serde::{Deserialize, Serialize};

use super::Booking;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Customer => "customer",
        }
    }

    /// Unknown roles get the least privileged role.
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            "staff" => Role::Staff,
            _ => Role::Customer,
        }
    }
}

/// The authenticated user an operation runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub id: i64,
    pub role: Role,
}

/// Which bookings a requester gets to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    All,
    AssignedTo(i64),
    OwnedBy(i64),
}

impl Requester {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    pub fn can_cancel(&self, booking: &Booking) -> bool {
        self.role == Role::Admin || booking.customer_id == self.id
    }

    pub fn can_complete(&self, booking: &Booking) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Staff => booking.staff_id == Some(self.id),
            Role::Customer => false,
        }
    }

    pub fn can_view(&self, booking: &Booking) -> bool {
        self.role == Role::Admin
            || booking.customer_id == self.id
            || booking.staff_id == Some(self.id)
    }

    pub fn list_scope(&self) -> ListScope {
        match self.role {
            Role::Admin => ListScope::All,
            Role::Staff => ListScope::AssignedTo(self.id),
            Role::Customer => ListScope::OwnedBy(self.id),
        }
    }
}

impl From<&User> for Requester {
    fn from(user: &User) -> Self {
        Self::new(user.id, user.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use chrono::NaiveDateTime;

    fn booking(customer_id: i64, staff_id: Option<i64>) -> Booking {
        let t = NaiveDateTime::parse_from_str("2025-03-15 14:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        Booking {
            id: "b-1".to_string(),
            customer_id,
            service_id: 1,
            staff_id,
            start_time: t,
            end_time: t,
            status: BookingStatus::Booked,
            notes: None,
            created_at: t,
        }
    }

    #[test]
    fn test_cancel_capability() {
        let b = booking(10, Some(20));
        assert!(Requester::new(10, Role::Customer).can_cancel(&b));
        assert!(Requester::new(1, Role::Admin).can_cancel(&b));
        assert!(!Requester::new(11, Role::Customer).can_cancel(&b));
        // assigned staff may not cancel on the customer's behalf
        assert!(!Requester::new(20, Role::Staff).can_cancel(&b));
    }

    #[test]
    fn test_complete_capability() {
        let b = booking(10, Some(20));
        assert!(Requester::new(20, Role::Staff).can_complete(&b));
        assert!(!Requester::new(21, Role::Staff).can_complete(&b));
        assert!(!Requester::new(10, Role::Customer).can_complete(&b));
        assert!(Requester::new(1, Role::Admin).can_complete(&b));
    }

    #[test]
    fn test_list_scope_by_role() {
        assert_eq!(Requester::new(1, Role::Admin).list_scope(), ListScope::All);
        assert_eq!(Requester::new(2, Role::Staff).list_scope(), ListScope::AssignedTo(2));
        assert_eq!(Requester::new(3, Role::Customer).list_scope(), ListScope::OwnedBy(3));
    }

    #[test]
    fn test_role_parse_defaults_to_customer() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("staff"), Role::Staff);
        assert_eq!(Role::parse("superuser"), Role::Customer);
    }
}
