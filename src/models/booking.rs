use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: String,
    pub customer_id: i64,
    pub service_id: i64,
    pub staff_id: Option<i64>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A booking before the store has assigned it an id.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: i64,
    pub service_id: i64,
    pub staff_id: Option<i64>,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Booked,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "booked",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booked" => Some(BookingStatus::Booked),
            "cancelled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Cancelled and completed are terminal.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Booked, BookingStatus::Cancelled)
                | (BookingStatus::Booked, BookingStatus::Completed)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booked_can_move_to_terminal_states() {
        assert!(BookingStatus::Booked.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Booked.can_transition_to(BookingStatus::Completed));
    }

    #[test]
    fn test_terminal_states_never_change() {
        for from in [BookingStatus::Cancelled, BookingStatus::Completed] {
            for to in [
                BookingStatus::Booked,
                BookingStatus::Cancelled,
                BookingStatus::Completed,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to} should be rejected");
            }
        }
        assert!(!BookingStatus::Booked.can_transition_to(BookingStatus::Booked));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(BookingStatus::parse("booked"), Some(BookingStatus::Booked));
        assert_eq!(BookingStatus::parse("cancelled"), Some(BookingStatus::Cancelled));
        assert_eq!(BookingStatus::parse("completed"), Some(BookingStatus::Completed));
        assert_eq!(BookingStatus::parse("pending"), None);
    }
}
