pub mod console;
pub mod http;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::Booking;

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn confirmation(booking: &Booking) -> Self {
        Self {
            subject: "Booking confirmation".to_string(),
            body: format!(
                "Your booking #{} is confirmed for {}",
                booking.id, booking.start_time
            ),
        }
    }

    pub fn reminder(booking: &Booking) -> Self {
        Self {
            subject: "Booking reminder".to_string(),
            body: format!("Reminder for booking #{} at {}", booking.id, booking.start_time),
        }
    }
}

/// What happened to a best-effort message. Never turned into an error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    /// Handed to a background task; its result is only logged.
    Queued,
    Skipped { reason: String },
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use chrono::NaiveDateTime;

    #[test]
    fn test_message_texts() {
        let t = NaiveDateTime::parse_from_str("2024-01-10 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let booking = Booking {
            id: "abc".to_string(),
            customer_id: 1,
            service_id: 1,
            staff_id: None,
            start_time: t,
            end_time: t,
            status: BookingStatus::Booked,
            notes: None,
            created_at: t,
        };

        let confirmation = Notification::confirmation(&booking);
        assert_eq!(confirmation.subject, "Booking confirmation");
        assert_eq!(
            confirmation.body,
            "Your booking #abc is confirmed for 2024-01-10 10:00:00"
        );

        let reminder = Notification::reminder(&booking);
        assert_eq!(reminder.subject, "Booking reminder");
        assert_eq!(reminder.body, "Reminder for booking #abc at 2024-01-10 10:00:00");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(DeliveryOutcome::Failed {
            reason: "smtp down".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "smtp down");
        assert_eq!(serde_json::to_value(DeliveryOutcome::Sent).unwrap()["status"], "sent");
        assert_eq!(serde_json::to_value(DeliveryOutcome::Queued).unwrap()["status"], "queued");
    }
}
