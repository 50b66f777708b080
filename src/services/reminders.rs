use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::db::queries;
use crate::services::identity::IdentityProvider;
use crate::services::jobs::JobHandler;
use crate::services::messaging::{DeliveryOutcome, Notification, NotificationDispatcher};

/// Job id for a booking's reminder. One reminder per booking.
pub fn reminder_job_id(booking_id: &str) -> String {
    format!("remind_{booking_id}")
}

/// Delivers the reminder for the booking id carried in the job payload.
///
/// The booking's status is not consulted, so a booking cancelled after the
/// reminder was scheduled still gets reminded unless the job was cancelled.
pub struct ReminderHandler {
    db: Arc<Mutex<Connection>>,
    identity: Arc<dyn IdentityProvider>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl ReminderHandler {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        identity: Arc<dyn IdentityProvider>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            identity,
            dispatcher,
        }
    }

    pub async fn send_reminder(&self, booking_id: &str) -> DeliveryOutcome {
        let booking = {
            let db = self.db.lock().unwrap();
            queries::get_booking(&db, booking_id)
        };

        let booking = match booking {
            Ok(Some(b)) => b,
            Ok(None) => {
                tracing::info!(booking_id, "reminder skipped, booking no longer exists");
                return DeliveryOutcome::Skipped {
                    reason: "booking not found".to_string(),
                };
            }
            Err(e) => {
                tracing::error!(booking_id, error = %e, "failed to load booking for reminder");
                return DeliveryOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let customer = match self.identity.get_user(booking.customer_id).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                tracing::warn!(
                    booking_id,
                    customer_id = booking.customer_id,
                    "reminder skipped, customer not found"
                );
                return DeliveryOutcome::Skipped {
                    reason: "customer not found".to_string(),
                };
            }
            Err(e) => {
                tracing::error!(booking_id, error = %e, "failed to resolve reminder recipient");
                return DeliveryOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let message = Notification::reminder(&booking);
        match self
            .dispatcher
            .send(&customer.email, &message.subject, &message.body)
            .await
        {
            Ok(()) => {
                tracing::info!(booking_id, status = %booking.status, "reminder sent");
                DeliveryOutcome::Sent
            }
            Err(e) => {
                tracing::error!(booking_id, error = %e, "reminder send failed");
                DeliveryOutcome::Failed {
                    reason: format!("{e:#}"),
                }
            }
        }
    }
}

#[async_trait]
impl JobHandler for ReminderHandler {
    async fn run(&self, payload: &str) {
        self.send_reminder(payload).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{BookingStatus, NewBooking, Role};
    use crate::services::identity::SqliteIdentity;
    use chrono::NaiveDateTime;

    struct MockDispatcher {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationDispatcher for MockDispatcher {
        async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("mailbox unavailable");
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn setup(fail: bool) -> (ReminderHandler, Arc<Mutex<Connection>>, Arc<MockDispatcher>, i64) {
        let db = Arc::new(Mutex::new(db::init_db(":memory:").unwrap()));
        let customer = {
            let conn = db.lock().unwrap();
            queries::insert_user(&conn, "cara@example.com", Some("Cara"), Role::Customer, None).unwrap()
        };
        let dispatcher = Arc::new(MockDispatcher {
            sent: Mutex::new(vec![]),
            fail,
        });
        let handler = ReminderHandler::new(
            db.clone(),
            Arc::new(SqliteIdentity::new(db.clone())),
            dispatcher.clone(),
        );
        (handler, db, dispatcher, customer)
    }

    fn insert_booking(db: &Arc<Mutex<Connection>>, customer_id: i64) -> String {
        let t = NaiveDateTime::parse_from_str("2025-06-16 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let conn = db.lock().unwrap();
        queries::create_booking(
            &conn,
            &NewBooking {
                customer_id,
                service_id: 1,
                staff_id: None,
                start_time: t,
                end_time: t + chrono::Duration::minutes(30),
                notes: None,
                created_at: t,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_job_id_format() {
        assert_eq!(reminder_job_id("42"), "remind_42");
    }

    #[tokio::test]
    async fn test_reminder_goes_to_customer_email() {
        let (handler, db, dispatcher, customer) = setup(false);
        let id = insert_booking(&db, customer);

        let outcome = handler.send_reminder(&id).await;
        assert_eq!(outcome, DeliveryOutcome::Sent);

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "cara@example.com");
        assert_eq!(sent[0].1, "Booking reminder");
        assert!(sent[0].2.contains(&id));
    }

    #[tokio::test]
    async fn test_reminder_still_sent_for_cancelled_booking() {
        let (handler, db, dispatcher, customer) = setup(false);
        let id = insert_booking(&db, customer);
        {
            let conn = db.lock().unwrap();
            queries::update_booking_status(&conn, &id, BookingStatus::Cancelled).unwrap();
        }

        assert!(handler.send_reminder(&id).await.is_sent());
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_booking_is_noop() {
        let (handler, _db, dispatcher, _) = setup(false);

        let outcome = handler.send_reminder("gone").await;
        assert!(matches!(outcome, DeliveryOutcome::Skipped { .. }));
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_reported_not_raised() {
        let (handler, db, _dispatcher, customer) = setup(true);
        let id = insert_booking(&db, customer);

        match handler.send_reminder(&id).await {
            DeliveryOutcome::Failed { reason } => assert!(reason.contains("mailbox unavailable")),
            other => panic!("expected failure, got {other:?}"),
        }

        // the job entry point swallows the outcome
        handler.run(&id).await;
    }
}
