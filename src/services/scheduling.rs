use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime, Timelike};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::{AppConfig, MAX_REMINDER_LEAD_HOURS};
use crate::db::queries;
use crate::errors::{AppError, Result};
use crate::models::{Booking, BookingStatus, NewBooking, Requester, User};
use crate::services::catalog::CatalogProvider;
use crate::services::clock::Clock;
use crate::services::identity::IdentityProvider;
use crate::services::jobs::{JobHandler, JobRunner};
use crate::services::messaging::{DeliveryOutcome, Notification, NotificationDispatcher};
use crate::services::reminders::{reminder_job_id, ReminderHandler};

/// Knobs for the parts of booking behaviour that are deployment decisions.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    pub reminder_lead: Duration,
    pub cancel_clears_reminder: bool,
    pub enforce_staff_conflicts: bool,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            reminder_lead: Duration::hours(24),
            cancel_clears_reminder: false,
            enforce_staff_conflicts: false,
        }
    }
}

impl From<&AppConfig> for SchedulingPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            reminder_lead: Some(config.reminder_lead_hours)
                .filter(|h| (0..=MAX_REMINDER_LEAD_HOURS).contains(h))
                .map(Duration::hours)
                .unwrap_or_else(|| SchedulingPolicy::default().reminder_lead),
            cancel_clears_reminder: config.cancel_clears_reminder,
            enforce_staff_conflicts: config.enforce_staff_conflicts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub customer_id: i64,
    pub service_id: i64,
    pub staff_id: Option<i64>,
    pub start_time: NaiveDateTime,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReminderOutcome {
    Scheduled {
        job_id: String,
        fire_at: NaiveDateTime,
    },
    /// The reminder time had already passed when the booking was made.
    SkippedTooLate,
    Failed {
        reason: String,
    },
}

/// A created booking together with how its side effects went. The booking
/// exists regardless of the side-effect outcomes. The confirmation is sent
/// in the background, so it is reported as `Queued`.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub booking: Booking,
    pub confirmation: DeliveryOutcome,
    pub reminder: ReminderOutcome,
}

pub struct BookingScheduler {
    db: Arc<Mutex<Connection>>,
    catalog: Arc<dyn CatalogProvider>,
    identity: Arc<dyn IdentityProvider>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    jobs: Arc<JobRunner>,
    reminders: Arc<ReminderHandler>,
    clock: Arc<dyn Clock>,
    policy: SchedulingPolicy,
}

impl BookingScheduler {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        catalog: Arc<dyn CatalogProvider>,
        identity: Arc<dyn IdentityProvider>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        jobs: Arc<JobRunner>,
        clock: Arc<dyn Clock>,
        policy: SchedulingPolicy,
    ) -> Self {
        let reminders = Arc::new(ReminderHandler::new(
            db.clone(),
            identity.clone(),
            dispatcher.clone(),
        ));
        Self {
            db,
            catalog,
            identity,
            dispatcher,
            jobs,
            reminders,
            clock,
            policy,
        }
    }

    pub fn reminders(&self) -> &Arc<ReminderHandler> {
        &self.reminders
    }

    pub fn jobs(&self) -> &Arc<JobRunner> {
        &self.jobs
    }

    pub async fn request_booking(&self, req: BookingRequest) -> Result<BookingOutcome> {
        let service = self
            .catalog
            .get_service(req.service_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("service {}", req.service_id)))?;

        // Stored timestamps have second precision.
        let start_time = req.start_time.with_nanosecond(0).unwrap_or(req.start_time);
        let end_time = start_time
            .checked_add_signed(service.duration())
            .ok_or_else(|| AppError::BadRequest(format!("start_time {start_time} is out of range")))?;
        let now = self.clock.now();
        let new = NewBooking {
            customer_id: req.customer_id,
            service_id: service.id,
            staff_id: req.staff_id,
            start_time,
            end_time,
            notes: req.notes,
            created_at: now.with_nanosecond(0).unwrap_or(now),
        };

        let booking = {
            let db = self.db.lock().unwrap();
            if self.policy.enforce_staff_conflicts {
                check_staff_conflict(&db, &new)?;
            }
            queries::create_booking(&db, &new)?
        };

        tracing::info!(
            booking_id = %booking.id,
            customer_id = booking.customer_id,
            service_id = booking.service_id,
            start = %booking.start_time,
            end = %booking.end_time,
            "booking created"
        );

        let confirmation = self.queue_confirmation(&booking);
        let reminder = self.schedule_reminder(&booking, now);

        Ok(BookingOutcome {
            booking,
            confirmation,
            reminder,
        })
    }

    pub fn cancel_booking(&self, booking_id: &str, requester: Requester) -> Result<Booking> {
        let booking = self.load(booking_id)?;

        if !requester.can_cancel(&booking) {
            tracing::warn!(
                booking_id,
                requester_id = requester.id,
                role = requester.role.as_str(),
                "cancel refused"
            );
            return Err(AppError::Forbidden);
        }

        let cancelled = {
            let db = self.db.lock().unwrap();
            queries::update_booking_status(&db, booking_id, BookingStatus::Cancelled)?
        };

        if self.policy.cancel_clears_reminder && self.jobs.cancel(&reminder_job_id(booking_id)) {
            tracing::info!(booking_id, "pending reminder cancelled");
        }

        tracing::info!(booking_id, requester_id = requester.id, "booking cancelled");
        Ok(cancelled)
    }

    pub fn complete_booking(&self, booking_id: &str, requester: Requester) -> Result<Booking> {
        let booking = self.load(booking_id)?;

        if !requester.can_complete(&booking) {
            return Err(AppError::Forbidden);
        }

        let completed = {
            let db = self.db.lock().unwrap();
            queries::update_booking_status(&db, booking_id, BookingStatus::Completed)?
        };

        tracing::info!(booking_id, requester_id = requester.id, "booking completed");
        Ok(completed)
    }

    pub fn get_booking(&self, booking_id: &str, requester: Requester) -> Result<Booking> {
        let booking = self.load(booking_id)?;
        if !requester.can_view(&booking) {
            return Err(AppError::Forbidden);
        }
        Ok(booking)
    }

    pub fn list_bookings(&self, requester: Requester) -> Result<Vec<Booking>> {
        let db = self.db.lock().unwrap();
        queries::list_bookings(&db, requester.list_scope())
    }

    pub fn list_upcoming(&self) -> Result<Vec<Booking>> {
        let now = self.clock.now();
        let db = self.db.lock().unwrap();
        queries::list_upcoming_bookings(&db, &now)
    }

    pub async fn list_staff(&self) -> Result<Vec<User>> {
        Ok(self.identity.list_staff().await?)
    }

    fn load(&self, booking_id: &str) -> Result<Booking> {
        let db = self.db.lock().unwrap();
        queries::get_booking(&db, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
    }

    /// Hands the confirmation to its own task so the caller never waits on
    /// the dispatcher. The delivery result is only logged.
    fn queue_confirmation(&self, booking: &Booking) -> DeliveryOutcome {
        let identity = self.identity.clone();
        let dispatcher = self.dispatcher.clone();
        let booking = booking.clone();
        let booking_id = booking.id.clone();

        let task = tokio::spawn(async move {
            send_confirmation(identity.as_ref(), dispatcher.as_ref(), &booking).await
        });

        tokio::spawn(async move {
            match task.await {
                Ok(outcome) => tracing::debug!(booking_id = %booking_id, ?outcome, "confirmation finished"),
                Err(e) => tracing::error!(booking_id = %booking_id, error = %e, "confirmation task aborted"),
            }
        });

        DeliveryOutcome::Queued
    }

    fn schedule_reminder(&self, booking: &Booking, now: NaiveDateTime) -> ReminderOutcome {
        let Some(fire_at) = booking.start_time.checked_sub_signed(self.policy.reminder_lead) else {
            return ReminderOutcome::SkippedTooLate;
        };
        if fire_at <= now {
            tracing::debug!(booking_id = %booking.id, fire_at = %fire_at, "reminder time already passed");
            return ReminderOutcome::SkippedTooLate;
        }

        let job_id = reminder_job_id(&booking.id);
        let handler: Arc<dyn JobHandler> = self.reminders.clone();
        match self
            .jobs
            .schedule(job_id.clone(), fire_at, booking.id.clone(), handler)
        {
            Ok(()) => {
                tracing::info!(booking_id = %booking.id, job_id = %job_id, fire_at = %fire_at, "reminder scheduled");
                ReminderOutcome::Scheduled { job_id, fire_at }
            }
            Err(e) => {
                tracing::warn!(booking_id = %booking.id, job_id = %job_id, error = %e, "reminder not scheduled");
                ReminderOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Sends the booking confirmation to the customer's email. A customer the
/// identity collaborator no longer knows is skipped, as for reminders.
pub async fn send_confirmation(
    identity: &dyn IdentityProvider,
    dispatcher: &dyn NotificationDispatcher,
    booking: &Booking,
) -> DeliveryOutcome {
    let email = match identity.get_user(booking.customer_id).await {
        Ok(Some(user)) => user.email,
        Ok(None) => {
            tracing::warn!(
                booking_id = %booking.id,
                customer_id = booking.customer_id,
                "confirmation skipped, customer not found"
            );
            return DeliveryOutcome::Skipped {
                reason: "customer not found".to_string(),
            };
        }
        Err(e) => {
            tracing::warn!(booking_id = %booking.id, error = %e, "no confirmation sent");
            return DeliveryOutcome::Failed {
                reason: e.to_string(),
            };
        }
    };

    let message = Notification::confirmation(booking);
    match dispatcher.send(&email, &message.subject, &message.body).await {
        Ok(()) => {
            tracing::info!(booking_id = %booking.id, "confirmation sent");
            DeliveryOutcome::Sent
        }
        Err(e) => {
            tracing::warn!(booking_id = %booking.id, error = %e, "confirmation send failed");
            DeliveryOutcome::Failed {
                reason: format!("{e:#}"),
            }
        }
    }
}

/// Rejects a booking whose assigned staff member already has an overlapping,
/// non-cancelled booking. Bookings without staff are never in conflict.
fn check_staff_conflict(conn: &Connection, new: &NewBooking) -> Result<()> {
    let Some(staff_id) = new.staff_id else {
        return Ok(());
    };

    let overlaps = queries::find_staff_overlaps(conn, staff_id, &new.start_time, &new.end_time)?;
    if let Some(existing) = overlaps.first() {
        return Err(AppError::Conflict(format!(
            "staff {staff_id} is already booked from {} to {}",
            existing.start_time, existing.end_time
        )));
    }
    Ok(())
}
