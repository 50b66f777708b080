use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Booking;
use crate::services::messaging::DeliveryOutcome;
use crate::services::scheduling::{BookingRequest, ReminderOutcome};
use crate::state::AppState;

use super::current_user;

const START_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

fn parse_start_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    START_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .filter(queries::is_storable)
}

fn iso(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[derive(Serialize)]
pub struct BookingResponse {
    id: String,
    customer_id: i64,
    service_id: i64,
    staff_id: Option<i64>,
    start_time: String,
    end_time: String,
    status: String,
    notes: Option<String>,
    created_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            start_time: iso(&b.start_time),
            end_time: iso(&b.end_time),
            created_at: iso(&b.created_at),
            status: b.status.as_str().to_string(),
            id: b.id,
            customer_id: b.customer_id,
            service_id: b.service_id,
            staff_id: b.staff_id,
            notes: b.notes,
        }
    }
}

// POST /api/bookings
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub service_id: i64,
    pub staff_id: Option<i64>,
    pub start_time: String,
    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct CreateBookingResponse {
    booking: BookingResponse,
    confirmation: DeliveryOutcome,
    reminder: ReminderOutcome,
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    let requester = current_user(&state, &headers).await?;

    let start_time = parse_start_time(&body.start_time).ok_or_else(|| {
        AppError::BadRequest(format!("unrecognised start_time: {}", body.start_time))
    })?;

    let outcome = state
        .scheduler
        .request_booking(BookingRequest {
            customer_id: requester.id,
            service_id: body.service_id,
            staff_id: body.staff_id,
            start_time,
            notes: body.notes.filter(|n| !n.trim().is_empty()),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            booking: outcome.booking.into(),
            confirmation: outcome.confirmation,
            reminder: outcome.reminder,
        }),
    ))
}

// GET /api/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let requester = current_user(&state, &headers).await?;
    let bookings = state.scheduler.list_bookings(requester)?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

// GET /api/bookings/upcoming
pub async fn upcoming_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    current_user(&state, &headers).await?;
    let bookings = state.scheduler.list_upcoming()?;
    Ok(Json(bookings.into_iter().map(Into::into).collect()))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let requester = current_user(&state, &headers).await?;
    let booking = state.scheduler.get_booking(&id, requester)?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let requester = current_user(&state, &headers).await?;
    let booking = state.scheduler.cancel_booking(&id, requester)?;
    Ok(Json(booking.into()))
}

// POST /api/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<BookingResponse>, AppError> {
    let requester = current_user(&state, &headers).await?;
    let booking = state.scheduler.complete_booking(&id, requester)?;
    Ok(Json(booking.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_time_formats() {
        let expected =
            NaiveDateTime::parse_from_str("2024-01-10 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        for raw in [
            "2024-01-10T10:00:00",
            "2024-01-10T10:00",
            "2024-01-10 10:00:00",
            "2024-01-10 10:00",
            " 2024-01-10T10:00:00.000 ",
        ] {
            assert_eq!(parse_start_time(raw), Some(expected), "failed on {raw:?}");
        }
        assert_eq!(parse_start_time("tomorrow at ten"), None);
    }

    #[test]
    fn test_parse_start_time_rejects_out_of_range_years() {
        assert!(parse_start_time("9999-12-31T23:59:00").is_some());
        assert_eq!(parse_start_time("+10000-01-10T10:00:00"), None);
        assert_eq!(parse_start_time("+262142-12-31T23:59:00"), None);
        assert_eq!(parse_start_time("-262143-01-01T10:00:00"), None);
    }
}
