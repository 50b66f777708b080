pub mod bookings;
pub mod health;
pub mod staff;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::models::Requester;
use crate::state::AppState;

/// Set by the upstream auth layer to the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route("/api/bookings/upcoming", get(bookings::upcoming_bookings))
        .route("/api/bookings/:id", get(bookings::get_booking))
        .route("/api/bookings/:id/cancel", post(bookings::cancel_booking))
        .route("/api/bookings/:id/complete", post(bookings::complete_booking))
        .route("/api/staff", get(staff::list_staff))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves the requesting user through the identity collaborator.
async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<Requester, AppError> {
    let id: i64 = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or(AppError::Unauthorized)?;

    let user = state
        .identity
        .get_user(id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Requester::from(&user))
}
