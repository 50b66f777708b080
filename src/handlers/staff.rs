use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::state::AppState;

use super::current_user;

// GET /api/staff
#[derive(Serialize)]
pub struct StaffResponse {
    id: i64,
    name: Option<String>,
    email: String,
}

pub async fn list_staff(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<StaffResponse>>, AppError> {
    current_user(&state, &headers).await?;

    let staff = state.scheduler.list_staff().await?;
    Ok(Json(
        staff
            .into_iter()
            .map(|u| StaffResponse {
                id: u.id,
                name: u.name,
                email: u.email,
            })
            .collect(),
    ))
}
