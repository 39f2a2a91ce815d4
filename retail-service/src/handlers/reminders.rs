use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::models::ReminderRunStats;
use crate::startup::AppState;

/// Trigger a reminder pass. Meant for the external scheduler.
#[tracing::instrument(skip(state))]
pub async fn run_reminders(
    State(state): State<AppState>,
) -> Result<Json<ReminderRunStats>, AppError> {
    Ok(Json(state.reminders.run().await?))
}
