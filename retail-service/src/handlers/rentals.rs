use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{AllocateRentalRequest, RecordRentPaymentRequest};
use crate::models::{Rental, RentPayment};
use crate::services::AccrualSummary;
use crate::startup::AppState;

#[tracing::instrument(skip(state, request))]
pub async fn allocate_rental(
    State(state): State<AppState>,
    Json(request): Json<AllocateRentalRequest>,
) -> Result<(StatusCode, Json<Rental>), AppError> {
    let rental = state.rentals.allocate(request).await?;
    Ok((StatusCode::CREATED, Json(rental)))
}

#[tracing::instrument(skip(state, request))]
pub async fn record_rent_payment(
    State(state): State<AppState>,
    Path(rental_id): Path<Uuid>,
    Json(request): Json<RecordRentPaymentRequest>,
) -> Result<(StatusCode, Json<RentPayment>), AppError> {
    let payment = state.rentals.record_payment(rental_id, request).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

#[tracing::instrument(skip(state))]
pub async fn rental_summary(
    State(state): State<AppState>,
    Path(rental_id): Path<Uuid>,
) -> Result<Json<AccrualSummary>, AppError> {
    Ok(Json(state.rentals.summary(rental_id).await?))
}
