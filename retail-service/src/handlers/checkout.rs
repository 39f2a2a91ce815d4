use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::{CheckoutRequest, TenantQuery};
use crate::models::Sale;
use crate::startup::AppState;

/// `201` with the new sale, or `200` with the original sale when the
/// idempotency key was seen before.
#[tracing::instrument(skip(state, request))]
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Sale>), AppError> {
    let outcome = state.checkout.checkout(request).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.sale)))
}

#[tracing::instrument(skip(state))]
pub async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Sale>, AppError> {
    Ok(Json(state.checkout.get_sale(query.tenant_id, sale_id).await?))
}
