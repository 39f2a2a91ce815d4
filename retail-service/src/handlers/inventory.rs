use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::UpdateStockRequest;
use crate::models::ProductVariant;
use crate::startup::AppState;

#[tracing::instrument(skip(state, request))]
pub async fn update_stock(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
    Json(request): Json<UpdateStockRequest>,
) -> Result<Json<ProductVariant>, AppError> {
    Ok(Json(state.inventory.update_stock(variant_id, request).await?))
}
