//! Product variant stock and inventory audit models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Variant as loaded for stock operations, joined with its product so the
/// owning tenant and display names are at hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProductVariant {
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub tenant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub barcode: Option<String>,
    pub stock: i32,
    pub price_cents: i64,
    pub low_stock_threshold: i32,
    pub approval_status: String,
}

/// Kind of stock-affecting action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryChangeType {
    Sale,
    ManualAdjustment,
}

impl InventoryChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryChangeType::Sale => "SALE",
            InventoryChangeType::ManualAdjustment => "MANUAL_ADJUSTMENT",
        }
    }
}

/// Stock before and after a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub previous: i32,
    pub current: i32,
}

/// Append-only audit entry, one per stock-affecting action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct InventoryLog {
    pub log_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub actor_user_id: Uuid,
    pub change_type: String,
    pub previous_value: i32,
    pub new_value: i32,
    pub created_utc: DateTime<Utc>,
}

impl InventoryLog {
    pub fn new(
        variant: &ProductVariant,
        actor_user_id: Uuid,
        change_type: InventoryChangeType,
        change: StockChange,
        created_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            product_id: variant.product_id,
            variant_id: variant.variant_id,
            actor_user_id,
            change_type: change_type.as_str().to_string(),
            previous_value: change.previous,
            new_value: change.current,
            created_utc,
        }
    }
}
