//! Typed request bodies. Every request is validated before it reaches the
//! services.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::{RentPaymentMethod, TenderMethod};

/// Basket submitted by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: String,
    pub tenant_id: Uuid,
    pub cashier_id: Option<Uuid>,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(min = 1), nested)]
    pub items: Vec<CheckoutItem>,
    #[validate(length(min = 1), nested)]
    pub payments: Vec<CheckoutPayment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CheckoutItem {
    pub variant_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(range(min = 0))]
    pub unit_price_cents: i64,
    /// Per unit.
    #[serde(default)]
    #[validate(range(min = 0))]
    pub discount_cents: i64,
    /// Per unit.
    #[serde(default)]
    #[validate(range(min = 0))]
    pub tax_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CheckoutPayment {
    pub method: TenderMethod,
    #[validate(range(min = 1))]
    pub amount_cents: i64,
}

/// Cube allocation request. Dates are calendar days in UTC.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_lease_dates"))]
pub struct AllocateRentalRequest {
    pub tenant_id: Uuid,
    pub cube_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[validate(custom(function = "money_amount"))]
    pub daily_rate: Decimal,
    pub allocated_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordRentPaymentRequest {
    #[validate(custom(function = "money_amount"))]
    pub amount: Decimal,
    pub method: RentPaymentMethod,
    pub received_by: Uuid,
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// Explicit stock correction for a variant.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateStockRequest {
    pub tenant_id: Uuid,
    pub actor_user_id: Uuid,
    #[validate(range(min = 0))]
    pub stock: i32,
}

/// Tenant scope for read endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Uuid,
}

fn validate_lease_dates(req: &AllocateRentalRequest) -> Result<(), ValidationError> {
    if req.end_date <= req.start_date {
        let mut err = ValidationError::new("lease_dates");
        err.message = Some("end_date must be after start_date".into());
        return Err(err);
    }
    Ok(())
}

/// Largest amount a NUMERIC(12,2) column holds: 9,999,999,999.99.
pub const MAX_MONEY: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// Positive, whole cents, and within NUMERIC(12,2).
fn money_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    if value.round_dp(2) != *value {
        return Err(ValidationError::new("too_many_decimal_places"));
    }
    if *value > MAX_MONEY {
        return Err(ValidationError::new("out_of_range"));
    }
    Ok(())
}
