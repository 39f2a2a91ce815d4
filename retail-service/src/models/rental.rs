//! Cube rental and rent payment models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Rental status, derived once from the lease dates at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RentalStatus {
    Upcoming,
    Active,
    Expired,
}

impl RentalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentalStatus::Upcoming => "UPCOMING",
            RentalStatus::Active => "ACTIVE",
            RentalStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "UPCOMING" => Some(RentalStatus::Upcoming),
            "ACTIVE" => Some(RentalStatus::Active),
            "EXPIRED" => Some(RentalStatus::Expired),
            _ => None,
        }
    }

    /// Status for a lease as seen on `today`.
    pub fn derive(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Self {
        if today < start {
            RentalStatus::Upcoming
        } else if today >= end {
            RentalStatus::Expired
        } else {
            RentalStatus::Active
        }
    }
}

impl std::fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tenant's lease on a cube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Rental {
    pub rental_id: Uuid,
    pub tenant_id: Uuid,
    pub cube_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub daily_rate: Decimal,
    pub status: String,
    pub allocated_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl Rental {
    pub fn parsed_status(&self) -> Option<RentalStatus> {
        RentalStatus::from_string(&self.status)
    }
}

/// How rent was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RentPaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Other,
}

impl RentPaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentPaymentMethod::Cash => "CASH",
            RentPaymentMethod::Card => "CARD",
            RentPaymentMethod::BankTransfer => "BANK_TRANSFER",
            RentPaymentMethod::Other => "OTHER",
        }
    }
}

/// Rent payment ledger entry. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RentPayment {
    pub payment_id: Uuid,
    pub rental_id: Uuid,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub method: String,
    pub received_by: Uuid,
    pub note: Option<String>,
}
