//! Point-of-sale models. All amounts are integer cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sale status. Sales are immutable once committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Completed,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "COMPLETED",
        }
    }
}

/// Tender used at the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenderMethod {
    Cash,
    Card,
    Mobile,
    Voucher,
}

impl TenderMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenderMethod::Cash => "CASH",
            TenderMethod::Card => "CARD",
            TenderMethod::Mobile => "MOBILE",
            TenderMethod::Voucher => "VOUCHER",
        }
    }
}

/// Status of a tender line. The terminal only records settled tenders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalePaymentStatus {
    Captured,
}

impl SalePaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalePaymentStatus::Captured => "CAPTURED",
        }
    }
}

/// A committed sale with its lines and tenders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Sale {
    pub sale_id: Uuid,
    pub idempotency_key: String,
    pub tenant_id: Uuid,
    pub cashier_id: Option<Uuid>,
    pub currency: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<SaleItem>,
    #[sqlx(skip)]
    pub payments: Vec<SalePayment>,
}

impl Sale {
    /// `subtotal − discount + tax == total` and tenders cover the total exactly.
    pub fn is_balanced(&self) -> bool {
        let tendered: i64 = self.payments.iter().map(|p| p.amount_cents).sum();
        self.subtotal_cents - self.discount_cents + self.tax_cents == self.total_cents
            && tendered == self.total_cents
    }
}

/// Sale line. Names and barcode are snapshots taken at checkout so later
/// product edits never rewrite history. Discount and tax are line totals
/// (per-unit value × quantity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SaleItem {
    pub sale_item_id: Uuid,
    pub sale_id: Uuid,
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub barcode: Option<String>,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
}

/// Tender line of a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SalePayment {
    pub sale_payment_id: Uuid,
    pub sale_id: Uuid,
    pub method: String,
    pub amount_cents: i64,
    pub status: String,
}
