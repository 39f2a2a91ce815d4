//! Persistence for retail-service.
//!
//! [`Store`] covers single-statement reads and writes. Multi-statement work
//! goes through a [`UnitOfWork`] obtained from [`Store::begin`], which must be
//! committed explicitly; dropping it rolls everything back.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    InventoryLog, PaymentReminder, ProductVariant, Rental, RentPayment, RentalStatus,
    ReminderType, Sale, SalePayment, StockChange, Tenant,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of inserting a sale inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleInsert {
    Inserted,
    /// Another sale already owns the idempotency key.
    DuplicateKey,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Sale with its items and payments.
    async fn find_sale_by_key(&self, idempotency_key: &str) -> Result<Option<Sale>, AppError>;

    async fn get_sale(&self, tenant_id: Uuid, sale_id: Uuid) -> Result<Option<Sale>, AppError>;

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError>;

    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<ProductVariant>, AppError>;

    async fn list_inventory_logs(&self, variant_id: Uuid) -> Result<Vec<InventoryLog>, AppError>;

    async fn insert_rental(&self, rental: &Rental) -> Result<(), AppError>;

    async fn get_rental(&self, rental_id: Uuid) -> Result<Option<Rental>, AppError>;

    /// Rentals whose stored status matches, oldest first.
    async fn list_rentals_by_status(&self, status: RentalStatus) -> Result<Vec<Rental>, AppError>;

    async fn insert_rent_payment(&self, payment: &RentPayment) -> Result<(), AppError>;

    async fn list_rent_payments(&self, rental_id: Uuid) -> Result<Vec<RentPayment>, AppError>;

    async fn reminder_exists(
        &self,
        rental_id: Uuid,
        reminder_type: ReminderType,
        due_date: NaiveDate,
    ) -> Result<bool, AppError>;

    /// Fails with `Conflict` when the (rental, type, due date) tuple exists.
    async fn insert_reminder(&self, reminder: &PaymentReminder) -> Result<(), AppError>;

    async fn list_reminders(&self, rental_id: Uuid) -> Result<Vec<PaymentReminder>, AppError>;

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;
}

/// An open transaction. Nothing written through it is visible to other
/// callers until [`UnitOfWork::commit`] succeeds.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_variants(
        &mut self,
        variant_ids: &[Uuid],
    ) -> Result<Vec<ProductVariant>, AppError>;

    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError>;

    /// Decrement stock by `quantity` only if at least that much is on hand.
    /// `None` means the condition failed and nothing was written.
    async fn decrement_stock(
        &mut self,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<Option<StockChange>, AppError>;

    /// Overwrite stock. `None` when the variant does not exist.
    async fn set_stock(&mut self, variant_id: Uuid, stock: i32)
        -> Result<Option<StockChange>, AppError>;

    async fn insert_inventory_log(&mut self, log: &InventoryLog) -> Result<(), AppError>;

    /// Insert the sale row and its items.
    async fn insert_sale(&mut self, sale: &Sale) -> Result<SaleInsert, AppError>;

    async fn insert_sale_payments(&mut self, payments: &[SalePayment]) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
