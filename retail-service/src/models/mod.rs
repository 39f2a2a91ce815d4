//! Domain models for retail-service.

mod inventory;
mod reminder;
mod rental;
mod sale;
mod tenant;

pub use inventory::{InventoryChangeType, InventoryLog, ProductVariant, StockChange};
pub use reminder::{
    PaymentReminder, RentalReminderOutcome, RentalReminderResult, ReminderDispatch,
    ReminderRunStats, ReminderType,
};
pub use rental::{Rental, RentPayment, RentPaymentMethod, RentalStatus};
pub use sale::{Sale, SaleItem, SalePayment, SalePaymentStatus, SaleStatus, TenderMethod};
pub use tenant::Tenant;
