//! HTTP handlers for retail-service. Handlers only extract, delegate to the
//! services and shape the response.

pub mod checkout;
pub mod health;
pub mod inventory;
pub mod reminders;
pub mod rentals;

pub use checkout::{checkout, get_sale};
pub use health::{health_check, metrics_handler, readiness_check};
pub use inventory::update_stock;
pub use reminders::run_reminders;
pub use rentals::{allocate_rental, record_rent_payment, rental_summary};
