//! Services module for retail-service.

pub mod accrual;
pub mod checkout;
pub mod clock;
pub mod inventory;
pub mod metrics;
pub mod notifier;
pub mod reminders;
pub mod rentals;
pub mod stock_alert;
pub mod store;
pub mod templates;

pub use accrual::{summarize, AccrualOptions, AccrualSummary};
pub use checkout::{CheckoutOutcome, CheckoutService};
pub use clock::{Clock, FixedClock, SystemClock};
pub use inventory::InventoryService;
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{build_notifier, MockNotifier, Notifier};
pub use reminders::ReminderScheduler;
pub use rentals::RentalService;
pub use stock_alert::{StockAlertQueue, StockAlertService};
pub use store::{MemoryStore, PgStore, Store};
