use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{SaleInsert, Store, UnitOfWork};
use crate::models::{
    InventoryLog, PaymentReminder, ProductVariant, Rental, RentPayment, RentalStatus,
    ReminderType, Sale, SalePayment, StockChange, Tenant,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tenants: HashMap<Uuid, Tenant>,
    variants: HashMap<Uuid, ProductVariant>,
    inventory_logs: Vec<InventoryLog>,
    sales: Vec<Sale>,
    rentals: Vec<Rental>,
    rent_payments: Vec<RentPayment>,
    reminders: Vec<PaymentReminder>,
}

impl MemoryState {
    fn sale_by_key(&self, key: &str) -> Option<&Sale> {
        self.sales.iter().find(|s| s.idempotency_key == key)
    }
}

/// In-process store with the same transactional behaviour as Postgres.
///
/// Units of work are serialised: one holds the state lock from `begin` until
/// it commits or rolls back, writing to a private copy that replaces the
/// shared state on commit. A task holding a unit of work must not call the
/// store directly.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_tenant(&self, tenant: Tenant) {
        self.state
            .lock()
            .await
            .tenants
            .insert(tenant.tenant_id, tenant);
    }

    pub async fn insert_variant(&self, variant: ProductVariant) {
        self.state
            .lock()
            .await
            .variants
            .insert(variant.variant_id, variant);
    }

    pub async fn sale_count(&self) -> usize {
        self.state.lock().await.sales.len()
    }

    pub async fn inventory_log_count(&self) -> usize {
        self.state.lock().await.inventory_logs.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn find_sale_by_key(&self, idempotency_key: &str) -> Result<Option<Sale>, AppError> {
        Ok(self.state.lock().await.sale_by_key(idempotency_key).cloned())
    }

    async fn get_sale(&self, tenant_id: Uuid, sale_id: Uuid) -> Result<Option<Sale>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .sales
            .iter()
            .find(|s| s.sale_id == sale_id && s.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        Ok(self.state.lock().await.tenants.get(&tenant_id).cloned())
    }

    async fn get_variant(&self, variant_id: Uuid) -> Result<Option<ProductVariant>, AppError> {
        Ok(self.state.lock().await.variants.get(&variant_id).cloned())
    }

    async fn list_inventory_logs(&self, variant_id: Uuid) -> Result<Vec<InventoryLog>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .inventory_logs
            .iter()
            .filter(|l| l.variant_id == variant_id)
            .cloned()
            .collect())
    }

    async fn insert_rental(&self, rental: &Rental) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if state.rentals.iter().any(|r| r.rental_id == rental.rental_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Rental {} already exists",
                rental.rental_id
            )));
        }
        state.rentals.push(rental.clone());
        Ok(())
    }

    async fn get_rental(&self, rental_id: Uuid) -> Result<Option<Rental>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .rentals
            .iter()
            .find(|r| r.rental_id == rental_id)
            .cloned())
    }

    async fn list_rentals_by_status(&self, status: RentalStatus) -> Result<Vec<Rental>, AppError> {
        let mut rentals: Vec<Rental> = self
            .state
            .lock()
            .await
            .rentals
            .iter()
            .filter(|r| r.status == status.as_str())
            .cloned()
            .collect();
        rentals.sort_by_key(|r| r.created_utc);
        Ok(rentals)
    }

    async fn insert_rent_payment(&self, payment: &RentPayment) -> Result<(), AppError> {
        self.state.lock().await.rent_payments.push(payment.clone());
        Ok(())
    }

    async fn list_rent_payments(&self, rental_id: Uuid) -> Result<Vec<RentPayment>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .rent_payments
            .iter()
            .filter(|p| p.rental_id == rental_id)
            .cloned()
            .collect())
    }

    async fn reminder_exists(
        &self,
        rental_id: Uuid,
        reminder_type: ReminderType,
        due_date: NaiveDate,
    ) -> Result<bool, AppError> {
        Ok(self.state.lock().await.reminders.iter().any(|r| {
            r.rental_id == rental_id
                && r.reminder_type == reminder_type.as_str()
                && r.due_date == due_date
        }))
    }

    async fn insert_reminder(&self, reminder: &PaymentReminder) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let duplicate = state.reminders.iter().any(|r| {
            r.rental_id == reminder.rental_id
                && r.reminder_type == reminder.reminder_type
                && r.due_date == reminder.due_date
        });
        if duplicate {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Reminder {} for {} already recorded",
                reminder.reminder_type,
                reminder.due_date
            )));
        }
        state.reminders.push(reminder.clone());
        Ok(())
    }

    async fn list_reminders(&self, rental_id: Uuid) -> Result<Vec<PaymentReminder>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .reminders
            .iter()
            .filter(|r| r.rental_id == rental_id)
            .cloned()
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_variants(
        &mut self,
        variant_ids: &[Uuid],
    ) -> Result<Vec<ProductVariant>, AppError> {
        Ok(variant_ids
            .iter()
            .filter_map(|id| self.working.variants.get(id).cloned())
            .collect())
    }

    async fn find_tenant(&mut self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        Ok(self.working.tenants.get(&tenant_id).cloned())
    }

    async fn decrement_stock(
        &mut self,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<Option<StockChange>, AppError> {
        match self.working.variants.get_mut(&variant_id) {
            Some(variant) if variant.stock >= quantity => {
                let previous = variant.stock;
                variant.stock -= quantity;
                Ok(Some(StockChange {
                    previous,
                    current: variant.stock,
                }))
            }
            _ => Ok(None),
        }
    }

    async fn set_stock(
        &mut self,
        variant_id: Uuid,
        stock: i32,
    ) -> Result<Option<StockChange>, AppError> {
        if stock < 0 {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "stock must not be negative"
            )));
        }
        Ok(self.working.variants.get_mut(&variant_id).map(|variant| {
            let previous = variant.stock;
            variant.stock = stock;
            StockChange {
                previous,
                current: stock,
            }
        }))
    }

    async fn insert_inventory_log(&mut self, log: &InventoryLog) -> Result<(), AppError> {
        self.working.inventory_logs.push(log.clone());
        Ok(())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<SaleInsert, AppError> {
        if self.working.sale_by_key(&sale.idempotency_key).is_some() {
            return Ok(SaleInsert::DuplicateKey);
        }
        let mut stored = sale.clone();
        stored.payments.clear();
        self.working.sales.push(stored);
        Ok(SaleInsert::Inserted)
    }

    async fn insert_sale_payments(&mut self, payments: &[SalePayment]) -> Result<(), AppError> {
        for payment in payments {
            let sale = self
                .working
                .sales
                .iter_mut()
                .find(|s| s.sale_id == payment.sale_id)
                .ok_or_else(|| {
                    AppError::DatabaseError(anyhow::anyhow!(
                        "Payment references unknown sale {}",
                        payment.sale_id
                    ))
                })?;
            sale.payments.push(payment.clone());
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn variant(stock: i32) -> ProductVariant {
        ProductVariant {
            variant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            product_name: "Tote".to_string(),
            variant_name: "Natural".to_string(),
            barcode: None,
            stock,
            price_cents: 1500,
            low_stock_threshold: 2,
            approval_status: "APPROVED".to_string(),
        }
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let store = MemoryStore::new();
        let v = variant(3);
        let id = v.variant_id;
        store.insert_variant(v).await;

        let mut uow = store.begin().await.unwrap();
        assert_eq!(
            uow.decrement_stock(id, 2).await.unwrap(),
            Some(StockChange {
                previous: 3,
                current: 1
            })
        );
        assert_eq!(uow.decrement_stock(id, 2).await.unwrap(), None);
        uow.commit().await.unwrap();

        assert_eq!(store.get_variant(id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn test_drop_without_commit_discards_writes() {
        let store = MemoryStore::new();
        let v = variant(5);
        let id = v.variant_id;
        store.insert_variant(v).await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.set_stock(id, 0).await.unwrap();
        }
        let mut uow = store.begin().await.unwrap();
        uow.decrement_stock(id, 1).await.unwrap();
        uow.rollback().await.unwrap();

        assert_eq!(store.get_variant(id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_duplicate_reminder_is_conflict() {
        let store = MemoryStore::new();
        let reminder = PaymentReminder {
            reminder_id: Uuid::new_v4(),
            rental_id: Uuid::new_v4(),
            reminder_type: ReminderType::Overdue.as_str().to_string(),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            email_sent: true,
            created_utc: Utc::now(),
        };
        store.insert_reminder(&reminder).await.unwrap();

        let again = PaymentReminder {
            reminder_id: Uuid::new_v4(),
            email_sent: false,
            ..reminder.clone()
        };
        assert!(matches!(
            store.insert_reminder(&again).await,
            Err(AppError::Conflict(_))
        ));
        assert!(store
            .reminder_exists(reminder.rental_id, ReminderType::Overdue, reminder.due_date)
            .await
            .unwrap());
    }
}
