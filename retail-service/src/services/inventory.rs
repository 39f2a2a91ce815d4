//! Explicit stock corrections.

use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::UpdateStockRequest;
use crate::models::{InventoryChangeType, InventoryLog, ProductVariant};
use crate::services::clock::Clock;
use crate::services::stock_alert::{StockAlertJob, StockAlertQueue};
use crate::services::store::{Store, UnitOfWork};

pub struct InventoryService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    alerts: StockAlertQueue,
}

impl InventoryService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, alerts: StockAlertQueue) -> Self {
        Self {
            store,
            clock,
            alerts,
        }
    }

    /// Set a variant's stock and record the adjustment. The new level is
    /// checked for alerts after commit.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id))]
    pub async fn update_stock(
        &self,
        variant_id: Uuid,
        request: UpdateStockRequest,
    ) -> Result<ProductVariant, AppError> {
        request.validate()?;

        let mut uow = self.store.begin().await?;
        let variant = match self.adjust(uow.as_mut(), variant_id, &request).await {
            Ok(variant) => variant,
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after stock update error");
                }
                return Err(e);
            }
        };
        uow.commit().await?;

        info!(variant_id = %variant_id, stock = variant.stock, "Stock updated");
        self.alerts
            .enqueue(StockAlertJob::for_variant(&variant, variant.stock));

        Ok(variant)
    }

    async fn adjust(
        &self,
        uow: &mut dyn UnitOfWork,
        variant_id: Uuid,
        request: &UpdateStockRequest,
    ) -> Result<ProductVariant, AppError> {
        let mut variant = uow
            .find_variants(&[variant_id])
            .await?
            .into_iter()
            .next()
            .filter(|v| v.tenant_id == request.tenant_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Variant {} not found", variant_id)))?;

        let change = uow
            .set_stock(variant_id, request.stock)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Variant {} not found", variant_id)))?;

        uow.insert_inventory_log(&InventoryLog::new(
            &variant,
            request.actor_user_id,
            InventoryChangeType::ManualAdjustment,
            change,
            self.clock.now(),
        ))
        .await?;

        variant.stock = change.current;
        Ok(variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertConfig;
    use crate::services::clock::SystemClock;
    use crate::services::notifier::MockNotifier;
    use crate::services::stock_alert::StockAlertService;
    use crate::services::store::MemoryStore;

    fn variant(tenant_id: Uuid) -> ProductVariant {
        ProductVariant {
            variant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            tenant_id,
            product_name: "Soap".to_string(),
            variant_name: "Oat".to_string(),
            barcode: None,
            stock: 10,
            price_cents: 800,
            low_stock_threshold: 3,
            approval_status: "APPROVED".to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_writes_manual_adjustment_log() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let v = variant(tenant_id);
        let variant_id = v.variant_id;
        store.insert_variant(v).await;

        let store_arc: Arc<dyn Store> = Arc::new(store.clone());
        let alerts = StockAlertService::new(
            &AlertConfig::default(),
            store_arc.clone(),
            Arc::new(MockNotifier::new()),
        );
        let service = InventoryService::new(store_arc, Arc::new(SystemClock), alerts.queue());

        let actor = Uuid::new_v4();
        let updated = service
            .update_stock(
                variant_id,
                UpdateStockRequest {
                    tenant_id,
                    actor_user_id: actor,
                    stock: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.stock, 2);

        let logs = store.list_inventory_logs(variant_id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].change_type, "MANUAL_ADJUSTMENT");
        assert_eq!((logs[0].previous_value, logs[0].new_value), (10, 2));
        assert_eq!(logs[0].actor_user_id, actor);

        let other_tenant = service
            .update_stock(
                variant_id,
                UpdateStockRequest {
                    tenant_id: Uuid::new_v4(),
                    actor_user_id: actor,
                    stock: 5,
                },
            )
            .await;
        assert!(matches!(other_tenant, Err(AppError::NotFound(_))));
        assert_eq!(store.get_variant(variant_id).await.unwrap().unwrap().stock, 2);
    }
}
