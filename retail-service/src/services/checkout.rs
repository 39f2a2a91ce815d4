//! Idempotent point-of-sale checkout.
//!
//! A basket becomes a sale in one unit of work: variants are checked against
//! the tenant, stock is decremented with a conditional write per line, one
//! audit entry is written per decrement, then the sale and its tenders are
//! inserted. Any failure rolls the whole unit back. Stock alerts are queued
//! only after commit.

use chrono::{DateTime, SubsecRound, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dtos::{CheckoutItem, CheckoutRequest};
use crate::models::{
    InventoryChangeType, InventoryLog, ProductVariant, Sale, SaleItem, SalePayment,
    SalePaymentStatus, SaleStatus,
};
use crate::services::clock::Clock;
use crate::services::metrics::{record_checkout, record_error};
use crate::services::stock_alert::{StockAlertJob, StockAlertQueue};
use crate::services::store::{SaleInsert, Store, UnitOfWork};

/// Persisted sale plus whether this call created it.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutOutcome {
    pub sale: Sale,
    /// False when the idempotency key replayed an earlier sale.
    pub created: bool,
}

/// Priced basket line. Discount and tax are line totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketTotals {
    pub lines: Vec<PricedLine>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// Price a basket in integer cents. Overflow is reported as a bad request.
pub fn price_basket(items: &[CheckoutItem]) -> Result<BasketTotals, AppError> {
    let overflow = || AppError::BadRequest(anyhow::anyhow!("Basket amounts out of range"));

    let mut lines = Vec::with_capacity(items.len());
    let (mut subtotal, mut discount, mut tax) = (0i64, 0i64, 0i64);

    for item in items {
        let qty = i64::from(item.quantity);
        let gross = item.unit_price_cents.checked_mul(qty).ok_or_else(overflow)?;
        let line_discount = item.discount_cents.checked_mul(qty).ok_or_else(overflow)?;
        let line_tax = item.tax_cents.checked_mul(qty).ok_or_else(overflow)?;
        let line_total = gross
            .checked_sub(line_discount)
            .and_then(|v| v.checked_add(line_tax))
            .ok_or_else(overflow)?;

        subtotal = subtotal.checked_add(gross).ok_or_else(overflow)?;
        discount = discount.checked_add(line_discount).ok_or_else(overflow)?;
        tax = tax.checked_add(line_tax).ok_or_else(overflow)?;

        lines.push(PricedLine {
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            discount_cents: line_discount,
            tax_cents: line_tax,
            line_total_cents: line_total,
        });
    }

    let total = subtotal
        .checked_sub(discount)
        .and_then(|v| v.checked_add(tax))
        .ok_or_else(overflow)?;

    Ok(BasketTotals {
        lines,
        subtotal_cents: subtotal,
        discount_cents: discount,
        tax_cents: tax,
        total_cents: total,
    })
}

/// Tenders that do not add up to the sale total fail validation on `payments`.
fn tender_mismatch(tendered: i64, total: i64) -> AppError {
    let mut error = ValidationError::new("payments_total_mismatch");
    error.message = Some(
        format!(
            "Payments total {} does not match sale total {}",
            tendered, total
        )
        .into(),
    );
    error.add_param("tendered_cents".into(), &tendered);
    error.add_param("total_cents".into(), &total);

    let mut errors = ValidationErrors::new();
    errors.add("payments", error);
    AppError::ValidationError(errors)
}

/// What the unit of work produced.
enum Written {
    Sale {
        sale: Sale,
        touched: Vec<(ProductVariant, i32)>,
    },
    DuplicateKey,
}

pub struct CheckoutService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    alerts: StockAlertQueue,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, alerts: StockAlertQueue) -> Self {
        Self {
            store,
            clock,
            alerts,
        }
    }

    #[instrument(
        skip(self, request),
        fields(tenant_id = %request.tenant_id, idempotency_key = %request.idempotency_key)
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, AppError> {
        let started = Instant::now();
        let result = self.process(&request).await;

        let outcome = match &result {
            Ok(o) if o.created => "created",
            Ok(_) => "replayed",
            Err(AppError::ValidationError(_)) | Err(AppError::BadRequest(_)) => "rejected",
            Err(AppError::NotFound(_)) => "not_found",
            Err(AppError::Conflict(_)) => "conflict",
            Err(e) => {
                record_error(e.kind(), "checkout");
                "failed"
            }
        };
        record_checkout(outcome, started.elapsed().as_secs_f64());

        result
    }

    async fn process(&self, request: &CheckoutRequest) -> Result<CheckoutOutcome, AppError> {
        request.validate()?;

        if let Some(existing) = self.store.find_sale_by_key(&request.idempotency_key).await? {
            return replay(request, existing);
        }

        let totals = price_basket(&request.items)?;
        let tendered = request
            .payments
            .iter()
            .try_fold(0i64, |acc, p| acc.checked_add(p.amount_cents))
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Payment amounts out of range")))?;

        if tendered != totals.total_cents {
            return Err(tender_mismatch(tendered, totals.total_cents));
        }

        let now = self.clock.now().trunc_subsecs(6);
        let mut uow = self.store.begin().await?;

        let written = match write_sale(uow.as_mut(), request, &totals, now).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after checkout error");
                }
                return Err(e);
            }
        };

        match written {
            Written::Sale { sale, touched } => {
                uow.commit().await?;

                info!(
                    sale_id = %sale.sale_id,
                    total_cents = sale.total_cents,
                    items = sale.items.len(),
                    "Sale committed"
                );

                for (variant, stock) in &touched {
                    self.alerts.enqueue(StockAlertJob::for_variant(variant, *stock));
                }

                Ok(CheckoutOutcome {
                    sale,
                    created: true,
                })
            }
            Written::DuplicateKey => {
                // Lost the race to a concurrent checkout with the same key.
                uow.rollback().await?;
                let existing = self
                    .store
                    .find_sale_by_key(&request.idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        AppError::InternalError(anyhow::anyhow!(
                            "Sale for idempotency key vanished after duplicate insert"
                        ))
                    })?;
                replay(request, existing)
            }
        }
    }

    /// Sale by id, visible only to its tenant.
    #[instrument(skip(self))]
    pub async fn get_sale(&self, tenant_id: Uuid, sale_id: Uuid) -> Result<Sale, AppError> {
        self.store
            .get_sale(tenant_id, sale_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Sale {} not found", sale_id)))
    }
}

fn replay(request: &CheckoutRequest, existing: Sale) -> Result<CheckoutOutcome, AppError> {
    if existing.tenant_id != request.tenant_id {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Idempotency key already used by another tenant"
        )));
    }

    info!(sale_id = %existing.sale_id, "Replaying existing sale");
    Ok(CheckoutOutcome {
        sale: existing,
        created: false,
    })
}

async fn write_sale(
    uow: &mut dyn UnitOfWork,
    request: &CheckoutRequest,
    totals: &BasketTotals,
    now: DateTime<Utc>,
) -> Result<Written, AppError> {
    let mut variant_ids: Vec<Uuid> = Vec::new();
    for item in &request.items {
        if !variant_ids.contains(&item.variant_id) {
            variant_ids.push(item.variant_id);
        }
    }

    let variants: HashMap<Uuid, ProductVariant> = uow
        .find_variants(&variant_ids)
        .await?
        .into_iter()
        .map(|v| (v.variant_id, v))
        .collect();

    for id in &variant_ids {
        let variant = variants
            .get(id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Variant {} not found", id)))?;
        if variant.tenant_id != request.tenant_id {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Variant {} does not belong to tenant {}",
                id,
                request.tenant_id
            )));
        }
    }

    let actor_user_id = match request.cashier_id {
        Some(cashier_id) => cashier_id,
        None => {
            uow.find_tenant(request.tenant_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!("Tenant {} not found", request.tenant_id))
                })?
                .user_id
        }
    };

    let sale_id = Uuid::new_v4();
    let mut items = Vec::with_capacity(request.items.len());
    let mut post_stock: HashMap<Uuid, i32> = HashMap::new();

    for (item, line) in request.items.iter().zip(&totals.lines) {
        let variant = &variants[&item.variant_id];

        let change = uow
            .decrement_stock(item.variant_id, item.quantity)
            .await?
            .ok_or_else(|| {
                AppError::Conflict(anyhow::anyhow!(
                    "Insufficient stock for variant {}",
                    item.variant_id
                ))
            })?;

        uow.insert_inventory_log(&InventoryLog::new(
            variant,
            actor_user_id,
            InventoryChangeType::Sale,
            change,
            now,
        ))
        .await?;
        post_stock.insert(item.variant_id, change.current);

        items.push(SaleItem {
            sale_item_id: Uuid::new_v4(),
            sale_id,
            variant_id: variant.variant_id,
            product_id: variant.product_id,
            product_name: variant.product_name.clone(),
            variant_name: variant.variant_name.clone(),
            barcode: variant.barcode.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            discount_cents: line.discount_cents,
            tax_cents: line.tax_cents,
            line_total_cents: line.line_total_cents,
        });
    }

    let payments: Vec<SalePayment> = request
        .payments
        .iter()
        .map(|p| SalePayment {
            sale_payment_id: Uuid::new_v4(),
            sale_id,
            method: p.method.as_str().to_string(),
            amount_cents: p.amount_cents,
            status: SalePaymentStatus::Captured.as_str().to_string(),
        })
        .collect();

    let mut sale = Sale {
        sale_id,
        idempotency_key: request.idempotency_key.clone(),
        tenant_id: request.tenant_id,
        cashier_id: request.cashier_id,
        currency: request.currency.to_ascii_uppercase(),
        subtotal_cents: totals.subtotal_cents,
        discount_cents: totals.discount_cents,
        tax_cents: totals.tax_cents,
        total_cents: totals.total_cents,
        status: SaleStatus::Completed.as_str().to_string(),
        created_utc: now,
        items,
        payments: Vec::new(),
    };

    if uow.insert_sale(&sale).await? == SaleInsert::DuplicateKey {
        return Ok(Written::DuplicateKey);
    }
    uow.insert_sale_payments(&payments).await?;
    sale.payments = payments;

    let touched = variant_ids
        .iter()
        .filter_map(|id| {
            let stock = post_stock.get(id)?;
            Some((variants[id].clone(), *stock))
        })
        .collect();

    Ok(Written::Sale { sale, touched })
}
