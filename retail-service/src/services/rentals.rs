//! Cube allocation, rent payments and accrual summaries.

use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{AllocateRentalRequest, RecordRentPaymentRequest};
use crate::models::{Rental, RentPayment, RentalStatus};
use crate::services::accrual::{summarize, AccrualOptions, AccrualSummary};
use crate::services::clock::{midnight_utc, Clock};
use crate::services::store::Store;

pub struct RentalService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    options: AccrualOptions,
}

impl RentalService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, options: AccrualOptions) -> Self {
        Self {
            store,
            clock,
            options,
        }
    }

    /// Allocate a cube. The status is derived from today's date once and
    /// stored as is.
    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, cube_id = %request.cube_id))]
    pub async fn allocate(&self, request: AllocateRentalRequest) -> Result<Rental, AppError> {
        request.validate()?;

        if self.store.get_tenant(request.tenant_id).await?.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Tenant {} not found",
                request.tenant_id
            )));
        }

        let now = self.clock.now();
        let status = RentalStatus::derive(request.start_date, request.end_date, now.date_naive());

        let rental = Rental {
            rental_id: Uuid::new_v4(),
            tenant_id: request.tenant_id,
            cube_id: request.cube_id,
            start_date: midnight_utc(request.start_date),
            end_date: midnight_utc(request.end_date),
            daily_rate: request.daily_rate,
            status: status.as_str().to_string(),
            allocated_by: request.allocated_by,
            created_utc: now,
        };

        self.store.insert_rental(&rental).await?;

        info!(rental_id = %rental.rental_id, status = %status, "Cube allocated");
        Ok(rental)
    }

    /// Append a payment to the rental's ledger.
    #[instrument(skip(self, request))]
    pub async fn record_payment(
        &self,
        rental_id: Uuid,
        request: RecordRentPaymentRequest,
    ) -> Result<RentPayment, AppError> {
        request.validate()?;
        self.rental(rental_id).await?;

        let payment = RentPayment {
            payment_id: Uuid::new_v4(),
            rental_id,
            amount: request.amount,
            paid_at: self.clock.now(),
            method: request.method.as_str().to_string(),
            received_by: request.received_by,
            note: request.note.filter(|n| !n.trim().is_empty()),
        };

        self.store.insert_rent_payment(&payment).await?;

        info!(payment_id = %payment.payment_id, amount = %payment.amount, "Rent payment recorded");
        Ok(payment)
    }

    /// Accrual figures for a rental as of now.
    #[instrument(skip(self))]
    pub async fn summary(&self, rental_id: Uuid) -> Result<AccrualSummary, AppError> {
        let rental = self.rental(rental_id).await?;
        let payments = self.store.list_rent_payments(rental_id).await?;
        summarize(&rental, &payments, self.clock.now(), self.options)
    }

    async fn rental(&self, rental_id: Uuid) -> Result<Rental, AppError> {
        self.store
            .get_rental(rental_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Rental {} not found", rental_id)))
    }
}
