//! Rent payment reminders.
//!
//! One sequential pass over active rentals. Each reminder kind is guarded by
//! a (rental, type, due date) record, so a second run with no state change
//! sends nothing. Every send attempt is recorded once with its delivery
//! outcome and never retried.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    PaymentReminder, Rental, RentalReminderOutcome, RentalReminderResult, RentalStatus,
    ReminderDispatch, ReminderRunStats, ReminderType, Tenant,
};
use crate::services::accrual::{summarize, AccrualOptions, AccrualSummary};
use crate::services::clock::Clock;
use crate::services::metrics::{record_error, record_reminder, record_reminder_run};
use crate::services::notifier::{deliver, EmailMessage, Notifier};
use crate::services::store::Store;
use crate::services::templates::{render_reminder, ReminderTemplateData};

/// Accrued rent above which a rental with no triggered reminder still gets
/// the generic advance notice.
const GENERIC_REMINDER_MIN_ACCRUED: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

pub struct ReminderScheduler {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    options: AccrualOptions,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        options: AccrualOptions,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            options,
        }
    }

    /// Run one reminder pass over every active rental.
    ///
    /// Only the initial rental listing can fail the run. Failures on a single
    /// rental are counted in `errors` and the pass continues.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<ReminderRunStats, AppError> {
        let now = self.clock.now();

        let rentals = match self.store.list_rentals_by_status(RentalStatus::Active).await {
            Ok(rentals) => rentals,
            Err(e) => {
                error!(error = %e, "Failed to list active rentals");
                record_reminder_run("failed");
                return Err(e);
            }
        };

        info!(rental_count = rentals.len(), "Starting reminder run");

        let mut stats = ReminderRunStats::default();

        for rental in &rentals {
            stats.processed += 1;

            let mut reminders = Vec::new();
            let result = match self.process_rental(rental, now, &mut reminders).await {
                Ok(outcome) => RentalReminderResult {
                    rental_id: rental.rental_id,
                    outcome,
                    reminders,
                    error: None,
                },
                Err(e) => {
                    warn!(rental_id = %rental.rental_id, error = %e, "Reminder processing failed");
                    record_error(e.kind(), "reminder_run");
                    stats.errors += 1;
                    RentalReminderResult {
                        rental_id: rental.rental_id,
                        outcome: RentalReminderOutcome::Failed,
                        reminders,
                        error: Some(e.to_string()),
                    }
                }
            };

            if result.outcome == RentalReminderOutcome::Skipped {
                stats.skipped += 1;
            }
            stats.sent += result.reminders.iter().filter(|r| r.email_sent).count() as u32;
            stats.results.push(result);
        }

        info!(
            processed = stats.processed,
            sent = stats.sent,
            skipped = stats.skipped,
            errors = stats.errors,
            "Reminder run completed"
        );
        record_reminder_run(if stats.errors == 0 {
            "completed"
        } else {
            "completed_with_errors"
        });

        Ok(stats)
    }

    async fn process_rental(
        &self,
        rental: &Rental,
        now: DateTime<Utc>,
        dispatched: &mut Vec<ReminderDispatch>,
    ) -> Result<RentalReminderOutcome, AppError> {
        let payments = self.store.list_rent_payments(rental.rental_id).await?;
        let summary = summarize(rental, &payments, now, self.options)?;

        if summary.accrued_to_date.is_zero() && summary.balance_due.is_zero() {
            return Ok(RentalReminderOutcome::Skipped);
        }

        let tenant = self.store.get_tenant(rental.tenant_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Tenant {} not found", rental.tenant_id))
        })?;

        let today = now.date_naive();
        let mut fired = false;

        if today + Duration::days(7) >= summary.next_due_date {
            fired |= self
                .send_once(
                    rental,
                    &tenant,
                    ReminderType::SevenDayAdvance,
                    summary.next_due_date,
                    summary.accrued_to_date,
                    false,
                    dispatched,
                )
                .await?;
        }

        if today + Duration::days(1) >= summary.next_due_date {
            fired |= self
                .send_once(
                    rental,
                    &tenant,
                    ReminderType::OneDayDue,
                    summary.next_due_date,
                    outstanding(&summary, false),
                    false,
                    dispatched,
                )
                .await?;
        }

        if summary.overdue {
            fired |= self
                .send_once(
                    rental,
                    &tenant,
                    ReminderType::Overdue,
                    summary.last_due_date,
                    outstanding(&summary, summary.lease_ended),
                    false,
                    dispatched,
                )
                .await?;
        }

        // Catch-all: shares the advance notice's type and dedup key.
        if !fired && summary.accrued_to_date > GENERIC_REMINDER_MIN_ACCRUED {
            self.send_once(
                rental,
                &tenant,
                ReminderType::SevenDayAdvance,
                summary.next_due_date,
                summary.accrued_to_date,
                true,
                dispatched,
            )
            .await?;
        }

        Ok(if dispatched.is_empty() {
            RentalReminderOutcome::NothingDue
        } else {
            RentalReminderOutcome::Reminded
        })
    }

    /// Send a reminder unless one with the same dedup key exists. Returns
    /// whether a send was attempted.
    #[allow(clippy::too_many_arguments)]
    async fn send_once(
        &self,
        rental: &Rental,
        tenant: &Tenant,
        reminder_type: ReminderType,
        due_date: NaiveDate,
        amount: Decimal,
        generic: bool,
        dispatched: &mut Vec<ReminderDispatch>,
    ) -> Result<bool, AppError> {
        if self
            .store
            .reminder_exists(rental.rental_id, reminder_type, due_date)
            .await?
        {
            return Ok(false);
        }

        let rendered = render_reminder(&ReminderTemplateData {
            tenant_name: &tenant.business_name,
            rental_id: rental.rental_id,
            cube_id: rental.cube_id,
            reminder_type,
            amount,
            due_date,
        });

        let report = deliver(
            self.notifier.as_ref(),
            &EmailMessage {
                to: tenant.contact_email.clone(),
                subject: rendered.subject,
                body_html: rendered.html,
                body_text: rendered.text,
            },
        )
        .await;

        let record = PaymentReminder {
            reminder_id: Uuid::new_v4(),
            rental_id: rental.rental_id,
            reminder_type: reminder_type.as_str().to_string(),
            due_date,
            email_sent: report.success,
            created_utc: self.clock.now(),
        };

        match self.store.insert_reminder(&record).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                warn!(
                    rental_id = %rental.rental_id,
                    reminder_type = %reminder_type,
                    due_date = %due_date,
                    "Reminder recorded concurrently by another run"
                );
            }
            Err(e) => return Err(e),
        }

        info!(
            rental_id = %rental.rental_id,
            reminder_type = %reminder_type,
            due_date = %due_date,
            amount = %amount,
            email_sent = report.success,
            generic,
            "Reminder dispatched"
        );
        record_reminder(
            reminder_type.as_str(),
            if report.success { "sent" } else { "failed" },
        );

        dispatched.push(ReminderDispatch {
            reminder_type,
            due_date,
            amount,
            email_sent: report.success,
            generic,
        });

        Ok(true)
    }
}

/// Billed rent still unpaid, never negative. Includes the unbilled tail
/// when `include_unbilled` is set.
fn outstanding(summary: &AccrualSummary, include_unbilled: bool) -> Decimal {
    let mut owed = summary.due_to_date;
    if include_unbilled {
        owed += summary.unbilled_accrued;
    }
    (owed - summary.total_paid).max(Decimal::ZERO)
}
