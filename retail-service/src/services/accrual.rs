//! Rent accrual and due-amount calculation.
//!
//! Rent accrues daily from the lease start and is billed in fixed 14-day
//! blocks counted from the start date. Everything here is pure: callers pass
//! the rental, its payment ledger and the instant to evaluate at.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use service_core::error::AppError;

use crate::models::{Rental, RentPayment};

/// Length of a billing block, in days.
pub const BILLING_CYCLE_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualOptions {
    /// Days after a due date before an unpaid balance counts as overdue.
    pub grace_days: i64,
}

/// Accrual figures for one rental at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualSummary {
    pub as_of: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_rental_days: i64,
    pub elapsed_days: i64,
    pub fortnights_elapsed: i64,
    pub accrued_to_date: Decimal,
    pub due_to_date: Decimal,
    pub total_paid: Decimal,
    /// Negative when the tenant has paid ahead.
    pub balance_due: Decimal,
    pub unbilled_accrued: Decimal,
    pub last_due_date: NaiveDate,
    pub next_due_date: NaiveDate,
    pub lease_ended: bool,
    pub overdue: bool,
}

/// Round half away from zero to cents.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the accrual summary of `rental` as of `now`.
///
/// All dates are truncated to UTC midnight first and `now` is clamped to the
/// lease end, so nothing accrues past the end of the lease. Fails instead of
/// panicking when a stored rate or payment pushes a figure past `Decimal`'s
/// range.
pub fn summarize(
    rental: &Rental,
    payments: &[RentPayment],
    now: DateTime<Utc>,
    options: AccrualOptions,
) -> Result<AccrualSummary, AppError> {
    let overflow = || {
        AppError::InternalError(anyhow::anyhow!(
            "Accrual amounts out of range for rental {}",
            rental.rental_id
        ))
    };

    let start = rental.start_date.date_naive();
    let end = rental.end_date.date_naive();
    let today = now.date_naive();
    let rate = rental.daily_rate;

    let clamped = today.min(end);
    let elapsed_days = (clamped - start).num_days().max(0);
    let total_rental_days = (end - start).num_days().max(0);
    let accrued_to_date = round2(
        Decimal::from(elapsed_days)
            .checked_mul(rate)
            .ok_or_else(overflow)?,
    );

    let fortnights_elapsed = elapsed_days / BILLING_CYCLE_DAYS;
    let due_days_blocks = (BILLING_CYCLE_DAYS * fortnights_elapsed).min(total_rental_days);

    let lease_ended = today >= end;
    let due_to_date = if lease_ended {
        accrued_to_date
    } else {
        round2(
            Decimal::from(due_days_blocks)
                .checked_mul(rate)
                .ok_or_else(overflow)?,
        )
    };

    let total_paid = round2(
        payments
            .iter()
            .try_fold(Decimal::ZERO, |sum, p| sum.checked_add(p.amount))
            .ok_or_else(overflow)?,
    );
    let balance_due = round2(due_to_date.checked_sub(total_paid).ok_or_else(overflow)?);
    let unbilled_accrued = round2(accrued_to_date - due_to_date);

    let last_due_date = start + Duration::days(BILLING_CYCLE_DAYS * fortnights_elapsed);
    let next_due_date = (last_due_date + Duration::days(BILLING_CYCLE_DAYS)).min(end);

    let past_grace = fortnights_elapsed > 0
        && today >= last_due_date + Duration::days(options.grace_days);
    let overdue = balance_due > Decimal::ZERO && (lease_ended || past_grace);

    Ok(AccrualSummary {
        as_of: today,
        start_date: start,
        end_date: end,
        total_rental_days,
        elapsed_days,
        fortnights_elapsed,
        accrued_to_date,
        due_to_date,
        total_paid,
        balance_due,
        unbilled_accrued,
        last_due_date,
        next_due_date,
        lease_ended,
        overdue,
    })
}
