//! Payment reminder records and reminder run statistics.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Reminder kind. Together with rental id and due date it forms the
/// dedup key of a [`PaymentReminder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReminderType {
    SevenDayAdvance,
    OneDayDue,
    Overdue,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderType::SevenDayAdvance => "SEVEN_DAY_ADVANCE",
            ReminderType::OneDayDue => "ONE_DAY_DUE",
            ReminderType::Overdue => "OVERDUE",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "SEVEN_DAY_ADVANCE" => Some(ReminderType::SevenDayAdvance),
            "ONE_DAY_DUE" => Some(ReminderType::OneDayDue),
            "OVERDUE" => Some(ReminderType::Overdue),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReminderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reminder send attempt. Recorded exactly once per attempt, whether or
/// not the email went out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PaymentReminder {
    pub reminder_id: Uuid,
    pub rental_id: Uuid,
    pub reminder_type: String,
    pub due_date: NaiveDate,
    pub email_sent: bool,
    pub created_utc: DateTime<Utc>,
}

/// One reminder dispatched during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderDispatch {
    pub reminder_type: ReminderType,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub email_sent: bool,
    /// Sent by the catch-all rule rather than its own trigger.
    pub generic: bool,
}

/// What happened to one rental during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentalReminderOutcome {
    Reminded,
    NothingDue,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalReminderResult {
    pub rental_id: Uuid,
    pub outcome: RentalReminderOutcome,
    pub reminders: Vec<ReminderDispatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate statistics of a reminder run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderRunStats {
    pub processed: u32,
    pub sent: u32,
    pub skipped: u32,
    pub errors: u32,
    pub results: Vec<RentalReminderResult>,
}
