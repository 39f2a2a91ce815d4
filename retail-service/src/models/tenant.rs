//! Tenant contact record.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A business renting cubes. `user_id` is the tenant's own login, used as
/// the fallback actor for audit entries when no cashier is attributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub business_name: String,
    pub contact_email: String,
}
