//! Database types for third-party identity bindings.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{UserId, UserStatus};

/// A (provider, open_id) binding to a local account. Immutable after creation
/// apart from its status.
#[derive(Debug, Clone, FromRow)]
pub struct ThirdIdentity {
    pub id: i64,
    pub provider: String,
    pub open_id: String,
    pub user_id: UserId,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}
