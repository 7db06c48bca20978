//! Database request/response types for users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{RegisterKind, UserId, UserStatus};

/// A full user row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub password_hash: String,
    pub register_kind: RegisterKind,
    pub status: UserStatus,
    pub nickname: String,
    pub avatar: String,
    pub failure_count: i32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub forbidden: bool,
    pub forbidden_at: Option<DateTime<Utc>>,
    pub activated: bool,
    pub activation_code: String,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_deleted(&self) -> bool {
        self.status == UserStatus::Deleted
    }
}

/// Create request. Empty identifier fields are stored as the stringified
/// identity so the unique constraints always hold.
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub password_hash: String,
    pub register_kind: RegisterKind,
    pub nickname: String,
    pub avatar: String,
    pub activated: bool,
    pub activation_code: String,
}

impl UserCreateDBRequest {
    /// Blank request with placeholder identifiers and no credentials.
    pub fn empty(register_kind: RegisterKind) -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            mobile: String::new(),
            password_hash: String::new(),
            register_kind,
            nickname: String::new(),
            avatar: String::new(),
            activated: true,
            activation_code: String::new(),
        }
    }
}

/// Profile update request; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}
