//! Shared identifier aliases and small domain enums.

use serde::{Deserialize, Serialize};

/// Numeric user identifier (BIGSERIAL, starts at 10000).
pub type UserId = i64;

/// Numeric role identifier.
pub type RoleId = i64;

/// How an account was originally registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "register_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    Name,
    Email,
    Mobile,
    Third,
}

/// Soft-delete status for users and third-party identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Normal,
    Deleted,
}
