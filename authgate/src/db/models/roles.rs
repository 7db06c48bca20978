//! Database request/response types for roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::auth::policy::PermissionTuple;
use crate::types::RoleId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A role together with its permission tuples.
#[derive(Debug, Clone)]
pub struct RoleWithPermissions {
    pub role: Role,
    pub permissions: Vec<PermissionTuple>,
}

#[derive(Debug, Clone)]
pub struct RoleCreateDBRequest {
    pub name: String,
    pub permissions: Vec<PermissionTuple>,
}

/// Update request. A `Some` permission set is a full replacement.
#[derive(Debug, Clone, Default)]
pub struct RoleUpdateDBRequest {
    pub name: Option<String>,
    pub permissions: Option<Vec<PermissionTuple>>,
}
