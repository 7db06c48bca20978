//! API request/response models for roles and permissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::policy::PermissionTuple;
use crate::db::models::roles::{Role, RoleWithPermissions};
use crate::types::RoleId;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    /// Request path, optionally ending in `*` for a prefix match
    pub path: String,
    pub method: String,
}

impl From<Permission> for PermissionTuple {
    fn from(p: Permission) -> Self {
        PermissionTuple {
            path: p.path,
            method: p.method,
        }
    }
}

impl From<PermissionTuple> for Permission {
    fn from(t: PermissionTuple) -> Self {
        Permission {
            path: t.path,
            method: t.method,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleCreate {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// A present permission set is a full replacement of the role's tuples.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<Permission>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleResponse {
    pub id: RoleId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        Self {
            id: role.id,
            name: role.name,
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleDetailResponse {
    #[serde(flatten)]
    pub role: RoleResponse,
    pub permissions: Vec<Permission>,
}

impl From<RoleWithPermissions> for RoleDetailResponse {
    fn from(detail: RoleWithPermissions) -> Self {
        Self {
            role: detail.role.into(),
            permissions: detail.permissions.into_iter().map(Permission::from).collect(),
        }
    }
}
