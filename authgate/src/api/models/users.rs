//! API request/response models for users, registration and profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::users::User;
use crate::types::{RegisterKind, RoleId, UserId};

/// Public view of an account. The password hash and security counters never
/// leave the server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub nickname: String,
    pub avatar: String,
    pub register_kind: RegisterKind,
    pub activated: bool,
    pub forbidden: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            mobile: user.mobile,
            nickname: user.nickname,
            avatar: user.avatar,
            register_kind: user.register_kind,
            activated: user.activated,
            forbidden: user.forbidden,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterByNameRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterByEmailRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterByMobileRequest {
    pub mobile: String,
    /// Verification code previously issued to the mobile number
    pub code: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterThirdRequest {
    /// Bridge code returned by a federated login that found no account
    pub code: String,
}

/// Encrypted mini-app payload plus the session-key handle it was encrypted
/// under.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MpPayloadRequest {
    pub session_key: String,
    pub iv: String,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ActivateRequest {
    /// Base64 activation envelope from the activation email
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResendActivationRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IssueCodeRequest {
    /// Email address or mobile number
    pub recipient: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ForgotCodeRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Password change: prove ownership either with the current password or with
/// a code sent to the account email.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BindEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BindMobileRequest {
    pub mobile: String,
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetForbiddenRequest {
    pub forbidden: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AssignRolesRequest {
    pub role_ids: Vec<RoleId>,
}
