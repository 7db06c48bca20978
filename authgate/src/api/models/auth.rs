//! API request/response models for login and federation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::session::{SessionSubject, TOKEN_SCHEME},
    db::models::users::User,
    errors::Error,
    types::UserId,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Name, email or mobile number; the server classifies it
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MobileLoginRequest {
    pub mobile: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    /// Ready-to-use credential header value, scheme included
    pub token: String,
    pub identity: UserId,
    pub nickname: String,
    pub avatar: String,
}

impl LoginResponse {
    /// Issue a session token for the user and wrap it with the display fields.
    pub fn issue(user: &User, config: &crate::config::Config) -> Result<Self, Error> {
        let subject = SessionSubject {
            identity: user.id,
            avatar: user.avatar.clone(),
            nickname: user.nickname.clone(),
        };
        let token = crate::auth::session::create_session_token(&subject, config)?;
        Ok(Self {
            token: format!("{TOKEN_SCHEME} {token}"),
            identity: user.id,
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ThirdLoginRequest {
    /// Authorization code returned by the provider redirect
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MpLoginRequest {
    pub js_code: String,
}

/// Outcome of a federated login attempt. When the identity has no local
/// account yet the response carries the numeric `UserNotExist` code plus the
/// bridge key the client must present at registration.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ThirdLoginResponse {
    LoggedIn(LoginResponse),
    NeedsRegistration {
        code: u32,
        /// Opaque bridge key: pending-profile code for OAuth providers,
        /// session-key handle for the mini-app
        register_code: String,
        nickname: String,
        avatar: String,
    },
}

impl ThirdLoginResponse {
    pub fn needs_registration(register_code: String, nickname: String, avatar: String) -> Self {
        Self::NeedsRegistration {
            code: Error::UserNotExist.code(),
            register_code,
            nickname,
            avatar,
        }
    }
}
