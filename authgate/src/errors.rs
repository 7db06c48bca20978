//! Central error type with stable numeric wire codes.
//!
//! Every error that can reach a client carries a numeric code alongside the HTTP
//! status, so API consumers can branch on `code` without parsing messages. The
//! code space follows the convention: 100xx authentication, 101xx user state,
//! 104xx request/credential validation, 105xx internal, 106xx roles.

use crate::db::errors::DbError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No credential presented, or the credential header is malformed
    #[error("Not logged in")]
    NotLoggedIn,

    /// Token failed signature, time or audience verification
    #[error("Session expired")]
    AuthExpired,

    /// Token verified but its subject payload is unusable
    #[error("Invalid session data")]
    AuthInvalidData,

    /// An account with the given identifier already exists
    #[error("User already exists")]
    UserExists,

    /// No account matches the given identifier
    #[error("User does not exist")]
    UserNotExist,

    /// Account has been administratively disabled
    #[error("User is forbidden")]
    UserForbidden,

    /// Too many failed logins inside the cool-down window
    #[error("User is locked")]
    UserLocked,

    /// Account has not completed activation
    #[error("User is not activated")]
    UserUnactivated,

    /// Activation requested for an already-active account
    #[error("User is already activated")]
    UserAlreadyActivated,

    /// Invalid request data or business rule violation
    #[error("{message}")]
    Argument { message: String },

    /// Password fails the length policy
    #[error("Password does not meet requirements")]
    WeakPassword,

    /// Password mismatch on login or password change
    #[error("Invalid password")]
    InvalidPassword,

    /// Verification code absent, expired or mismatched
    #[error("Invalid or expired verification code")]
    InvalidOrExpiredCode,

    /// Activation code envelope is malformed or does not match
    #[error("Invalid activation code")]
    InvalidActivationCode,

    /// Role not found by id or name
    #[error("Role does not exist")]
    RoleNotFound,

    /// A role with the given name already exists
    #[error("Role already exists")]
    RoleExists,

    /// Policy enforcement denied the request
    #[error("Access denied")]
    AccessDenied,

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Stable numeric code carried on the wire.
    pub fn code(&self) -> u32 {
        match self {
            Error::NotLoggedIn => 10001,
            Error::AuthExpired => 10002,
            Error::AuthInvalidData => 10003,
            Error::UserExists => 10100,
            Error::UserNotExist => 10101,
            Error::UserForbidden => 10106,
            Error::UserLocked => 10107,
            Error::UserUnactivated => 10109,
            Error::UserAlreadyActivated => 10110,
            Error::Argument { .. } => 10400,
            Error::WeakPassword => 10401,
            Error::InvalidPassword => 10402,
            Error::AccessDenied => 10403,
            Error::InvalidOrExpiredCode => 10407,
            Error::InvalidActivationCode => 10408,
            Error::Internal { .. } => 10500,
            Error::RoleNotFound => 10600,
            Error::RoleExists => 10601,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => 10101,
                DbError::UniqueViolation { .. } => 10100,
                _ => 10500,
            },
            Error::Other(_) => 10500,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotLoggedIn | Error::AuthExpired | Error::AuthInvalidData => StatusCode::UNAUTHORIZED,
            Error::UserForbidden | Error::UserLocked | Error::AccessDenied => StatusCode::FORBIDDEN,
            Error::UserNotExist | Error::RoleNotFound => StatusCode::NOT_FOUND,
            Error::UserExists | Error::RoleExists => StatusCode::CONFLICT,
            Error::UserUnactivated
            | Error::UserAlreadyActivated
            | Error::Argument { .. }
            | Error::WeakPassword
            | Error::InvalidPassword
            | Error::InvalidOrExpiredCode
            | Error::InvalidActivationCode => StatusCode::BAD_REQUEST,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => match (table.as_deref(), constraint.as_deref()) {
                    (Some("users"), Some(c)) if c.contains("email") => "An account with this email already exists".to_string(),
                    (Some("users"), Some(c)) if c.contains("mobile") => "An account with this mobile number already exists".to_string(),
                    (Some("users"), Some(c)) if c.contains("name") => "This name is already taken".to_string(),
                    (Some("roles"), _) => "A role with this name already exists".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::NotLoggedIn | Error::AuthExpired | Error::AuthInvalidData | Error::AccessDenied => {
                tracing::info!("Authorization error: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = json!({
            "code": self.code(),
            "message": self.user_message(),
        });

        (self.status_code(), axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes_are_stable() {
        assert_eq!(Error::NotLoggedIn.code(), 10001);
        assert_eq!(Error::AuthExpired.code(), 10002);
        assert_eq!(Error::AuthInvalidData.code(), 10003);
        assert_eq!(Error::UserExists.code(), 10100);
        assert_eq!(Error::UserNotExist.code(), 10101);
        assert_eq!(Error::UserLocked.code(), 10107);
        assert_eq!(Error::InvalidOrExpiredCode.code(), 10407);
        assert_eq!(Error::RoleExists.code(), 10601);
    }

    #[test]
    fn test_internal_detail_never_leaks() {
        let err = Error::Internal {
            operation: "connect to postgres at 10.0.0.1".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");

        let err = Error::Other(anyhow::anyhow!("secret detail"));
        assert_eq!(err.user_message(), "Internal server error");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::NotLoggedIn.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::UserLocked.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(Error::UserExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(Error::WeakPassword.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Database(DbError::NotFound).status_code(), StatusCode::NOT_FOUND);
    }
}
