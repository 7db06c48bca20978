//! Session token creation and verification.
//!
//! Tokens are HS256 JWTs with issuer and audience pinned to [`TOKEN_ISSUER`].
//! The subject claim is itself a JSON document carrying the numeric identity
//! plus the display fields clients need without a profile round-trip. On the
//! wire the credential is `Authgate <jwt>` in one of the two auth headers.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, errors::Error, types::UserId};

/// Scheme prefix expected in the credential header.
pub const TOKEN_SCHEME: &str = "Authgate";

/// Issuer and audience pinned into every token.
pub const TOKEN_ISSUER: &str = "authgate";

/// Header carrying end-user credentials.
pub const USER_AUTH_HEADER: &str = "x-authgate-authorization";

/// Header carrying admin credentials.
pub const ADMIN_AUTH_HEADER: &str = "x-authgate-admin-authorization";

/// JWT session claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String, // JSON-encoded SessionSubject
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
}

/// The payload embedded in the subject claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSubject {
    pub identity: UserId,
    pub avatar: String,
    pub nickname: String,
}

/// Create a signed session token for a subject
pub fn create_session_token(subject: &SessionSubject, config: &Config) -> Result<String, Error> {
    let secret_key = config.secret_key.as_ref().ok_or_else(|| Error::Internal {
        operation: "session tokens: secret_key is required".to_string(),
    })?;

    let now = Utc::now();
    let claims = SessionClaims {
        iss: TOKEN_ISSUER.to_string(),
        aud: TOKEN_ISSUER.to_string(),
        sub: serde_json::to_string(subject).map_err(|e| Error::Internal {
            operation: format!("encode session subject: {e}"),
        })?,
        exp: (now + chrono::Duration::days(config.auth.token_expiry_days)).timestamp(),
        iat: now.timestamp(),
    };

    let key = EncodingKey::from_secret(secret_key.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create session token: {e}"),
    })
}

/// Split a credential header value into its token part.
///
/// The value must be exactly `<scheme> <token>` with the expected scheme;
/// anything else is treated as "not logged in" rather than "expired".
pub fn parse_credential(header_value: &str) -> Result<&str, Error> {
    let mut parts = header_value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme == TOKEN_SCHEME && !token.is_empty() => Ok(token),
        _ => Err(Error::NotLoggedIn),
    }
}

/// Verify a session token and decode its subject
pub fn verify_session_token(token: &str, config: &Config) -> Result<SessionSubject, Error> {
    let secret_key = config.secret_key.as_ref().ok_or_else(|| Error::Internal {
        operation: "session tokens: secret_key is required".to_string(),
    })?;

    let key = DecodingKey::from_secret(secret_key.as_bytes());
    let mut validation = Validation::default();
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_audience(&[TOKEN_ISSUER]);

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed, tampered or out-of-window tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::AuthExpired,

        // Server errors (500) - key issues, internal failures
        _ => Error::Internal {
            operation: format!("session token verification: {e}"),
        },
    })?;

    // The subject is nested JSON; a token that verifies but carries junk here
    // is a data problem, not an expiry problem
    serde_json::from_str(&token_data.claims.sub).map_err(|_| Error::AuthInvalidData)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            secret_key: Some("test-secret-key-for-sessions".to_string()),
            ..Default::default()
        }
    }

    fn create_test_subject() -> SessionSubject {
        SessionSubject {
            identity: 10042,
            avatar: "https://cdn.example.com/a.png".to_string(),
            nickname: "tester".to_string(),
        }
    }

    #[test]
    fn test_create_and_verify_session_token() {
        let config = create_test_config();
        let subject = create_test_subject();

        let token = create_session_token(&subject, &config).unwrap();
        assert!(!token.is_empty());

        let verified = verify_session_token(&token, &config).unwrap();
        assert_eq!(verified, subject);
    }

    #[test]
    fn test_verify_token_wrong_secret() {
        let mut config = create_test_config();
        let token = create_session_token(&create_test_subject(), &config).unwrap();

        config.secret_key = Some("different-secret".to_string());
        let result = verify_session_token(&token, &config);
        assert!(matches!(result.unwrap_err(), Error::AuthExpired));
    }

    #[test]
    fn test_verify_expired_token() {
        let config = create_test_config();
        let subject = create_test_subject();

        // Manually create an expired token by setting exp in the past
        let now = Utc::now();
        let claims = SessionClaims {
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_ISSUER.to_string(),
            sub: serde_json::to_string(&subject).unwrap(),
            exp: (now - chrono::Duration::hours(1)).timestamp(),
            iat: (now - chrono::Duration::hours(2)).timestamp(),
        };
        let key = EncodingKey::from_secret(config.secret_key.as_ref().unwrap().as_bytes());
        let token = encode(&Header::default(), &claims, &key).unwrap();

        let result = verify_session_token(&token, &config);
        assert!(matches!(result.unwrap_err(), Error::AuthExpired));
    }

    #[test]
    fn test_verify_wrong_audience() {
        let config = create_test_config();
        let now = Utc::now();
        let claims = SessionClaims {
            iss: TOKEN_ISSUER.to_string(),
            aud: "somebody-else".to_string(),
            sub: serde_json::to_string(&create_test_subject()).unwrap(),
            exp: (now + chrono::Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };
        let key = EncodingKey::from_secret(config.secret_key.as_ref().unwrap().as_bytes());
        let token = encode(&Header::default(), &claims, &key).unwrap();

        let result = verify_session_token(&token, &config);
        assert!(matches!(result.unwrap_err(), Error::AuthExpired));
    }

    #[test]
    fn test_verify_garbage_subject() {
        let config = create_test_config();
        let now = Utc::now();
        let claims = SessionClaims {
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_ISSUER.to_string(),
            sub: "not json at all".to_string(),
            exp: (now + chrono::Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };
        let key = EncodingKey::from_secret(config.secret_key.as_ref().unwrap().as_bytes());
        let token = encode(&Header::default(), &claims, &key).unwrap();

        let result = verify_session_token(&token, &config);
        assert!(matches!(result.unwrap_err(), Error::AuthInvalidData));
    }

    #[test]
    fn test_parse_credential() {
        assert_eq!(parse_credential("Authgate abc.def.ghi").unwrap(), "abc.def.ghi");

        for bad in ["", "Authgate", "Authgate ", "Bearer abc", "Authgate a b", "authgate abc"] {
            assert!(
                matches!(parse_credential(bad).unwrap_err(), Error::NotLoggedIn),
                "expected NotLoggedIn for {bad:?}"
            );
        }
    }
}
