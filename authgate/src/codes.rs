//! Verification code vault.
//!
//! Short-lived 6-digit codes keyed by purpose and recipient. Issuing a new
//! code for the same (purpose, recipient) pair replaces the previous one, so
//! at most one code is live per pair. Verification does not consume the code;
//! call sites delete it explicitly after a successful match. The window
//! between verify and delete is accepted.

use rand::prelude::RngExt;
use rand::rng;
use std::time::Duration;

use crate::cache::TtlStore;
use crate::errors::{Error, Result};

const CODE_KEY_PREFIX: &str = "__code_";

/// What a verification code authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    Register,
    Login,
    ForgotPassword,
    BindEmail,
    BindMobile,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::Register => "reg",
            CodePurpose::Login => "login",
            CodePurpose::ForgotPassword => "forgot",
            CodePurpose::BindEmail => "bind_email",
            CodePurpose::BindMobile => "bind_mobile",
        }
    }
}

fn code_key(purpose: CodePurpose, recipient: &str) -> String {
    format!("{}{}_{}", CODE_KEY_PREFIX, purpose.as_str(), recipient)
}

/// Generate a 6-digit numeric code.
pub fn generate_code() -> String {
    format!("{:06}", rng().random_range(0..1_000_000u32))
}

/// Vault over the shared TTL store.
#[derive(Clone)]
pub struct CodeVault {
    store: TtlStore,
    ttl: Duration,
}

impl CodeVault {
    pub fn new(store: TtlStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a fresh code for (purpose, recipient), replacing any live one.
    /// Returns the code for dispatch; dispatch itself is the caller's concern
    /// and must not gate the issue result.
    pub async fn issue(&self, purpose: CodePurpose, recipient: &str) -> String {
        let code = generate_code();
        self.store.set(code_key(purpose, recipient), code.clone(), self.ttl).await;
        tracing::debug!(purpose = purpose.as_str(), recipient, "verification code issued");
        code
    }

    /// Check a submitted code. Absence, expiry and mismatch are deliberately
    /// indistinguishable to the caller.
    pub async fn verify(&self, purpose: CodePurpose, recipient: &str, code: &str) -> Result<()> {
        match self.store.get(&code_key(purpose, recipient)).await {
            Some(stored) if stored == code => Ok(()),
            _ => Err(Error::InvalidOrExpiredCode),
        }
    }

    /// Remove a code after successful use.
    pub async fn consume(&self, purpose: CodePurpose, recipient: &str) {
        self.store.delete(&code_key(purpose, recipient)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CodeVault {
        CodeVault::new(TtlStore::new(), Duration::from_secs(60))
    }

    #[test]
    fn test_generate_code_shape() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(code_key(CodePurpose::Register, "13812345678"), "__code_reg_13812345678");
        assert_eq!(code_key(CodePurpose::Login, "a@b.co"), "__code_login_a@b.co");
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let vault = vault();
        let code = vault.issue(CodePurpose::Login, "13812345678").await;

        assert!(vault.verify(CodePurpose::Login, "13812345678", &code).await.is_ok());
        // Wrong code, wrong purpose and wrong recipient all fail the same way
        assert!(matches!(
            vault.verify(CodePurpose::Login, "13812345678", "000000").await.unwrap_err(),
            Error::InvalidOrExpiredCode
        ));
        assert!(vault.verify(CodePurpose::Register, "13812345678", &code).await.is_err());
        assert!(vault.verify(CodePurpose::Login, "13900000000", &code).await.is_err());
    }

    #[tokio::test]
    async fn test_reissue_replaces_previous_code() {
        let vault = vault();
        let first = vault.issue(CodePurpose::Register, "a@b.co").await;
        let second = vault.issue(CodePurpose::Register, "a@b.co").await;

        assert!(vault.verify(CodePurpose::Register, "a@b.co", &second).await.is_ok());
        if first != second {
            assert!(vault.verify(CodePurpose::Register, "a@b.co", &first).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_verify_does_not_consume() {
        let vault = vault();
        let code = vault.issue(CodePurpose::BindEmail, "a@b.co").await;

        // A match leaves the code live; only an explicit consume removes it
        for _ in 0..3 {
            assert!(vault.verify(CodePurpose::BindEmail, "a@b.co", &code).await.is_ok());
        }
        vault.consume(CodePurpose::BindEmail, "a@b.co").await;
        assert!(vault.verify(CodePurpose::BindEmail, "a@b.co", &code).await.is_err());
    }

    #[tokio::test]
    async fn test_consume_removes_code() {
        let vault = vault();
        let code = vault.issue(CodePurpose::ForgotPassword, "a@b.co").await;

        vault.consume(CodePurpose::ForgotPassword, "a@b.co").await;
        assert!(vault.verify(CodePurpose::ForgotPassword, "a@b.co", &code).await.is_err());
    }
}
