//! Short-lived bridge records between a federated exchange and registration.
//!
//! When a federated identity has no local account yet, the exchanged profile
//! is parked in the TTL store under an opaque code and the code is handed to
//! the client. Registration later redeems the code instead of repeating the
//! provider exchange. Mini-app session keys are parked the same way so the
//! raw `session_key` never leaves the server.

use std::time::Duration;

use rand::prelude::*;
use tracing::instrument;

use crate::{
    cache::TtlStore,
    config::CodesConfig,
    errors::{Error, Result},
    federation::{MiniAppSession, NormalizedProfile},
};

pub const TOKEN_THIRD_PREFIX: &str = "__token_third_";
pub const SESSION_KEY_WEIXINMP_PREFIX: &str = "__session_key_weixinmp_";

const OPAQUE_KEY_LEN: usize = 32;
const OPAQUE_KEY_ATTEMPTS: usize = 10;

/// TTL-store wrapper for federation bridge records.
#[derive(Clone)]
pub struct PendingStore {
    store: TtlStore,
    pending_ttl: Duration,
    session_key_ttl: Duration,
}

impl PendingStore {
    pub fn new(store: TtlStore, codes: &CodesConfig) -> Self {
        Self {
            store,
            pending_ttl: codes.pending_ttl,
            session_key_ttl: codes.session_key_ttl,
        }
    }

    /// Park a profile awaiting registration; returns the opaque code the
    /// client must present to redeem it.
    #[instrument(skip_all, fields(provider = %profile.provider), err)]
    pub async fn stash_profile(&self, profile: &NormalizedProfile) -> Result<String> {
        let value = serde_json::to_string(profile).map_err(|e| Error::Internal {
            operation: format!("serialize pending profile: {e}"),
        })?;
        let code = self.claim_key(TOKEN_THIRD_PREFIX, &value, self.pending_ttl).await?;
        Ok(code)
    }

    /// Redeem a parked profile. Consuming: a code works exactly once.
    pub async fn take_profile(&self, code: &str) -> Result<NormalizedProfile> {
        let key = format!("{TOKEN_THIRD_PREFIX}{code}");
        let value = self.store.get(&key).await.ok_or(Error::InvalidOrExpiredCode)?;
        self.store.delete(&key).await;
        serde_json::from_str(&value).map_err(|e| Error::Internal {
            operation: format!("deserialize pending profile: {e}"),
        })
    }

    /// Park a mini-app session; returns the opaque key the client uses in
    /// place of the raw `session_key`.
    #[instrument(skip_all, err)]
    pub async fn stash_session(&self, session: &MiniAppSession) -> Result<String> {
        let value = serde_json::to_string(session).map_err(|e| Error::Internal {
            operation: format!("serialize mini-app session: {e}"),
        })?;
        let key = self
            .claim_key(SESSION_KEY_WEIXINMP_PREFIX, &value, self.session_key_ttl)
            .await?;
        Ok(key)
    }

    /// Fetch a parked mini-app session. Non-consuming: the same session key
    /// serves several decrypt calls until it expires.
    pub async fn session(&self, key: &str) -> Result<MiniAppSession> {
        let store_key = format!("{SESSION_KEY_WEIXINMP_PREFIX}{key}");
        let value = self.store.get(&store_key).await.ok_or(Error::InvalidOrExpiredCode)?;
        serde_json::from_str(&value).map_err(|e| Error::Internal {
            operation: format!("deserialize mini-app session: {e}"),
        })
    }

    /// Generate an unused opaque key under the prefix and store the value.
    ///
    /// Collisions over a 62^32 space are vanishingly rare; the retry cap
    /// turns the pathological case into a clean error instead of a spin.
    async fn claim_key(&self, prefix: &str, value: &str, ttl: Duration) -> Result<String> {
        for _ in 0..OPAQUE_KEY_ATTEMPTS {
            let candidate = random_key();
            let store_key = format!("{prefix}{candidate}");
            if self.store.contains(&store_key).await {
                continue;
            }
            self.store.set(store_key, value, ttl).await;
            return Ok(candidate);
        }
        Err(Error::Internal {
            operation: "allocate federation bridge key".to_string(),
        })
    }
}

fn random_key() -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(OPAQUE_KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_store() -> PendingStore {
        PendingStore::new(TtlStore::new(), &CodesConfig::default())
    }

    fn profile() -> NormalizedProfile {
        NormalizedProfile {
            provider: "github".to_string(),
            open_id: "9942".to_string(),
            nickname: "octo".to_string(),
            avatar: "https://example.com/a.png".to_string(),
            mobile: String::new(),
        }
    }

    #[test]
    fn test_random_key_shape() {
        let key = random_key();
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, random_key());
    }

    #[tokio::test]
    async fn test_profile_roundtrip_is_consuming() {
        let store = pending_store();
        let code = store.stash_profile(&profile()).await.unwrap();

        let redeemed = store.take_profile(&code).await.unwrap();
        assert_eq!(redeemed, profile());

        // Second redemption fails: the code is single-use
        assert!(matches!(
            store.take_profile(&code).await.unwrap_err(),
            Error::InvalidOrExpiredCode
        ));
    }

    #[tokio::test]
    async fn test_unknown_code_rejected() {
        let store = pending_store();
        assert!(matches!(
            store.take_profile("nope").await.unwrap_err(),
            Error::InvalidOrExpiredCode
        ));
    }

    #[tokio::test]
    async fn test_session_is_reusable() {
        let store = pending_store();
        let session = MiniAppSession {
            open_id: "oX".to_string(),
            session_key: "a2V5a2V5a2V5a2V5a2V5aw==".to_string(),
            union_id: None,
        };
        let key = store.stash_session(&session).await.unwrap();

        assert_eq!(store.session(&key).await.unwrap(), session);
        assert_eq!(store.session(&key).await.unwrap(), session);
    }
}
