//! Third-party identity federation.
//!
//! Each provider adapter turns a provider-specific OAuth dance into a
//! [`NormalizedProfile`]. The set of adapters is closed: configuration is a
//! tagged union and the registry is built by matching on it, so an unknown
//! tag can never reach a live adapter. All provider HTTP goes through one
//! shared client with a bounded timeout; provider failures are logged with
//! detail and reduced to a generic argument error for callers.

mod github;
mod mp;
mod pending;
mod qq;
mod weibo;
mod weixin;

pub use mp::{MiniApp, MiniAppSession};
pub use pending::{PendingStore, TOKEN_THIRD_PREFIX, SESSION_KEY_WEIXINMP_PREFIX};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::{config::ProviderConfig, errors::Error};

/// Provider-agnostic view of a federated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedProfile {
    pub provider: String,
    pub open_id: String,
    pub nickname: String,
    pub avatar: String,
    #[serde(default)]
    pub mobile: String,
}

/// An OAuth-style provider: browser redirect out, code exchange back.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Registry key, also stored with bound identities.
    fn tag(&self) -> &'static str;

    /// Where to send the user's browser to authorize.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the user's profile.
    async fn exchange_user(&self, code: &str) -> Result<NormalizedProfile, Error>;
}

/// Log provider detail, hand the caller a generic error.
pub(crate) fn provider_error(provider: &str, context: &str, detail: impl std::fmt::Display) -> Error {
    tracing::warn!(provider, context, "federation provider error: {detail}");
    Error::Argument {
        message: "Third-party authorization failed".to_string(),
    }
}

/// Constructed adapters, keyed by tag.
#[derive(Clone)]
pub struct ProviderRegistry {
    oauth: HashMap<&'static str, Arc<dyn Provider>>,
    miniapp: HashMap<&'static str, Arc<MiniApp>>,
}

impl ProviderRegistry {
    /// Build adapters for every configured provider.
    pub fn from_config(providers: &[ProviderConfig]) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Internal {
                operation: format!("create federation HTTP client: {e}"),
            })?;

        let mut oauth: HashMap<&'static str, Arc<dyn Provider>> = HashMap::new();
        let mut miniapp: HashMap<&'static str, Arc<MiniApp>> = HashMap::new();

        for config in providers {
            match config {
                ProviderConfig::Github { .. } => {
                    oauth.insert("github", Arc::new(github::Github::new(config, http.clone())?));
                }
                ProviderConfig::Qq { .. } => {
                    oauth.insert("qq", Arc::new(qq::Qq::new(config, http.clone())?));
                }
                ProviderConfig::Weibo { .. } => {
                    oauth.insert("weibo", Arc::new(weibo::Weibo::new(config, http.clone())?));
                }
                ProviderConfig::Weixin { .. } => {
                    oauth.insert("weixin", Arc::new(weixin::Weixin::new(config, http.clone())?));
                }
                ProviderConfig::Weixinmp { app_id, app_secret } => {
                    miniapp.insert("weixinmp", Arc::new(MiniApp::new(app_id.clone(), app_secret.clone(), http.clone())));
                }
            }
        }

        Ok(Self { oauth, miniapp })
    }

    /// Look up an OAuth adapter by tag.
    pub fn oauth(&self, tag: &str) -> Result<&Arc<dyn Provider>, Error> {
        self.oauth.get(tag).ok_or_else(|| Error::Argument {
            message: format!("Unknown provider: {tag}"),
        })
    }

    /// Look up a mini-app adapter by tag.
    pub fn miniapp(&self, tag: &str) -> Result<&Arc<MiniApp>, Error> {
        self.miniapp.get(tag).ok_or_else(|| Error::Argument {
            message: format!("Unknown provider: {tag}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        let providers = vec![
            ProviderConfig::Github {
                client_id: "cid".into(),
                client_secret: "cs".into(),
                redirect_url: "http://localhost/cb".into(),
            },
            ProviderConfig::Weixinmp {
                app_id: "wx1".into(),
                app_secret: "shh".into(),
            },
        ];
        ProviderRegistry::from_config(&providers).unwrap()
    }

    #[test]
    fn test_registry_resolves_configured_tags() {
        let registry = registry();
        assert_eq!(registry.oauth("github").unwrap().tag(), "github");
        assert!(registry.miniapp("weixinmp").is_ok());
    }

    #[test]
    fn test_registry_rejects_unknown_tags() {
        let registry = registry();
        assert!(registry.oauth("gitlab").is_err());
        assert!(registry.oauth("weixinmp").is_err()); // mini-app is not an OAuth adapter
        assert!(registry.miniapp("github").is_err());
    }
}
