//! Axum request handlers.

pub mod auth;
pub mod codes;
pub mod profile;
pub mod reg;
pub mod roles;
pub mod users;

use axum::http::HeaderMap;

/// Best-effort client address for login history. Proxy header first, then
/// nothing; the record tolerates an empty address.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

/// Application state over a test database, with no providers configured and
/// all outbound messaging disabled.
#[cfg(test)]
pub(crate) fn test_state(pool: sqlx::PgPool) -> crate::AppState {
    let config = crate::config::Config {
        secret_key: Some("test-secret-key-for-handlers".to_string()),
        ..Default::default()
    };
    let store = crate::cache::TtlStore::new();

    crate::AppState::builder()
        .db(pool)
        .vault(crate::codes::CodeVault::new(store.clone(), config.codes.code_ttl))
        .pending(crate::federation::PendingStore::new(store, &config.codes))
        .messenger(crate::messaging::Messenger::new(&config).expect("test messenger"))
        .providers(crate::federation::ProviderRegistry::from_config(&[]).expect("test providers"))
        .config(config)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_from_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&headers), "203.0.113.9");

        assert_eq!(client_ip(&HeaderMap::new()), "");
    }
}
