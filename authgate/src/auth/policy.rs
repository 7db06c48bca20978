//! Role-based policy enforcement for admin endpoints.
//!
//! Permissions are (path, method) tuples attached to roles. A request is
//! allowed when the subject is the configured super subject, or any tuple of
//! any of the subject's roles matches the request path (glob) and method
//! (exact, case-insensitive). Everything else is denied, including subjects
//! whose role tuples are transiently empty while a role update is replacing
//! them.

use sqlx::PgPool;
use tracing::instrument;

use crate::{
    config::Config,
    db::handlers::Roles,
    errors::{Error, Result},
    types::UserId,
};

/// A single allowed (path, method) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionTuple {
    pub path: String,
    pub method: String,
}

/// Path glob match: a trailing `*` in the pattern matches any suffix.
///
/// `/admin/*` matches `/admin/users` and `/admin/users/1`; a pattern without
/// `*` must match exactly. A request path shorter than the prefix matches only
/// if it equals the prefix itself.
pub fn key_match(path: &str, pattern: &str) -> bool {
    match pattern.find('*') {
        None => path == pattern,
        Some(i) => {
            if path.len() > i {
                path.as_bytes()[..i] == pattern.as_bytes()[..i]
            } else {
                path.as_bytes() == &pattern.as_bytes()[..i]
            }
        }
    }
}

/// Whether any tuple allows the request. Default-deny.
pub fn permits(tuples: &[PermissionTuple], path: &str, method: &str) -> bool {
    tuples
        .iter()
        .any(|t| key_match(path, &t.path) && t.method.eq_ignore_ascii_case(method))
}

/// Enforce the policy for a subject against a request.
#[instrument(skip(db, config), err(level = "info"))]
pub async fn enforce(db: &PgPool, config: &Config, subject: UserId, path: &str, method: &str) -> Result<()> {
    if subject == config.auth.super_subject_id {
        return Ok(());
    }

    let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let tuples = Roles::new(&mut conn).permissions_for_user(subject).await?;

    if permits(&tuples, path, method) {
        Ok(())
    } else {
        Err(Error::AccessDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(path: &str, method: &str) -> PermissionTuple {
        PermissionTuple {
            path: path.to_string(),
            method: method.to_string(),
        }
    }

    #[test]
    fn test_key_match_exact() {
        assert!(key_match("/v1/admin/user", "/v1/admin/user"));
        assert!(!key_match("/v1/admin/user", "/v1/admin/users"));
        assert!(!key_match("/v1/admin/users", "/v1/admin/user"));
    }

    #[test]
    fn test_key_match_wildcard() {
        assert!(key_match("/v1/admin/user/1", "/v1/admin/*"));
        assert!(key_match("/v1/admin/user/1/roles", "/v1/admin/*"));
        assert!(key_match("/v1/admin/", "/v1/admin/*"));
        // Path shorter than the prefix only matches the prefix itself
        assert!(key_match("/v1/admin/", "/v1/admin/*"));
        assert!(!key_match("/v1/admin", "/v1/admin/*"));
        assert!(!key_match("/v1/other/x", "/v1/admin/*"));
    }

    #[test]
    fn test_permits_method_case_insensitive() {
        let tuples = vec![tuple("/v1/admin/user/*", "get")];
        assert!(permits(&tuples, "/v1/admin/user/1", "GET"));
        assert!(permits(&tuples, "/v1/admin/user/1", "get"));
        assert!(!permits(&tuples, "/v1/admin/user/1", "POST"));
    }

    #[test]
    fn test_permits_default_deny() {
        assert!(!permits(&[], "/v1/admin/user/1", "GET"));

        let tuples = vec![tuple("/v1/admin/role/*", "get"), tuple("/v1/admin/user/*", "put")];
        assert!(!permits(&tuples, "/v1/admin/user/1", "GET"));
        assert!(permits(&tuples, "/v1/admin/role/2", "GET"));
        assert!(permits(&tuples, "/v1/admin/user/1", "PUT"));
    }
}
