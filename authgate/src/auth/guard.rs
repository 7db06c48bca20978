//! Account security state machine.
//!
//! Every login attempt walks the same gate order: locked, forbidden, deleted,
//! unactivated, then (for password logins) the credential itself. A lock is a
//! derived state: the failure counter reached the threshold and the last
//! failure is still inside the cool-down window. Once the window elapses the
//! account unlocks by itself; a successful login resets the counter.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::{
    auth::password,
    config::Config,
    db::{handlers::Users, models::users::User},
    errors::{Error, Result},
};

/// Whether the account is currently locked out.
pub fn is_locked(user: &User, config: &Config, now: DateTime<Utc>) -> bool {
    if user.failure_count < config.auth.lockout_threshold as i32 {
        return false;
    }
    match user.last_failure_at {
        Some(last) => {
            let elapsed = (now - last).to_std().unwrap_or_default();
            elapsed < config.auth.lockout_cooldown
        }
        // Threshold reached but no timestamp: nothing to measure the window
        // against, treat as unlocked
        None => false,
    }
}

/// Run the non-credential gates in precedence order.
pub fn check_login_state(user: &User, config: &Config, now: DateTime<Utc>) -> Result<()> {
    if is_locked(user, config, now) {
        return Err(Error::UserLocked);
    }
    if user.forbidden {
        return Err(Error::UserForbidden);
    }
    if user.is_deleted() {
        return Err(Error::UserNotExist);
    }
    if !user.activated {
        return Err(Error::UserUnactivated);
    }
    Ok(())
}

/// Password login: resolve, gate, verify, and record the outcome.
///
/// A wrong password bumps the failure counter in its own single-statement
/// update; success resets the counter and appends login history in one
/// transaction.
#[instrument(skip(db, config, password), err(level = "info"))]
pub async fn login_with_password(db: &PgPool, config: &Config, identifier: &str, password: &str, ip: &str) -> Result<User> {
    let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = users.find_by_identifier(identifier).await?.ok_or(Error::UserNotExist)?;

    check_login_state(&user, config, Utc::now())?;

    // A password attempt against a passwordless (federated) account counts
    // as a failure like any other
    if !password::verify_async(password, &user.password_hash).await? {
        users.record_login_failure(user.id).await?;
        return Err(Error::InvalidPassword);
    }

    users.record_login_success(user.id, ip, "").await?;
    Ok(user)
}

/// Non-password login (verification code or federation): the caller has
/// already proven the credential, only the gates and bookkeeping remain.
#[instrument(skip(db, config, user), fields(user_id = user.id), err(level = "info"))]
pub async fn login_resolved(db: &PgPool, config: &Config, user: &User, ip: &str) -> Result<()> {
    check_login_state(user, config, Utc::now())?;

    let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn).record_login_success(user.id, ip, "").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RegisterKind, UserStatus};
    use std::time::Duration;

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: 10001,
            name: "tester".to_string(),
            email: "t@example.com".to_string(),
            mobile: "13812345678".to_string(),
            password_hash: "$argon2id$fake".to_string(),
            register_kind: RegisterKind::Email,
            status: UserStatus::Normal,
            nickname: "tester".to_string(),
            avatar: String::new(),
            failure_count: 0,
            last_failure_at: None,
            forbidden: false,
            forbidden_at: None,
            activated: true,
            activation_code: String::new(),
            activated_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn test_config() -> Config {
        let mut config = Config {
            secret_key: Some("s".to_string()),
            ..Default::default()
        };
        config.auth.lockout_threshold = 5;
        config.auth.lockout_cooldown = Duration::from_secs(1800);
        config
    }

    #[test]
    fn test_clean_account_passes() {
        let user = test_user();
        assert!(check_login_state(&user, &test_config(), Utc::now()).is_ok());
    }

    #[test]
    fn test_lock_requires_threshold_and_window() {
        let config = test_config();
        let now = Utc::now();
        let mut user = test_user();

        // Below threshold: recent failures alone do not lock
        user.failure_count = 4;
        user.last_failure_at = Some(now);
        assert!(!is_locked(&user, &config, now));

        // At threshold inside the window: locked
        user.failure_count = 5;
        assert!(is_locked(&user, &config, now));
        assert!(matches!(check_login_state(&user, &config, now).unwrap_err(), Error::UserLocked));

        // Cool-down elapsed: the lock releases on its own
        user.last_failure_at = Some(now - chrono::Duration::seconds(1801));
        assert!(!is_locked(&user, &config, now));
        assert!(check_login_state(&user, &config, now).is_ok());
    }

    #[test]
    fn test_threshold_without_timestamp_is_unlocked() {
        let mut user = test_user();
        user.failure_count = 10;
        user.last_failure_at = None;
        assert!(!is_locked(&user, &test_config(), Utc::now()));
    }

    #[test]
    fn test_gate_precedence() {
        let config = test_config();
        let now = Utc::now();

        // Locked wins over forbidden
        let mut user = test_user();
        user.failure_count = 5;
        user.last_failure_at = Some(now);
        user.forbidden = true;
        assert!(matches!(check_login_state(&user, &config, now).unwrap_err(), Error::UserLocked));

        // Forbidden wins over deleted
        let mut user = test_user();
        user.forbidden = true;
        user.status = UserStatus::Deleted;
        assert!(matches!(check_login_state(&user, &config, now).unwrap_err(), Error::UserForbidden));

        // Deleted wins over unactivated
        let mut user = test_user();
        user.status = UserStatus::Deleted;
        user.activated = false;
        assert!(matches!(check_login_state(&user, &config, now).unwrap_err(), Error::UserNotExist));

        // Unactivated is the last gate
        let mut user = test_user();
        user.activated = false;
        assert!(matches!(
            check_login_state(&user, &config, now).unwrap_err(),
            Error::UserUnactivated
        ));
    }
}
