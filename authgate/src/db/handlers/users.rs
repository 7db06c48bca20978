//! Database repository for users and their login history.

use sqlx::{Connection, PgConnection};
use tracing::instrument;

use crate::{
    auth::resolver::{self, IdentifierKind},
    db::{
        errors::Result,
        handlers::repository::Repository,
        models::users::{User, UserCreateDBRequest, UserUpdateDBRequest},
    },
    types::UserId,
};

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, name: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_mobile(&mut self, mobile: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE mobile = $1")
            .bind(mobile)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    /// Resolve a login identifier to a user, trying the classified columns in
    /// order. First hit wins.
    #[instrument(skip(self), err)]
    pub async fn find_by_identifier(&mut self, identifier: &str) -> Result<Option<User>> {
        for kind in resolver::classify(identifier) {
            let found = match kind {
                IdentifierKind::Email => self.get_by_email(identifier).await?,
                IdentifierKind::Mobile => self.get_by_mobile(identifier).await?,
                IdentifierKind::Name => self.get_by_name(identifier).await?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Bump the failure counter and timestamp. One statement, nothing else.
    #[instrument(skip(self), err)]
    pub async fn record_login_failure(&mut self, id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET failure_count = failure_count + 1, last_failure_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Reset the failure counter and append a login-history row, atomically.
    #[instrument(skip(self), err)]
    pub async fn record_login_success(&mut self, id: UserId, ip: &str, location: &str) -> Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("UPDATE users SET failure_count = 0, last_failure_at = NULL, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO login_history (user_id, ip, location) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(ip)
            .bind(location)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn set_forbidden(&mut self, id: UserId, forbidden: bool) -> Result<()> {
        sqlx::query(
            "UPDATE users SET forbidden = $2, forbidden_at = CASE WHEN $2 THEN NOW() ELSE NULL END, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(forbidden)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    /// Administrative unlock: clear the failure counter without a login.
    #[instrument(skip(self), err)]
    pub async fn reset_failures(&mut self, id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET failure_count = 0, last_failure_at = NULL, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Mark the account activated and clear the activation code.
    #[instrument(skip(self), err)]
    pub async fn activate(&mut self, id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET activated = TRUE, activation_code = '', activated_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Store a fresh activation code for an unactivated account.
    #[instrument(skip(self, code), err)]
    pub async fn set_activation_code(&mut self, id: UserId, code: &str) -> Result<()> {
        sqlx::query("UPDATE users SET activation_code = $2, updated_at = NOW() WHERE id = $1 AND NOT activated")
            .bind(id)
            .bind(code)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, password_hash), err)]
    pub async fn update_password(&mut self, id: UserId, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn bind_email(&mut self, id: UserId, email: &str) -> Result<()> {
        sqlx::query("UPDATE users SET email = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(email)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn bind_mobile(&mut self, id: UserId, mobile: &str) -> Result<()> {
        sqlx::query("UPDATE users SET mobile = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(mobile)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = User;
    type Id = UserId;

    /// Insert a user. Identifier fields left empty become the stringified
    /// identity, allocated from the sequence inside the same statement so the
    /// unique constraints never see a transient placeholder.
    #[instrument(skip(self, request), fields(register_kind = ?request.register_kind), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, User>(
            r#"
            WITH new_id AS (SELECT nextval('users_id_seq') AS id)
            INSERT INTO users (id, name, email, mobile, password_hash, register_kind, nickname, avatar, activated, activation_code)
            SELECT id,
                   COALESCE(NULLIF($1, ''), id::text),
                   COALESCE(NULLIF($2, ''), id::text),
                   COALESCE(NULLIF($3, ''), id::text),
                   $4, $5,
                   COALESCE(NULLIF($6, ''), id::text),
                   $7, $8, $9
            FROM new_id
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.mobile)
        .bind(&request.password_hash)
        .bind(request.register_kind)
        .bind(&request.nickname)
        .bind(&request.avatar)
        .bind(request.activated)
        .bind(&request.activation_code)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(user)
    }

    /// Soft delete: the row stays for audit, the account stops resolving.
    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET status = 'deleted', updated_at = NOW() WHERE id = $1 AND status != 'deleted'")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET nickname = COALESCE($2, nickname),
                avatar = COALESCE($3, avatar),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.nickname)
        .bind(&request.avatar)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegisterKind;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_failure_counter_is_per_user(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut users = Users::new(&mut conn);

        let mut create = UserCreateDBRequest::empty(RegisterKind::Email);
        create.email = "first@example.com".to_string();
        let first = users.create(&create).await.unwrap();

        let mut create = UserCreateDBRequest::empty(RegisterKind::Email);
        create.email = "second@example.com".to_string();
        let second = users.create(&create).await.unwrap();

        users.record_login_failure(first.id).await.unwrap();
        users.record_login_failure(first.id).await.unwrap();

        let first = users.get_by_id(first.id).await.unwrap().unwrap();
        let second = users.get_by_id(second.id).await.unwrap().unwrap();
        assert_eq!(first.failure_count, 2);
        assert!(first.last_failure_at.is_some());
        assert_eq!(second.failure_count, 0);
        assert!(second.last_failure_at.is_none());
    }
}
