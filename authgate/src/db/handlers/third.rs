//! Database repository for third-party identity bindings.

use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    db::{errors::Result, models::third::ThirdIdentity},
    types::UserId,
};

pub struct ThirdIdentities<'c> {
    db: &'c mut PgConnection,
}

impl<'c> ThirdIdentities<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Exact lookup by (provider, open_id). No fuzzy resolution here.
    #[instrument(skip(self), err)]
    pub async fn find(&mut self, provider: &str, open_id: &str) -> Result<Option<ThirdIdentity>> {
        let identity = sqlx::query_as::<_, ThirdIdentity>(
            "SELECT * FROM third_party_identities WHERE provider = $1 AND open_id = $2 AND status = 'normal'",
        )
        .bind(provider)
        .bind(open_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(identity)
    }

    /// Bind a federated identity to a local account.
    #[instrument(skip(self), err)]
    pub async fn bind(&mut self, provider: &str, open_id: &str, user_id: UserId) -> Result<ThirdIdentity> {
        let identity = sqlx::query_as::<_, ThirdIdentity>(
            "INSERT INTO third_party_identities (provider, open_id, user_id) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(provider)
        .bind(open_id)
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(identity)
    }
}
