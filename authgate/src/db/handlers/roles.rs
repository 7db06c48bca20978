//! Database repository for roles, permission tuples and role assignment.

use sqlx::{Connection, PgConnection, Row};
use tracing::instrument;

use crate::{
    auth::policy::PermissionTuple,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::roles::{Role, RoleCreateDBRequest, RoleUpdateDBRequest, RoleWithPermissions},
    },
    types::{RoleId, UserId},
};

pub struct Roles<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Roles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_name(&mut self, name: &str) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(role)
    }

    #[instrument(skip(self), err)]
    pub async fn list(&mut self) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY id")
            .fetch_all(&mut *self.db)
            .await?;
        Ok(roles)
    }

    #[instrument(skip(self), err)]
    pub async fn permissions_for_role(&mut self, role_id: RoleId) -> Result<Vec<PermissionTuple>> {
        let rows = sqlx::query("SELECT path, method FROM role_permissions WHERE role_id = $1 ORDER BY id")
            .bind(role_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| PermissionTuple {
                path: row.get("path"),
                method: row.get("method"),
            })
            .collect())
    }

    /// All tuples granted to a user through any of their roles.
    #[instrument(skip(self), err)]
    pub async fn permissions_for_user(&mut self, user_id: UserId) -> Result<Vec<PermissionTuple>> {
        let rows = sqlx::query(
            r#"
            SELECT rp.path, rp.method
            FROM role_permissions rp
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PermissionTuple {
                path: row.get("path"),
                method: row.get("method"),
            })
            .collect())
    }

    #[instrument(skip(self), err)]
    pub async fn roles_for_user(&mut self, user_id: UserId) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT r.* FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = $1 ORDER BY r.id",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(roles)
    }

    /// Replace a user's role set: delete-all then insert-all in one transaction.
    #[instrument(skip(self), err)]
    pub async fn assign_roles(&mut self, user_id: UserId, role_ids: &[RoleId]) -> Result<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        for role_id in role_ids {
            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
                .bind(user_id)
                .bind(role_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load a role with its permission tuples.
    #[instrument(skip(self), err)]
    pub async fn get_with_permissions(&mut self, id: RoleId) -> Result<Option<RoleWithPermissions>> {
        let Some(role) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let permissions = self.permissions_for_role(id).await?;
        Ok(Some(RoleWithPermissions { role, permissions }))
    }

    async fn replace_permissions(tx: &mut PgConnection, role_id: RoleId, permissions: &[PermissionTuple]) -> Result<()> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        for tuple in permissions {
            sqlx::query("INSERT INTO role_permissions (role_id, path, method) VALUES ($1, $2, LOWER($3))")
                .bind(role_id)
                .bind(&tuple.path)
                .bind(&tuple.method)
                .execute(&mut *tx)
                .await?;
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Roles<'c> {
    type CreateRequest = RoleCreateDBRequest;
    type UpdateRequest = RoleUpdateDBRequest;
    type Response = Role;
    type Id = RoleId;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let role = sqlx::query_as::<_, Role>("INSERT INTO roles (name) VALUES ($1) RETURNING *")
            .bind(&request.name)
            .fetch_one(&mut *tx)
            .await?;

        Self::replace_permissions(&mut tx, role.id, &request.permissions).await?;

        tx.commit().await?;
        Ok(role)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(role)
    }

    /// Delete a role; permission tuples and assignments cascade.
    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rename and/or replace the permission set, atomically. A permission set
    /// in the request is a full replacement (delete-all then insert-all).
    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut tx = self.db.begin().await?;

        let role = sqlx::query_as::<_, Role>(
            "UPDATE roles SET name = COALESCE($2, name), updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&request.name)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

        if let Some(permissions) = &request.permissions {
            Self::replace_permissions(&mut tx, id, permissions).await?;
        }

        tx.commit().await?;
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn tuple(path: &str, method: &str) -> PermissionTuple {
        PermissionTuple {
            path: path.to_string(),
            method: method.to_string(),
        }
    }

    #[sqlx::test]
    async fn test_empty_permission_set_replaces_all_tuples(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut roles = Roles::new(&mut conn);

        let role = roles
            .create(&RoleCreateDBRequest {
                name: "ops".to_string(),
                permissions: vec![tuple("/v1/admin/users", "get"), tuple("/v1/admin/users/:id", "delete")],
            })
            .await
            .unwrap();
        assert_eq!(roles.permissions_for_role(role.id).await.unwrap().len(), 2);

        // An empty set is still a full replacement, not a no-op
        roles
            .update(
                role.id,
                &RoleUpdateDBRequest {
                    name: None,
                    permissions: Some(vec![]),
                },
            )
            .await
            .unwrap();
        assert!(roles.permissions_for_role(role.id).await.unwrap().is_empty());
    }
}
