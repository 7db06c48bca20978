//! Admin role management handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::roles::{RoleCreate, RoleDetailResponse, RoleResponse, RoleUpdate},
    db::errors::DbError,
    db::handlers::{Repository, Roles},
    db::models::roles::{RoleCreateDBRequest, RoleUpdateDBRequest},
    errors::{Error, Result},
    types::RoleId,
};

/// The roles table has one unique constraint, the name; surface it as the
/// role-specific conflict instead of the generic database one.
fn map_role_error(err: Error) -> Error {
    match err {
        Error::Database(DbError::UniqueViolation { .. }) => Error::RoleExists,
        Error::Database(DbError::NotFound) => Error::RoleNotFound,
        other => other,
    }
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "roles",
    summary = "Create a role with its permission tuples",
    request_body = RoleCreate,
    responses(
        (status = 201, description = "Role created", body = RoleResponse),
        (status = 409, description = "Role name already exists")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_role(
    State(state): State<AppState>,
    Json(request): Json<RoleCreate>,
) -> Result<(StatusCode, Json<RoleResponse>)> {
    if request.name.is_empty() {
        return Err(Error::Argument {
            message: "role name is required".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let role = Roles::new(&mut conn)
        .create(&RoleCreateDBRequest {
            name: request.name,
            permissions: request.permissions.into_iter().map(Into::into).collect(),
        })
        .await
        .map_err(|e| map_role_error(e.into()))?;

    Ok((StatusCode::CREATED, Json(role.into())))
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "roles",
    summary = "List roles",
    responses((status = 200, description = "All roles", body = Vec<RoleResponse>)),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_roles(State(state): State<AppState>) -> Result<Json<Vec<RoleResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let roles = Roles::new(&mut conn).list().await?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/roles/{role_id}",
    tag = "roles",
    summary = "Role with its permission tuples",
    params(("role_id" = i64, Path, description = "Role id")),
    responses(
        (status = 200, description = "Role detail", body = RoleDetailResponse),
        (status = 404, description = "No such role")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(role_id))]
pub async fn get_role(State(state): State<AppState>, Path(role_id): Path<RoleId>) -> Result<Json<RoleDetailResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let detail = Roles::new(&mut conn)
        .get_with_permissions(role_id)
        .await?
        .ok_or(Error::RoleNotFound)?;
    Ok(Json(detail.into()))
}

#[utoipa::path(
    put,
    path = "/roles/{role_id}",
    tag = "roles",
    summary = "Rename a role or replace its permission set",
    request_body = RoleUpdate,
    params(("role_id" = i64, Path, description = "Role id")),
    responses(
        (status = 200, description = "Updated role", body = RoleResponse),
        (status = 404, description = "No such role"),
        (status = 409, description = "Role name already exists")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(role_id))]
pub async fn update_role(
    State(state): State<AppState>,
    Path(role_id): Path<RoleId>,
    Json(request): Json<RoleUpdate>,
) -> Result<Json<RoleResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let role = Roles::new(&mut conn)
        .update(
            role_id,
            &RoleUpdateDBRequest {
                name: request.name,
                permissions: request
                    .permissions
                    .map(|perms| perms.into_iter().map(Into::into).collect()),
            },
        )
        .await
        .map_err(|e| map_role_error(e.into()))?;

    Ok(Json(role.into()))
}

#[utoipa::path(
    delete,
    path = "/roles/{role_id}",
    tag = "roles",
    summary = "Delete a role, its tuples and assignments",
    params(("role_id" = i64, Path, description = "Role id")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "No such role")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(role_id))]
pub async fn delete_role(State(state): State<AppState>, Path(role_id): Path<RoleId>) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Roles::new(&mut conn).delete(role_id).await? {
        return Err(Error::RoleNotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
