//! Admin user management handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::roles::RoleResponse,
    api::models::users::{AssignRolesRequest, SetForbiddenRequest, UserResponse},
    db::handlers::{Repository, Roles, Users},
    db::models::users::User,
    errors::{Error, Result},
    types::UserId,
};

/// Load a live account or 404. Soft-deleted rows stay invisible to admins too.
async fn load_user(state: &AppState, id: UserId) -> Result<User> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn)
        .get_by_id(id)
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or(Error::UserNotExist)
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Inspect an account",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Account", body = UserResponse),
        (status = 404, description = "No such account")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id))]
pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<Json<UserResponse>> {
    let user = load_user(&state, user_id).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Soft-delete an account",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "Account deleted"),
        (status = 404, description = "No such account")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id))]
pub async fn delete_user(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Users::new(&mut conn).delete(user_id).await? {
        return Err(Error::UserNotExist);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/users/{user_id}/forbidden",
    tag = "users",
    summary = "Forbid or re-allow an account",
    request_body = SetForbiddenRequest,
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "Flag updated"),
        (status = 404, description = "No such account")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id))]
pub async fn set_forbidden(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<SetForbiddenRequest>,
) -> Result<StatusCode> {
    load_user(&state, user_id).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn).set_forbidden(user_id, request.forbidden).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/users/{user_id}/reset",
    tag = "users",
    summary = "Clear the login failure counter",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "Counter cleared"),
        (status = 404, description = "No such account")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id))]
pub async fn reset_failures(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<StatusCode> {
    load_user(&state, user_id).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn).reset_failures(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/users/{user_id}/activate",
    tag = "users",
    summary = "Force-activate an account without its code",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "Account activated"),
        (status = 400, description = "Already active"),
        (status = 404, description = "No such account")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id))]
pub async fn force_activate(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<StatusCode> {
    let user = load_user(&state, user_id).await?;
    if user.activated {
        return Err(Error::UserAlreadyActivated);
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn).activate(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/roles",
    tag = "users",
    summary = "Roles assigned to an account",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Assigned roles", body = Vec<RoleResponse>),
        (status = 404, description = "No such account")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id))]
pub async fn user_roles(State(state): State<AppState>, Path(user_id): Path<UserId>) -> Result<Json<Vec<RoleResponse>>> {
    load_user(&state, user_id).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let roles = Roles::new(&mut conn).roles_for_user(user_id).await?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

#[utoipa::path(
    put,
    path = "/users/{user_id}/roles",
    tag = "users",
    summary = "Replace an account's role set",
    request_body = AssignRolesRequest,
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "Roles replaced"),
        (status = 400, description = "Unknown role in the set"),
        (status = 404, description = "No such account")
    ),
    security(("AdminAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id))]
pub async fn assign_roles(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Json(request): Json<AssignRolesRequest>,
) -> Result<StatusCode> {
    load_user(&state, user_id).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Roles::new(&mut conn).assign_roles(user_id, &request.role_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}
