//! Profile handlers for the authenticated end user.

use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    api::models::users::{BindEmailRequest, BindMobileRequest, ChangePasswordRequest, UpdateProfileRequest, UserResponse},
    auth::{password, resolver, session::SessionSubject},
    codes::CodePurpose,
    db::handlers::{Repository, Users},
    db::models::users::{User, UserUpdateDBRequest},
    errors::{Error, Result},
};

/// Load the live account behind a session subject.
async fn current_user(state: &AppState, subject: &SessionSubject) -> Result<User> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_id(subject.identity)
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or(Error::UserNotExist)?;
    Ok(user)
}

#[utoipa::path(
    get,
    path = "/profile",
    tag = "profile",
    summary = "Current user's profile",
    responses(
        (status = 200, description = "Profile", body = UserResponse),
        (status = 401, description = "Not logged in")
    ),
    security(("UserAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn me(State(state): State<AppState>, Extension(subject): Extension<SessionSubject>) -> Result<Json<UserResponse>> {
    let user = current_user(&state, &subject).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path = "/profile",
    tag = "profile",
    summary = "Update nickname or avatar",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 401, description = "Not logged in")
    ),
    security(("UserAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(subject): Extension<SessionSubject>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>> {
    current_user(&state, &subject).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .update(
            subject.identity,
            &UserUpdateDBRequest {
                nickname: request.nickname,
                avatar: request.avatar,
            },
        )
        .await?;

    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path = "/profile/password",
    tag = "profile",
    summary = "Change password with the old password or an emailed code",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 400, description = "Wrong password, bad code, or weak replacement"),
        (status = 401, description = "Not logged in")
    ),
    security(("UserAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(subject): Extension<SessionSubject>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    password::check_strength(&request.new_password)?;
    let user = current_user(&state, &subject).await?;

    // Either proof works; the old password takes precedence when both appear
    let mut used_code = false;
    match (&request.old_password, &request.code) {
        (Some(old), _) => {
            if !password::verify_async(old, &user.password_hash).await? {
                return Err(Error::InvalidPassword);
            }
        }
        (None, Some(code)) => {
            state.vault.verify(CodePurpose::ForgotPassword, &user.email, code).await?;
            used_code = true;
        }
        (None, None) => {
            return Err(Error::Argument {
                message: "old_password or code is required".to_string(),
            });
        }
    }

    let hash = password::hash_async(&request.new_password).await?;
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn).update_password(user.id, &hash).await?;
    drop(conn);

    if used_code {
        state.vault.consume(CodePurpose::ForgotPassword, &user.email).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/profile/email",
    tag = "profile",
    summary = "Bind a verified email address",
    request_body = BindEmailRequest,
    responses(
        (status = 204, description = "Email bound"),
        (status = 400, description = "Invalid code"),
        (status = 409, description = "Address already registered")
    ),
    security(("UserAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn bind_email(
    State(state): State<AppState>,
    Extension(subject): Extension<SessionSubject>,
    Json(request): Json<BindEmailRequest>,
) -> Result<StatusCode> {
    resolver::check_email(&request.email)?;
    state.vault.verify(CodePurpose::BindEmail, &request.email, &request.code).await?;
    let user = current_user(&state, &subject).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    if users.get_by_email(&request.email).await?.is_some() {
        return Err(Error::UserExists);
    }
    users.bind_email(user.id, &request.email).await?;
    drop(conn);

    state.vault.consume(CodePurpose::BindEmail, &request.email).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/profile/mobile",
    tag = "profile",
    summary = "Bind a verified mobile number",
    request_body = BindMobileRequest,
    responses(
        (status = 204, description = "Mobile bound"),
        (status = 400, description = "Invalid code"),
        (status = 409, description = "Number already registered")
    ),
    security(("UserAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn bind_mobile(
    State(state): State<AppState>,
    Extension(subject): Extension<SessionSubject>,
    Json(request): Json<BindMobileRequest>,
) -> Result<StatusCode> {
    resolver::check_mobile(&request.mobile)?;
    state.vault.verify(CodePurpose::BindMobile, &request.mobile, &request.code).await?;
    let user = current_user(&state, &subject).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    if users.get_by_mobile(&request.mobile).await?.is_some() {
        return Err(Error::UserExists);
    }
    users.bind_mobile(user.id, &request.mobile).await?;
    drop(conn);

    state.vault.consume(CodePurpose::BindMobile, &request.mobile).await;
    Ok(StatusCode::NO_CONTENT)
}
