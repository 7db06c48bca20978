//! Login handlers: password, mobile code, and federated providers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Deserialize;

use crate::{
    AppState,
    api::handlers::client_ip,
    api::models::auth::{
        AuthorizeUrlResponse, LoginRequest, LoginResponse, MobileLoginRequest, MpLoginRequest, ThirdLoginRequest,
        ThirdLoginResponse,
    },
    auth::{guard, resolver},
    codes::CodePurpose,
    db::handlers::{Repository, ThirdIdentities, Users},
    errors::{Error, Result},
};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct AuthorizeQuery {
    /// Opaque state echoed back through the provider redirect
    pub state: Option<String>,
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    summary = "Log in with an identifier and password",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Wrong password"),
        (status = 403, description = "Account locked or forbidden"),
        (status = 404, description = "No such account")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    if request.identifier.is_empty() || request.password.is_empty() {
        return Err(Error::Argument {
            message: "identifier and password are required".to_string(),
        });
    }

    let user = guard::login_with_password(
        &state.db,
        &state.config,
        &request.identifier,
        &request.password,
        &client_ip(&headers),
    )
    .await?;

    Ok(Json(LoginResponse::issue(&user, &state.config)?))
}

#[utoipa::path(
    post,
    path = "/login/mobile",
    tag = "auth",
    summary = "Log in with a mobile verification code",
    request_body = MobileLoginRequest,
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Invalid or expired code"),
        (status = 404, description = "No such account")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login_mobile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MobileLoginRequest>,
) -> Result<Json<LoginResponse>> {
    resolver::check_mobile(&request.mobile)?;
    state.vault.verify(CodePurpose::Login, &request.mobile, &request.code).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_mobile(&request.mobile)
        .await?
        .ok_or(Error::UserNotExist)?;
    drop(conn);

    guard::login_resolved(&state.db, &state.config, &user, &client_ip(&headers)).await?;
    state.vault.consume(CodePurpose::Login, &request.mobile).await;

    Ok(Json(LoginResponse::issue(&user, &state.config)?))
}

#[utoipa::path(
    get,
    path = "/login/th/{provider}",
    tag = "auth",
    summary = "Authorize URL for an OAuth provider",
    params(
        ("provider" = String, Path, description = "Provider tag"),
        AuthorizeQuery,
    ),
    responses(
        (status = 200, description = "Redirect target", body = AuthorizeUrlResponse),
        (status = 400, description = "Unknown provider")
    )
)]
#[tracing::instrument(skip_all, fields(provider))]
pub async fn third_authorize_url(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Json<AuthorizeUrlResponse>> {
    let adapter = state.providers.oauth(&provider)?;
    Ok(Json(AuthorizeUrlResponse {
        url: adapter.authorize_url(query.state.as_deref().unwrap_or_default()),
    }))
}

#[utoipa::path(
    post,
    path = "/login/th/{provider}",
    tag = "auth",
    summary = "Log in with an OAuth provider code",
    request_body = ThirdLoginRequest,
    params(("provider" = String, Path, description = "Provider tag")),
    responses(
        (status = 200, description = "Session issued, or a registration bridge when no account is bound", body = ThirdLoginResponse),
        (status = 400, description = "Unknown provider or failed exchange")
    )
)]
#[tracing::instrument(skip_all, fields(provider))]
pub async fn third_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ThirdLoginRequest>,
) -> Result<Json<ThirdLoginResponse>> {
    let adapter = state.providers.oauth(&provider)?;
    let profile = adapter.exchange_user(&request.code).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let bound = ThirdIdentities::new(&mut conn).find(&profile.provider, &profile.open_id).await?;

    if let Some(identity) = bound {
        let user = Users::new(&mut conn)
            .get_by_id(identity.user_id)
            .await?
            .ok_or(Error::UserNotExist)?;
        drop(conn);

        guard::login_resolved(&state.db, &state.config, &user, &client_ip(&headers)).await?;
        return Ok(Json(ThirdLoginResponse::LoggedIn(LoginResponse::issue(&user, &state.config)?)));
    }
    drop(conn);

    // First time here: park the profile and hand back a registration bridge
    let code = state.pending.stash_profile(&profile).await?;
    Ok(Json(ThirdLoginResponse::needs_registration(code, profile.nickname, profile.avatar)))
}

#[utoipa::path(
    post,
    path = "/login/th/weixinmp/{provider}",
    tag = "auth",
    summary = "Log in from a WeChat mini-app",
    request_body = MpLoginRequest,
    params(("provider" = String, Path, description = "Provider tag")),
    responses(
        (status = 200, description = "Session issued, or a session-key bridge when no account is bound", body = ThirdLoginResponse),
        (status = 400, description = "Unknown provider or failed exchange")
    )
)]
#[tracing::instrument(skip_all, fields(provider))]
pub async fn mp_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MpLoginRequest>,
) -> Result<Json<ThirdLoginResponse>> {
    let adapter = state.providers.miniapp(&provider)?;
    let session = adapter.exchange_session(&request.js_code).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let bound = ThirdIdentities::new(&mut conn).find(&provider, &session.open_id).await?;

    if let Some(identity) = bound {
        let user = Users::new(&mut conn)
            .get_by_id(identity.user_id)
            .await?
            .ok_or(Error::UserNotExist)?;
        drop(conn);

        guard::login_resolved(&state.db, &state.config, &user, &client_ip(&headers)).await?;
        return Ok(Json(ThirdLoginResponse::LoggedIn(LoginResponse::issue(&user, &state.config)?)));
    }
    drop(conn);

    // Park the session key; registration submits encrypted payloads against it
    let key = state.pending.stash_session(&session).await?;
    Ok(Json(ThirdLoginResponse::needs_registration(key, String::new(), String::new())))
}
