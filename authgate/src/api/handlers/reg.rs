//! Registration and activation handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use sqlx::Connection;
use tracing::warn;

use crate::{
    AppState,
    api::handlers::client_ip,
    api::models::auth::LoginResponse,
    api::models::users::{
        ActivateRequest, MpPayloadRequest, RegisterByEmailRequest, RegisterByMobileRequest, RegisterByNameRequest,
        RegisterThirdRequest, ResendActivationRequest, UserResponse,
    },
    auth::{activation, guard, password, resolver},
    codes::CodePurpose,
    db::handlers::{Repository, ThirdIdentities, Users},
    db::models::users::UserCreateDBRequest,
    errors::{Error, Result},
    federation::NormalizedProfile,
    types::RegisterKind,
};

#[utoipa::path(
    post,
    path = "/reg/name",
    tag = "registration",
    summary = "Register with a name and password",
    request_body = RegisterByNameRequest,
    responses(
        (status = 200, description = "Account created and session issued", body = LoginResponse),
        (status = 400, description = "Invalid name or weak password"),
        (status = 409, description = "Name already taken")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register_name(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterByNameRequest>,
) -> Result<Json<LoginResponse>> {
    resolver::check_name(&request.name)?;
    password::check_strength(&request.password)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    if users.get_by_name(&request.name).await?.is_some() {
        return Err(Error::UserExists);
    }

    let mut create = UserCreateDBRequest::empty(RegisterKind::Name);
    create.name = request.name.clone();
    create.nickname = request.nickname.unwrap_or(request.name);
    create.password_hash = password::hash_async(&request.password).await?;

    let user = users.create(&create).await?;
    drop(conn);

    guard::login_resolved(&state.db, &state.config, &user, &client_ip(&headers)).await?;
    Ok(Json(LoginResponse::issue(&user, &state.config)?))
}

#[utoipa::path(
    post,
    path = "/reg/email",
    tag = "registration",
    summary = "Register with an email, pending activation",
    request_body = RegisterByEmailRequest,
    responses(
        (status = 200, description = "Account created, activation email sent", body = UserResponse),
        (status = 400, description = "Invalid email or weak password"),
        (status = 409, description = "Email already registered")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register_email(
    State(state): State<AppState>,
    Json(request): Json<RegisterByEmailRequest>,
) -> Result<Json<UserResponse>> {
    resolver::check_email(&request.email)?;
    password::check_strength(&request.password)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    if users.get_by_email(&request.email).await?.is_some() {
        return Err(Error::UserExists);
    }

    let mut create = UserCreateDBRequest::empty(RegisterKind::Email);
    create.email = request.email.clone();
    create.password_hash = password::hash_async(&request.password).await?;
    create.activated = false;
    create.activation_code = activation::new_activation_code();

    let user = users.create(&create).await?;
    drop(conn);

    dispatch_activation(&state, &user.email, activation::encode_envelope(user.id, &user.activation_code));

    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/reg/mobile",
    tag = "registration",
    summary = "Register with a mobile number and verification code",
    request_body = RegisterByMobileRequest,
    responses(
        (status = 200, description = "Account created and session issued", body = LoginResponse),
        (status = 400, description = "Invalid code, number or password"),
        (status = 409, description = "Mobile number already registered")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register_mobile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterByMobileRequest>,
) -> Result<Json<LoginResponse>> {
    resolver::check_mobile(&request.mobile)?;
    password::check_strength(&request.password)?;
    state.vault.verify(CodePurpose::Register, &request.mobile, &request.code).await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    if users.get_by_mobile(&request.mobile).await?.is_some() {
        return Err(Error::UserExists);
    }

    let mut create = UserCreateDBRequest::empty(RegisterKind::Mobile);
    create.mobile = request.mobile.clone();
    create.password_hash = password::hash_async(&request.password).await?;

    let user = users.create(&create).await?;
    drop(conn);

    state.vault.consume(CodePurpose::Register, &request.mobile).await;

    guard::login_resolved(&state.db, &state.config, &user, &client_ip(&headers)).await?;
    Ok(Json(LoginResponse::issue(&user, &state.config)?))
}

#[utoipa::path(
    post,
    path = "/reg/third",
    tag = "registration",
    summary = "Complete registration for a parked federated profile",
    request_body = RegisterThirdRequest,
    responses(
        (status = 200, description = "Account created and session issued", body = LoginResponse),
        (status = 400, description = "Bridge code invalid or expired")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register_third(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterThirdRequest>,
) -> Result<Json<LoginResponse>> {
    let profile = state.pending.take_profile(&request.code).await?;
    let user = login_or_create_federated(&state, &profile).await?;

    guard::login_resolved(&state.db, &state.config, &user, &client_ip(&headers)).await?;
    Ok(Json(LoginResponse::issue(&user, &state.config)?))
}

#[utoipa::path(
    post,
    path = "/reg/weixinmp/userinfo/{provider}",
    tag = "registration",
    summary = "Register from an encrypted mini-app profile payload",
    request_body = MpPayloadRequest,
    params(("provider" = String, Path, description = "Provider tag")),
    responses(
        (status = 200, description = "Account created and session issued", body = LoginResponse),
        (status = 400, description = "Session key invalid or payload undecryptable")
    )
)]
#[tracing::instrument(skip_all, fields(provider))]
pub async fn mp_register_userinfo(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MpPayloadRequest>,
) -> Result<Json<LoginResponse>> {
    let adapter = state.providers.miniapp(&provider)?;
    let session = state.pending.session(&request.session_key).await?;
    let profile = adapter.decrypt_user(&session, &request.iv, &request.data)?;

    let user = login_or_create_federated(&state, &profile).await?;

    guard::login_resolved(&state.db, &state.config, &user, &client_ip(&headers)).await?;
    Ok(Json(LoginResponse::issue(&user, &state.config)?))
}

#[utoipa::path(
    post,
    path = "/reg/weixinmp/mobile/{provider}",
    tag = "registration",
    summary = "Register or log in from an encrypted mini-app phone payload",
    request_body = MpPayloadRequest,
    params(("provider" = String, Path, description = "Provider tag")),
    responses(
        (status = 200, description = "Session issued", body = LoginResponse),
        (status = 400, description = "Session key invalid or payload undecryptable")
    )
)]
#[tracing::instrument(skip_all, fields(provider))]
pub async fn mp_register_mobile(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MpPayloadRequest>,
) -> Result<Json<LoginResponse>> {
    let adapter = state.providers.miniapp(&provider)?;
    let session = state.pending.session(&request.session_key).await?;
    let mobile = adapter.decrypt_mobile(&session, &request.iv, &request.data)?;
    resolver::check_mobile(&mobile)?;

    let profile = NormalizedProfile {
        provider: provider.clone(),
        open_id: session.open_id.clone(),
        nickname: String::new(),
        avatar: String::new(),
        mobile,
    };
    let user = login_or_create_federated(&state, &profile).await?;

    guard::login_resolved(&state.db, &state.config, &user, &client_ip(&headers)).await?;
    Ok(Json(LoginResponse::issue(&user, &state.config)?))
}

#[utoipa::path(
    post,
    path = "/reg/activate",
    tag = "registration",
    summary = "Activate an account with an emailed envelope",
    request_body = ActivateRequest,
    responses(
        (status = 200, description = "Account activated", body = UserResponse),
        (status = 400, description = "Envelope malformed, mismatched, or account already active")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn activate(State(state): State<AppState>, Json(request): Json<ActivateRequest>) -> Result<Json<UserResponse>> {
    let (id, code) = activation::decode_envelope(&request.code)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = users.get_by_id(id).await?.ok_or(Error::UserNotExist)?;
    if user.is_deleted() {
        return Err(Error::UserNotExist);
    }
    if user.activated {
        return Err(Error::UserAlreadyActivated);
    }
    if user.activation_code.is_empty() || user.activation_code != code {
        return Err(Error::InvalidActivationCode);
    }

    users.activate(id).await?;
    let user = users.get_by_id(id).await?.ok_or(Error::UserNotExist)?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/reg/activate/resend",
    tag = "registration",
    summary = "Re-send the activation email with a fresh code",
    request_body = ResendActivationRequest,
    responses(
        (status = 204, description = "Activation email dispatched"),
        (status = 400, description = "Account already active"),
        (status = 404, description = "No such account")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn resend_activation(
    State(state): State<AppState>,
    Json(request): Json<ResendActivationRequest>,
) -> Result<StatusCode> {
    resolver::check_email(&request.email)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);

    let user = users.get_by_email(&request.email).await?.ok_or(Error::UserNotExist)?;
    if user.is_deleted() {
        return Err(Error::UserNotExist);
    }
    if user.activated {
        return Err(Error::UserAlreadyActivated);
    }

    let code = activation::new_activation_code();
    users.set_activation_code(user.id, &code).await?;
    drop(conn);

    dispatch_activation(&state, &user.email, activation::encode_envelope(user.id, &code));
    Ok(StatusCode::NO_CONTENT)
}

/// Resolve a federated profile to an account, creating and binding one on
/// first contact. A concurrent registration can land between the login miss
/// and this call, so the binding is re-checked here.
async fn login_or_create_federated(state: &AppState, profile: &NormalizedProfile) -> Result<crate::db::models::users::User> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    if let Some(identity) = ThirdIdentities::new(&mut conn).find(&profile.provider, &profile.open_id).await? {
        return Users::new(&mut conn)
            .get_by_id(identity.user_id)
            .await?
            .ok_or(Error::UserNotExist);
    }

    // A phone payload may name a mobile that already has an account; bind to
    // it instead of creating a duplicate
    if !profile.mobile.is_empty()
        && let Some(existing) = Users::new(&mut conn).get_by_mobile(&profile.mobile).await?
    {
        ThirdIdentities::new(&mut conn)
            .bind(&profile.provider, &profile.open_id, existing.id)
            .await?;
        return Ok(existing);
    }

    let mut create = UserCreateDBRequest::empty(RegisterKind::Third);
    create.nickname = profile.nickname.clone();
    create.avatar = profile.avatar.clone();
    create.mobile = profile.mobile.clone();

    // Create and bind atomically: if a concurrent registration wins the
    // (provider, open_id) unique constraint, the rollback takes the fresh
    // user row with it instead of leaving an orphan
    let mut tx = conn.begin().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut tx).create(&create).await?;
    ThirdIdentities::new(&mut tx)
        .bind(&profile.provider, &profile.open_id, user.id)
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(user)
}

/// Fire-and-forget activation email.
fn dispatch_activation(state: &AppState, email: &str, envelope: String) {
    let messenger = state.messenger.clone();
    let email = email.to_string();
    tokio::spawn(async move {
        if let Err(e) = messenger.send_activation(&email, &envelope).await {
            warn!(%email, "activation email dispatch failed: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_state;
    use sqlx::PgPool;

    fn wx_profile(open_id: &str) -> NormalizedProfile {
        NormalizedProfile {
            provider: "weixin".to_string(),
            open_id: open_id.to_string(),
            nickname: "wx-user".to_string(),
            avatar: String::new(),
            mobile: String::new(),
        }
    }

    async fn user_count(pool: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn test_federated_profile_creates_account_once(pool: PgPool) {
        let state = test_state(pool.clone());
        let profile = wx_profile("oid-once");

        let first = login_or_create_federated(&state, &profile).await.unwrap();
        let second = login_or_create_federated(&state, &profile).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(user_count(&pool).await, 1);
    }

    #[sqlx::test]
    async fn test_losing_bind_leaves_no_orphan_user(pool: PgPool) {
        let state = test_state(pool.clone());

        // A revoked identity is invisible to resolution but still occupies
        // the (provider, open_id) unique constraint, which forces the
        // create-then-bind path to lose the insert
        login_or_create_federated(&state, &wx_profile("oid-taken")).await.unwrap();
        sqlx::query("UPDATE third_party_identities SET status = 'deleted' WHERE open_id = $1")
            .bind("oid-taken")
            .execute(&pool)
            .await
            .unwrap();

        let err = login_or_create_federated(&state, &wx_profile("oid-taken")).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        // The user row created alongside the failed bind must not survive
        assert_eq!(user_count(&pool).await, 1);
    }
}
