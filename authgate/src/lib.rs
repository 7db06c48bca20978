//! # Authgate
//!
//! Identity and access core: authenticates users via password, one-time codes
//! or federated third-party providers, issues signed session tokens, and
//! enforces role-based access control on administrative endpoints.
//!
//! ## Architecture
//!
//! The **database layer** ([`db`]) wraps PostgreSQL behind repository types
//! (users, roles, third-party identities) using the sqlx runtime API with
//! embedded migrations.
//!
//! The **auth layer** ([`auth`]) holds the security core: argon2 password
//! hashing, HS256 session tokens, identifier classification, the account
//! guard state machine (lockout, forbidden, deleted, unactivated) and the
//! role-based policy enforcer.
//!
//! The **federation layer** ([`federation`]) adapts third-party providers
//! (GitHub, QQ, Weibo, WeChat web and mini-app) to one normalized profile
//! shape, and bridges first-time identities into registration through
//! short-lived pending records.
//!
//! The **API layer** ([`api`]) exposes end-user routes at `/v1/api/*` and
//! admin routes at `/v1/admin/*`; admin routes pass the policy enforcer in
//! addition to token verification.

pub mod api;
pub mod auth;
pub mod cache;
pub mod codes;
pub mod config;
pub mod db;
pub mod errors;
pub mod federation;
pub mod messaging;
pub mod openapi;
pub mod telemetry;
pub mod types;

use anyhow::Context;
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post, put},
};
use bon::Builder;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers,
    auth::middleware,
    cache::TtlStore,
    codes::CodeVault,
    config::Config,
    db::handlers::{Repository, Users},
    db::models::users::UserCreateDBRequest,
    federation::{PendingStore, ProviderRegistry},
    messaging::Messenger,
    openapi::ApiDoc,
    types::{RegisterKind, UserId},
};

/// Shared application state, cloned into every handler.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub vault: CodeVault,
    pub pending: PendingStore,
    pub messenger: Messenger,
    pub providers: ProviderRegistry,
}

/// Embedded database migrations.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin account if it does not exist.
///
/// Idempotent by name. The account is expected to land on the configured
/// super subject identity on a fresh database; when it does not (pre-seeded
/// databases), the operator must point `auth.super_subject_id` at the
/// returned identity.
pub async fn create_initial_admin_user(config: &Config, db: &PgPool) -> anyhow::Result<UserId> {
    let mut conn = db.acquire().await.context("acquire connection for admin seeding")?;
    let mut users = Users::new(&mut conn);

    if let Some(existing) = users.get_by_name(&config.admin_name).await? {
        return Ok(existing.id);
    }

    let mut create = UserCreateDBRequest::empty(RegisterKind::Name);
    create.name = config.admin_name.clone();
    create.nickname = config.admin_name.clone();
    if let Some(password) = config.admin_password.as_deref() {
        create.password_hash = auth::password::hash_async(password).await.context("hash admin password")?;
    }

    let admin = users.create(&create).await.context("create initial admin user")?;
    info!(id = admin.id, name = %admin.name, "created initial admin user");

    if admin.id != config.auth.super_subject_id {
        warn!(
            id = admin.id,
            super_subject_id = config.auth.super_subject_id,
            "admin account is not the configured super subject; set auth.super_subject_id accordingly"
        );
    }
    Ok(admin.id)
}

/// Build the application router: public routes, end-user guarded routes and
/// admin guarded routes, plus API docs.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/login/mobile", post(handlers::auth::login_mobile))
        .route("/login/th/weixinmp/{provider}", post(handlers::auth::mp_login))
        .route(
            "/login/th/{provider}",
            get(handlers::auth::third_authorize_url).post(handlers::auth::third_login),
        )
        .route("/reg/name", post(handlers::reg::register_name))
        .route("/reg/email", post(handlers::reg::register_email))
        .route("/reg/mobile", post(handlers::reg::register_mobile))
        .route("/reg/third", post(handlers::reg::register_third))
        .route("/reg/weixinmp/userinfo/{provider}", post(handlers::reg::mp_register_userinfo))
        .route("/reg/weixinmp/mobile/{provider}", post(handlers::reg::mp_register_mobile))
        .route("/reg/activate", post(handlers::reg::activate))
        .route("/reg/activate/resend", post(handlers::reg::resend_activation))
        .route("/code/reg", post(handlers::codes::issue_register_code))
        .route("/code/login", post(handlers::codes::issue_login_code))
        .route("/code/forgot/email", post(handlers::codes::issue_forgot_code))
        .route("/forgot/reset/email", post(handlers::codes::reset_password));

    let user_guarded = Router::new()
        .route("/profile", get(handlers::profile::me).put(handlers::profile::update_profile))
        .route("/profile/password", put(handlers::profile::change_password))
        .route("/profile/email", put(handlers::profile::bind_email))
        .route("/profile/mobile", put(handlers::profile::bind_mobile))
        .route("/code/bind/email", post(handlers::codes::issue_bind_email_code))
        .route("/code/bind/mobile", post(handlers::codes::issue_bind_mobile_code))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_user));

    let admin = Router::new()
        .route("/roles", post(handlers::roles::create_role).get(handlers::roles::list_roles))
        .route(
            "/roles/{role_id}",
            get(handlers::roles::get_role)
                .put(handlers::roles::update_role)
                .delete(handlers::roles::delete_role),
        )
        .route(
            "/users/{user_id}",
            get(handlers::users::get_user).delete(handlers::users::delete_user),
        )
        .route("/users/{user_id}/forbidden", put(handlers::users::set_forbidden))
        .route("/users/{user_id}/reset", put(handlers::users::reset_failures))
        .route("/users/{user_id}/activate", put(handlers::users::force_activate))
        .route(
            "/users/{user_id}/roles",
            get(handlers::users::user_roles).put(handlers::users::assign_roles),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::require_admin));

    Router::new()
        .nest("/v1/api", public.merge(user_guarded))
        .nest("/v1/admin", admin)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
            .connect(&config.database.url)
            .await
            .context("connect to database")?;

        migrator().run(&pool).await.context("run database migrations")?;
        create_initial_admin_user(&config, &pool).await?;

        let store = TtlStore::new();
        let state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .vault(CodeVault::new(store.clone(), config.codes.code_ttl))
            .pending(PendingStore::new(store, &config.codes))
            .messenger(Messenger::new(&config)?)
            .providers(ProviderRegistry::from_config(&config.federation)?)
            .build();

        let router = build_router(state);

        Ok(Self { router, config, pool })
    }

    /// Start serving until the shutdown future resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await.context("bind listener")?;
        info!("Authgate listening on http://{bind_addr}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;
        Ok(())
    }
}
