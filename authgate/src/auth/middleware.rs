//! Request authentication middleware.
//!
//! End-user routes require `x-authgate-authorization`; admin routes require
//! `x-authgate-admin-authorization` plus a policy check. Both insert the
//! verified [`SessionSubject`] as a request extension for handlers.

use axum::{
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::{
        policy,
        session::{self, ADMIN_AUTH_HEADER, SessionSubject, USER_AUTH_HEADER},
    },
    db::handlers::{Repository, Users},
    errors::Error,
};

fn subject_from_header(req: &Request, header: &str, state: &AppState) -> Result<SessionSubject, Error> {
    let value = req
        .headers()
        .get(header)
        .ok_or(Error::NotLoggedIn)?
        .to_str()
        .map_err(|_| Error::NotLoggedIn)?;

    let token = session::parse_credential(value)?;
    session::verify_session_token(token, &state.config)
}

/// Gate for end-user routes.
pub async fn require_user(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, Error> {
    let subject = subject_from_header(&req, USER_AUTH_HEADER, &state)?;
    req.extensions_mut().insert(subject);
    Ok(next.run(req).await)
}

/// Gate for admin routes: verified token, live account, and a policy match
/// for the request path and method.
pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, Error> {
    let subject = subject_from_header(&req, ADMIN_AUTH_HEADER, &state)?;

    // Admin tokens are re-resolved on every request so a deleted account
    // cannot keep administering until its token expires
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_id(subject.identity)
        .await?
        .ok_or(Error::UserNotExist)?;
    if user.is_deleted() {
        return Err(Error::UserNotExist);
    }
    drop(conn);

    // Nesting strips the mount prefix from req.uri(); policy tuples are
    // written against the full external path
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    policy::enforce(&state.db, &state.config, subject.identity, &path, req.method().as_str()).await?;

    req.extensions_mut().insert(subject);
    Ok(next.run(req).await)
}
