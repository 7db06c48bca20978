//! Verification code issuance and the forgotten-password reset.
//!
//! Issuance endpoints answer 204 as soon as the code is stored; delivery is
//! fire-and-forget through the messenger.

use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    api::models::users::{ForgotCodeRequest, IssueCodeRequest, ResetPasswordRequest},
    auth::{password, resolver, session::SessionSubject},
    codes::CodePurpose,
    db::handlers::Users,
    errors::{Error, Result},
    messaging::CodeRecipient,
};

/// Classify a recipient string as an email address or mobile number.
fn classify_recipient(recipient: &str) -> Result<CodeRecipient> {
    if resolver::check_email(recipient).is_ok() {
        Ok(CodeRecipient::Email(recipient.to_string()))
    } else if resolver::check_mobile(recipient).is_ok() {
        Ok(CodeRecipient::Mobile(recipient.to_string()))
    } else {
        Err(Error::Argument {
            message: "recipient must be an email address or mobile number".to_string(),
        })
    }
}

async fn issue_and_dispatch(state: &AppState, purpose: CodePurpose, recipient: CodeRecipient) -> Result<()> {
    let code = state.vault.issue(purpose, recipient.address()).await;
    state.messenger.dispatch_code(recipient, purpose, code);
    Ok(())
}

#[utoipa::path(
    post,
    path = "/code/reg",
    tag = "codes",
    summary = "Send a registration verification code",
    request_body = IssueCodeRequest,
    responses(
        (status = 204, description = "Code issued and dispatch started"),
        (status = 400, description = "Unrecognized recipient"),
        (status = 409, description = "Recipient already registered")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn issue_register_code(State(state): State<AppState>, Json(request): Json<IssueCodeRequest>) -> Result<StatusCode> {
    let recipient = classify_recipient(&request.recipient)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    let taken = match &recipient {
        CodeRecipient::Email(email) => users.get_by_email(email).await?.is_some(),
        CodeRecipient::Mobile(mobile) => users.get_by_mobile(mobile).await?.is_some(),
    };
    if taken {
        return Err(Error::UserExists);
    }
    drop(conn);

    issue_and_dispatch(&state, CodePurpose::Register, recipient).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/code/login",
    tag = "codes",
    summary = "Send a login verification code by SMS",
    request_body = IssueCodeRequest,
    responses(
        (status = 204, description = "Code issued and dispatch started"),
        (status = 400, description = "Not a mobile number"),
        (status = 404, description = "No account for mobile number")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn issue_login_code(State(state): State<AppState>, Json(request): Json<IssueCodeRequest>) -> Result<StatusCode> {
    // Code login only exists for mobile numbers; an emailed login code would
    // have no endpoint to redeem it
    resolver::check_mobile(&request.recipient)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn)
        .get_by_mobile(&request.recipient)
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or(Error::UserNotExist)?;
    drop(conn);

    issue_and_dispatch(&state, CodePurpose::Login, CodeRecipient::Mobile(request.recipient)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/code/forgot/email",
    tag = "codes",
    summary = "Send a password-reset code by email",
    request_body = ForgotCodeRequest,
    responses(
        (status = 204, description = "Code issued and dispatch started"),
        (status = 404, description = "No account for email")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn issue_forgot_code(State(state): State<AppState>, Json(request): Json<ForgotCodeRequest>) -> Result<StatusCode> {
    resolver::check_email(&request.email)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Users::new(&mut conn)
        .get_by_email(&request.email)
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or(Error::UserNotExist)?;
    drop(conn);

    issue_and_dispatch(&state, CodePurpose::ForgotPassword, CodeRecipient::Email(request.email)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/forgot/reset/email",
    tag = "codes",
    summary = "Reset a forgotten password with an emailed code",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 400, description = "Invalid code or weak password"),
        (status = 404, description = "No account for email")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn reset_password(State(state): State<AppState>, Json(request): Json<ResetPasswordRequest>) -> Result<StatusCode> {
    resolver::check_email(&request.email)?;
    password::check_strength(&request.password)?;
    state
        .vault
        .verify(CodePurpose::ForgotPassword, &request.email, &request.code)
        .await?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut users = Users::new(&mut conn);
    let user = users
        .get_by_email(&request.email)
        .await?
        .filter(|u| !u.is_deleted())
        .ok_or(Error::UserNotExist)?;

    let hash = password::hash_async(&request.password).await?;
    users.update_password(user.id, &hash).await?;
    drop(conn);

    state.vault.consume(CodePurpose::ForgotPassword, &request.email).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/code/bind/email",
    tag = "codes",
    summary = "Send an email-binding code to a new address",
    request_body = ForgotCodeRequest,
    responses(
        (status = 204, description = "Code issued and dispatch started"),
        (status = 409, description = "Address already registered")
    ),
    security(("UserAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn issue_bind_email_code(
    State(state): State<AppState>,
    Extension(_subject): Extension<SessionSubject>,
    Json(request): Json<ForgotCodeRequest>,
) -> Result<StatusCode> {
    resolver::check_email(&request.email)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Users::new(&mut conn).get_by_email(&request.email).await?.is_some() {
        return Err(Error::UserExists);
    }
    drop(conn);

    issue_and_dispatch(&state, CodePurpose::BindEmail, CodeRecipient::Email(request.email)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/code/bind/mobile",
    tag = "codes",
    summary = "Send a mobile-binding code to a new number",
    request_body = IssueCodeRequest,
    responses(
        (status = 204, description = "Code issued and dispatch started"),
        (status = 409, description = "Number already registered")
    ),
    security(("UserAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn issue_bind_mobile_code(
    State(state): State<AppState>,
    Extension(_subject): Extension<SessionSubject>,
    Json(request): Json<IssueCodeRequest>,
) -> Result<StatusCode> {
    resolver::check_mobile(&request.recipient)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Users::new(&mut conn).get_by_mobile(&request.recipient).await?.is_some() {
        return Err(Error::UserExists);
    }
    drop(conn);

    issue_and_dispatch(&state, CodePurpose::BindMobile, CodeRecipient::Mobile(request.recipient)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::test_state;
    use sqlx::PgPool;

    #[test]
    fn test_classify_recipient() {
        assert!(matches!(classify_recipient("a@b.co").unwrap(), CodeRecipient::Email(_)));
        assert!(matches!(classify_recipient("13812345678").unwrap(), CodeRecipient::Mobile(_)));
        assert!(classify_recipient("zhangsan").is_err());
        assert!(classify_recipient("").is_err());
    }

    #[sqlx::test]
    async fn test_login_code_is_mobile_only(pool: PgPool) {
        let state = test_state(pool.clone());

        // An emailed login code would be unredeemable; reject at issuance
        // even when an account exists for the address
        let mut conn = pool.acquire().await.unwrap();
        let mut create = crate::db::models::users::UserCreateDBRequest::empty(crate::types::RegisterKind::Email);
        create.email = "a@b.co".to_string();
        crate::db::handlers::Repository::create(&mut Users::new(&mut conn), &create)
            .await
            .unwrap();
        drop(conn);

        let err = issue_login_code(
            State(state.clone()),
            Json(IssueCodeRequest {
                recipient: "a@b.co".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Argument { .. }));

        // A mobile number with no account is a lookup miss, not an argument error
        let err = issue_login_code(
            State(state),
            Json(IssueCodeRequest {
                recipient: "13812345678".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::UserNotExist));
    }
}
