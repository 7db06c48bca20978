//! OpenAPI documentation for the two API surfaces: end-user routes at
//! `/v1/api/*` and admin routes at `/v1/admin/*`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;
use crate::auth::session::{ADMIN_AUTH_HEADER, USER_AUTH_HEADER};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "UserAuth",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_AUTH_HEADER))),
            );
            components.add_security_scheme(
                "AdminAuth",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ADMIN_AUTH_HEADER))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Authgate",
        description = "Identity and access core: password, code and federated login, session tokens, role-based admin access control."
    ),
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::login,
        api::handlers::auth::login_mobile,
        api::handlers::auth::third_authorize_url,
        api::handlers::auth::third_login,
        api::handlers::auth::mp_login,
        api::handlers::reg::register_name,
        api::handlers::reg::register_email,
        api::handlers::reg::register_mobile,
        api::handlers::reg::register_third,
        api::handlers::reg::mp_register_userinfo,
        api::handlers::reg::mp_register_mobile,
        api::handlers::reg::activate,
        api::handlers::reg::resend_activation,
        api::handlers::codes::issue_register_code,
        api::handlers::codes::issue_login_code,
        api::handlers::codes::issue_forgot_code,
        api::handlers::codes::reset_password,
        api::handlers::codes::issue_bind_email_code,
        api::handlers::codes::issue_bind_mobile_code,
        api::handlers::profile::me,
        api::handlers::profile::update_profile,
        api::handlers::profile::change_password,
        api::handlers::profile::bind_email,
        api::handlers::profile::bind_mobile,
        api::handlers::roles::create_role,
        api::handlers::roles::list_roles,
        api::handlers::roles::get_role,
        api::handlers::roles::update_role,
        api::handlers::roles::delete_role,
        api::handlers::users::get_user,
        api::handlers::users::delete_user,
        api::handlers::users::set_forbidden,
        api::handlers::users::reset_failures,
        api::handlers::users::force_activate,
        api::handlers::users::user_roles,
        api::handlers::users::assign_roles,
    ),
    components(schemas(
        api::models::auth::LoginRequest,
        api::models::auth::MobileLoginRequest,
        api::models::auth::LoginResponse,
        api::models::auth::AuthorizeUrlResponse,
        api::models::auth::ThirdLoginRequest,
        api::models::auth::MpLoginRequest,
        api::models::auth::ThirdLoginResponse,
        api::models::users::UserResponse,
        api::models::users::RegisterByNameRequest,
        api::models::users::RegisterByEmailRequest,
        api::models::users::RegisterByMobileRequest,
        api::models::users::RegisterThirdRequest,
        api::models::users::MpPayloadRequest,
        api::models::users::ActivateRequest,
        api::models::users::ResendActivationRequest,
        api::models::users::IssueCodeRequest,
        api::models::users::ForgotCodeRequest,
        api::models::users::ResetPasswordRequest,
        api::models::users::UpdateProfileRequest,
        api::models::users::ChangePasswordRequest,
        api::models::users::BindEmailRequest,
        api::models::users::BindMobileRequest,
        api::models::users::SetForbiddenRequest,
        api::models::users::AssignRolesRequest,
        api::models::roles::Permission,
        api::models::roles::RoleCreate,
        api::models::roles::RoleUpdate,
        api::models::roles::RoleResponse,
        api::models::roles::RoleDetailResponse,
        crate::types::RegisterKind,
    ))
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builds_with_security_schemes() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("UserAuth"));
        assert!(components.security_schemes.contains_key("AdminAuth"));
        assert!(!spec.paths.paths.is_empty());
    }
}
