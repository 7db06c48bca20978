//! GitHub OAuth adapter.

use serde::Deserialize;

use crate::{
    config::ProviderConfig,
    errors::Error,
    federation::{NormalizedProfile, Provider, provider_error},
};

const TAG: &str = "github";

pub struct Github {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    auth_base: String,
    api_base: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: String,
}

impl Github {
    pub fn new(config: &ProviderConfig, http: reqwest::Client) -> Result<Self, Error> {
        let ProviderConfig::Github {
            client_id,
            client_secret,
            redirect_url,
        } = config
        else {
            return Err(Error::Internal {
                operation: "github adapter built from mismatched provider config".to_string(),
            });
        };
        Ok(Self {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_url: redirect_url.clone(),
            auth_base: "https://github.com".to_string(),
            api_base: "https://api.github.com".to_string(),
            http,
        })
    }

    #[cfg(test)]
    fn with_bases(mut self, auth_base: &str, api_base: &str) -> Self {
        self.auth_base = auth_base.to_string();
        self.api_base = api_base.to_string();
        self
    }
}

#[async_trait::async_trait]
impl Provider for Github {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn authorize_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("state", state)
            .append_pair("scope", "user")
            .finish();
        format!("{}/login/oauth/authorize?{query}", self.auth_base)
    }

    async fn exchange_user(&self, code: &str) -> Result<NormalizedProfile, Error> {
        let token: TokenResponse = self
            .http
            .post(format!("{}/login/oauth/access_token", self.auth_base))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(|e| provider_error(TAG, "access_token request", e))?
            .json()
            .await
            .map_err(|e| provider_error(TAG, "access_token decode", e))?;

        if token.access_token.is_empty() {
            return Err(provider_error(
                TAG,
                "access_token response",
                format!("{}: {}", token.error, token.error_description),
            ));
        }

        let user: GithubUser = self
            .http
            .get(format!("{}/user", self.api_base))
            .header(reqwest::header::AUTHORIZATION, format!("token {}", token.access_token))
            .header(reqwest::header::USER_AGENT, "authgate")
            .send()
            .await
            .map_err(|e| provider_error(TAG, "user request", e))?
            .json()
            .await
            .map_err(|e| provider_error(TAG, "user decode", e))?;

        Ok(NormalizedProfile {
            provider: TAG.to_string(),
            open_id: user.id.to_string(),
            nickname: user.name.filter(|n| !n.is_empty()).unwrap_or(user.login),
            avatar: user.avatar_url,
            mobile: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> Github {
        let config = ProviderConfig::Github {
            client_id: "cid".into(),
            client_secret: "cs".into(),
            redirect_url: "http://localhost/cb".into(),
        };
        Github::new(&config, reqwest::Client::new())
            .unwrap()
            .with_bases(&server.uri(), &server.uri())
    }

    #[test]
    fn test_authorize_url_carries_state() {
        let config = ProviderConfig::Github {
            client_id: "cid".into(),
            client_secret: "cs".into(),
            redirect_url: "http://localhost/cb".into(),
        };
        let url = Github::new(&config, reqwest::Client::new()).unwrap().authorize_url("st8");
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("state=st8"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%2Fcb"));
    }

    #[tokio::test]
    async fn test_exchange_user() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(header("accept", "application/json"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok1"})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "token tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 583231,
                "login": "octocat",
                "name": "The Octocat",
                "avatar_url": "https://avatars.example/u/583231"
            })))
            .mount(&server)
            .await;

        let profile = adapter(&server).exchange_user("abc").await.unwrap();
        assert_eq!(profile.provider, "github");
        assert_eq!(profile.open_id, "583231");
        assert_eq!(profile.nickname, "The Octocat");
        assert_eq!(profile.avatar, "https://avatars.example/u/583231");
    }

    #[tokio::test]
    async fn test_provider_error_is_generic() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"error": "bad_verification_code", "error_description": "expired"})),
            )
            .mount(&server)
            .await;

        let err = adapter(&server).exchange_user("stale").await.unwrap_err();
        match err {
            Error::Argument { message } => assert!(!message.contains("bad_verification_code")),
            other => panic!("expected Argument error, got {other:?}"),
        }
    }
}
