//! Weibo OAuth adapter.

use serde::Deserialize;

use crate::{
    config::ProviderConfig,
    errors::Error,
    federation::{NormalizedProfile, Provider, provider_error},
};

const TAG: &str = "weibo";

pub struct Weibo {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    display: String,
    base: String,
    http: reqwest::Client,
}

/// Token responses carry the numeric uid that doubles as the open id.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    uid: String,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
struct WeiboUser {
    #[serde(default)]
    screen_name: String,
    #[serde(default)]
    avatar_large: String,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error: String,
}

impl Weibo {
    pub fn new(config: &ProviderConfig, http: reqwest::Client) -> Result<Self, Error> {
        let ProviderConfig::Weibo {
            client_id,
            client_secret,
            redirect_url,
            display,
        } = config
        else {
            return Err(Error::Internal {
                operation: "weibo adapter built from mismatched provider config".to_string(),
            });
        };
        Ok(Self {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_url: redirect_url.clone(),
            display: display.clone(),
            base: "https://api.weibo.com".to_string(),
            http,
        })
    }

    #[cfg(test)]
    fn with_base(mut self, base: &str) -> Self {
        self.base = base.to_string();
        self
    }
}

#[async_trait::async_trait]
impl Provider for Weibo {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn authorize_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("state", state)
            .append_pair("display", &self.display)
            .finish();
        format!("{}/oauth2/authorize?{query}", self.base)
    }

    async fn exchange_user(&self, code: &str) -> Result<NormalizedProfile, Error> {
        let token: TokenResponse = self
            .http
            .post(format!("{}/oauth2/access_token", self.base))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| provider_error(TAG, "access_token request", e))?
            .json()
            .await
            .map_err(|e| provider_error(TAG, "access_token decode", e))?;

        if token.access_token.is_empty() || token.uid.is_empty() {
            return Err(provider_error(
                TAG,
                "access_token response",
                format!("error_code={} error={}", token.error_code, token.error),
            ));
        }

        let user_query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("access_token", &token.access_token)
            .append_pair("uid", &token.uid)
            .finish();
        let user: WeiboUser = self
            .http
            .get(format!("{}/2/users/show.json?{user_query}", self.base))
            .send()
            .await
            .map_err(|e| provider_error(TAG, "user request", e))?
            .json()
            .await
            .map_err(|e| provider_error(TAG, "user decode", e))?;

        if user.error_code != 0 {
            return Err(provider_error(
                TAG,
                "user response",
                format!("error_code={} error={}", user.error_code, user.error),
            ));
        }

        Ok(NormalizedProfile {
            provider: TAG.to_string(),
            open_id: token.uid,
            nickname: user.screen_name,
            avatar: user.avatar_large,
            mobile: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> Weibo {
        let config = ProviderConfig::Weibo {
            client_id: "cid".into(),
            client_secret: "cs".into(),
            redirect_url: "http://localhost/cb".into(),
            display: String::new(),
        };
        Weibo::new(&config, reqwest::Client::new()).unwrap().with_base(&server.uri())
    }

    #[tokio::test]
    async fn test_exchange_user() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tokW",
                "expires_in": 157679999,
                "uid": "5648523947"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/2/users/show.json"))
            .and(query_param("uid", "5648523947"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "screen_name": "weiboer",
                "avatar_large": "https://w.example/avatar.jpg"
            })))
            .mount(&server)
            .await;

        let profile = adapter(&server).exchange_user("c0de").await.unwrap();
        assert_eq!(profile.open_id, "5648523947");
        assert_eq!(profile.nickname, "weiboer");
        assert_eq!(profile.avatar, "https://w.example/avatar.jpg");
    }

    #[tokio::test]
    async fn test_token_error_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/access_token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error_code": 21325, "error": "invalid code"})),
            )
            .mount(&server)
            .await;

        assert!(adapter(&server).exchange_user("bad").await.is_err());
    }
}
