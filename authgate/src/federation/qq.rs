//! QQ Connect OAuth adapter.
//!
//! QQ is the odd one out on the wire: the token endpoint answers with a
//! query string, and the openid endpoint wraps its JSON in a `callback(...)`
//! JSONP envelope. Both get normalized here before anything else sees them.

use serde::Deserialize;

use crate::{
    config::ProviderConfig,
    errors::Error,
    federation::{NormalizedProfile, Provider, provider_error},
};

const TAG: &str = "qq";

pub struct Qq {
    client_id: String,
    client_secret: String,
    redirect_url: String,
    display: String,
    base: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct OpenIdResponse {
    openid: String,
}

#[derive(Deserialize)]
struct QqUser {
    ret: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    figureurl_qq_2: String,
    #[serde(default)]
    figureurl_qq_1: String,
}

/// Extract the JSON payload from a `callback( {...} );` envelope.
fn strip_jsonp(body: &str) -> Option<&str> {
    let start = body.find('(')?;
    let end = body.rfind(')')?;
    (start < end).then(|| body[start + 1..end].trim())
}

/// The token endpoint answers `access_token=..&expires_in=..` on success and
/// a JSONP error object on failure.
fn parse_token_body(body: &str) -> Option<String> {
    url::form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == "access_token")
        .map(|(_, v)| v.into_owned())
        .filter(|t| !t.is_empty())
}

impl Qq {
    pub fn new(config: &ProviderConfig, http: reqwest::Client) -> Result<Self, Error> {
        let ProviderConfig::Qq {
            client_id,
            client_secret,
            redirect_url,
            display,
        } = config
        else {
            return Err(Error::Internal {
                operation: "qq adapter built from mismatched provider config".to_string(),
            });
        };
        Ok(Self {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_url: redirect_url.clone(),
            display: display.clone(),
            base: "https://graph.qq.com".to_string(),
            http,
        })
    }

    #[cfg(test)]
    fn with_base(mut self, base: &str) -> Self {
        self.base = base.to_string();
        self
    }

    async fn fetch_text(&self, url: String, context: &'static str) -> Result<String, Error> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| provider_error(TAG, context, e))?
            .text()
            .await
            .map_err(|e| provider_error(TAG, context, e))
    }
}

#[async_trait::async_trait]
impl Provider for Qq {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn authorize_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("state", state)
            .append_pair("display", &self.display)
            .finish();
        format!("{}/oauth2.0/authorize?{query}", self.base)
    }

    async fn exchange_user(&self, code: &str) -> Result<NormalizedProfile, Error> {
        let token_query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "authorization_code")
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("code", code)
            .append_pair("redirect_uri", &self.redirect_url)
            .finish();
        let token_body = self
            .fetch_text(format!("{}/oauth2.0/token?{token_query}", self.base), "token request")
            .await?;
        let access_token =
            parse_token_body(&token_body).ok_or_else(|| provider_error(TAG, "token response", token_body.clone()))?;

        let me_body = self
            .fetch_text(
                format!("{}/oauth2.0/me?access_token={access_token}", self.base),
                "openid request",
            )
            .await?;
        let open_id: OpenIdResponse = strip_jsonp(&me_body)
            .and_then(|json| serde_json::from_str(json).ok())
            .ok_or_else(|| provider_error(TAG, "openid response", me_body.clone()))?;

        let user_query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("access_token", &access_token)
            .append_pair("oauth_consumer_key", &self.client_id)
            .append_pair("openid", &open_id.openid)
            .finish();
        let user: QqUser = self
            .http
            .get(format!("{}/user/get_user_info?{user_query}", self.base))
            .send()
            .await
            .map_err(|e| provider_error(TAG, "user request", e))?
            .json()
            .await
            .map_err(|e| provider_error(TAG, "user decode", e))?;

        if user.ret != 0 {
            return Err(provider_error(TAG, "user response", format!("ret={} msg={}", user.ret, user.msg)));
        }

        let avatar = if user.figureurl_qq_2.is_empty() {
            user.figureurl_qq_1
        } else {
            user.figureurl_qq_2
        };

        Ok(NormalizedProfile {
            provider: TAG.to_string(),
            open_id: open_id.openid,
            nickname: user.nickname,
            avatar,
            mobile: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> Qq {
        let config = ProviderConfig::Qq {
            client_id: "cid".into(),
            client_secret: "cs".into(),
            redirect_url: "http://localhost/cb".into(),
            display: String::new(),
        };
        Qq::new(&config, reqwest::Client::new()).unwrap().with_base(&server.uri())
    }

    #[test]
    fn test_strip_jsonp() {
        assert_eq!(
            strip_jsonp(r#"callback( {"openid":"OID"} );"#),
            Some(r#"{"openid":"OID"}"#)
        );
        assert_eq!(strip_jsonp("no envelope"), None);
    }

    #[test]
    fn test_parse_token_body() {
        assert_eq!(
            parse_token_body("access_token=FE04&expires_in=7776000&refresh_token=88E4").as_deref(),
            Some("FE04")
        );
        assert_eq!(parse_token_body(r#"callback( {"error":100019} );"#), None);
    }

    #[tokio::test]
    async fn test_exchange_user() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth2.0/token"))
            .and(query_param("code", "c0de"))
            .respond_with(ResponseTemplate::new(200).set_body_string("access_token=tokA&expires_in=7776000"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/oauth2.0/me"))
            .and(query_param("access_token", "tokA"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"callback( {"client_id":"cid","openid":"OID1"} );"#))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user/get_user_info"))
            .and(query_param("openid", "OID1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ret": 0,
                "nickname": "penguin",
                "figureurl_qq_1": "https://q.example/small.jpg",
                "figureurl_qq_2": "https://q.example/large.jpg"
            })))
            .mount(&server)
            .await;

        let profile = adapter(&server).exchange_user("c0de").await.unwrap();
        assert_eq!(profile.open_id, "OID1");
        assert_eq!(profile.nickname, "penguin");
        assert_eq!(profile.avatar, "https://q.example/large.jpg");
    }

    #[tokio::test]
    async fn test_user_info_error_code() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("access_token=tokA"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth2.0/me"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"callback( {"openid":"OID1"} );"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/get_user_info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ret": -23, "msg": "token expired"})))
            .mount(&server)
            .await;

        assert!(adapter(&server).exchange_user("c0de").await.is_err());
    }
}
