//! WeChat web (QR scan) OAuth adapter.

use serde::Deserialize;

use crate::{
    config::ProviderConfig,
    errors::Error,
    federation::{NormalizedProfile, Provider, provider_error},
};

const TAG: &str = "weixin";

pub struct Weixin {
    app_id: String,
    app_secret: String,
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
    openid: String,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Deserialize)]
struct WeixinUser {
    #[serde(default)]
    nickname: String,
    #[serde(default)]
    headimgurl: String,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl Weixin {
    pub fn new(config: &ProviderConfig, http: reqwest::Client) -> Result<Self, Error> {
        let ProviderConfig::Weixin {
            app_id,
            app_secret,
            redirect_url,
        } = config
        else {
            return Err(Error::Internal {
                operation: "weixin adapter built from mismatched provider config".to_string(),
            });
        };
        Ok(Self {
            app_id: app_id.clone(),
            app_secret: app_secret.clone(),
            redirect_url: redirect_url.clone(),
            auth_base: "https://open.weixin.qq.com".to_string(),
            api_base: "https://api.weixin.qq.com".to_string(),
            http,
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }
}

#[async_trait::async_trait]
impl Provider for Weixin {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn authorize_url(&self, state: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("appid", &self.app_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", "snsapi_login")
            .append_pair("state", state)
            .finish();
        // The fragment is required by WeChat's web login flow
        format!("{}/connect/qrconnect?{query}#wechat_redirect", self.auth_base)
    }

    async fn exchange_user(&self, code: &str) -> Result<NormalizedProfile, Error> {
        let token_query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("appid", &self.app_id)
            .append_pair("secret", &self.app_secret)
            .append_pair("code", code)
            .append_pair("grant_type", "authorization_code")
            .finish();
        let token: TokenResponse = self
            .http
            .get(format!("{}/sns/oauth2/access_token?{token_query}", self.api_base))
            .send()
            .await
            .map_err(|e| provider_error(TAG, "access_token request", e))?
            .json()
            .await
            .map_err(|e| provider_error(TAG, "access_token decode", e))?;

        if token.errcode != 0 || token.access_token.is_empty() || token.openid.is_empty() {
            return Err(provider_error(
                TAG,
                "access_token response",
                format!("errcode={} errmsg={}", token.errcode, token.errmsg),
            ));
        }

        let user_query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("access_token", &token.access_token)
            .append_pair("openid", &token.openid)
            .finish();
        let user: WeixinUser = self
            .http
            .get(format!("{}/sns/userinfo?{user_query}", self.api_base))
            .send()
            .await
            .map_err(|e| provider_error(TAG, "user request", e))?
            .json()
            .await
            .map_err(|e| provider_error(TAG, "user decode", e))?;

        if user.errcode != 0 {
            return Err(provider_error(
                TAG,
                "user response",
                format!("errcode={} errmsg={}", user.errcode, user.errmsg),
            ));
        }

        Ok(NormalizedProfile {
            provider: TAG.to_string(),
            open_id: token.openid,
            nickname: user.nickname,
            avatar: user.headimgurl,
            mobile: String::new(),
        })
    }
}
