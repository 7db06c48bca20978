//! WeChat mini-app adapter.
//!
//! Mini-apps never leave WeChat, so there is no redirect flow. The client
//! sends a `js_code`, the server exchanges it for an `(openid, session_key)`
//! pair, and later profile and phone payloads arrive encrypted with that
//! session key: AES-128-CBC, key, IV and ciphertext all base64. WeChat pads
//! the plaintext with 0x0e bytes, which are mapped to ASCII spaces before
//! JSON parsing so the payload stays valid.

use aes::Aes128;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    errors::Result,
    federation::{NormalizedProfile, provider_error},
};

const TAG: &str = "weixinmp";

type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub struct MiniApp {
    app_id: String,
    app_secret: String,
    api_base: String,
    http: reqwest::Client,
}

/// The `(openid, session_key)` pair from a code exchange. Parked server-side;
/// clients only ever see an opaque handle to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniAppSession {
    pub open_id: String,
    pub session_key: String,
    #[serde(default)]
    pub union_id: Option<String>,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    openid: String,
    #[serde(default)]
    session_key: String,
    #[serde(default)]
    unionid: Option<String>,
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Encrypted profile payloads use camelCase field names.
#[derive(Deserialize)]
struct MpUser {
    #[serde(rename = "openId", default)]
    open_id: String,
    #[serde(rename = "nickName", default)]
    nickname: String,
    #[serde(rename = "avatarUrl", default)]
    avatar: String,
}

#[derive(Deserialize)]
struct MpPhone {
    #[serde(rename = "purePhoneNumber", default)]
    pure_phone_number: String,
}

impl MiniApp {
    pub fn new(app_id: String, app_secret: String, http: reqwest::Client) -> Self {
        Self {
            app_id,
            app_secret,
            api_base: "https://api.weixin.qq.com".to_string(),
            http,
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    /// Exchange a client `js_code` for a session.
    #[instrument(skip(self, js_code), err(level = "info"))]
    pub async fn exchange_session(&self, js_code: &str) -> Result<MiniAppSession> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("appid", &self.app_id)
            .append_pair("secret", &self.app_secret)
            .append_pair("js_code", js_code)
            .append_pair("grant_type", "authorization_code")
            .finish();
        let session: SessionResponse = self
            .http
            .get(format!("{}/sns/jscode2session?{query}", self.api_base))
            .send()
            .await
            .map_err(|e| provider_error(TAG, "jscode2session request", e))?
            .json()
            .await
            .map_err(|e| provider_error(TAG, "jscode2session decode", e))?;

        if session.errcode != 0 || session.openid.is_empty() || session.session_key.is_empty() {
            return Err(provider_error(
                TAG,
                "jscode2session response",
                format!("errcode={} errmsg={}", session.errcode, session.errmsg),
            ));
        }

        Ok(MiniAppSession {
            open_id: session.openid,
            session_key: session.session_key,
            union_id: session.unionid,
        })
    }

    /// Decrypt an encrypted profile payload into the normalized shape.
    pub fn decrypt_user(&self, session: &MiniAppSession, iv: &str, data: &str) -> Result<NormalizedProfile> {
        let plaintext = decrypt_payload(&session.session_key, iv, data)?;
        let user: MpUser = serde_json::from_slice(&plaintext).map_err(|e| provider_error(TAG, "user payload parse", e))?;

        // The payload's openId is advisory; the session's is authoritative
        let open_id = if user.open_id.is_empty() {
            session.open_id.clone()
        } else {
            user.open_id
        };

        Ok(NormalizedProfile {
            provider: TAG.to_string(),
            open_id,
            nickname: user.nickname,
            avatar: user.avatar,
            mobile: String::new(),
        })
    }

    /// Decrypt an encrypted phone-number payload; returns the bare number
    /// without country code.
    pub fn decrypt_mobile(&self, session: &MiniAppSession, iv: &str, data: &str) -> Result<String> {
        let plaintext = decrypt_payload(&session.session_key, iv, data)?;
        let phone: MpPhone = serde_json::from_slice(&plaintext).map_err(|e| provider_error(TAG, "phone payload parse", e))?;
        if phone.pure_phone_number.is_empty() {
            return Err(provider_error(TAG, "phone payload", "missing purePhoneNumber"));
        }
        Ok(phone.pure_phone_number)
    }
}

/// AES-128-CBC decrypt with WeChat's conventions: all inputs base64, padding
/// bytes are 0x0e and get rewritten to spaces so the JSON stays parseable.
fn decrypt_payload(session_key: &str, iv: &str, data: &str) -> Result<Vec<u8>> {
    let key = BASE64.decode(session_key).map_err(|e| provider_error(TAG, "session_key decode", e))?;
    let iv = BASE64.decode(iv).map_err(|e| provider_error(TAG, "iv decode", e))?;
    let mut buf = BASE64.decode(data).map_err(|e| provider_error(TAG, "payload decode", e))?;

    if buf.is_empty() || buf.len() % 16 != 0 {
        return Err(provider_error(TAG, "payload decrypt", "ciphertext is not block aligned"));
    }

    let cipher = Aes128CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| provider_error(TAG, "payload decrypt", format!("bad key or iv length: {e}")))?;
    let len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|e| provider_error(TAG, "payload decrypt", e))?
        .len();
    buf.truncate(len);

    for byte in &mut buf {
        if *byte == 0x0e {
            *byte = b' ';
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::BlockEncryptMut;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    const KEY: [u8; 16] = *b"0123456789abcdef";
    const IV: [u8; 16] = *b"fedcba9876543210";

    /// Pad with 0x0e to the block boundary and encrypt, the way WeChat does.
    fn encrypt(plaintext: &str) -> String {
        let mut buf = plaintext.as_bytes().to_vec();
        let pad = 16 - buf.len() % 16;
        buf.extend(std::iter::repeat_n(0x0eu8, pad));

        let len = buf.len();
        let cipher = Aes128CbcEnc::new_from_slices(&KEY, &IV).unwrap();
        cipher.encrypt_padded_mut::<NoPadding>(&mut buf, len).unwrap();
        BASE64.encode(&buf)
    }

    fn session() -> MiniAppSession {
        MiniAppSession {
            open_id: "oSess1".to_string(),
            session_key: BASE64.encode(KEY),
            union_id: None,
        }
    }

    fn miniapp() -> MiniApp {
        MiniApp::new("wx1".to_string(), "shh".to_string(), reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_exchange_session() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sns/jscode2session"))
            .and(query_param("js_code", "jsc"))
            .and(query_param("grant_type", "authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "openid": "oMP1",
                "session_key": "a2V5",
                "unionid": "uMP1"
            })))
            .mount(&server)
            .await;

        let session = miniapp().with_api_base(&server.uri()).exchange_session("jsc").await.unwrap();
        assert_eq!(session.open_id, "oMP1");
        assert_eq!(session.session_key, "a2V5");
        assert_eq!(session.union_id.as_deref(), Some("uMP1"));
    }

    #[tokio::test]
    async fn test_exchange_session_errcode() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sns/jscode2session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errcode": 40163, "errmsg": "code been used"})))
            .mount(&server)
            .await;

        assert!(miniapp().with_api_base(&server.uri()).exchange_session("used").await.is_err());
    }

    #[test]
    fn test_decrypt_user_with_padding_rewrite() {
        let payload = encrypt(r#"{"openId":"oPay1","nickName":"minnie","avatarUrl":"https://mp.example/a.png"}"#);

        let profile = miniapp()
            .decrypt_user(&session(), &BASE64.encode(IV), &payload)
            .unwrap();
        assert_eq!(profile.provider, "weixinmp");
        assert_eq!(profile.open_id, "oPay1");
        assert_eq!(profile.nickname, "minnie");
        assert_eq!(profile.avatar, "https://mp.example/a.png");
    }

    #[test]
    fn test_decrypt_user_falls_back_to_session_open_id() {
        let payload = encrypt(r#"{"nickName":"minnie","avatarUrl":""}"#);

        let profile = miniapp()
            .decrypt_user(&session(), &BASE64.encode(IV), &payload)
            .unwrap();
        assert_eq!(profile.open_id, "oSess1");
    }

    #[test]
    fn test_decrypt_mobile() {
        let payload =
            encrypt(r#"{"phoneNumber":"+8613812345678","purePhoneNumber":"13812345678","countryCode":"86"}"#);

        let mobile = miniapp()
            .decrypt_mobile(&session(), &BASE64.encode(IV), &payload)
            .unwrap();
        assert_eq!(mobile, "13812345678");
    }

    #[test]
    fn test_decrypt_rejects_bad_inputs() {
        let mp = miniapp();
        let iv = BASE64.encode(IV);

        // Not base64
        assert!(mp.decrypt_user(&session(), &iv, "not-base64!!!").is_err());

        // Wrong block size
        assert!(mp.decrypt_user(&session(), &iv, &BASE64.encode([0u8; 15])).is_err());

        // Wrong key: decrypts to garbage that is not JSON
        let mut bad_session = session();
        bad_session.session_key = BASE64.encode(b"ffffffffffffffff");
        let payload = encrypt(r#"{"nickName":"x"}"#);
        assert!(mp.decrypt_user(&bad_session, &iv, &payload).is_err());
    }
}
