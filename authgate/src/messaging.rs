//! Outbound messaging for verification codes and activation emails.
//!
//! Dispatch is fire-and-forget: issuing endpoints spawn the send and report
//! success regardless of delivery. Failures are logged with the recipient and
//! purpose so operators can trace lost messages.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::{
    codes::CodePurpose,
    config::{Config, EmailTransportConfig},
    errors::Error,
};

/// Where a code is delivered.
#[derive(Debug, Clone)]
pub enum CodeRecipient {
    Email(String),
    Mobile(String),
}

impl CodeRecipient {
    pub fn address(&self) -> &str {
        match self {
            CodeRecipient::Email(addr) => addr,
            CodeRecipient::Mobile(number) => number,
        }
    }
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
    Disabled,
}

/// Shared outbound messaging collaborator.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<MessengerInner>,
}

struct MessengerInner {
    transport: EmailTransport,
    from_address: String,
    from_name: String,
    sms_webhook: Option<url::Url>,
    sms_token: Option<String>,
    http: reqwest::Client,
}

impl Messenger {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let transport = match &config.email.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
            } => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| Error::Internal {
                        operation: format!("create SMTP transport: {e}"),
                    })?
                    .port(*port);

                if let (Some(user), Some(pass)) = (username, password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }

                EmailTransport::Smtp(builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
            EmailTransportConfig::Disabled => EmailTransport::Disabled,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Internal {
                operation: format!("create HTTP client: {e}"),
            })?;

        Ok(Self {
            inner: Arc::new(MessengerInner {
                transport,
                from_address: config.email.from_address.clone(),
                from_name: config.email.from_name.clone(),
                sms_webhook: config.sms.webhook_url.clone(),
                sms_token: config.sms.webhook_token.clone(),
                http,
            }),
        })
    }

    /// Deliver a verification code to its recipient.
    pub async fn send_code(&self, recipient: &CodeRecipient, purpose: CodePurpose, code: &str) -> Result<(), Error> {
        match recipient {
            CodeRecipient::Email(address) => {
                let subject = "Your verification code";
                let body = format!(
                    "Your verification code is {code}. It expires shortly; if you did not request it, ignore this message."
                );
                self.send_email(address, subject, &body).await
            }
            CodeRecipient::Mobile(number) => self.send_sms(number, purpose, code).await,
        }
    }

    /// Deliver an account activation envelope by email.
    pub async fn send_activation(&self, to_email: &str, envelope: &str) -> Result<(), Error> {
        let body = format!("Your activation code is {envelope}. Enter it to activate your account.");
        self.send_email(to_email, "Activate your account", &body).await
    }

    /// Spawn delivery in the background. Issuance must never block or fail on
    /// transport problems.
    pub fn dispatch_code(&self, recipient: CodeRecipient, purpose: CodePurpose, code: String) {
        let messenger = self.clone();
        tokio::spawn(async move {
            if let Err(e) = messenger.send_code(&recipient, purpose, &code).await {
                warn!(
                    recipient = recipient.address(),
                    purpose = purpose.as_str(),
                    "code dispatch failed: {e}"
                );
            }
        });
    }

    async fn send_email(&self, to_email: &str, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.inner.from_name, self.inner.from_address)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = to_email.parse::<Mailbox>().map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.inner.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
            EmailTransport::Disabled => {
                tracing::info!(to = to_email, subject, "email transport disabled, dropping message");
            }
        }

        Ok(())
    }

    async fn send_sms(&self, mobile: &str, purpose: CodePurpose, code: &str) -> Result<(), Error> {
        let Some(webhook) = &self.inner.sms_webhook else {
            tracing::info!(mobile, "SMS webhook not configured, dropping message");
            return Ok(());
        };

        let mut request = self.inner.http.post(webhook.clone()).json(&json!({
            "mobile": mobile,
            "purpose": purpose.as_str(),
            "code": code,
        }));
        if let Some(token) = &self.inner.sms_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| Error::Internal {
            operation: format!("send SMS webhook: {e}"),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Internal {
                operation: format!("SMS webhook returned {status}: {body}"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmsConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_with_file_transport(dir: &std::path::Path) -> Config {
        Config {
            secret_key: Some("s".to_string()),
            email: crate::config::EmailConfig {
                transport: EmailTransportConfig::File {
                    path: dir.to_string_lossy().to_string(),
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_file_transport_writes_message() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = Messenger::new(&config_with_file_transport(dir.path())).unwrap();

        messenger
            .send_code(&CodeRecipient::Email("user@example.com".to_string()), CodePurpose::Register, "123456")
            .await
            .unwrap();

        let written: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(written.len(), 1);
    }

    #[tokio::test]
    async fn test_sms_webhook_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sms"))
            .and(body_partial_json(serde_json::json!({"mobile": "13812345678", "code": "654321"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            secret_key: Some("s".to_string()),
            sms: SmsConfig {
                webhook_url: Some(format!("{}/sms", server.uri()).parse().unwrap()),
                webhook_token: None,
            },
            ..Default::default()
        };

        let messenger = Messenger::new(&config).unwrap();
        messenger
            .send_code(&CodeRecipient::Mobile("13812345678".to_string()), CodePurpose::Login, "654321")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sms_webhook_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = Config {
            secret_key: Some("s".to_string()),
            sms: SmsConfig {
                webhook_url: Some(server.uri().parse().unwrap()),
                webhook_token: None,
            },
            ..Default::default()
        };

        let messenger = Messenger::new(&config).unwrap();
        let result = messenger
            .send_code(&CodeRecipient::Mobile("13812345678".to_string()), CodePurpose::Login, "654321")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_disabled_transport_is_a_noop() {
        let config = Config {
            secret_key: Some("s".to_string()),
            ..Default::default()
        };
        let messenger = Messenger::new(&config).unwrap();

        // No transport configured anywhere - both directions drop silently
        messenger
            .send_code(&CodeRecipient::Email("user@example.com".to_string()), CodePurpose::Register, "111111")
            .await
            .unwrap();
        messenger
            .send_code(&CodeRecipient::Mobile("13812345678".to_string()), CodePurpose::Login, "222222")
            .await
            .unwrap();
    }
}
