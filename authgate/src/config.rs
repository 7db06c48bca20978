//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `AUTHGATE_CONFIG`
//! environment variable.
//!
//! Sources are merged in order (later overrides earlier):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `AUTHGATE_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `AUTHGATE_AUTH__LOCKOUT_THRESHOLD=5` sets `auth.lockout_threshold`.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;
use crate::types::UserId;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "AUTHGATE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Secret key for signing session tokens (required)
    pub secret_key: Option<String>,
    /// Database connection settings
    pub database: DatabaseConfig,
    /// Name for the initial super user (created on first startup)
    pub admin_name: String,
    /// Password for the initial super user (optional, can be set via environment)
    pub admin_password: Option<String>,
    /// Authentication behavior: token lifetime, lockout policy, super subject
    pub auth: AuthConfig,
    /// Verification code and federation-pending cache lifetimes
    pub codes: CodesConfig,
    /// Outbound email configuration
    pub email: EmailConfig,
    /// Outbound SMS configuration
    pub sms: SmsConfig,
    /// Third-party identity providers, keyed by their tag
    pub federation: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7293,
            secret_key: None,
            database: DatabaseConfig::default(),
            admin_name: "admin".to_string(),
            admin_password: None,
            auth: AuthConfig::default(),
            codes: CodesConfig::default(),
            email: EmailConfig::default(),
            sms: SmsConfig::default(),
            federation: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/authgate".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Session token lifetime in days
    pub token_expiry_days: i64,
    /// Consecutive failed logins before the account locks
    pub lockout_threshold: u32,
    /// How long a locked account stays locked after the last failure
    #[serde(with = "humantime_serde")]
    pub lockout_cooldown: Duration,
    /// Subject that bypasses policy enforcement entirely
    pub super_subject_id: UserId,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_expiry_days: 7,
            lockout_threshold: 5,
            lockout_cooldown: Duration::from_secs(30 * 60),
            super_subject_id: 10000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodesConfig {
    /// Verification code lifetime
    #[serde(with = "humantime_serde")]
    pub code_ttl: Duration,
    /// How long an unconsumed federated profile waits for registration
    #[serde(with = "humantime_serde")]
    pub pending_ttl: Duration,
    /// How long a mini-app session key stays usable
    #[serde(with = "humantime_serde")]
    pub session_key_ttl: Duration,
}

impl Default for CodesConfig {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(5 * 60),
            pending_ttl: Duration::from_secs(10 * 60),
            session_key_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Email delivery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    /// From address for outgoing emails
    pub from_address: String,
    /// From name for outgoing emails
    pub from_name: String,
    /// Transport to use for sending
    pub transport: EmailTransportConfig,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from_address: "noreply@localhost".to_string(),
            from_name: "Authgate".to_string(),
            transport: EmailTransportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmailTransportConfig {
    /// Deliver via an SMTP relay
    Smtp {
        host: String,
        #[serde(default = "default_smtp_port")]
        port: u16,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
    /// Write messages to files in a directory (development / testing)
    File { path: String },
    /// Drop messages (codes are still issued and logged)
    Disabled,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        EmailTransportConfig::Disabled
    }
}

/// SMS delivery configuration. Delivery goes through a webhook so any gateway
/// that accepts a JSON POST can be plugged in.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmsConfig {
    /// Webhook that receives `{mobile, purpose, code}` as JSON. Unset disables SMS.
    pub webhook_url: Option<Url>,
    /// Bearer token added to webhook requests
    pub webhook_token: Option<String>,
}

/// A configured identity provider. The `kind` tag selects the adapter; there is
/// no dynamic provider loading.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    Github {
        client_id: String,
        client_secret: String,
        redirect_url: String,
    },
    Qq {
        client_id: String,
        client_secret: String,
        redirect_url: String,
        #[serde(default)]
        display: String,
    },
    Weibo {
        client_id: String,
        client_secret: String,
        redirect_url: String,
        #[serde(default)]
        display: String,
    },
    Weixin {
        app_id: String,
        app_secret: String,
        redirect_url: String,
    },
    Weixinmp {
        app_id: String,
        app_secret: String,
    },
}

impl ProviderConfig {
    /// The provider tag, used as registry key and stored with third-party identities.
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderConfig::Github { .. } => "github",
            ProviderConfig::Qq { .. } => "qq",
            ProviderConfig::Weibo { .. } => "weibo",
            ProviderConfig::Weixin { .. } => "weixin",
            ProviderConfig::Weixinmp { .. } => "weixinmp",
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load(args: &Args) -> Result<Self, Error> {
        let mut figment = Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("AUTHGATE_").split("__"));

        // DATABASE_URL is the conventional deployment override
        if let Ok(url) = std::env::var("DATABASE_URL") {
            figment = figment.merge(("database.url", url));
        }

        let config: Config = figment.extract().map_err(|e| Error::Argument {
            message: format!("Invalid configuration: {e}"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(|k| k.is_empty()) {
            return Err(Error::Argument {
                message: "secret_key is required".to_string(),
            });
        }
        if self.auth.lockout_threshold < 3 {
            return Err(Error::Argument {
                message: "auth.lockout_threshold must be at least 3".to_string(),
            });
        }
        if self.auth.token_expiry_days < 1 {
            return Err(Error::Argument {
                message: "auth.token_expiry_days must be at least 1".to_string(),
            });
        }

        // Duplicate provider tags would make registry lookups ambiguous
        let mut tags: Vec<&str> = self.federation.iter().map(|p| p.tag()).collect();
        tags.sort_unstable();
        let before = tags.len();
        tags.dedup();
        if tags.len() != before {
            return Err(Error::Argument {
                message: "federation providers must have unique kinds".to_string(),
            });
        }

        Ok(())
    }

    /// Full bind address string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn valid_config() -> Config {
        Config {
            secret_key: Some("test-secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_fail_without_secret() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_lockout_threshold_minimum() {
        let mut config = valid_config();
        config.auth.lockout_threshold = 2;
        assert!(config.validate().is_err());
        config.auth.lockout_threshold = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_provider_kinds_rejected() {
        let mut config = valid_config();
        config.federation = vec![
            ProviderConfig::Github {
                client_id: "a".into(),
                client_secret: "b".into(),
                redirect_url: "http://localhost/cb".into(),
            },
            ProviderConfig::Github {
                client_id: "c".into(),
                client_secret: "d".into(),
                redirect_url: "http://localhost/cb2".into(),
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
                port: 9000
                secret_key: from-yaml
                "#,
            )?;
            jail.set_env("AUTHGATE_PORT", "9001");

            let args = Args {
                config: "config.yaml".to_string(),
                validate: false,
            };
            let config = Config::load(&args).expect("config should load");
            assert_eq!(config.port, 9001);
            assert_eq!(config.secret_key.as_deref(), Some("from-yaml"));
            Ok(())
        });
    }

    #[test]
    fn test_provider_config_parses_tagged() {
        let yaml = r#"
            kind: weixinmp
            app_id: wx123
            app_secret: shhh
        "#;
        let provider: ProviderConfig = serde_yaml_parse(yaml);
        assert_eq!(provider.tag(), "weixinmp");
    }

    fn serde_yaml_parse(yaml: &str) -> ProviderConfig {
        Figment::new()
            .merge(Yaml::string(yaml))
            .extract()
            .expect("provider yaml should parse")
    }
}
