//! Configuration types, loaded once from the environment at startup.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default SMTP port for direct MX delivery.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Default submission port for the hosted mailbox relay.
pub const DEFAULT_MAILBOX_PORT: u16 = 587;

/// Per-host SMTP transaction timeout.
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-request timeout for panel API calls.
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(30);

/// Account template used when `USER_CONFIG` is not set.
///
/// `expire` is relative (seconds from account creation).
pub fn default_user_template() -> serde_json::Value {
    serde_json::json!({
        "data_limit": 51_u64 * 1_000_000_000,
        "data_limit_reset_strategy": "month",
        "expire": 7_776_000,
        "inbounds": {
            "vless": ["VLESS TCP REALITY"],
        },
        "proxies": {
            "vless": {
                "flow": "xtls-rprx-vision",
            }
        },
    })
}

/// Which mail transport delivers verification codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailDelivery {
    /// Resolve the recipient's MX hosts and hand off directly.
    Direct,
    /// Submit through an authenticated hosted mailbox.
    Mailbox,
}

impl FromStr for MailDelivery {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DIRECT" => Ok(Self::Direct),
            "MAILBOX" | "EXCHANGE" => Ok(Self::Mailbox),
            other => Err(ConfigError::InvalidValue {
                key: "MAIL_DELIVERY".into(),
                message: format!("unsupported mailer {other:?} (expected DIRECT or MAILBOX)"),
            }),
        }
    }
}

impl std::fmt::Display for MailDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "DIRECT"),
            Self::Mailbox => write!(f, "MAILBOX"),
        }
    }
}

/// Direct MX delivery settings.
#[derive(Debug, Clone)]
pub struct DirectConfig {
    /// Domain used in `From`, the envelope sender and `Message-ID`.
    pub sender_domain: String,
    /// Identity sent with EHLO.
    pub hello_name: String,
    pub smtp_port: u16,
    pub timeout: Duration,
}

/// Hosted mailbox submission settings.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub login: String,
    pub password: SecretString,
    pub from_address: String,
}

/// Mail transport selection plus the settings of each variant.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub delivery: MailDelivery,
    pub direct: DirectConfig,
    /// Present only when `delivery` is `Mailbox`.
    pub mailbox: Option<MailboxConfig>,
}

/// Panel API settings.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub base_url: String,
    pub admin_token: SecretString,
    /// JSON account template posted on user creation.
    pub template: serde_json::Value,
    pub timeout: Duration,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: SecretString,
    /// Suffix every submitted address must end with, e.g. `@example.org`.
    pub allowed_email_suffix: String,
    pub provision: ProvisionConfig,
    pub mail: MailConfig,
}

impl Config {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let bot_token = SecretString::from(require("TG_BOT_TOKEN")?);
        let allowed_email_suffix = require("ALLOWED_EMAIL_POSTFIX")?.trim().to_string();

        let template = match get("USER_CONFIG") {
            Some(raw) => parse_template(&raw)?,
            None => default_user_template(),
        };

        let provision = ProvisionConfig {
            base_url: require("MARZBAN_API_BASE_URL")?
                .trim()
                .trim_end_matches('/')
                .to_string(),
            admin_token: SecretString::from(require("MARZBAN_ADMIN_API_TOKEN")?),
            template,
            timeout: DEFAULT_PROVISION_TIMEOUT,
        };

        let delivery: MailDelivery = require("MAIL_DELIVERY")?.parse()?;

        let sender_domain = get("DIRECT_MAILER_SENDER_DOMAIN").unwrap_or_else(|| "localhost".into());
        let hello_name = get("DIRECT_MAILER_HELLO_NAME")
            .or_else(|| get("HOSTNAME"))
            .or_else(system_hostname)
            .unwrap_or_else(|| sender_domain.clone());

        let timeout_secs: u64 = parse_or(&get, "DIRECT_MAILER_TIMEOUT_SECS", DEFAULT_SMTP_TIMEOUT.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DIRECT_MAILER_TIMEOUT_SECS".into(),
                message: "must be at least 1 second".into(),
            });
        }

        let direct = DirectConfig {
            sender_domain,
            hello_name,
            smtp_port: parse_or(&get, "DIRECT_MAILER_SMTP_PORT", DEFAULT_SMTP_PORT)?,
            timeout: Duration::from_secs(timeout_secs),
        };

        let mailbox = match delivery {
            MailDelivery::Direct => None,
            MailDelivery::Mailbox => {
                let login = require("MAILBOX_LOGIN")?;
                Some(MailboxConfig {
                    smtp_host: require("MAILBOX_SMTP_HOST")?,
                    smtp_port: parse_or(&get, "MAILBOX_SMTP_PORT", DEFAULT_MAILBOX_PORT)?,
                    from_address: get("MAILBOX_ADDRESS").unwrap_or_else(|| login.clone()),
                    password: SecretString::from(require("MAILBOX_PASSWORD")?),
                    login,
                })
            }
        };

        Ok(Self {
            bot_token,
            allowed_email_suffix,
            provision,
            mail: MailConfig {
                delivery,
                direct,
                mailbox,
            },
        })
    }
}

fn parse_template(raw: &str) -> Result<serde_json::Value, ConfigError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ConfigError::ParseError(format!("USER_CONFIG: {e}")))?;
    if !value.is_object() {
        return Err(ConfigError::InvalidValue {
            key: "USER_CONFIG".into(),
            message: "must be a JSON object".into(),
        });
    }
    Ok(value)
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.into(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn system_hostname() -> Option<String> {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
