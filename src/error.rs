//! Error types for verify-bot.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Provisioning error: {0}")]
    Provision(#[from] ProvisionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel health check failed: {name}")]
    HealthCheckFailed { name: String },
}

/// Submitted address rejected before any session is created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Malformed email address: {0}")]
    MalformedEmail(String),

    #[error("Email {email} does not end with {allowed}")]
    DomainNotAllowed { email: String, allowed: String },
}

/// Mail delivery errors. These never leave a `Mailer`; they are logged and
/// collapsed into a `false` result.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("DNS resolution failed for {domain}: {reason}")]
    Resolve { domain: String, reason: String },

    #[error("No MX or A records found for {domain}")]
    NoExchangers { domain: String },

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error("SMTP transaction with {host} failed: {reason}")]
    Transport { host: String, reason: String },

    #[error("All {attempts} mail exchangers failed for {domain}")]
    AllHostsFailed { domain: String, attempts: usize },
}

/// Account provisioning errors.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Failed to create user ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response from panel: {0}")]
    InvalidResponse(String),

    #[error("Panel response has no subscription_url")]
    MissingSubscriptionUrl,

    #[error("Account template must be a JSON object")]
    InvalidTemplate,

    #[error("Account template expire of {0} seconds is out of range")]
    ExpireOutOfRange(i64),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
