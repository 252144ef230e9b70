//! Hosted mailbox delivery — authenticated SMTP submission through the
//! mailbox provider's relay.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use super::Mailer;
use crate::config::MailboxConfig;
use crate::error::{ConfigError, MailError};

/// Port that speaks TLS from the first byte; everything else uses STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends through a single hosted mailbox account.
pub struct MailboxMailer {
    from: Mailbox,
    host: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailboxMailer {
    pub fn new(config: MailboxConfig) -> Result<Self, ConfigError> {
        let from: Mailbox = config.from_address.parse().map_err(|e| ConfigError::InvalidValue {
            key: "MAILBOX_ADDRESS".into(),
            message: format!("{e}"),
        })?;

        let creds = Credentials::new(config.login.clone(), config.password.expose_secret().to_string());

        let relay = if config.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
        };
        let builder = relay.map_err(|e| ConfigError::InvalidValue {
            key: "MAILBOX_SMTP_HOST".into(),
            message: format!("SMTP relay error: {e}"),
        })?;

        let transport = builder.port(config.smtp_port).credentials(creds).build();

        Ok(Self {
            from,
            host: config.smtp_host,
            transport,
        })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message, MailError> {
        Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|e| MailError::InvalidRecipient(format!("{to}: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailError::Message(e.to_string()))
    }

    async fn submit(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let email = self.build_message(to, subject, body)?;
        self.transport.send(email).await.map_err(|e| MailError::Transport {
            host: self.host.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

#[async_trait]
impl Mailer for MailboxMailer {
    fn name(&self) -> &str {
        "mailbox"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        match self.submit(to, subject, body).await {
            Ok(()) => {
                tracing::info!("Email sent to {to} via {}", self.host);
                true
            }
            Err(e) => {
                tracing::error!("Mailbox delivery to {to} failed: {e}");
                false
            }
        }
    }
}
