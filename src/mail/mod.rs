//! Mail transport for verification codes.
//!
//! Supports:
//! - **Direct**: MX lookup and SMTP handoff to the recipient's exchanger
//! - **Mailbox**: authenticated submission through a hosted mailbox relay
//!
//! Both sit behind the [`Mailer`] trait and are picked once at startup by
//! [`create_mailer`].

pub mod direct;
pub mod mailbox;
pub mod message;
pub mod resolver;

pub use direct::{DirectMailer, LettreHandoff, SmtpHandoff};
pub use mailbox::MailboxMailer;
pub use resolver::{HickoryMxResolver, MxRecord, MxResolver};

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{MailConfig, MailDelivery};
use crate::error::ConfigError;

/// Sends a single plain-text message.
///
/// Never fails past its boundary: every error is logged by the
/// implementation and reported as `false`.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &str;

    async fn send(&self, to: &str, subject: &str, body: &str) -> bool;
}

/// Create the mailer selected by configuration.
pub fn create_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, ConfigError> {
    match config.delivery {
        MailDelivery::Direct => create_direct_mailer(config),
        MailDelivery::Mailbox => create_mailbox_mailer(config),
    }
}

fn create_direct_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, ConfigError> {
    let direct = &config.direct;
    let resolver = HickoryMxResolver::new();
    let handoff = LettreHandoff::new(&direct.hello_name, direct.smtp_port, direct.timeout);

    tracing::info!(
        sender_domain = %direct.sender_domain,
        hello_name = %direct.hello_name,
        port = direct.smtp_port,
        "Using direct MX delivery"
    );
    Ok(Arc::new(DirectMailer::new(
        &direct.sender_domain,
        Arc::new(resolver),
        Arc::new(handoff),
    )))
}

fn create_mailbox_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, ConfigError> {
    let mailbox = config.mailbox.clone().ok_or_else(|| ConfigError::InvalidValue {
        key: "MAIL_DELIVERY".into(),
        message: "MAILBOX delivery selected without mailbox settings".into(),
    })?;

    tracing::info!(
        host = %mailbox.smtp_host,
        port = mailbox.smtp_port,
        from = %mailbox.from_address,
        "Using hosted mailbox delivery"
    );
    Ok(Arc::new(MailboxMailer::new(mailbox)?))
}
