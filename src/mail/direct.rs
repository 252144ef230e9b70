//! Direct delivery — resolve the recipient's exchangers and hand the
//! message to the first one that accepts it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{error, info, warn};

use super::message::compose;
use super::resolver::{MxResolver, resolve_exchangers};
use super::Mailer;
use crate::error::MailError;

/// One complete SMTP transaction (EHLO, MAIL FROM, RCPT TO, DATA) against a
/// single host.
#[async_trait]
pub trait SmtpHandoff: Send + Sync {
    async fn deliver(&self, host: &str, envelope: &Envelope, message: &[u8]) -> Result<(), MailError>;
}

/// Production handoff over lettre's async SMTP client.
///
/// Uses opportunistic STARTTLS without certificate verification, which is
/// the norm between mail exchangers. Each call opens a fresh connection.
pub struct LettreHandoff {
    hello_name: String,
    port: u16,
    timeout: Duration,
}

impl LettreHandoff {
    pub fn new(hello_name: &str, port: u16, timeout: Duration) -> Self {
        Self {
            hello_name: hello_name.to_string(),
            port,
            timeout,
        }
    }
}

#[async_trait]
impl SmtpHandoff for LettreHandoff {
    async fn deliver(&self, host: &str, envelope: &Envelope, message: &[u8]) -> Result<(), MailError> {
        let transport_err = |reason: String| MailError::Transport {
            host: host.to_string(),
            reason,
        };

        let tls = TlsParameters::builder(host.to_string())
            .dangerous_accept_invalid_certs(true)
            .build()
            .map_err(|e| transport_err(format!("TLS setup failed: {e}")))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(self.port)
            .hello_name(ClientId::Domain(self.hello_name.clone()))
            .tls(Tls::Opportunistic(tls))
            .timeout(Some(self.timeout))
            .build();

        // lettre's timeout is per socket operation; bound the whole transaction too.
        let budget = self.timeout * 6;
        match tokio::time::timeout(budget, transport.send_raw(envelope, message)).await {
            Ok(Ok(response)) => {
                info!(host = %host, code = %response.code(), "SMTP transaction accepted");
                Ok(())
            }
            Ok(Err(e)) => Err(transport_err(e.to_string())),
            Err(_) => Err(transport_err(format!("timed out after {budget:?}"))),
        }
    }
}

/// Delivers straight to the recipient domain's mail exchangers.
pub struct DirectMailer {
    sender_domain: String,
    resolver: Arc<dyn MxResolver>,
    handoff: Arc<dyn SmtpHandoff>,
}

impl DirectMailer {
    pub fn new(sender_domain: &str, resolver: Arc<dyn MxResolver>, handoff: Arc<dyn SmtpHandoff>) -> Self {
        Self {
            sender_domain: sender_domain.to_string(),
            resolver,
            handoff,
        }
    }

    /// Resolve, compose and try each exchanger in preference order.
    ///
    /// Returns the host that accepted the message.
    pub async fn deliver(&self, to: &str, subject: &str, body: &str) -> Result<String, MailError> {
        let domain = to
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| MailError::InvalidRecipient(to.to_string()))?;

        let hosts = resolve_exchangers(self.resolver.as_ref(), domain).await?;
        if hosts.is_empty() {
            return Err(MailError::NoExchangers {
                domain: domain.to_string(),
            });
        }

        let message = compose(&self.sender_domain, to, subject, body)?;
        let raw = message.formatted();

        for record in &hosts {
            info!(
                host = %record.host,
                preference = record.preference,
                "Attempting delivery to MX"
            );
            match self.handoff.deliver(&record.host, message.envelope(), &raw).await {
                Ok(()) => {
                    info!(host = %record.host, to = %to, "Successfully delivered");
                    return Ok(record.host.clone());
                }
                Err(e) => {
                    warn!(host = %record.host, error = %e, "Failed to deliver, trying next MX");
                }
            }
        }

        Err(MailError::AllHostsFailed {
            domain: domain.to_string(),
            attempts: hosts.len(),
        })
    }
}

#[async_trait]
impl Mailer for DirectMailer {
    fn name(&self) -> &str {
        "direct"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        match self.deliver(to, subject, body).await {
            Ok(_) => true,
            Err(e) => {
                error!(to = %to, error = %e, "Direct delivery failed");
                false
            }
        }
    }
}
