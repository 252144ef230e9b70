//! Bot run loop — pulls events off the channel and runs each one through
//! the verification workflow on its own task.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinSet;

use crate::channels::{BotEvent, Channel, TelegramChannel};
use crate::config::Config;
use crate::error::Error;
use crate::mail::create_mailer;
use crate::provision::MarzbanClient;
use crate::verify::{ChatId, EmailPolicy, Replier, SessionStore, Workflow, replies};

/// Sends workflow replies back through the channel. Delivery failures are
/// logged and otherwise ignored.
#[derive(Clone)]
struct ChannelReplier {
    channel: Arc<dyn Channel>,
    chat_id: ChatId,
}

#[async_trait]
impl Replier for ChannelReplier {
    async fn reply(&self, text: String) {
        if let Err(e) = self.channel.send_reply(&self.chat_id, &text).await {
            tracing::warn!(chat_id = %self.chat_id, "Failed to send reply: {e}");
        }
    }
}

pub struct Bot {
    channel: Arc<dyn Channel>,
    workflow: Arc<Workflow>,
}

impl Bot {
    pub fn new(channel: Arc<dyn Channel>, workflow: Arc<Workflow>) -> Self {
        Self { channel, workflow }
    }

    /// Wire the Telegram channel, the configured mailer and the panel client.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mailer = create_mailer(&config.mail)?;
        let provisioner = Arc::new(MarzbanClient::new(&config.provision)?);

        let workflow = Arc::new(Workflow::new(
            SessionStore::new(),
            EmailPolicy::new(config.allowed_email_suffix.clone()),
            mailer,
            provisioner,
        ));
        let channel = Arc::new(TelegramChannel::new(config.bot_token.clone()));

        Ok(Self::new(channel, workflow))
    }

    /// Run until Ctrl+C or until the channel's stream ends. In-flight
    /// events are finished before returning.
    pub async fn run(self) -> Result<(), Error> {
        self.channel.health_check().await?;
        let mut events = self.channel.start().await?;

        tracing::info!(channel = self.channel.name(), "Bot ready and listening");

        let mut in_flight = JoinSet::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => event,
                    None => {
                        tracing::info!("Channel stream ended, shutting down...");
                        break;
                    }
                },
            };

            in_flight.spawn(dispatch(Arc::clone(&self.channel), Arc::clone(&self.workflow), event));

            // Reap finished tasks so the set stays small.
            while in_flight.try_join_next().is_some() {}
        }

        while in_flight.join_next().await.is_some() {}

        if let Err(e) = self.channel.shutdown().await {
            tracing::warn!("Channel shutdown failed: {e}");
        }
        Ok(())
    }
}

/// Handle one event. A panic inside the workflow is contained to this
/// event and answered with a generic error reply.
async fn dispatch(channel: Arc<dyn Channel>, workflow: Arc<Workflow>, event: BotEvent) {
    let replier = ChannelReplier {
        channel,
        chat_id: event.chat_id().clone(),
    };

    let handled = {
        let replier = replier.clone();
        tokio::spawn(async move { workflow.handle(event, &replier).await })
    };

    match handled.await {
        Ok(state) => tracing::debug!(chat_id = %replier.chat_id, state = %state, "Event handled"),
        Err(e) => {
            tracing::error!(chat_id = %replier.chat_id, "Event handler failed: {e}");
            replier.reply(replies::internal_error()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::channels::EventStream;
    use crate::config::{Config, MailDelivery};
    use crate::error::{ChannelError, ConfigError, ProvisionError};
    use crate::mail::Mailer;
    use crate::provision::Provisioner;

    struct ScriptedChannel {
        events: Mutex<Vec<BotEvent>>,
        sent: Mutex<Vec<(ChatId, String)>>,
        healthy: bool,
    }

    impl ScriptedChannel {
        fn new(events: Vec<BotEvent>) -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(events),
                sent: Mutex::new(Vec::new()),
                healthy: true,
            })
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn start(&self) -> Result<EventStream, ChannelError> {
            let events = std::mem::take(&mut *self.events.lock().unwrap());
            Ok(Box::pin(futures::stream::iter(events)))
        }

        async fn send_reply(&self, chat_id: &ChatId, text: &str) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push((chat_id.clone(), text.to_string()));
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            if self.healthy {
                Ok(())
            } else {
                Err(ChannelError::HealthCheckFailed {
                    name: "scripted".into(),
                })
            }
        }
    }

    struct OkMailer;

    #[async_trait]
    impl Mailer for OkMailer {
        fn name(&self) -> &str {
            "ok"
        }

        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> bool {
            true
        }
    }

    /// Panics on every call.
    struct PanickingProvisioner;

    #[async_trait]
    impl Provisioner for PanickingProvisioner {
        async fn provision(&self, _username: &str) -> Result<String, ProvisionError> {
            panic!("panel client bug");
        }
    }

    fn workflow(provisioner: Arc<dyn Provisioner>) -> Arc<Workflow> {
        Arc::new(Workflow::new(
            SessionStore::new(),
            EmailPolicy::new("@allowed.org"),
            Arc::new(OkMailer),
            provisioner,
        ))
    }

    #[tokio::test]
    async fn replies_go_to_the_originating_chat() {
        let channel = ScriptedChannel::new(vec![BotEvent::start(1), BotEvent::text(2, "bad")]);
        let bot = Bot::new(channel.clone(), workflow(Arc::new(PanickingProvisioner)));

        bot.run().await.unwrap();

        let mut sent = channel.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], (ChatId::from(1), replies::welcome()));
        assert_eq!(sent[1].0, ChatId::from(2));
        assert!(sent[1].1.starts_with("Invalid email format"));
    }

    #[tokio::test]
    async fn panicking_handler_gets_generic_reply() {
        let wf = workflow(Arc::new(PanickingProvisioner));
        let chat = ChatId::from(9);
        *wf.store().lock(&chat).await = Some(crate::verify::VerificationSession::issue(chat.clone(), "a@allowed.org"));
        let code = wf.store().get(&chat).await.unwrap().code.as_str().to_string();

        let channel = ScriptedChannel::new(vec![BotEvent::text(9, code)]);
        Bot::new(channel.clone(), wf).run().await.unwrap();

        let sent = channel.sent.lock().unwrap().clone();
        assert_eq!(sent.last().map(|(_, text)| text.clone()), Some(replies::internal_error()));
    }

    #[tokio::test]
    async fn unhealthy_channel_fails_startup() {
        let channel = Arc::new(ScriptedChannel {
            events: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            healthy: false,
        });
        let result = Bot::new(channel, workflow(Arc::new(PanickingProvisioner))).run().await;
        assert!(matches!(result, Err(Error::Channel(ChannelError::HealthCheckFailed { .. }))));
    }

    fn config(delivery: MailDelivery) -> Config {
        let env = [
            ("TG_BOT_TOKEN", "123:ABC"),
            ("MARZBAN_API_BASE_URL", "https://panel.example.org"),
            ("MARZBAN_ADMIN_API_TOKEN", "admin-token"),
            ("ALLOWED_EMAIL_POSTFIX", "@allowed.org"),
            ("MAIL_DELIVERY", "DIRECT"),
            ("DIRECT_MAILER_SENDER_DOMAIN", "mail.example.org"),
        ];
        let mut config = Config::from_lookup(|key| {
            env.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
        })
        .unwrap();
        config.mail.delivery = delivery;
        config
    }

    #[tokio::test]
    async fn builds_from_direct_config() {
        assert!(Bot::from_config(&config(MailDelivery::Direct)).is_ok());
    }

    #[tokio::test]
    async fn mailbox_without_settings_is_a_config_error() {
        let result = Bot::from_config(&config(MailDelivery::Mailbox));
        assert!(matches!(result, Err(Error::Config(ConfigError::InvalidValue { .. }))));
    }
}
