//! Channel trait and the events channels produce.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::verify::ChatId;

/// An inbound event, already split into command and text by the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    /// Explicit restart (`/start`).
    Start { chat_id: ChatId },
    /// Any non-command text.
    Text { chat_id: ChatId, content: String },
}

impl BotEvent {
    pub fn start(chat_id: impl Into<ChatId>) -> Self {
        Self::Start {
            chat_id: chat_id.into(),
        }
    }

    pub fn text(chat_id: impl Into<ChatId>, content: impl Into<String>) -> Self {
        Self::Text {
            chat_id: chat_id.into(),
            content: content.into(),
        }
    }

    pub fn chat_id(&self) -> &ChatId {
        match self {
            Self::Start { chat_id } | Self::Text { chat_id, .. } => chat_id,
        }
    }
}

/// Stream of inbound events from a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = BotEvent> + Send>>;

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Start receiving. The returned stream ends when the channel stops.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Send a plain-text reply to a chat.
    async fn send_reply(&self, chat_id: &ChatId, text: &str) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
