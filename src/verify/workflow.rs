//! Verification workflow — drives a chat from email submission through code
//! comparison to a provisioned account.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::replies;
use super::session::{ChatId, VerificationSession};
use super::state::VerificationState;
use super::store::{SessionGuard, SessionStore};
use super::validation::EmailPolicy;
use crate::channels::BotEvent;
use crate::mail::Mailer;
use crate::provision::Provisioner;

/// Where replies for one chat go.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(&self, text: String);
}

/// The verification state machine plus its collaborators.
pub struct Workflow {
    store: Arc<SessionStore>,
    policy: EmailPolicy,
    mailer: Arc<dyn Mailer>,
    provisioner: Arc<dyn Provisioner>,
}

impl Workflow {
    pub fn new(
        store: Arc<SessionStore>,
        policy: EmailPolicy,
        mailer: Arc<dyn Mailer>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        Self {
            store,
            policy,
            mailer,
            provisioner,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle one inbound event and return the chat's resulting state.
    pub async fn handle(&self, event: BotEvent, replier: &dyn Replier) -> VerificationState {
        match event {
            BotEvent::Start { chat_id } => self.reset(&chat_id, replier).await,
            BotEvent::Text { chat_id, content } => self.handle_text(&chat_id, &content, replier).await,
        }
    }

    /// Drop any session unconditionally.
    async fn reset(&self, chat_id: &ChatId, replier: &dyn Replier) -> VerificationState {
        if self.store.remove(chat_id).await.is_some() {
            info!(chat_id = %chat_id, "Session reset");
        }
        replier.reply(replies::welcome()).await;
        VerificationState::Idle
    }

    async fn handle_text(&self, chat_id: &ChatId, content: &str, replier: &dyn Replier) -> VerificationState {
        let slot = self.store.lock(chat_id).await;
        if slot.is_some() {
            self.submit_code(slot, content, replier).await
        } else {
            self.submit_email(slot, content, replier).await
        }
    }

    /// Idle + text: validate, issue a code, mail it.
    async fn submit_email(
        &self,
        mut slot: SessionGuard<'_>,
        content: &str,
        replier: &dyn Replier,
    ) -> VerificationState {
        let chat_id = slot.chat_id().clone();
        let email = match self.policy.check(content) {
            Ok(email) => email,
            Err(e) => {
                info!(chat_id = %chat_id, "Rejected address: {e}");
                replier.reply(replies::validation_failed(&e)).await;
                return VerificationState::Idle;
            }
        };

        let session = VerificationSession::issue(chat_id.clone(), &email);
        let body = replies::mail_body(session.code.as_str());
        info!(chat_id = %chat_id, username = %session.username, "Verification code issued");
        *slot = Some(session);
        debug_assert!(VerificationState::Idle.can_transition_to(VerificationState::AwaitingCode));
        // Mail goes out without holding the chat's lock.
        drop(slot);

        if self.mailer.send(&email, replies::MAIL_SUBJECT, &body).await {
            info!(chat_id = %chat_id, mailer = self.mailer.name(), "Verification email sent to {email}");
            replier.reply(replies::code_sent(&email)).await;
        } else {
            // The code is already issued; the session stays.
            warn!(chat_id = %chat_id, mailer = self.mailer.name(), "Verification email to {email} failed");
            replier.reply(replies::mail_failed()).await;
        }
        VerificationState::AwaitingCode
    }

    /// AwaitingCode + text: compare, then provision on match.
    ///
    /// The chat's lock is held throughout, so a duplicate submission waits
    /// and then sees the outcome instead of provisioning twice.
    async fn submit_code(
        &self,
        mut slot: SessionGuard<'_>,
        content: &str,
        replier: &dyn Replier,
    ) -> VerificationState {
        let Some(session) = slot.as_ref() else {
            return VerificationState::Idle;
        };
        let chat_id = session.chat_id.clone();

        if !session.code.matches(content) {
            info!(chat_id = %chat_id, "Invalid verification code");
            replier.reply(replies::invalid_code()).await;
            return VerificationState::AwaitingCode;
        }

        let username = session.username.clone();
        replier.reply(replies::creating_account()).await;

        match self.provisioner.provision(&username).await {
            Ok(url) => {
                *slot = None;
                debug_assert!(VerificationState::AwaitingCode.can_transition_to(VerificationState::Verified));
                info!(chat_id = %chat_id, username = %username, "Email verified, account provisioned");
                replier.reply(replies::verified(&url)).await;
                VerificationState::Verified
            }
            Err(e) => {
                warn!(chat_id = %chat_id, username = %username, "Provisioning failed: {e}");
                replier.reply(replies::provisioning_failed(&e)).await;
                VerificationState::AwaitingCode
            }
        }
    }
}
