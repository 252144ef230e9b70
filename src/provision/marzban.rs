//! Marzban panel client — delete-then-create for idempotent provisioning.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::Provisioner;
use crate::config::ProvisionConfig;
use crate::error::ProvisionError;

/// Response body of `POST /api/user`. Only the field we need.
#[derive(Debug, Deserialize)]
struct CreatedUser {
    #[serde(default)]
    subscription_url: Option<String>,
}

/// HTTP client for the panel's admin API.
pub struct MarzbanClient {
    base_url: String,
    admin_token: SecretString,
    template: serde_json::Value,
    client: reqwest::Client,
}

impl MarzbanClient {
    pub fn new(config: &ProvisionConfig) -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProvisionError::Request {
                url: config.base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            admin_token: config.admin_token.clone(),
            template: config.template.clone(),
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    /// Remove any existing account. The response status is only logged: a
    /// missing account is the common case. A request that never gets a
    /// response fails the provisioning attempt.
    async fn delete_user(&self, username: &str) -> Result<(), ProvisionError> {
        let url = self.api_url(&format!("user/{username}"));
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(self.admin_token.expose_secret())
            .send()
            .await
            .map_err(|e| ProvisionError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        debug!(username = %username, status = %resp.status(), "Delete before create");
        Ok(())
    }

    async fn create_user(&self, account: &serde_json::Value) -> Result<String, ProvisionError> {
        let url = self.api_url("user");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.admin_token.expose_secret())
            .json(account)
            .send()
            .await
            .map_err(|e| ProvisionError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProvisionError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedUser = resp
            .json()
            .await
            .map_err(|e| ProvisionError::InvalidResponse(e.to_string()))?;

        created
            .subscription_url
            .filter(|url| !url.is_empty())
            .ok_or(ProvisionError::MissingSubscriptionUrl)
    }
}

#[async_trait]
impl Provisioner for MarzbanClient {
    async fn provision(&self, username: &str) -> Result<String, ProvisionError> {
        let account = prepare_account(&self.template, username, chrono::Utc::now().timestamp())?;

        self.delete_user(username).await?;
        let url = self.create_user(&account).await?;

        info!(username = %username, "User provisioned");
        Ok(url)
    }
}

/// Build the create-user payload from the account template.
///
/// Injects `username`, turns a numeric relative `expire` into an absolute
/// unix timestamp and defaults `status` to `"active"`. The template itself
/// is left untouched.
pub fn prepare_account(
    template: &serde_json::Value,
    username: &str,
    now_unix: i64,
) -> Result<serde_json::Value, ProvisionError> {
    let mut account = template.clone();
    let fields = account.as_object_mut().ok_or(ProvisionError::InvalidTemplate)?;

    fields.insert("username".into(), username.into());

    if let Some(expire) = fields.get("expire").and_then(serde_json::Value::as_i64) {
        let absolute = expire
            .checked_add(now_unix)
            .ok_or(ProvisionError::ExpireOutOfRange(expire))?;
        fields.insert("expire".into(), absolute.into());
    }

    if !fields.contains_key("status") {
        fields.insert("status".into(), "active".into());
    }

    Ok(account)
}
