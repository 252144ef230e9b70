//! Account provisioning against the proxy panel.

pub mod marzban;

pub use marzban::{MarzbanClient, prepare_account};

use async_trait::async_trait;

use crate::error::ProvisionError;

/// Creates (or recreates) the account for a verified user.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision `username` and return its subscription URL.
    async fn provision(&self, username: &str) -> Result<String, ProvisionError>;
}
