//! Mail-exchanger resolution.
//!
//! Provides a trait-based resolver that can be swapped for testing.
//! Production uses hickory-resolver, tests use a mock implementation.

use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{ResolveError, Resolver};
use tracing::{error, warn};

use crate::error::MailError;

/// One candidate exchanger. Lower preference is tried first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    pub preference: u16,
    pub host: String,
}

impl MxRecord {
    pub fn new(preference: u16, host: impl Into<String>) -> Self {
        Self {
            preference,
            host: host.into(),
        }
    }
}

/// Trait for the DNS lookups delivery needs.
///
/// A domain without records of the requested type yields `Ok(vec![])`;
/// `Err` is reserved for failed lookups.
#[async_trait]
pub trait MxResolver: Send + Sync {
    /// MX records of `domain`, in any order.
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MailError>;

    /// IPv4 addresses of `domain`, as strings.
    async fn lookup_a(&self, domain: &str) -> Result<Vec<String>, MailError>;
}

/// Resolve the hosts to try for `domain`, most preferred first.
///
/// Falls back to the domain's A records (preference 0) when it publishes no
/// MX. An empty result means there is nowhere to deliver.
pub async fn resolve_exchangers<R>(resolver: &R, domain: &str) -> Result<Vec<MxRecord>, MailError>
where
    R: MxResolver + ?Sized,
{
    let mut records = resolver.lookup_mx(domain).await?;
    if !records.is_empty() {
        // Stable sort keeps DNS order among equal preferences.
        records.sort_by_key(|r| r.preference);
        return Ok(records);
    }

    warn!(domain = %domain, "No MX records found, trying A records");
    let addresses = resolver.lookup_a(domain).await?;
    if addresses.is_empty() {
        error!(domain = %domain, "No A records found");
    }
    Ok(addresses.into_iter().map(|addr| MxRecord::new(0, addr)).collect())
}

/// Production resolver using hickory-resolver.
pub struct HickoryMxResolver {
    resolver: Resolver<TokioConnectionProvider>,
}

impl HickoryMxResolver {
    /// Create a resolver from the system configuration, falling back to the
    /// library's default upstreams when it cannot be read.
    pub fn new() -> Self {
        let builder = match Resolver::builder_tokio() {
            Ok(builder) => builder,
            Err(e) => {
                warn!("Failed to read system resolver config ({e}); using defaults");
                Resolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default())
            }
        };
        Self {
            resolver: builder.build(),
        }
    }
}

impl Default for HickoryMxResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup_error(domain: &str, err: ResolveError) -> MailError {
    MailError::Resolve {
        domain: domain.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl MxResolver for HickoryMxResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, MailError> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|mx| {
                    let host = mx.exchange().to_utf8();
                    MxRecord::new(mx.preference(), host.trim_end_matches('.'))
                })
                .collect()),
            Err(e) if e.is_no_records_found() => Ok(Vec::new()),
            Err(e) => Err(lookup_error(domain, e)),
        }
    }

    async fn lookup_a(&self, domain: &str) -> Result<Vec<String>, MailError> {
        match self.resolver.ipv4_lookup(domain).await {
            Ok(lookup) => Ok(lookup.iter().map(|a| a.to_string()).collect()),
            Err(e) if e.is_no_records_found() => Ok(Vec::new()),
            Err(e) => Err(lookup_error(domain, e)),
        }
    }
}
