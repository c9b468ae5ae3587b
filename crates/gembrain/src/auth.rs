//! Credential seam for the relay transport.
//!
//! The credential *acquisition* flow (OAuth, device code, token storage) is
//! an external collaborator.  This layer only consumes an opaque provider:
//! fetch the current credentials, refresh them when expired, and hand the
//! bearer token to the transport immediately before use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A bearer credential snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// The bearer token.
    pub token: String,
    /// Whether the issuer considers the credential currently usable.
    pub valid: bool,
    /// When the token expires, if known.
    pub expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    /// True when the credential must be refreshed before use.
    pub fn needs_refresh(&self) -> bool {
        !self.valid || self.expiry.is_some_and(|expiry| expiry <= Utc::now())
    }
}

/// Opaque source of refreshable credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return the current credentials.
    async fn get_credentials(&self) -> Result<Credentials>;

    /// Exchange expired credentials for fresh ones.
    async fn refresh(&self, credentials: Credentials) -> Result<Credentials>;
}

/// Fixed-token provider for tests and deployments where an external process
/// keeps the token file fresh.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Create a provider that always returns the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn get_credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            token: self.token.clone(),
            valid: true,
            expiry: None,
        })
    }

    async fn refresh(&self, _credentials: Credentials) -> Result<Credentials> {
        self.get_credentials().await
    }
}

/// Fetch credentials and refresh them if expired, returning a usable token.
pub(crate) async fn fresh_token(provider: &dyn CredentialProvider) -> Result<String> {
    let credentials = provider.get_credentials().await?;
    let credentials = if credentials.needs_refresh() {
        tracing::debug!("credential expired, refreshing before use");
        provider.refresh(credentials).await?
    } else {
        credentials
    };
    Ok(credentials.token)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
