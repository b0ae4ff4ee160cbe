//! Bearer credential supply.
//!
//! Token acquisition belongs to the embedding application. The client asks for
//! a token on every request and never caches one, so refresh and expiry stay
//! the provider's business.

use crate::error::{Error, Result};

/// Source of bearer credentials
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    /// A currently valid bearer token
    async fn bearer_token(&self) -> Result<String>;
}

/// Provider that always returns the same token
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap a fixed token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(Error::Credential("static token is empty".to_string()));
        }
        Ok(self.token.clone())
    }
}
