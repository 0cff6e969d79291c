//! Bearer credential lookup.
//!
//! Token acquisition and refresh live outside this crate; clients only ask
//! for the current bearer token right before each request.

use std::sync::Arc;

use crate::error::ApiError;
use crate::traits::Provider;

/// Source of bearer tokens for tracker requests.
pub trait Credentials: Send + Sync {
    fn bearer(&self, provider: Provider) -> Result<String, ApiError>;
}

/// A fixed token, typically read from the config file.
#[derive(Clone)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self((!token.trim().is_empty()).then_some(token))
    }

    pub fn missing() -> Self {
        Self(None)
    }

    pub fn shared(self) -> Arc<dyn Credentials> {
        Arc::new(self)
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.0.is_some() { "set" } else { "missing" };
        f.debug_tuple("StaticToken").field(&state).finish()
    }
}

impl Credentials for StaticToken {
    fn bearer(&self, provider: Provider) -> Result<String, ApiError> {
        self.0.clone().ok_or_else(|| {
            tracing::warn!(%provider, "no credential configured");
            ApiError::Unauthenticated(provider)
        })
    }
}
