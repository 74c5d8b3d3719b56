//! Outbound authentication hooks.
//!
//! # Responsibilities
//! - Attach credentials to every attempt (not once per call: tokens may expire
//!   between retries)
//! - Build the configured hook from `AuthConfig`, reading secrets from the environment

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::config::AuthConfig;
use crate::http::error::BoxError;

/// Hook invoked before each attempt to set credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authorize(&self, headers: &mut HeaderMap) -> Result<(), BoxError>;
}

/// Sends no credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl Authenticator for NoAuth {
    async fn authorize(&self, _headers: &mut HeaderMap) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Static `Authorization: Bearer <token>`.
#[derive(Clone)]
pub struct BearerToken {
    value: HeaderValue,
}

impl BearerToken {
    pub fn new(token: &str) -> Result<Self, BoxError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken").finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for BearerToken {
    async fn authorize(&self, headers: &mut HeaderMap) -> Result<(), BoxError> {
        headers.insert(AUTHORIZATION, self.value.clone());
        Ok(())
    }
}

/// Arbitrary static header, e.g. an API key.
#[derive(Debug, Clone)]
pub struct StaticHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl StaticHeader {
    pub fn new(name: &str, value: &str) -> Result<Self, BoxError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let mut value = HeaderValue::from_str(value)?;
        value.set_sensitive(true);
        Ok(Self { name, value })
    }
}

#[async_trait]
impl Authenticator for StaticHeader {
    async fn authorize(&self, headers: &mut HeaderMap) -> Result<(), BoxError> {
        headers.insert(self.name.clone(), self.value.clone());
        Ok(())
    }
}

/// Bearer token produced by a closure on every attempt (refreshing sources).
pub struct TokenFn<F> {
    fetch: F,
}

impl<F> TokenFn<F> {
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<F, Fut> Authenticator for TokenFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, BoxError>> + Send,
{
    async fn authorize(&self, headers: &mut HeaderMap) -> Result<(), BoxError> {
        let token = (self.fetch)().await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Build the hook described by `config`.
pub fn from_config(config: &AuthConfig) -> Result<Arc<dyn Authenticator>, BoxError> {
    match config {
        AuthConfig::None => Ok(Arc::new(NoAuth)),
        AuthConfig::Bearer { token_env } => {
            let token = read_env(token_env)?;
            Ok(Arc::new(BearerToken::new(&token)?))
        }
        AuthConfig::Header { name, value_env } => {
            let value = read_env(value_env)?;
            Ok(Arc::new(StaticHeader::new(name, &value)?))
        }
    }
}

fn read_env(var: &str) -> Result<String, BoxError> {
    std::env::var(var).map_err(|e| format!("environment variable {}: {}", var, e).into())
}
