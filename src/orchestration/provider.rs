//! Keyed data sources for the request-scoped memo cache.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::http::client::ResilientClient;
use crate::http::error::BoxError;
use crate::resilience::timeouts::CallContext;

/// A fetchable value identified by a cache key.
#[async_trait]
pub trait DataProvider: Send + Sync {
    type Output: Send + Sync + 'static;

    /// Cache key; providers returning the same key must produce the same type.
    fn key(&self) -> String;

    async fn fetch(&self, ctx: &CallContext) -> Result<Self::Output, BoxError>;
}

/// JSON document fetched with GET through a [`ResilientClient`].
///
/// Keyed by `<service>:<path>`. 4xx responses are fetch errors.
pub struct JsonResource<T> {
    client: ResilientClient,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonResource<T> {
    pub fn new(client: ResilientClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl<T> Clone for JsonResource<T> {
    fn clone(&self) -> Self {
        Self::new(self.client.clone(), self.path.clone())
    }
}

#[async_trait]
impl<T> DataProvider for JsonResource<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    type Output = T;

    fn key(&self) -> String {
        format!("{}:{}", self.client.service_name(), self.path)
    }

    async fn fetch(&self, ctx: &CallContext) -> Result<T, BoxError> {
        Ok(self.client.get_json::<T>(ctx, &self.path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    #[test]
    fn test_json_resource_key() {
        let client = ResilientClient::new(ClientConfig::new("catalog", "http://127.0.0.1:9")).unwrap();
        let resource: JsonResource<serde_json::Value> = JsonResource::new(client, "/products/7");
        assert_eq!(resource.key(), "catalog:/products/7");
        assert_eq!(resource.clone().path(), "/products/7");
    }
}
