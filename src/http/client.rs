//! Resilient downstream HTTP client.
//!
//! # Responsibilities
//! - Consult the circuit breaker before any network I/O
//! - Propagate request/correlation IDs and run the auth hook on every attempt
//! - Classify each attempt and report it to the breaker
//! - Retry transport errors and 5xx with jittered exponential backoff
//! - Honor the caller's cancellation and deadline, including during backoff
//!
//! # Design Decisions
//! - The breaker is injected (or built from config) and shared by every clone
//!   of the client; it is the only process-wide state
//! - A denied `allow()` ends the call immediately with `CircuitOpen`
//! - 4xx responses are returned as `Ok(Response)`; callers opt into an error
//!   with `Response::error_for_status`
//! - Bodies are `Bytes`, so re-sending on retry is a cheap clone

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::config::{validate_client, ClientConfig};
use crate::http::auth::{self, Authenticator};
use crate::http::error::{ClientError, ClientResult};
use crate::http::request::inject_ids;
use crate::http::response::Response;
use crate::observability::metrics;
use crate::resilience::backoff::{Backoff, JitterSource, RetryPolicy, ThreadRngJitter};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitPolicy};
use crate::resilience::retries::{classify_status, AttemptOutcome, BreakerVerdict, StatusClass};
use crate::resilience::timeouts::CallContext;

/// Circuit-breaker-protected, retrying HTTP client for one downstream service.
#[derive(Clone)]
pub struct ResilientClient {
    service: String,
    base_url: Url,
    timeout: Duration,
    http: reqwest::Client,
    breaker: Arc<CircuitBreaker>,
    backoff: Backoff,
    auth: Arc<dyn Authenticator>,
    count_client_errors: bool,
}

/// Builder for [`ResilientClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    http: Option<reqwest::Client>,
    breaker: Option<Arc<CircuitBreaker>>,
    auth: Option<Arc<dyn Authenticator>>,
    jitter: Option<Arc<dyn JitterSource>>,
}

impl ClientBuilder {
    /// Use a preconfigured `reqwest::Client` (connection pool, TLS, proxies).
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Share an existing breaker instead of creating one from the config.
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Override the auth hook from the config.
    pub fn auth(mut self, auth: impl Authenticator + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Override the jitter random source.
    pub fn jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Validate the configuration and build the client.
    pub fn build(self) -> ClientResult<ResilientClient> {
        let config = self.config;

        validate_client(&config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            ClientError::InvalidConfig(joined)
        })?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidConfig(format!("base_url: {}", e)))?;

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .build()
                .map_err(|e| ClientError::InvalidConfig(format!("http client: {}", e)))?,
        };

        let auth = match self.auth {
            Some(auth) => auth,
            None => auth::from_config(&config.auth)
                .map_err(|e| ClientError::InvalidConfig(format!("auth: {}", e)))?,
        };

        let breaker = self.breaker.unwrap_or_else(|| {
            Arc::new(CircuitBreaker::new(
                config.service_name.clone(),
                CircuitPolicy::from(&config.circuit),
            ))
        });

        let jitter = self.jitter.unwrap_or_else(|| Arc::new(ThreadRngJitter));
        let backoff = Backoff::with_jitter(RetryPolicy::from(&config.retry), jitter);

        tracing::debug!(
            service = %config.service_name,
            base_url = %base_url,
            max_attempts = config.retry.max_attempts,
            "Resilient client created"
        );

        Ok(ResilientClient {
            service: config.service_name,
            base_url,
            timeout: Duration::from_millis(config.timeout_ms),
            http,
            breaker,
            backoff,
            auth,
            count_client_errors: config.circuit.count_client_errors,
        })
    }
}

impl ResilientClient {
    /// Start building a client for `config`.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            http: None,
            breaker: None,
            auth: None,
            jitter: None,
        }
    }

    /// Build a client with defaults for everything not in `config`.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::builder(config).build()
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The breaker guarding this service.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.backoff.policy()
    }

    pub async fn get(&self, ctx: &CallContext, path: &str) -> ClientResult<Response> {
        self.execute(ctx, Method::GET, path, None).await
    }

    pub async fn delete(&self, ctx: &CallContext, path: &str) -> ClientResult<Response> {
        self.execute(ctx, Method::DELETE, path, None).await
    }

    pub async fn post(&self, ctx: &CallContext, path: &str, body: impl Into<Bytes>) -> ClientResult<Response> {
        self.execute(ctx, Method::POST, path, Some(body.into())).await
    }

    pub async fn put(&self, ctx: &CallContext, path: &str, body: impl Into<Bytes>) -> ClientResult<Response> {
        self.execute(ctx, Method::PUT, path, Some(body.into())).await
    }

    /// GET and decode a JSON body; 4xx responses become `ClientStatus` errors.
    pub async fn get_json<T: DeserializeOwned>(&self, ctx: &CallContext, path: &str) -> ClientResult<T> {
        self.get(ctx, path).await?.error_for_status()?.json()
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<B, T>(&self, ctx: &CallContext, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(ctx, Method::POST, path, body).await?.error_for_status()?.json()
    }

    /// PUT a JSON body and decode the JSON response.
    pub async fn put_json<B, T>(&self, ctx: &CallContext, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(ctx, Method::PUT, path, body).await?.error_for_status()?.json()
    }

    async fn send_json<B>(&self, ctx: &CallContext, method: Method, path: &str, body: &B) -> ClientResult<Response>
    where
        B: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(body).map_err(|e| ClientError::Request(e.to_string()))?;
        self.execute_json(ctx, method, path, Bytes::from(bytes)).await
    }

    /// Like [`execute`](Self::execute), sending an already encoded JSON body.
    pub async fn execute_json(
        &self,
        ctx: &CallContext,
        method: Method,
        path: &str,
        body: Bytes,
    ) -> ClientResult<Response> {
        let content_type = HeaderValue::from_static("application/json");
        self.call(ctx, method, path, Some(body), Some(content_type)).await
    }

    /// Execute one logical request with breaker protection and retries.
    pub async fn execute(
        &self,
        ctx: &CallContext,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> ClientResult<Response> {
        self.call(ctx, method, path, body, None).await
    }

    async fn call(
        &self,
        ctx: &CallContext,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        content_type: Option<HeaderValue>,
    ) -> ClientResult<Response> {
        let start = Instant::now();
        let url = self.endpoint(path)?;
        let max_attempts = self.backoff.policy().max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            if let Some(reason) = ctx.interrupted() {
                metrics::record_request(&self.service, method.as_str(), "interrupted", start);
                return Err(reason.into());
            }

            if !self.breaker.allow() {
                tracing::warn!(
                    service = %self.service,
                    method = %method,
                    path = %path,
                    request_id = ctx.request_id().unwrap_or("-"),
                    "Circuit open, rejecting call"
                );
                metrics::record_request(&self.service, method.as_str(), "circuit_open", start);
                return Err(ClientError::CircuitOpen {
                    service: self.service.clone(),
                });
            }

            let outcome = self
                .attempt(ctx, &method, &url, body.as_ref(), content_type.as_ref())
                .await;

            match outcome.verdict(self.count_client_errors) {
                BreakerVerdict::Success => self.breaker.record_success(),
                BreakerVerdict::Failure => self.breaker.record_failure(),
                BreakerVerdict::Neutral => self.breaker.release_probe(),
            }

            let label = outcome.label();
            match outcome {
                AttemptOutcome::Success(mut response) | AttemptOutcome::ClientError(mut response) => {
                    response.attempts = attempt + 1;
                    metrics::record_request(&self.service, method.as_str(), label, start);
                    return Ok(response);
                }
                AttemptOutcome::Fatal(err) => {
                    metrics::record_request(&self.service, method.as_str(), label, start);
                    return Err(err);
                }
                AttemptOutcome::Retryable(err) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        tracing::warn!(
                            service = %self.service,
                            method = %method,
                            path = %path,
                            attempts = attempt,
                            error = %err,
                            "Retries exhausted"
                        );
                        metrics::record_request(&self.service, method.as_str(), "max_retries", start);
                        return Err(ClientError::MaxRetriesExceeded {
                            service: self.service.clone(),
                            method: method.to_string(),
                            path: path.to_string(),
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }

                    let delay = self.backoff.delay(attempt - 1);
                    tracing::info!(
                        service = %self.service,
                        method = %method,
                        path = %path,
                        attempt = attempt,
                        delay = ?delay,
                        error = %err,
                        "Retrying request"
                    );
                    metrics::record_retry(&self.service);

                    if let Err(reason) = ctx.sleep(delay).await {
                        metrics::record_request(&self.service, method.as_str(), "interrupted", start);
                        return Err(reason.into());
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        ctx: &CallContext,
        method: &Method,
        url: &Url,
        body: Option<&Bytes>,
        content_type: Option<&HeaderValue>,
    ) -> AttemptOutcome<Response, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, content_type.clone());
        }
        inject_ids(&mut headers, ctx.request_id(), ctx.correlation_id());

        if let Err(source) = self.auth.authorize(&mut headers).await {
            tracing::error!(service = %self.service, error = %source, "Auth hook failed");
            return AttemptOutcome::Fatal(ClientError::Auth {
                service: self.service.clone(),
                source,
            });
        }

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .headers(headers)
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.body(body.clone());
        }

        let send = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(Response {
                status,
                headers,
                body,
                attempts: 0,
            })
        };

        match ctx.run(send).await {
            Err(reason) => AttemptOutcome::Fatal(reason.into()),
            Ok(Err(source)) if source.is_builder() => {
                AttemptOutcome::Fatal(ClientError::Request(source.to_string()))
            }
            Ok(Err(source)) => {
                tracing::warn!(
                    service = %self.service,
                    url = %url,
                    timeout = source.is_timeout(),
                    error = %source,
                    "Downstream transport error"
                );
                AttemptOutcome::Retryable(ClientError::Transport {
                    service: self.service.clone(),
                    source,
                })
            }
            Ok(Ok(response)) => match classify_status(response.status) {
                StatusClass::Success => AttemptOutcome::Success(response),
                StatusClass::ClientError => AttemptOutcome::ClientError(response),
                StatusClass::ServerError => {
                    tracing::warn!(
                        service = %self.service,
                        url = %url,
                        status = %response.status,
                        "Downstream server error"
                    );
                    AttemptOutcome::Retryable(ClientError::ServerStatus {
                        service: self.service.clone(),
                        status: response.status,
                    })
                }
            },
        }
    }

    /// Join `path` onto the base URL, keeping the base path.
    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| ClientError::Request(format!("invalid path '{}': {}", path, e)))
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("breaker_state", &self.breaker.state())
            .finish()
    }
}
