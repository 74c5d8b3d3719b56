//! Inbound identifier propagation.
//!
//! Wrap an Axum router (or any tower service over `http` types) with
//! [`PropagationLayer`] to read `x-request-id` / `x-correlation-id` from the
//! inbound request, generating what is missing, and keep them in scope while
//! the handler runs. Outbound calls made through a [`CallContext`] created in
//! the handler then carry the same identifiers.
//!
//! [`CallContext`]: crate::resilience::timeouts::CallContext

use std::task::{Context, Poll};

use axum::http::{HeaderValue, Request, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::http::request::{inject_ids, RequestIds, X_CORRELATION_ID, X_REQUEST_ID};

/// Layer producing [`PropagationService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagationLayer;

impl<S> Layer<S> for PropagationLayer {
    type Service = PropagationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PropagationService { inner }
    }
}

/// Service wrapper produced by [`PropagationLayer`].
#[derive(Debug, Clone)]
pub struct PropagationService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for PropagationService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let ids = RequestIds::from_headers(req.headers());

        // Handlers reading headers directly see the generated values too.
        inject_ids(req.headers_mut(), Some(&ids.request_id), Some(&ids.correlation_id));
        req.extensions_mut().insert(ids.clone());

        tracing::debug!(
            request_id = %ids.request_id,
            correlation_id = %ids.correlation_id,
            path = %req.uri().path(),
            "Inbound request"
        );

        let fut = self.inner.call(req);
        Box::pin(RequestIds::scope(ids.clone(), async move {
            let mut res = fut.await?;
            let headers = res.headers_mut();
            for (name, value) in [(X_REQUEST_ID, &ids.request_id), (X_CORRELATION_ID, &ids.correlation_id)] {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.insert(name, value);
                }
            }
            Ok(res)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use crate::resilience::timeouts::CallContext;

    async fn echo_ids() -> String {
        let ctx = CallContext::new();
        format!(
            "{}|{}",
            ctx.request_id().unwrap_or("-"),
            ctx.correlation_id().unwrap_or("-")
        )
    }

    fn app() -> Router {
        Router::new().route("/", get(echo_ids)).layer(PropagationLayer)
    }

    async fn body_string(res: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_inbound_ids_reach_handler_and_response() {
        let req = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "req-42")
            .header(X_CORRELATION_ID, "corr-7")
            .body(Body::empty())
            .unwrap();

        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.headers().get(X_REQUEST_ID).unwrap(), "req-42");
        assert_eq!(res.headers().get(X_CORRELATION_ID).unwrap(), "corr-7");
        assert_eq!(body_string(res).await, "req-42|corr-7");
    }

    #[tokio::test]
    async fn test_missing_ids_are_generated() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let res = app().oneshot(req).await.unwrap();
        let request_id = res.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap().to_string();
        assert!(uuid::Uuid::parse_str(&request_id).is_ok());
        assert_eq!(res.headers().get(X_CORRELATION_ID).unwrap(), request_id.as_str());
        assert_eq!(body_string(res).await, format!("{0}|{0}", request_id));
    }
}
