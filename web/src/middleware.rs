//! Request tracking middleware.
//!
//! Two layers work together:
//! - [`correlation_id_layer`] takes the id from `X-Correlation-ID` when it is
//!   a valid UUID (generates one otherwise), stores it in the request
//!   extensions and echoes it in the response header.
//! - [`trace_layer`] is `tower_http`'s `TraceLayer` with an `http_request`
//!   span carrying that id, plus a completion log and request counter.
//!
//! The correlation layer must be the outer one so the span can see the id.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use nest_web::middleware::{correlation_id_layer, trace_layer};
//!
//! let app = Router::new()
//!     .route("/api/v1/events", get(list_events))
//!     .layer(trace_layer())
//!     .layer(correlation_id_layer());
//! ```

use axum::{
    extract::Request,
    http::{self, HeaderValue},
    response::Response,
};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::Span;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Create the correlation id layer.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Copy, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        req.extensions_mut().insert(correlation_id);

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.await?;

            if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

/// `TraceLayer` configured with [`RequestSpan`] and [`RecordResponse`].
pub type RequestTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan, DefaultOnRequest, RecordResponse>;

/// Create the HTTP trace layer.
///
/// Server errors are additionally reported at `ERROR` by the layer's failure
/// classifier.
#[must_use]
pub fn trace_layer() -> RequestTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_response(RecordResponse)
}

/// Opens the `http_request` span, tagged with the correlation id when one is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        let span = tracing::info_span!(
            "http_request",
            correlation_id = tracing::field::Empty,
            method = %request.method(),
            uri = %request.uri(),
        );
        if let Some(id) = request.extensions().get::<Uuid>() {
            span.record("correlation_id", tracing::field::display(id));
        }
        span
    }
}

/// Logs completion with status and latency and counts the request.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordResponse;

impl<B> OnResponse<B> for RecordResponse {
    fn on_response(self, response: &http::Response<B>, latency: Duration, _span: &Span) {
        let status = response.status().as_u16();
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(status, latency_ms, "Request completed");
        metrics::counter!("http.requests", "status" => status.to_string()).increment(1);
    }
}
