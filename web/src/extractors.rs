//! Custom Axum extractors.
//!
//! - `CorrelationId`: the request's correlation id, as set by
//!   [`crate::middleware::correlation_id_layer`]
//! - `ClientIp`: client address from proxy headers
//! - `BearerToken`: raw token from `Authorization: Bearer <token>`
//!
//! # Examples
//!
//! ```ignore
//! use nest_web::extractors::{BearerToken, ClientIp, CorrelationId};
//!
//! async fn handler(
//!     correlation_id: CorrelationId,
//!     client_ip: ClientIp,
//!     token: BearerToken,
//! ) -> Result<Json<Response>, AppError> {
//!     tracing::info!(
//!         correlation_id = %correlation_id.0,
//!         client_ip = %client_ip.0,
//!         "Processing request"
//!     );
//!     Ok(Json(response))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use std::net::{IpAddr, Ipv4Addr};
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Prefers the id stored in request extensions by the tracing middleware,
/// then a valid `X-Correlation-ID` header, and generates a UUID v4 otherwise.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .extensions
            .get::<Uuid>()
            .copied()
            .or_else(|| {
                parts
                    .headers
                    .get(CORRELATION_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

/// Client IP address.
///
/// # Priority
///
/// 1. `X-Forwarded-For` (first IP in the list)
/// 2. `X-Real-IP`
/// 3. Loopback
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(client_ip(&parts.headers)))
    }
}

fn client_ip(headers: &HeaderMap) -> IpAddr {
    let forwarded: Option<IpAddr> = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    let real = || {
        headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    forwarded
        .or_else(real)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Bearer token from the `Authorization` header.
///
/// Rejects with 401 when the header is missing, is not a bearer credential,
/// or carries an empty token. Checking the token itself is up to the caller.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Authentication credentials were not provided."))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'")
            })?
            .trim();

        if token.is_empty() {
            return Err(AppError::unauthorized("Empty bearer token"));
        }

        Ok(Self(token.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    fn request_parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).expect("Valid request").into_parts().0
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_extension() {
        let stored = Uuid::new_v4();
        let mut parts = request_parts(Request::builder().header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string()));
        parts.extensions.insert(stored);

        let correlation_id = CorrelationId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(correlation_id.0, stored);
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let mut parts = request_parts(Request::builder().header(CORRELATION_ID_HEADER, uuid.to_string()));

        let correlation_id = CorrelationId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_client_ip_priority() {
        let mut forwarded = request_parts(
            Request::builder()
                .header("X-Forwarded-For", "203.0.113.1, 198.51.100.1")
                .header("X-Real-IP", "198.51.100.42"),
        );
        let ip = ClientIp::from_request_parts(&mut forwarded, &()).await.unwrap();
        assert_eq!(ip.0.to_string(), "203.0.113.1");

        let mut real = request_parts(Request::builder().header("X-Real-IP", "198.51.100.42"));
        let ip = ClientIp::from_request_parts(&mut real, &()).await.unwrap();
        assert_eq!(ip.0.to_string(), "198.51.100.42");

        let mut none = request_parts(Request::builder());
        let ip = ClientIp::from_request_parts(&mut none, &()).await.unwrap();
        assert_eq!(ip.0.to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_bearer_token_extracted() {
        let mut parts = request_parts(Request::builder().header(header::AUTHORIZATION, "Bearer s3cret"));
        let token = BearerToken::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(token.0, "s3cret");
    }

    #[tokio::test]
    async fn test_bearer_token_rejections() {
        for builder in [
            Request::builder(),
            Request::builder().header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz"),
            Request::builder().header(header::AUTHORIZATION, "Bearer   "),
        ] {
            let mut parts = request_parts(builder);
            let err = BearerToken::from_request_parts(&mut parts, &()).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
