//! Operator authentication for the admin surface.
//!
//! The admin is gated by a single shared bearer token taken from
//! `ADMIN_OPERATOR_TOKEN`. When no token is configured, every request is
//! forbidden, with or without an `Authorization` header.

use crate::state::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use nest_web::{AppError, BearerToken, ClientIp, CorrelationId};

/// Proof that the request carries the operator token.
///
/// # Rejections
///
/// - 403 when no operator token is configured
/// - 401 when `Authorization: Bearer <token>` is missing or malformed
/// - 403 when the token does not match
#[derive(Debug, Clone, Copy)]
pub struct RequireOperator;

#[async_trait]
impl<E, C> FromRequestParts<AppState<E, C>> for RequireOperator
where
    E: Send + Sync,
    C: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<E, C>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin.operator_token.as_deref() else {
            return Err(reject(parts, state, "no operator token configured").await);
        };

        let BearerToken(presented) = BearerToken::from_request_parts(parts, state).await?;

        if !constant_time_eq::constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
            return Err(reject(parts, state, "operator token mismatch").await);
        }

        Ok(Self)
    }
}

async fn reject<E, C>(parts: &mut Parts, state: &AppState<E, C>, reason: &'static str) -> AppError
where
    E: Send + Sync,
    C: Send + Sync,
{
    let client_ip = match ClientIp::from_request_parts(parts, state).await {
        Ok(ClientIp(ip)) => ip,
        Err(never) => match never {},
    };
    let correlation_id = match CorrelationId::from_request_parts(parts, state).await {
        Ok(CorrelationId(id)) => id,
        Err(never) => match never {},
    };

    tracing::warn!(
        client_ip = %client_ip,
        correlation_id = %correlation_id,
        path = %parts.uri.path(),
        reason,
        "Rejected admin request"
    );
    metrics::counter!("admin.rejected", "reason" => reason).increment(1);

    AppError::forbidden("You do not have permission to perform this action.")
}
