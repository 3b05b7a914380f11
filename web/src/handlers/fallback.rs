//! Fallback handlers for unmatched requests.

use crate::error::AppError;
use axum::http::{Method, Uri};

/// Reject a verb the route does not serve with a JSON 405.
///
/// Install with `MethodRouter::fallback` on read-only routes.
#[allow(clippy::unused_async)]
pub async fn method_not_allowed(method: Method, uri: Uri) -> AppError {
    tracing::debug!(method = %method, path = %uri.path(), "Method not allowed");
    AppError::method_not_allowed(&method)
}

/// JSON 404 for paths no route matches.
#[allow(clippy::unused_async)]
pub async fn not_found(uri: Uri) -> AppError {
    AppError::new(
        axum::http::StatusCode::NOT_FOUND,
        format!("No route for {}", uri.path()),
        "NOT_FOUND",
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/items", get(|| async { "[]" }).fallback(method_not_allowed))
            .fallback(not_found)
    }

    #[tokio::test]
    async fn test_write_verb_gets_405_json() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/items")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "METHOD_NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_unknown_path_gets_404_json() {
        let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
