use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::dto::ErrorResponse;
use crate::state::AppState;

/// Outcome of checking a request against the configured admin token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCheck {
    Allowed,
    /// No admin token is configured, so protected routes are disabled.
    Disabled,
    Unauthorized,
}

pub fn check_bearer(headers: &HeaderMap, admin_token: Option<&str>) -> AuthCheck {
    let Some(expected) = admin_token else {
        return AuthCheck::Disabled;
    };

    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match presented {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => {
            AuthCheck::Allowed
        }
        _ => AuthCheck::Unauthorized,
    }
}

/// Middleware that validates `Authorization: Bearer <token>` against `JOBHARVEST_ADMIN_TOKEN`.
pub async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match check_bearer(request.headers(), state.admin_token.as_deref()) {
        AuthCheck::Allowed => next.run(request).await,
        AuthCheck::Disabled => {
            let body = ErrorResponse::new(
                "forbidden",
                "Live scraping is disabled. Set JOBHARVEST_ADMIN_TOKEN to enable it.",
            );
            (StatusCode::FORBIDDEN, axum::Json(body)).into_response()
        }
        AuthCheck::Unauthorized => {
            let body = ErrorResponse::new(
                "unauthorized",
                "Missing or invalid Authorization header. Expected: Bearer <admin_token>",
            );
            (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
        }
    }
}
