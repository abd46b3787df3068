use crate::server::AppState;
use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use edupath_auth::TokenError;
use std::sync::Arc;
use tracing::warn;

/// Auth configuration for the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// When false (development mode) every request passes through unverified.
    pub enabled: bool,
}

impl AuthConfig {
    /// Auth enabled, the production default.
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

/// Routes that never require a credential.
fn is_public(path: &str) -> bool {
    matches!(path, "/login" | "/health")
}

/// Query-string credential, used by browser WebSocket clients which cannot
/// set an `Authorization` header.
#[derive(serde::Deserialize, Default)]
pub(crate) struct AuthQuery {
    pub(crate) token: Option<String>,
}

/// Bearer-token middleware.
///
/// Public routes bypass verification entirely. Elsewhere, a missing
/// credential is a 401 and a failed verification a 403, with the expired
/// case called out so clients can re-login instead of treating the token
/// as corrupt. Verified claims are attached to the request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.auth.enabled || is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or(query.token);

    let Some(token) = token else {
        warn!(path = request.uri().path(), "Rejected request: missing bearer token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "unauthenticated",
                "detail": "missing bearer token",
            })),
        )
            .into_response();
    };

    match state.tokens.verify(&token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(TokenError::Expired) => {
            warn!(path = request.uri().path(), "Rejected request: expired token");
            (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "error": "invalid_credential",
                    "detail": "token expired",
                })),
            )
                .into_response()
        }
        Err(TokenError::Invalid(e)) => {
            warn!(path = request.uri().path(), error = %e, "Rejected request: invalid token");
            (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({
                    "error": "invalid_credential",
                    "detail": "token verification failed",
                })),
            )
                .into_response()
        }
    }
}
