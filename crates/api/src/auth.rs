use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;

use crate::AppState;

/// Returned for any dashboard request without the configured token.
pub struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        )
            .into_response()
    }
}

/// Token of an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Middleware guarding the `/api/*` routes.
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Unauthorized> {
    let authorized =
        bearer_token(request.headers()).is_some_and(|token| token == &*state.dashboard_token);
    if !authorized {
        debug!(path = %request.uri().path(), "Dashboard request without valid token");
        return Err(Unauthorized);
    }
    Ok(next.run(request).await)
}
