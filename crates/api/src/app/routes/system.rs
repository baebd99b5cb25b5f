use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use smartslate_auth::AuthContext;

use crate::guards;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Introspect the caller's resolved identity and effective permissions.
pub async fn whoami(Extension(ctx): Extension<AuthContext>) -> axum::response::Response {
    if let Err(response) = guards::require_auth(&ctx) {
        return response;
    }

    let mut permissions: Vec<&str> = ctx.permissions.iter().map(|p| p.as_str()).collect();
    permissions.sort_unstable();

    Json(serde_json::json!({
        "subject": ctx.subject,
        "email": ctx.email,
        "roles": ctx.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": permissions,
        "verified": ctx.verified,
    }))
    .into_response()
}
