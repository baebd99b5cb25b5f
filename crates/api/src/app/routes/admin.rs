//! Admin routes: role administration and the identity sync trigger.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;

use smartslate_auth::{AuthContext, permissions, roles::role_spec};
use smartslate_core::UserId;

use crate::app::{errors, services::AppServices};
use crate::guards;

// ─────────────────────────────────────────────────────────────────────────────
// Request DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/users/:id/roles", get(user_roles).post(assign_role))
        .route("/users/:id/roles/:role", axum::routing::delete(revoke_role))
        .route("/sync", post(run_sync))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/roles - the role catalogue as persisted.
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> axum::response::Response {
    if let Err(response) = guards::require_permission(&ctx, &permissions::ROLE_MANAGE) {
        return response;
    }

    match services.store.list_roles().await {
        Ok(roles) => Json(roles).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

/// GET /admin/users/:id/roles
pub async fn user_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(response) = guards::require_permission(&ctx, &permissions::ROLE_MANAGE) {
        return response;
    }
    let id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.store.roles_for_user(id).await {
        Ok(roles) => Json(serde_json::json!({ "roles": roles })).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

/// POST /admin/users/:id/roles - assign a role from the static catalogue.
pub async fn assign_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(body): Json<AssignRoleRequest>,
) -> axum::response::Response {
    if let Err(response) = guards::require_permission(&ctx, &permissions::ROLE_MANAGE) {
        return response;
    }
    let id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if role_spec(&body.role).is_none() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_role",
            format!("unknown role '{}'", body.role),
        );
    }

    match services.store.assign_role(id, &body.role).await {
        Ok(newly_assigned) => {
            tracing::info!(user_id = %id, role = %body.role, "role assigned");
            Json(serde_json::json!({ "assigned": newly_assigned })).into_response()
        }
        Err(err) => errors::store_error_to_response(err),
    }
}

/// DELETE /admin/users/:id/roles/:role
pub async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
    Path((id, role)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(response) = guards::require_permission(&ctx, &permissions::ROLE_MANAGE) {
        return response;
    }
    let id = match parse_user_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match services.store.revoke_role(id, &role).await {
        Ok(revoked) => {
            tracing::info!(user_id = %id, role = %role, "role revoked");
            Json(serde_json::json!({ "revoked": revoked })).into_response()
        }
        Err(err) => errors::store_error_to_response(err),
    }
}

/// POST /admin/sync - run one directory reconciliation pass.
pub async fn run_sync(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<AuthContext>,
) -> axum::response::Response {
    if let Err(response) = guards::require_permission(&ctx, &permissions::DATABASE_MANAGE) {
        return response;
    }

    let Some(sync) = &services.sync else {
        return errors::json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "sync_unconfigured",
            "no user directory is configured",
        );
    };

    match sync.run().await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => errors::sync_error_to_response(err),
    }
}

fn parse_user_id(raw: &str) -> Result<UserId, axum::response::Response> {
    UserId::from_str(raw).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id")
    })
}
