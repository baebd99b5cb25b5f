use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use smartslate_infra::StoreError;
use smartslate_infra::sync::SyncError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Database(msg) => {
            tracing::error!(error = %msg, "store failure");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "storage failure",
            )
        }
    }
}

pub fn sync_error_to_response(err: SyncError) -> axum::response::Response {
    match err {
        SyncError::AlreadyRunning => json_error(
            StatusCode::CONFLICT,
            "sync_in_progress",
            "a sync run is already in progress",
        ),
        SyncError::Directory(e) => json_error(StatusCode::BAD_GATEWAY, "directory_error", e.to_string()),
        SyncError::Store(e) => store_error_to_response(e),
    }
}
