use axum::{Router, routing::get};

pub mod admin;
pub mod system;

/// Router for everything behind the auth middleware.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/admin", admin::router())
}
