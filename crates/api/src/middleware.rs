use std::sync::Arc;

use axum::{extract::State, middleware::Next, response::Response};

use crate::app::services::AppServices;

/// Resolve the caller's identity on every request and stash it in the request
/// extensions. Never rejects: public routes serve anonymous callers, and the
/// guards decide what authenticated routes require.
pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let ctx = services.resolver.resolve(header).await;

    // Provision the local user row and default roles on every verified
    // authentication event. A storage failure is logged, not surfaced; the
    // request proceeds on the token's own say-so.
    if ctx.verified {
        if let Err(err) = services.roles.on_authenticated(&ctx).await {
            tracing::error!(error = %err, "failed to provision user for authenticated request");
        }
    }

    req.extensions_mut().insert(ctx);
    next.run(req).await
}
