//! Access guards called by handlers after the middleware has resolved the
//! request's [`AuthContext`].
//!
//! Responses are deliberately generic: a 403 never names the permission that
//! was required, and the same 401 covers a missing, malformed, and rejected
//! token alike.

use axum::http::StatusCode;

use smartslate_auth::{AuthContext, Permission};

use crate::app::errors::json_error;

/// Require any authenticated identity (verified or degraded).
pub fn require_auth(ctx: &AuthContext) -> Result<(), axum::response::Response> {
    if !ctx.is_authenticated() {
        return Err(json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "authentication required",
        ));
    }
    Ok(())
}

/// Require a verified identity holding `required`.
///
/// An unverified (fallback-decoded) context is authenticated but carries no
/// permissions, so it always fails here.
pub fn require_permission(
    ctx: &AuthContext,
    required: &Permission,
) -> Result<(), axum::response::Response> {
    require_auth(ctx)?;

    if !ctx.verified || !ctx.has_permission(required) {
        return Err(json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "insufficient permissions",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use smartslate_auth::{Role, permissions, permissions_for_roles};

    fn ctx_with_roles(roles: &[&'static str], verified: bool) -> AuthContext {
        let roles: Vec<Role> = roles.iter().map(|r| Role::from_static(*r)).collect();
        let mut ctx = AuthContext::anonymous();
        ctx.subject = Some("auth0|someone".to_string());
        ctx.permissions = if verified {
            permissions_for_roles(&roles)
        } else {
            Default::default()
        };
        ctx.roles = roles;
        ctx.verified = verified;
        ctx
    }

    #[test]
    fn anonymous_is_unauthenticated() {
        let err = require_auth(&AuthContext::anonymous()).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err =
            require_permission(&AuthContext::anonymous(), &permissions::COURSE_READ).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn course_author_can_create_courses() {
        let ctx = ctx_with_roles(&["smartslateCourse"], true);
        assert!(require_permission(&ctx, &permissions::COURSE_CREATE).is_ok());
        assert!(require_permission(&ctx, &permissions::COURSE_PUBLISH).is_ok());
    }

    #[test]
    fn learner_cannot_create_courses() {
        let ctx = ctx_with_roles(&["learner"], true);
        assert!(require_permission(&ctx, &permissions::COURSE_READ).is_ok());

        let err = require_permission(&ctx, &permissions::COURSE_CREATE).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn owner_wildcard_passes_every_guard() {
        let ctx = ctx_with_roles(&["owner"], true);
        assert!(require_permission(&ctx, &permissions::COURSE_CREATE).is_ok());
        assert!(require_permission(&ctx, &permissions::DATABASE_MANAGE).is_ok());
        assert!(require_permission(&ctx, &permissions::ROLE_MANAGE).is_ok());
    }

    #[test]
    fn unverified_identity_passes_auth_but_no_permission_guard() {
        let ctx = ctx_with_roles(&["owner"], false);
        assert!(require_auth(&ctx).is_ok());

        let err = require_permission(&ctx, &permissions::COURSE_READ).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
