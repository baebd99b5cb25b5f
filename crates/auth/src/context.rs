//! Request-scoped identity resolution.
//!
//! Turns an `Authorization` header into an [`AuthContext`]: subject, email,
//! roles, and the effective permission set. Resolution never fails: a
//! missing, malformed, or unverifiable token yields the anonymous context,
//! because many endpoints are public and the guards decide what to reject.

use std::collections::HashSet;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::claims::TokenPayload;
use crate::permissions::Permission;
use crate::roles::{self, Role, permission_granted, permissions_for_roles};
use crate::verifier::TokenVerifier;

/// The resolved, request-scoped identity and permission set.
///
/// Ephemeral: reconstructed on every request, never persisted.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The identity provider's subject id, when a token was presented.
    pub subject: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<Role>,
    pub permissions: HashSet<Permission>,
    /// False when the context came from the unverified fallback decode.
    /// Unverified contexts carry no permissions.
    pub verified: bool,
    /// The full raw claim set, for introspection.
    pub claims: Option<serde_json::Value>,
}

impl AuthContext {
    /// The context for a request with no usable credentials.
    pub fn anonymous() -> Self {
        Self {
            subject: None,
            email: None,
            roles: Vec::new(),
            permissions: HashSet::new(),
            verified: false,
            claims: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.subject.is_some()
    }

    pub fn has_permission(&self, required: &Permission) -> bool {
        permission_granted(&self.permissions, required)
    }
}

/// Resolver configuration, sourced from the environment by the API layer.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Administrative override: this email is always granted the `owner` role.
    /// Security-sensitive; every application of the override is audit-logged.
    pub owner_email: Option<String>,
    /// Enable the unverified payload-decode fallback. Never set in production:
    /// the decoded identity is spoofable, so the resulting context is marked
    /// unverified and holds no permissions.
    pub allow_unverified: bool,
}

/// Produces an [`AuthContext`] from an inbound request's authorization header.
pub struct AuthResolver {
    verifier: TokenVerifier,
    config: ResolverConfig,
}

impl AuthResolver {
    pub fn new(verifier: TokenVerifier, config: ResolverConfig) -> Self {
        Self { verifier, config }
    }

    /// Resolve the caller's identity. Infallible by design.
    pub async fn resolve(&self, authorization: Option<&str>) -> AuthContext {
        let Some(token) = extract_bearer(authorization) else {
            return AuthContext::anonymous();
        };

        match self.verifier.verify(token).await {
            Ok(payload) => self.context_from_payload(payload, true),
            Err(err) => {
                tracing::debug!(error = %err, "token verification failed");
                if !self.config.allow_unverified {
                    return AuthContext::anonymous();
                }
                match decode_unverified(token) {
                    Some(payload) => {
                        tracing::warn!(
                            subject = %payload.claims.sub,
                            "serving identity from unverified token decode"
                        );
                        self.context_from_payload(payload, false)
                    }
                    None => AuthContext::anonymous(),
                }
            }
        }
    }

    fn context_from_payload(&self, payload: TokenPayload, verified: bool) -> AuthContext {
        let claims = payload.claims;
        let mut role_list: Vec<Role> = claims.roles.into_iter().map(Role::new).collect();

        // Owner override only applies to verified identities; an unverified
        // payload is attacker-controlled.
        if verified {
            if let (Some(owner_email), Some(email)) = (&self.config.owner_email, &claims.email) {
                if email.eq_ignore_ascii_case(owner_email)
                    && !role_list.iter().any(|r| r.as_str() == roles::OWNER.as_str())
                {
                    tracing::warn!(email = %email, "owner-email override applied");
                    role_list.push(roles::OWNER);
                }
            }
        }

        let permissions = if verified {
            permissions_for_roles(&role_list)
        } else {
            HashSet::new()
        };

        AuthContext {
            subject: Some(claims.sub),
            email: claims.email,
            roles: role_list,
            permissions,
            verified,
            claims: Some(payload.raw),
        }
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Decode a token's payload segment without any signature check.
///
/// Degraded-mode identity extraction only; the result must never be trusted
/// for authorization.
fn decode_unverified(token: &str) -> Option<TokenPayload> {
    let payload_segment = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload_segment).ok()?;
    let raw: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    TokenPayload::from_raw(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions;
    use crate::verifier::VerifierConfig;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn now_epoch() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn mint(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn resolver(config: ResolverConfig) -> AuthResolver {
        let verifier = TokenVerifier::new(VerifierConfig {
            shared_secret: Some(SECRET.to_string()),
            ..Default::default()
        });
        AuthResolver::new(verifier, config)
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer(Some("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(Some("Bearer   abc  ")), Some("abc"));
        assert_eq!(extract_bearer(Some("Basic abc")), None);
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(None), None);
    }

    #[tokio::test]
    async fn missing_header_yields_anonymous() {
        let ctx = resolver(ResolverConfig::default()).resolve(None).await;
        assert!(!ctx.is_authenticated());
        assert!(ctx.roles.is_empty());
        assert!(ctx.permissions.is_empty());
    }

    #[tokio::test]
    async fn valid_token_resolves_roles_and_permissions() {
        let token = mint(
            SECRET,
            json!({
                "sub": "auth0|alice",
                "email": "alice@x.com",
                "roles": ["smartslateCourse"],
                "exp": now_epoch() + 600,
            }),
        );

        let ctx = resolver(ResolverConfig::default())
            .resolve(Some(&format!("Bearer {token}")))
            .await;

        assert_eq!(ctx.subject.as_deref(), Some("auth0|alice"));
        assert!(ctx.verified);
        assert!(ctx.has_permission(&permissions::COURSE_CREATE));
        assert!(!ctx.has_permission(&permissions::ROLE_MANAGE));
        assert!(ctx.claims.is_some());
    }

    #[tokio::test]
    async fn owner_override_forces_owner_role() {
        let token = mint(
            SECRET,
            json!({
                "sub": "auth0|boss",
                "email": "Founder@Smartslate.io",
                "roles": ["learner"],
                "exp": now_epoch() + 600,
            }),
        );

        let ctx = resolver(ResolverConfig {
            owner_email: Some("founder@smartslate.io".to_string()),
            allow_unverified: false,
        })
        .resolve(Some(&format!("Bearer {token}")))
        .await;

        assert!(ctx.roles.iter().any(|r| r.as_str() == "owner"));
        // Wildcard via owner.
        assert!(ctx.has_permission(&permissions::DATABASE_MANAGE));
    }

    #[tokio::test]
    async fn owner_override_does_not_apply_to_other_emails() {
        let token = mint(
            SECRET,
            json!({
                "sub": "auth0|mallory",
                "email": "mallory@x.com",
                "roles": ["learner"],
                "exp": now_epoch() + 600,
            }),
        );

        let ctx = resolver(ResolverConfig {
            owner_email: Some("founder@smartslate.io".to_string()),
            allow_unverified: false,
        })
        .resolve(Some(&format!("Bearer {token}")))
        .await;

        assert!(!ctx.roles.iter().any(|r| r.as_str() == "owner"));
    }

    #[tokio::test]
    async fn bad_token_without_fallback_is_anonymous() {
        let token = mint(
            "wrong-secret",
            json!({
                "sub": "auth0|alice",
                "roles": ["owner"],
                "exp": now_epoch() + 600,
            }),
        );

        let ctx = resolver(ResolverConfig::default())
            .resolve(Some(&format!("Bearer {token}")))
            .await;

        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn unverified_fallback_extracts_identity_without_permissions() {
        let token = mint(
            "wrong-secret",
            json!({
                "sub": "auth0|alice",
                "email": "alice@x.com",
                "roles": ["owner"],
                "exp": now_epoch() + 600,
            }),
        );

        let ctx = resolver(ResolverConfig {
            owner_email: None,
            allow_unverified: true,
        })
        .resolve(Some(&format!("Bearer {token}")))
        .await;

        assert_eq!(ctx.subject.as_deref(), Some("auth0|alice"));
        assert!(!ctx.verified);
        // The claimed roles are visible but grant nothing.
        assert!(ctx.roles.iter().any(|r| r.as_str() == "owner"));
        assert!(ctx.permissions.is_empty());
        assert!(!ctx.has_permission(&permissions::COURSE_READ));
    }

    #[tokio::test]
    async fn unverified_fallback_never_applies_owner_override() {
        let token = mint(
            "wrong-secret",
            json!({
                "sub": "auth0|mallory",
                "email": "founder@smartslate.io",
                "exp": now_epoch() + 600,
            }),
        );

        let ctx = resolver(ResolverConfig {
            owner_email: Some("founder@smartslate.io".to_string()),
            allow_unverified: true,
        })
        .resolve(Some(&format!("Bearer {token}")))
        .await;

        assert!(!ctx.verified);
        assert!(!ctx.roles.iter().any(|r| r.as_str() == "owner"));
        assert!(ctx.permissions.is_empty());
    }
}
