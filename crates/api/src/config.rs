//! Environment-sourced configuration for the API binary.

use smartslate_auth::{ResolverConfig, VerifierConfig};

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Shared HMAC secret for symmetric tokens.
    pub jwt_secret: Option<String>,
    /// Identity-provider base URL; also the directory API base.
    pub auth_base_url: Option<String>,
    /// Explicit key-set URL override.
    pub jwks_url: Option<String>,
    /// Administrative override: this email is always granted `owner`.
    pub owner_email: Option<String>,
    /// Degraded-mode identity from unverified token decode. Never in prod.
    pub allow_unverified: bool,
    /// Service credential for the directory API.
    pub directory_token: Option<String>,
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            bind_addr: env_var("SMARTSLATE_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            jwt_secret: env_var("SMARTSLATE_JWT_SECRET"),
            auth_base_url: env_var("SMARTSLATE_AUTH_BASE_URL"),
            jwks_url: env_var("SMARTSLATE_JWKS_URL"),
            owner_email: env_var("SMARTSLATE_OWNER_EMAIL"),
            allow_unverified: env_flag("SMARTSLATE_ALLOW_UNVERIFIED_AUTH"),
            directory_token: env_var("SMARTSLATE_DIRECTORY_TOKEN"),
            database_url: env_var("DATABASE_URL"),
        };

        if config.jwt_secret.is_none() && config.jwks_url.is_none() && config.auth_base_url.is_none()
        {
            tracing::warn!(
                "no token verification source configured; every bearer token will be rejected"
            );
        }
        if config.allow_unverified {
            tracing::warn!("unverified token fallback is enabled; do not run this in production");
        }
        if config.owner_email.is_some() {
            tracing::warn!("owner-email override is configured");
        }

        config
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            shared_secret: self.jwt_secret.clone(),
            jwks_url: self.jwks_url.clone(),
            provider_base_url: self.auth_base_url.clone(),
            fetch_timeout: None,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            owner_email: self.owner_email.clone(),
            allow_unverified: self.allow_unverified,
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(name: &str) -> bool {
    matches!(
        env_var(name).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}
