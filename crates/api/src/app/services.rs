//! Infrastructure wiring shared by the router and the binary.

use std::sync::Arc;

use smartslate_auth::{AuthResolver, TokenVerifier};
use smartslate_infra::{
    HttpUserDirectory, IdentityStore, IdentitySync, InMemoryIdentityStore, PostgresIdentityStore,
    RoleStore,
};

use crate::config::AppConfig;

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub resolver: AuthResolver,
    pub roles: RoleStore,
    pub store: Arc<dyn IdentityStore>,
    /// Absent when no directory API is configured; the sync endpoint then
    /// answers 503.
    pub sync: Option<IdentitySync>,
}

/// Wire services from runtime configuration.
///
/// Storage is Postgres when `DATABASE_URL` is set, otherwise an in-memory
/// store (local development only). The schema and role table are ensured on
/// the way up.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn IdentityStore> = match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url).await?;
            let store = PostgresIdentityStore::new(pool);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using volatile in-memory storage");
            Arc::new(InMemoryIdentityStore::new())
        }
    };

    let roles = RoleStore::new(store.clone(), config.owner_email.clone());
    roles.seed_roles().await?;

    let resolver = AuthResolver::new(
        TokenVerifier::new(config.verifier_config()),
        config.resolver_config(),
    );

    let sync = config.auth_base_url.as_ref().map(|base| {
        let directory = Arc::new(HttpUserDirectory::new(
            base.clone(),
            config.directory_token.clone(),
        ));
        IdentitySync::new(store.clone(), directory)
    });

    Ok(AppServices {
        resolver,
        roles,
        store,
        sync,
    })
}
