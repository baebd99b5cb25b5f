//! Role persistence glue: seeding the static role table into the store and
//! provisioning users on their first authenticated request.

use std::sync::Arc;

use tracing::instrument;

use smartslate_auth::{AuthContext, role_table};
use smartslate_auth::roles::{DEFAULT_ROLE, OWNER};

use crate::identity::{IdentityStore, NewUser, StoreError, UserRecord, normalize_email};

/// Seeds role rows and provisions/links users as authentication events arrive.
pub struct RoleStore {
    store: Arc<dyn IdentityStore>,
    owner_email: Option<String>,
}

impl RoleStore {
    pub fn new(store: Arc<dyn IdentityStore>, owner_email: Option<String>) -> Self {
        Self {
            store,
            owner_email: owner_email.map(|e| normalize_email(&e)),
        }
    }

    /// Mirror the static role table into the store. Idempotent; run at startup.
    #[instrument(skip(self), err)]
    pub async fn seed_roles(&self) -> Result<(), StoreError> {
        for spec in role_table() {
            self.store.upsert_role(spec.id, spec.description).await?;
        }
        Ok(())
    }

    /// Handle a verified authentication event: make sure a local user row
    /// exists for this identity and that it holds at least one role.
    ///
    /// Called on every authenticated request, so every step is idempotent.
    #[instrument(skip(self, ctx), fields(subject = ctx.subject.as_deref()), err)]
    pub async fn on_authenticated(&self, ctx: &AuthContext) -> Result<UserRecord, StoreError> {
        let user = self.ensure_user(ctx).await?;
        self.ensure_default_roles(&user).await?;
        Ok(user)
    }

    /// Find or create the local row for this identity.
    ///
    /// Lookup order: external id, then email. A create that loses a race
    /// surfaces as a unique-key conflict and is resolved by re-reading.
    pub async fn ensure_user(&self, ctx: &AuthContext) -> Result<UserRecord, StoreError> {
        let subject = ctx.subject.as_deref();
        let email = ctx.email.as_deref();

        if let Some(subject) = subject {
            if let Some(user) = self.store.find_user_by_external_id(subject).await? {
                return Ok(user);
            }
        }

        if let Some(email) = email {
            if let Some(user) = self.store.find_user_by_email(email).await? {
                if let Some(subject) = subject {
                    self.store.link_external_id(user.id, subject).await?;
                }
                return Ok(user);
            }
        }

        let display_name = ctx
            .claims
            .as_ref()
            .and_then(|c| c.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match self
            .store
            .create_user(NewUser {
                email: email.map(str::to_string),
                external_id: subject.map(str::to_string),
                display_name,
            })
            .await
        {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "provisioned local user on first login");
                Ok(user)
            }
            Err(StoreError::Conflict(_)) => {
                // Lost the race to a concurrent first login; the row exists now.
                if let Some(subject) = subject {
                    if let Some(user) = self.store.find_user_by_external_id(subject).await? {
                        return Ok(user);
                    }
                }
                if let Some(email) = email {
                    if let Some(user) = self.store.find_user_by_email(email).await? {
                        if let Some(subject) = subject {
                            self.store.link_external_id(user.id, subject).await?;
                        }
                        return Ok(user);
                    }
                }
                Err(StoreError::NotFound)
            }
            Err(other) => Err(other),
        }
    }

    /// Guarantee the user holds at least one role.
    ///
    /// The configured owner email is pinned to the `owner` role; everyone else
    /// with an empty assignment set receives the default role.
    pub async fn ensure_default_roles(&self, user: &UserRecord) -> Result<(), StoreError> {
        if let (Some(owner_email), Some(email)) = (&self.owner_email, &user.email) {
            if email == owner_email {
                let assigned = self.store.assign_role(user.id, OWNER.as_str()).await?;
                if assigned {
                    tracing::warn!(user_id = %user.id, "assigned owner role to configured owner email");
                }
            }
        }

        let held = self.store.roles_for_user(user.id).await?;
        if held.is_empty() {
            self.store.assign_role(user.id, DEFAULT_ROLE.as_str()).await?;
            tracing::info!(user_id = %user.id, role = DEFAULT_ROLE.as_str(), "assigned default role");
        }
        Ok(())
    }
}
