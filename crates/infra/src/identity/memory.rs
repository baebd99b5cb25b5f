//! In-memory identity store for tests and local development.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::Utc;

use smartslate_core::UserId;

use super::{IdentityStore, NewUser, RoleRow, StoreError, UserRecord, normalize_email};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserRecord>,
    roles: BTreeMap<String, String>,
    assignments: BTreeSet<(UserId, String)>,
}

/// In-memory [`IdentityStore`] with the same conflict semantics as Postgres.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    inner: RwLock<Inner>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> Result<T, StoreError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| StoreError::Database("poisoned lock".to_string()))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::Database("poisoned lock".to_string()))?;
        f(&mut guard)
    }
}

#[async_trait::async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn upsert_role(&self, id: &str, description: &str) -> Result<(), StoreError> {
        self.write(|inner| {
            inner.roles.insert(id.to_string(), description.to_string());
            Ok(())
        })
    }

    async fn list_roles(&self) -> Result<Vec<RoleRow>, StoreError> {
        self.read(|inner| {
            inner
                .roles
                .iter()
                .map(|(id, description)| RoleRow {
                    id: id.clone(),
                    description: description.clone(),
                })
                .collect()
        })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let email = normalize_email(email);
        self.read(|inner| {
            inner
                .users
                .values()
                .find(|u| u.email.as_deref() == Some(email.as_str()))
                .cloned()
        })
    }

    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.read(|inner| {
            inner
                .users
                .values()
                .find(|u| u.external_id.as_deref() == Some(external_id))
                .cloned()
        })
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let email = user.email.as_deref().map(normalize_email);
        self.write(|inner| {
            if let Some(email) = &email {
                if inner
                    .users
                    .values()
                    .any(|u| u.email.as_deref() == Some(email.as_str()))
                {
                    return Err(StoreError::Conflict(format!("email '{email}' exists")));
                }
            }
            if let Some(ext) = &user.external_id {
                if inner
                    .users
                    .values()
                    .any(|u| u.external_id.as_deref() == Some(ext.as_str()))
                {
                    return Err(StoreError::Conflict(format!("external id '{ext}' exists")));
                }
            }

            let now = Utc::now();
            let record = UserRecord {
                id: UserId::new(),
                email,
                external_id: user.external_id,
                display_name: user.display_name,
                created_at: now,
                updated_at: now,
            };
            inner.users.insert(record.id, record.clone());
            Ok(record)
        })
    }

    async fn link_external_id(&self, id: UserId, external_id: &str) -> Result<bool, StoreError> {
        self.write(|inner| {
            let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
            match &user.external_id {
                None => {
                    user.external_id = Some(external_id.to_string());
                    user.updated_at = Utc::now();
                    Ok(true)
                }
                Some(existing) if existing == external_id => Ok(false),
                Some(existing) => {
                    tracing::warn!(
                        user_id = %id,
                        existing = %existing,
                        offered = %external_id,
                        "refusing to overwrite external identity reference"
                    );
                    Ok(false)
                }
            }
        })
    }

    async fn set_display_name_if_missing(
        &self,
        id: UserId,
        name: &str,
    ) -> Result<bool, StoreError> {
        self.write(|inner| {
            let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
            if user.display_name.is_some() {
                return Ok(false);
            }
            user.display_name = Some(name.to_string());
            user.updated_at = Utc::now();
            Ok(true)
        })
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.read(|inner| {
            let mut users: Vec<_> = inner.users.values().cloned().collect();
            users.sort_by_key(|u| u.created_at);
            users
        })
    }

    async fn roles_for_user(&self, id: UserId) -> Result<Vec<String>, StoreError> {
        self.read(|inner| {
            inner
                .assignments
                .iter()
                .filter(|(user_id, _)| *user_id == id)
                .map(|(_, role_id)| role_id.clone())
                .collect()
        })
    }

    async fn assign_role(&self, id: UserId, role_id: &str) -> Result<bool, StoreError> {
        self.write(|inner| {
            if !inner.users.contains_key(&id) {
                return Err(StoreError::NotFound);
            }
            Ok(inner.assignments.insert((id, role_id.to_string())))
        })
    }

    async fn revoke_role(&self, id: UserId, role_id: &str) -> Result<bool, StoreError> {
        self.write(|inner| Ok(inner.assignments.remove(&(id, role_id.to_string()))))
    }
}
