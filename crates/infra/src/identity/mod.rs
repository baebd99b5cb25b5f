//! Persistent identity storage: users, role rows, and user→role assignments.
//!
//! The store is deliberately dumb: idempotent upserts keyed on unique
//! constraints, no application-level locking. Two near-simultaneous
//! first-logins for the same identity are resolved by the unique keys on
//! `email` / `external_id`, with the losing writer's conflict treated as an
//! already-exists outcome rather than an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use smartslate_core::UserId;

mod memory;
mod postgres;

pub use memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;

/// A locally-stored user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    /// Unique when present; stored lowercased.
    pub email: Option<String>,
    /// The identity provider's subject id. Set at most once, never rewritten.
    pub external_id: Option<String>,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a user insert.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: Option<String>,
    pub external_id: Option<String>,
    pub display_name: Option<String>,
}

/// A persisted role definition row (mirror of the static table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRow {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint fired (duplicate email/external id/assignment).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(String),
}

/// Storage seam for users, roles, and assignments.
///
/// Backed by Postgres in production and by an in-memory map in tests; both
/// implementations share the same idempotency semantics.
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    /// Idempotent upsert of a role definition row, keyed on the role id.
    async fn upsert_role(&self, id: &str, description: &str) -> Result<(), StoreError>;

    async fn list_roles(&self) -> Result<Vec<RoleRow>, StoreError>;

    /// Lookup by email. `email` is matched case-insensitively.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a user. A duplicate email/external id is a [`StoreError::Conflict`];
    /// callers resolve the race by re-reading.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    /// Set the external-identity reference iff it is currently unset.
    ///
    /// Returns true when the row was updated. A record already carrying a
    /// *different* value is left untouched (and logged): the reference is
    /// write-once.
    async fn link_external_id(&self, id: UserId, external_id: &str) -> Result<bool, StoreError>;

    /// Backfill a missing display name. Returns true when the row was updated.
    async fn set_display_name_if_missing(&self, id: UserId, name: &str)
    -> Result<bool, StoreError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    async fn roles_for_user(&self, id: UserId) -> Result<Vec<String>, StoreError>;

    /// Assign a role. Returns false when the user already held it (no-op).
    async fn assign_role(&self, id: UserId, role_id: &str) -> Result<bool, StoreError>;

    /// Revoke a role. Returns false when the user did not hold it.
    async fn revoke_role(&self, id: UserId, role_id: &str) -> Result<bool, StoreError>;
}

/// Canonical form of an email for storage and joining: trimmed, lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
