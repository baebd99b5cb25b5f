//! Postgres-backed identity store implementation.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to [`StoreError`] as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate email or external id |
//! | RowNotFound | N/A | `NotFound` | Lookup on a missing user |
//! | Other | Any | `Database` | Connection failures, etc. |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use smartslate_core::UserId;

use super::{IdentityStore, NewUser, RoleRow, StoreError, UserRecord, normalize_email};

/// Postgres-backed user, role and assignment storage.
///
/// Uses the SQLx connection pool which is thread-safe (Arc + Send + Sync).
/// Uniqueness of email and external id is enforced by the database schema,
/// so concurrent creates surface as `Conflict` rather than duplicate rows.
#[derive(Debug, Clone)]
pub struct PostgresIdentityStore {
    pool: Arc<PgPool>,
}

impl PostgresIdentityStore {
    /// Create a new PostgresIdentityStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the identity tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT UNIQUE,
                external_id TEXT UNIQUE,
                display_name TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_roles (
                user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role_id TEXT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, role_id)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord, StoreError> {
    let id: uuid::Uuid = row
        .try_get("id")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let email: Option<String> = row
        .try_get("email")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let external_id: Option<String> = row
        .try_get("external_id")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let display_name: Option<String> = row
        .try_get("display_name")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let created_at: DateTime<Utc> = row
        .try_get("created_at")
        .map_err(|e| StoreError::Database(e.to_string()))?;
    let updated_at: DateTime<Utc> = row
        .try_get("updated_at")
        .map_err(|e| StoreError::Database(e.to_string()))?;

    Ok(UserRecord {
        id: UserId::from_uuid(id),
        email,
        external_id,
        display_name,
        created_at,
        updated_at,
    })
}

const USER_COLUMNS: &str = "id, email, external_id, display_name, created_at, updated_at";

#[async_trait::async_trait]
impl IdentityStore for PostgresIdentityStore {
    #[instrument(skip(self), err)]
    async fn upsert_role(&self, id: &str, description: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, description)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET description = EXCLUDED.description
            "#,
        )
        .bind(id)
        .bind(description)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_role", e))?;
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<RoleRow>, StoreError> {
        let rows = sqlx::query("SELECT id, description FROM roles ORDER BY id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        rows.into_iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                let description: String = row
                    .try_get("description")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                Ok(RoleRow { id, description })
            })
            .collect()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let email = normalize_email(email);
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(&email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email", e))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_external_id", e))?;

        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self, user), err)]
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let email = user.email.as_deref().map(normalize_email);
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (id, email, external_id, display_name)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(UserId::new().as_uuid())
        .bind(&email)
        .bind(&user.external_id)
        .bind(&user.display_name)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        user_from_row(&row)
    }

    async fn link_external_id(&self, id: UserId, external_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET external_id = $2, updated_at = NOW()
            WHERE id = $1 AND external_id IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(external_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("link_external_id", e))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Either the user does not exist or the reference is already set.
        let row = sqlx::query("SELECT external_id FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("link_external_id", e))?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => {
                let existing: Option<String> = row
                    .try_get("external_id")
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                if existing.as_deref() != Some(external_id) {
                    tracing::warn!(
                        user_id = %id,
                        offered = %external_id,
                        "refusing to overwrite external identity reference"
                    );
                }
                Ok(false)
            }
        }
    }

    async fn set_display_name_if_missing(
        &self,
        id: UserId,
        name: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET display_name = $2, updated_at = NOW()
            WHERE id = $1 AND display_name IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(name)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_display_name_if_missing", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_users", e))?;

        rows.iter().map(user_from_row).collect()
    }

    async fn roles_for_user(&self, id: UserId) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT role_id FROM user_roles WHERE user_id = $1 ORDER BY role_id ASC",
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("roles_for_user", e))?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("role_id")
                    .map_err(|e| StoreError::Database(e.to_string()))
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn assign_role(&self, id: UserId, role_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(id.as_uuid())
        .bind(role_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assign_role", e))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn revoke_role(&self, id: UserId, role_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(id.as_uuid())
            .bind(role_id)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke_role", e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Database(format!("error in {}: {}", operation, other)),
    }
}
