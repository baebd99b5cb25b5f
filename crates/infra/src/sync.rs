//! Bidirectional reconciliation between the local user table and the external
//! directory.
//!
//! Email (lowercased) is the sole join key. The run is two phases:
//!
//! 1. Directory → local: every directory user with an email gets a local row,
//!    an external-id link, and a display-name backfill as needed.
//! 2. Local → directory: every local user with an email the directory does
//!    not know is created there, and the returned id is linked back.
//!
//! A per-user failure is recorded in the summary and the run continues. Runs
//! are single-flight; a second caller gets [`SyncError::AlreadyRunning`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::directory::{DirectoryError, UserDirectory};
use crate::identity::{IdentityStore, NewUser, StoreError, normalize_email};

/// Outcome of one reconciliation run. All-zero on a no-op rerun.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Local rows created from directory users.
    pub local_created: usize,
    /// Local rows linked or backfilled.
    pub local_updated: usize,
    /// Directory users created from local rows.
    pub directory_created: usize,
    /// Per-user failures; the run continued past each.
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Another run is in flight.
    #[error("a sync run is already in progress")]
    AlreadyRunning,

    /// The initial directory listing failed; nothing was reconciled.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reconciles the local identity store with the external directory.
pub struct IdentitySync {
    store: Arc<dyn IdentityStore>,
    directory: Arc<dyn UserDirectory>,
    running: AtomicBool,
}

impl IdentitySync {
    pub fn new(store: Arc<dyn IdentityStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            store,
            directory,
            running: AtomicBool::new(false),
        }
    }

    /// Run one reconciliation pass. Single-flight.
    #[instrument(skip(self), err)]
    pub async fn run(&self) -> Result<SyncSummary, SyncError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyRunning);
        }
        let result = self.run_inner().await;
        self.running.store(false, Ordering::SeqCst);

        if let Ok(summary) = &result {
            tracing::info!(
                local_created = summary.local_created,
                local_updated = summary.local_updated,
                directory_created = summary.directory_created,
                error_count = summary.errors.len(),
                "identity sync finished"
            );
        }
        result
    }

    async fn run_inner(&self) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();
        let directory_users = self.directory.list_users().await?;

        // Phase 1: directory → local.
        let mut directory_emails = std::collections::HashSet::new();
        for remote in &directory_users {
            let Some(email) = remote.email.as_deref() else {
                continue;
            };
            let email = normalize_email(email);
            directory_emails.insert(email.clone());

            if let Err(err) = self.import_remote(&email, remote, &mut summary).await {
                summary
                    .errors
                    .push(format!("import '{}': {}", email, err));
            }
        }

        // Phase 2: local → directory.
        let local_users = self.store.list_users().await?;
        for local in &local_users {
            let Some(email) = local.email.as_deref() else {
                continue;
            };
            if directory_emails.contains(email) {
                continue;
            }

            match self
                .directory
                .create_user(email, local.display_name.as_deref())
                .await
            {
                Ok(created) => {
                    summary.directory_created += 1;
                    if let Err(err) = self.store.link_external_id(local.id, &created.id).await {
                        summary
                            .errors
                            .push(format!("link '{}': {}", email, err));
                    }
                }
                Err(err) => {
                    summary
                        .errors
                        .push(format!("export '{}': {}", email, err));
                }
            }
        }

        Ok(summary)
    }

    /// Make sure one directory user has a matching, linked local row.
    async fn import_remote(
        &self,
        email: &str,
        remote: &crate::directory::DirectoryUser,
        summary: &mut SyncSummary,
    ) -> Result<(), StoreError> {
        let local = match self.store.find_user_by_email(email).await? {
            Some(local) => local,
            None => {
                let created = self
                    .store
                    .create_user(NewUser {
                        email: Some(email.to_string()),
                        external_id: Some(remote.id.clone()),
                        display_name: remote.display_name.clone(),
                    })
                    .await;

                match created {
                    Ok(local) => {
                        summary.local_created += 1;
                        tracing::info!(user_id = %local.id, "created local user from directory");
                        return Ok(());
                    }
                    // Lost a race with a concurrent login; fall through and link.
                    Err(StoreError::Conflict(_)) => self
                        .store
                        .find_user_by_email(email)
                        .await?
                        .ok_or(StoreError::NotFound)?,
                    Err(other) => return Err(other),
                }
            }
        };

        let mut updated = false;
        if self.store.link_external_id(local.id, &remote.id).await? {
            updated = true;
        }
        if let Some(name) = remote.display_name.as_deref() {
            if self.store.set_display_name_if_missing(local.id, name).await? {
                updated = true;
            }
        }
        if updated {
            summary.local_updated += 1;
        }
        Ok(())
    }
}
