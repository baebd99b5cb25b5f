//! Infrastructure layer: persistent identity storage, the identity-provider
//! directory client, and the reconciliation job between the two.

pub mod directory;
pub mod identity;
pub mod role_store;
pub mod sync;

pub use directory::{DirectoryError, DirectoryUser, HttpUserDirectory, InMemoryUserDirectory, UserDirectory};
pub use identity::{IdentityStore, InMemoryIdentityStore, NewUser, PostgresIdentityStore, RoleRow, StoreError, UserRecord};
pub use role_store::RoleStore;
pub use sync::{IdentitySync, SyncError, SyncSummary};
