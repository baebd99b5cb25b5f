//! `smartslate-auth` — authentication/authorization core.
//!
//! This crate owns the permission model, bearer-token verification, and
//! request-scoped identity resolution. It is decoupled from HTTP routing and
//! storage; the only I/O it performs is the remote key-set fetch inside the
//! token verifier.

pub mod claims;
pub mod context;
pub mod jwks;
pub mod permissions;
pub mod roles;
pub mod verifier;

pub use claims::{Claims, TokenPayload};
pub use context::{AuthContext, AuthResolver, ResolverConfig};
pub use permissions::Permission;
pub use roles::{Role, RoleSpec, permission_granted, permissions_for_roles, role_table};
pub use verifier::{TokenError, TokenVerifier, VerifierConfig};
