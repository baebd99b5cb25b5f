//! Domain error model.

use thiserror::Error;

/// Domain-level error.
///
/// Deliberately small: storage conflicts live in the infra layer's own error
/// type, and authentication/authorization outcomes are expressed at the HTTP
/// guard boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
