use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque capability tags (e.g. "course:create").
/// The special wildcard permission `"*"` grants every permission; it is the
/// only form of combination the model supports (no hierarchies).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every permission, granted via the wildcard.
pub const ALL: Permission = Permission::from_static("*");

pub const COURSE_READ: Permission = Permission::from_static("course:read");
pub const COURSE_CREATE: Permission = Permission::from_static("course:create");
pub const COURSE_PUBLISH: Permission = Permission::from_static("course:publish");
pub const ROLE_MANAGE: Permission = Permission::from_static("role:manage");
pub const METRICS_READ: Permission = Permission::from_static("metrics:read");
pub const DATABASE_MANAGE: Permission = Permission::from_static("database:manage");
pub const LEAD_READ: Permission = Permission::from_static("lead:read");
pub const SETTINGS_WRITE: Permission = Permission::from_static("settings:write");
