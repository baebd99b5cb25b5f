//! Static role definitions and the permission-union computation.
//!
//! Roles are defined in code and mirrored into the relational store for
//! foreign-key integrity; the table here is the single source of truth for
//! which permissions a role grants. All access guards ultimately rest on
//! [`permissions_for_roles`] and [`permission_granted`], so both are kept
//! deterministic, I/O-free, and exhaustively tested.

use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::permissions::{self, Permission};

/// Role identifier used for RBAC.
///
/// Opaque at this layer; the mapping to permissions lives in [`role_table`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The emergency super-user role (wildcard permission).
pub const OWNER: Role = Role::from_static("owner");

/// The role assigned to any authenticated identity that holds no other role.
pub const DEFAULT_ROLE: Role = Role::from_static("learner");

/// A role definition: stable string key, human description, granted permissions.
///
/// Immutable at runtime. The store mirrors these rows verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSpec {
    pub id: &'static str,
    pub description: &'static str,
    pub permissions: &'static [Permission],
}

const ROLE_TABLE: &[RoleSpec] = &[
    RoleSpec {
        id: "owner",
        description: "Platform owner with every permission",
        permissions: &[permissions::ALL],
    },
    RoleSpec {
        id: "admin",
        description: "Administrator for content, roles, and settings",
        permissions: &[
            permissions::COURSE_READ,
            permissions::COURSE_CREATE,
            permissions::COURSE_PUBLISH,
            permissions::ROLE_MANAGE,
            permissions::METRICS_READ,
            permissions::LEAD_READ,
            permissions::SETTINGS_WRITE,
        ],
    },
    RoleSpec {
        id: "smartslateCourse",
        description: "Course author",
        permissions: &[
            permissions::COURSE_READ,
            permissions::COURSE_CREATE,
            permissions::COURSE_PUBLISH,
        ],
    },
    RoleSpec {
        id: "learner",
        description: "Enrolled learner (default role)",
        permissions: &[permissions::COURSE_READ],
    },
];

/// The full static role table.
pub fn role_table() -> &'static [RoleSpec] {
    ROLE_TABLE
}

/// Look up a single role definition by its stable key.
pub fn role_spec(id: &str) -> Option<&'static RoleSpec> {
    ROLE_TABLE.iter().find(|spec| spec.id == id)
}

/// Compute the set union of the permissions granted by `roles`.
///
/// Unknown role identifiers are not an error: they are dropped from the union
/// and logged, so a misconfigured role claim degrades to fewer permissions
/// rather than a failed request.
pub fn permissions_for_roles(roles: &[Role]) -> HashSet<Permission> {
    let mut union = HashSet::new();
    for role in roles {
        match role_spec(role.as_str()) {
            Some(spec) => union.extend(spec.permissions.iter().cloned()),
            None => tracing::warn!(role = role.as_str(), "unknown role in claim; ignoring"),
        }
    }
    union
}

/// True iff `granted` contains the wildcard or `required` itself.
pub fn permission_granted(granted: &HashSet<Permission>, required: &Permission) -> bool {
    granted.contains(&permissions::ALL) || granted.contains(required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions;

    fn roles(ids: &[&'static str]) -> Vec<Role> {
        ids.iter().map(|id| Role::from_static(*id)).collect()
    }

    #[test]
    fn union_over_multiple_roles() {
        let perms = permissions_for_roles(&roles(&["smartslateCourse", "learner"]));
        assert!(perms.contains(&permissions::COURSE_CREATE));
        assert!(perms.contains(&permissions::COURSE_PUBLISH));
        assert!(perms.contains(&permissions::COURSE_READ));
        assert!(!perms.contains(&permissions::ROLE_MANAGE));
    }

    #[test]
    fn unknown_roles_are_ignored() {
        let perms = permissions_for_roles(&roles(&["nonsense", "alsoNotARole"]));
        assert!(perms.is_empty());

        // A known role mixed with unknowns still contributes its grants.
        let perms = permissions_for_roles(&roles(&["nonsense", "learner"]));
        assert_eq!(perms.len(), 1);
        assert!(perms.contains(&permissions::COURSE_READ));
    }

    #[test]
    fn empty_role_list_grants_nothing() {
        assert!(permissions_for_roles(&[]).is_empty());
    }

    #[test]
    fn every_table_permission_is_granted_to_its_role() {
        for spec in role_table() {
            let perms = permissions_for_roles(&[Role::new(spec.id)]);
            for p in spec.permissions {
                assert!(
                    permission_granted(&perms, p),
                    "role '{}' should grant '{}'",
                    spec.id,
                    p
                );
            }
        }
    }

    #[test]
    fn wildcard_grants_everything() {
        let perms = permissions_for_roles(&[OWNER]);
        assert!(permission_granted(&perms, &permissions::COURSE_CREATE));
        assert!(permission_granted(&perms, &permissions::DATABASE_MANAGE));
        assert!(permission_granted(&perms, &Permission::new("never:declared")));
    }

    #[test]
    fn specific_grant_does_not_leak() {
        let perms = permissions_for_roles(&[DEFAULT_ROLE]);
        assert!(permission_granted(&perms, &permissions::COURSE_READ));
        assert!(!permission_granted(&perms, &permissions::COURSE_CREATE));
        assert!(!permission_granted(&perms, &permissions::ROLE_MANAGE));
    }

    #[test]
    fn default_and_owner_roles_exist_in_table() {
        assert!(role_spec(DEFAULT_ROLE.as_str()).is_some());
        assert!(role_spec(OWNER.as_str()).is_some());
    }
}
