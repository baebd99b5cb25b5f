//! Token claims model (transport-agnostic).
//!
//! This is the minimal set of claims Smartslate expects from a verified token.
//! The role claim is tolerated in both shapes identity providers emit: a
//! single string or a list of strings.

use serde::{Deserialize, Deserializer, Serialize};

/// Decoded token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the identity provider's stable id for the caller.
    pub sub: String,

    /// Email, when the provider includes one.
    #[serde(default)]
    pub email: Option<String>,

    /// Role claim; accepts `"roles": "learner"` and `"roles": ["learner"]`,
    /// plus the singular `"role"` key some providers use.
    #[serde(default, alias = "role", deserialize_with = "string_or_list")]
    pub roles: Vec<String>,

    /// Expiry (seconds since epoch). Enforced by the verifier.
    pub exp: u64,
}

/// A verified (or, on the degraded path, merely decoded) token payload.
///
/// `raw` retains the full claim set so callers can surface provider-specific
/// claims without this crate enumerating them.
#[derive(Debug, Clone)]
pub struct TokenPayload {
    pub claims: Claims,
    pub raw: serde_json::Value,
}

impl TokenPayload {
    /// Parse the typed claims out of a raw payload value.
    pub fn from_raw(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let claims = serde_json::from_value(raw.clone())?;
        Ok(Self { claims, raw })
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RoleClaim {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<RoleClaim>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(RoleClaim::One(role)) => vec![role],
        Some(RoleClaim::Many(roles)) => roles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_claim_as_single_string() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "auth0|abc",
            "email": "a@x.com",
            "roles": "learner",
            "exp": 4102444800u64,
        }))
        .unwrap();
        assert_eq!(claims.roles, vec!["learner"]);
    }

    #[test]
    fn role_claim_as_list() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "auth0|abc",
            "roles": ["learner", "smartslateCourse"],
            "exp": 4102444800u64,
        }))
        .unwrap();
        assert_eq!(claims.roles, vec!["learner", "smartslateCourse"]);
        assert_eq!(claims.email, None);
    }

    #[test]
    fn singular_role_key_accepted() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "auth0|abc",
            "role": "admin",
            "exp": 4102444800u64,
        }))
        .unwrap();
        assert_eq!(claims.roles, vec!["admin"]);
    }

    #[test]
    fn missing_role_claim_is_empty() {
        let claims: Claims = serde_json::from_value(json!({
            "sub": "auth0|abc",
            "exp": 4102444800u64,
        }))
        .unwrap();
        assert!(claims.roles.is_empty());
    }

    #[test]
    fn payload_retains_raw_claims() {
        let raw = json!({
            "sub": "auth0|abc",
            "exp": 4102444800u64,
            "custom:plan": "enterprise",
        });
        let payload = TokenPayload::from_raw(raw).unwrap();
        assert_eq!(payload.raw["custom:plan"], "enterprise");
        assert_eq!(payload.claims.sub, "auth0|abc");
    }
}
