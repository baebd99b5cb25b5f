//! Remote key-set (JWKS) resolution for asymmetric token verification.
//!
//! The fetched key set is cached for the process lifetime; a miss on the
//! token's `kid` triggers one re-fetch (provider key rotation). Duplicate
//! fetches on a cold start are acceptable: the cache is read-mostly and a
//! racing writer just stores the same keys again.

use std::time::Duration;

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::verifier::TokenError;

/// A single JSON Web Key as published by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key id, matched against the token header's `kid`.
    #[serde(default)]
    pub kid: Option<String>,
    /// Key type; only RSA keys are used for verification.
    pub kty: String,
    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Process-lifetime cache over a provider's key-set endpoint.
pub struct KeySetCache {
    url: String,
    http: reqwest::Client,
    fetch_timeout: Duration,
    cached: RwLock<Option<JwkSet>>,
}

impl KeySetCache {
    pub fn new(url: String, http: reqwest::Client, fetch_timeout: Duration) -> Self {
        Self {
            url,
            http,
            fetch_timeout,
            cached: RwLock::new(None),
        }
    }

    /// Seed the cache with a fixed key set (tests; offline verification).
    pub fn with_static_keys(keys: Vec<Jwk>) -> Self {
        Self {
            url: String::new(),
            http: reqwest::Client::new(),
            fetch_timeout: Duration::from_secs(1),
            cached: RwLock::new(Some(JwkSet { keys })),
        }
    }

    /// Resolve a decoding key for `kid`, fetching the key set as needed.
    ///
    /// A `kid` of `None` matches a key set containing exactly one key.
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, TokenError> {
        if let Some(key) = self.lookup(kid).await? {
            return Ok(key);
        }

        self.refresh().await?;

        match self.lookup(kid).await? {
            Some(key) => Ok(key),
            None => Err(TokenError::NoMatchingKey),
        }
    }

    async fn lookup(&self, kid: Option<&str>) -> Result<Option<DecodingKey>, TokenError> {
        let cache = self.cached.read().await;
        let Some(set) = cache.as_ref() else {
            return Ok(None);
        };

        let jwk = match kid {
            Some(kid) => set.keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
            None if set.keys.len() == 1 => set.keys.first(),
            None => None,
        };

        match jwk {
            Some(jwk) => Self::to_decoding_key(jwk).map(Some),
            None => Ok(None),
        }
    }

    async fn refresh(&self) -> Result<(), TokenError> {
        if self.url.is_empty() {
            // Static key set; nothing to re-fetch.
            return Ok(());
        }

        let set: JwkSet = self
            .http
            .get(&self.url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| TokenError::KeySetUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| TokenError::KeySetUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| TokenError::KeySetUnavailable(e.to_string()))?;

        tracing::debug!(url = %self.url, keys = set.keys.len(), "fetched remote key set");

        *self.cached.write().await = Some(set);
        Ok(())
    }

    fn to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, TokenError> {
        if jwk.kty != "RSA" {
            return Err(TokenError::NoMatchingKey);
        }
        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            return Err(TokenError::NoMatchingKey);
        };
        DecodingKey::from_rsa_components(n, e).map_err(|_| TokenError::NoMatchingKey)
    }
}
