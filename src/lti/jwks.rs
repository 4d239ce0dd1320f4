//! Platform signing keys: JWKS retrieval and caching.
//!
//! # Key selection
//!
//! 1. Keys are cached per JWKS URI for the configured TTL (default 1 hour).
//! 2. A `kid` missing from the cached set triggers a single forced refresh,
//!    so platform key rotation is picked up without a restart; a `kid` still
//!    missing afterwards is an error, not a refetch loop. Forced refreshes of
//!    one URI are at least [`MIN_FORCED_REFRESH_INTERVAL`] apart; inside that
//!    window an unknown `kid` fails against the cached set.
//! 3. A token without `kid` is only accepted when the set holds exactly one
//!    usable RSA signing key.
//!
//! Every fetch is bounded by `fetch_timeout`, whatever the fetcher does
//! internally. No lock is held while a fetch is in flight.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, Jwk, JwkSet, PublicKeyUse},
};
use tokio::time::Instant;
use tracing::debug;

use crate::config::JwksConfig;

/// Minimum spacing between two forced refreshes of the same JWKS URI.
pub const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Error variants for key retrieval.
#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    /// Network or HTTP error while fetching JWKS.
    #[error("JWKS fetch error: {0}")]
    Http(#[from] reqwest::Error),

    /// The JWKS endpoint answered with a non-success status.
    #[error("JWKS endpoint returned HTTP {0}")]
    Status(u16),

    /// The fetch did not complete within the timeout.
    #[error("JWKS fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The `kid` in the JWT header is not in the platform's JWKS, even after refresh.
    #[error("Unknown key ID: {0}")]
    UnknownKeyId(String),

    /// No `kid` in the header and the set does not hold exactly one candidate key.
    #[error("JWT has no 'kid' and the key set holds {0} candidate keys")]
    AmbiguousKey(usize),

    /// The matching JWK is not an RSA signing key.
    #[error("Key {0} is not a usable RSA signing key")]
    UnsupportedKey(String),
}

/// Source of JWK sets.
///
/// [`HttpJwksFetcher`] is the production implementation; tests and embedders
/// can supply keys from elsewhere.
#[async_trait::async_trait]
pub trait JwksFetcher: Send + Sync + 'static {
    /// Fetch the key set published at `jwks_uri`.
    async fn fetch(&self, jwks_uri: &str) -> Result<JwkSet, JwksError>;
}

/// Fetches JWKS documents over HTTP(S).
pub struct HttpJwksFetcher {
    http: reqwest::Client,
}

impl HttpJwksFetcher {
    /// Build a fetcher from the JWKS configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &JwksConfig) -> Result<Self, JwksError> {
        let http = reqwest::Client::builder()
            .https_only(config.require_https)
            .timeout(config.fetch_timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, jwks_uri: &str) -> Result<JwkSet, JwksError> {
        let response = self.http.get(jwks_uri).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(JwksError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

/// Cached JWKS entry.
struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
    /// Last refresh triggered by an unknown `kid`.
    forced_at: Option<Instant>,
}

/// JWKS cache: one entry per JWKS URI.
pub struct JwksCache {
    inner: DashMap<String, CachedJwks>,
    fetcher: Arc<dyn JwksFetcher>,
    ttl: Duration,
    fetch_timeout: Duration,
}

impl JwksCache {
    /// Create a cache over `fetcher` with the configured TTL and timeout.
    #[must_use]
    pub fn new(fetcher: Arc<dyn JwksFetcher>, config: &JwksConfig) -> Self {
        Self {
            inner: DashMap::new(),
            fetcher,
            ttl: config.cache_ttl,
            fetch_timeout: config.fetch_timeout,
        }
    }

    /// Return the cached JWKS for `jwks_uri`, fetching it if stale or absent.
    ///
    /// If `force_refresh` is `true`, the cache is bypassed regardless of TTL.
    pub async fn get_or_fetch(&self, jwks_uri: &str, force_refresh: bool) -> Result<JwkSet, JwksError> {
        if !force_refresh {
            if let Some(cached) = self.inner.get(jwks_uri) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(jwks_uri = %jwks_uri, force_refresh, "Fetching platform JWKS");
        let keys = tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(jwks_uri))
            .await
            .map_err(|_| JwksError::Timeout(self.fetch_timeout))??;

        let now = Instant::now();
        let forced_at = if force_refresh {
            Some(now)
        } else {
            self.inner.get(jwks_uri).and_then(|cached| cached.forced_at)
        };
        self.inner.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys: keys.clone(),
                fetched_at: now,
                forced_at,
            },
        );

        Ok(keys)
    }

    /// Find the decoding key for a token, refreshing once on an unknown `kid`.
    pub async fn decoding_key(&self, jwks_uri: &str, kid: Option<&str>) -> Result<DecodingKey, JwksError> {
        let jwks = self.get_or_fetch(jwks_uri, false).await?;

        let Some(kid) = kid else {
            return sole_signing_key(&jwks);
        };

        if let Some(jwk) = find_jwk(&jwks, kid) {
            return to_decoding_key(jwk, kid);
        }

        if self.recently_forced(jwks_uri) {
            debug!(kid = %kid, "Key not found in cached JWKS, refresh on cooldown");
            return Err(JwksError::UnknownKeyId(kid.to_string()));
        }

        debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
        let jwks = self.get_or_fetch(jwks_uri, true).await?;
        let jwk = find_jwk(&jwks, kid).ok_or_else(|| JwksError::UnknownKeyId(kid.to_string()))?;
        to_decoding_key(jwk, kid)
    }

    fn recently_forced(&self, jwks_uri: &str) -> bool {
        self.inner
            .get(jwks_uri)
            .and_then(|cached| cached.forced_at)
            .is_some_and(|at| at.elapsed() < MIN_FORCED_REFRESH_INTERVAL)
    }

    /// Drop every cached key set.
    pub fn clear(&self) {
        self.inner.clear();
    }
}

fn is_signing_key(jwk: &Jwk) -> bool {
    !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
        && matches!(jwk.algorithm, AlgorithmParameters::RSA(_))
}

fn find_jwk<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
}

fn sole_signing_key(jwks: &JwkSet) -> Result<DecodingKey, JwksError> {
    let candidates: Vec<&Jwk> = jwks.keys.iter().filter(|jwk| is_signing_key(jwk)).collect();
    match candidates.as_slice() {
        [jwk] => to_decoding_key(jwk, jwk.common.key_id.as_deref().unwrap_or("<none>")),
        other => Err(JwksError::AmbiguousKey(other.len())),
    }
}

fn to_decoding_key(jwk: &Jwk, kid: &str) -> Result<DecodingKey, JwksError> {
    if !is_signing_key(jwk) {
        return Err(JwksError::UnsupportedKey(kid.to_string()));
    }
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|_| JwksError::UnsupportedKey(kid.to_string())),
        _ => Err(JwksError::UnsupportedKey(kid.to_string())),
    }
}
