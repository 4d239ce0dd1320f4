//! Platform registry: the set of LMS platforms allowed to launch this tool.
//!
//! Platforms are keyed by issuer. A deployment with a single registered
//! platform may resolve without naming an issuer; with several, the issuer
//! is mandatory.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::LaunchError;
use crate::{Error, Result};

/// Registration of one platform (LMS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Issuer identifier, compared verbatim against `iss`.
    pub issuer: String,
    /// Client id the platform assigned to this tool.
    pub client_id: String,
    /// OIDC authorization endpoint the login redirect targets.
    pub auth_endpoint: Url,
    /// Where the platform publishes its signing keys.
    pub jwks_uri: Url,
    /// Registered deployment ids. Empty accepts any deployment.
    #[serde(default)]
    pub deployment_ids: Vec<String>,
}

impl PlatformConfig {
    /// Returns `true` if `deployment_id` is registered (or no list is configured).
    #[must_use]
    pub fn accepts_deployment(&self, deployment_id: &str) -> bool {
        self.deployment_ids.is_empty() || self.deployment_ids.iter().any(|d| d == deployment_id)
    }
}

/// Issuer-keyed registry of platforms.
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    platforms: HashMap<String, PlatformConfig>,
}

impl PlatformRegistry {
    /// Build a registry from platform configurations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if two platforms share an issuer.
    pub fn new(platforms: impl IntoIterator<Item = PlatformConfig>) -> Result<Self> {
        let mut map = HashMap::new();
        for platform in platforms {
            let issuer = platform.issuer.clone();
            if map.insert(issuer.clone(), platform).is_some() {
                return Err(Error::Config(format!("Duplicate platform issuer: {issuer}")));
            }
        }
        Ok(Self { platforms: map })
    }

    /// Resolve a platform.
    ///
    /// With an issuer, only an exact match succeeds. Without one, the sole
    /// registered platform is returned; an empty or multi-platform registry
    /// cannot answer and fails with [`LaunchError::UnknownIssuer`].
    pub fn resolve(&self, issuer: Option<&str>) -> std::result::Result<&PlatformConfig, LaunchError> {
        match issuer {
            Some(iss) => self
                .platforms
                .get(iss)
                .ok_or_else(|| LaunchError::UnknownIssuer(iss.to_string())),
            None if self.platforms.len() == 1 => self
                .platforms
                .values()
                .next()
                .ok_or_else(|| LaunchError::UnknownIssuer(String::new())),
            None => Err(LaunchError::UnknownIssuer(String::new())),
        }
    }

    /// Number of registered platforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    /// Returns `true` if no platform is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Registered issuers, sorted.
    #[must_use]
    pub fn issuers(&self) -> Vec<&str> {
        let mut issuers: Vec<&str> = self.platforms.keys().map(String::as_str).collect();
        issuers.sort_unstable();
        issuers
    }
}

#[cfg(test)]
pub(crate) fn test_platform(issuer: &str) -> PlatformConfig {
    PlatformConfig {
        issuer: issuer.to_string(),
        client_id: "tool-client".to_string(),
        auth_endpoint: Url::parse(&format!("{issuer}/auth")).unwrap(),
        jwks_uri: Url::parse(&format!("{issuer}/jwks")).unwrap(),
        deployment_ids: Vec::new(),
    }
}
