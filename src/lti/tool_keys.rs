//! The tool's own public key set, published at `/lti/jwks`.
//!
//! Derived once from the configured RSA private key. A missing or unusable
//! key yields an empty set: the endpoint stays up, and platforms simply
//! cannot verify tool-signed messages.

use jsonwebtoken::{
    Algorithm, EncodingKey,
    jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse},
};
use tracing::{info, warn};

/// Default `kid` stamped on the tool's public key.
pub const DEFAULT_TOOL_KEY_ID: &str = "lti-tool-key";

/// Public half of the tool's key material.
#[derive(Debug, Clone)]
pub struct ToolKeys {
    jwks: JwkSet,
}

impl Default for ToolKeys {
    fn default() -> Self {
        Self {
            jwks: JwkSet { keys: Vec::new() },
        }
    }
}

impl ToolKeys {
    /// Derive the public key set from an optional PEM private key.
    ///
    /// Never fails; derivation errors are logged and produce an empty set.
    #[must_use]
    pub fn from_pem(private_key_pem: Option<&str>, key_id: &str) -> Self {
        let Some(pem) = private_key_pem.filter(|p| !p.trim().is_empty()) else {
            info!("No tool private key configured; publishing an empty JWKS");
            return Self::default();
        };

        match derive_public_jwk(pem, key_id) {
            Ok(jwk) => Self {
                jwks: JwkSet { keys: vec![jwk] },
            },
            Err(e) => {
                warn!(error = %e, "Failed to derive tool public key; publishing an empty JWKS");
                Self::default()
            }
        }
    }

    /// The JWKS document (`{"keys": [...]}`).
    #[must_use]
    pub fn public_jwks(&self) -> &JwkSet {
        &self.jwks
    }

    /// Returns `true` if a public key is being published.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.jwks.keys.is_empty()
    }
}

fn derive_public_jwk(pem: &str, key_id: &str) -> jsonwebtoken::errors::Result<Jwk> {
    let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())?;
    let mut jwk = Jwk::from_encoding_key(&encoding_key, Algorithm::RS256)?;
    jwk.common.public_key_use = Some(PublicKeyUse::Signature);
    jwk.common.key_algorithm = Some(KeyAlgorithm::RS256);
    jwk.common.key_id = Some(key_id.to_string());
    Ok(jwk)
}
