//! Launch validation: the `id_token` + `state` half of the handshake.
//!
//! # Verification flow
//!
//! 1. Consume the `state` (one-time, before anything else; even a forged
//!    token burns it).
//! 2. Pick the platform: the sole registered one, or by the token's
//!    unverified `iss` when several are registered.
//! 3. Fetch the platform's key for the header `kid` and verify signature,
//!    `exp`, `iss`, `aud` (and `azp` for multi-audience tokens).
//! 4. Compare the signed `nonce` with the one stored under the `state`.
//! 5. Check the `deployment_id` against the platform's registered list.
//! 6. Require LTI `version` `1.3.0`.
//!
//! Each step is terminal. Security checks (1–5) always run before the
//! client-correctable version check.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, TokenData, Validation};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::claims::{LTI_VERSION, LaunchClaims, LtiTokenClaims};
use super::error::LaunchError;
use super::jwks::JwksCache;
use super::registry::{PlatformConfig, PlatformRegistry};
use super::state::StateStore;

/// Default clock skew tolerance in seconds.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Validates launches against stored login state and platform keys.
pub struct LaunchValidator {
    registry: Arc<PlatformRegistry>,
    states: Arc<dyn StateStore>,
    jwks: Arc<JwksCache>,
    leeway_secs: u64,
}

impl LaunchValidator {
    /// Create a validator.
    #[must_use]
    pub fn new(
        registry: Arc<PlatformRegistry>,
        states: Arc<dyn StateStore>,
        jwks: Arc<JwksCache>,
        leeway_secs: u64,
    ) -> Self {
        Self {
            registry,
            states,
            jwks,
            leeway_secs,
        }
    }

    /// Validate a launch.
    ///
    /// # Errors
    ///
    /// - [`LaunchError::StateInvalid`] if `state` is unknown, expired, or used.
    /// - [`LaunchError::JwtInvalid`] if the token fails verification.
    /// - [`LaunchError::NonceMismatch`] if the token belongs to another login.
    /// - [`LaunchError::UnsupportedVersion`] if the LTI version is not `1.3.0`.
    pub async fn validate(&self, id_token: &str, state: &str) -> Result<LaunchClaims, LaunchError> {
        let Some(entry) = self.states.consume(state).await else {
            return Err(rejected(state, None, None, LaunchError::StateInvalid));
        };

        let platform = self
            .select_platform(id_token)
            .map_err(|e| rejected(state, None, None, e))?;

        let claims = self
            .verify_token(id_token, platform)
            .await
            .map_err(|e| rejected(state, Some(&platform.issuer), None, e))?;

        let nonce_matches: bool = claims.nonce.as_bytes().ct_eq(entry.nonce.as_bytes()).into();
        if !nonce_matches {
            return Err(rejected(state, Some(&claims.iss), Some(&claims.sub), LaunchError::NonceMismatch));
        }

        if !platform.accepts_deployment(&claims.deployment_id) {
            let err = LaunchError::jwt_invalid(format!(
                "deployment_id not registered: {:?}",
                claims.deployment_id
            ));
            return Err(rejected(state, Some(&claims.iss), Some(&claims.sub), err));
        }

        if claims.version != LTI_VERSION {
            let err = LaunchError::UnsupportedVersion(claims.version.clone());
            return Err(rejected(state, Some(&claims.iss), Some(&claims.sub), err));
        }

        info!(
            state = %state,
            issuer = %claims.iss,
            subject = %claims.sub,
            deployment_id = %claims.deployment_id,
            message_type = %claims.message_type,
            "LTI launch validated"
        );

        Ok(LaunchClaims::from(claims))
    }

    fn select_platform(&self, id_token: &str) -> Result<&PlatformConfig, LaunchError> {
        if self.registry.len() == 1 {
            return self.registry.resolve(None).map_err(LaunchError::jwt_invalid);
        }

        let issuer = peek_issuer(id_token)?;
        self.registry
            .resolve(Some(&issuer))
            .map_err(|_| LaunchError::jwt_invalid(format!("issuer not registered: {issuer}")))
    }

    async fn verify_token(&self, id_token: &str, platform: &PlatformConfig) -> Result<LtiTokenClaims, LaunchError> {
        let header = jsonwebtoken::decode_header(id_token).map_err(LaunchError::jwt_invalid)?;
        let alg = pinned_algorithm(header.alg)?;

        let key = self
            .jwks
            .decoding_key(platform.jwks_uri.as_str(), header.kid.as_deref())
            .await
            .map_err(LaunchError::jwt_invalid)?;

        let validation = build_validation(alg, platform, self.leeway_secs);
        let token_data: TokenData<LtiTokenClaims> =
            jsonwebtoken::decode(id_token, &key, &validation).map_err(LaunchError::jwt_invalid)?;
        let claims = token_data.claims;

        check_authorized_party(&claims, &platform.client_id)?;
        Ok(claims)
    }
}

/// Log a rejection with its audit context and hand the error back.
fn rejected(state: &str, issuer: Option<&str>, subject: Option<&str>, err: LaunchError) -> LaunchError {
    warn!(
        state = %state,
        issuer = issuer.unwrap_or("-"),
        subject = subject.unwrap_or("-"),
        error = err.code(),
        reason = %err.log_reason(),
        "LTI launch rejected"
    );
    err
}

/// Only the RSA family is acceptable for LTI platform tokens.
fn pinned_algorithm(alg: Algorithm) -> Result<Algorithm, LaunchError> {
    match alg {
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => Ok(alg),
        other => Err(LaunchError::jwt_invalid(format!("unsupported JWT algorithm: {other:?}"))),
    }
}

fn build_validation(alg: Algorithm, platform: &PlatformConfig, leeway_secs: u64) -> Validation {
    let mut v = Validation::new(alg);
    v.leeway = leeway_secs;
    v.set_issuer(&[platform.issuer.as_str()]);
    v.set_audience(&[platform.client_id.as_str()]);
    v.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
    v
}

/// OIDC Core 3.1.3.7: with several audiences `azp` must be present, and when
/// present it must be this client.
fn check_authorized_party(claims: &LtiTokenClaims, client_id: &str) -> Result<(), LaunchError> {
    match (&claims.azp, claims.aud.len() > 1) {
        (Some(azp), _) if azp != client_id => {
            Err(LaunchError::jwt_invalid(format!("azp {azp:?} is not this client")))
        }
        (None, true) => Err(LaunchError::jwt_invalid("multiple audiences without azp")),
        _ => Ok(()),
    }
}

#[derive(Deserialize)]
struct UnverifiedIssuer {
    iss: String,
}

/// Read `iss` from a JWT without verifying it.
///
/// Used only to choose which platform's keys to verify with.
fn peek_issuer(token: &str) -> Result<String, LaunchError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| LaunchError::jwt_invalid("malformed JWT"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| LaunchError::jwt_invalid(format!("malformed JWT payload: {e}")))?;
    let claims: UnverifiedIssuer = serde_json::from_slice(&bytes)
        .map_err(|e| LaunchError::jwt_invalid(format!("malformed JWT payload: {e}")))?;
    Ok(claims.iss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lti::claims::Audience;
    use serde_json::json;

    fn raw_claims(aud: Audience, azp: Option<&str>) -> LtiTokenClaims {
        let mut claims: LtiTokenClaims = serde_json::from_value(json!({
            "iss": "https://lms.example.com",
            "sub": "user-1",
            "aud": "tool-client",
            "exp": 2_000_000_000u64,
            "iat": 1_700_000_000u64
        }))
        .unwrap();
        claims.aud = aud;
        claims.azp = azp.map(str::to_string);
        claims
    }

    #[test]
    fn azp_not_required_for_single_audience() {
        let claims = raw_claims(Audience::Single("tool-client".into()), None);

        assert!(check_authorized_party(&claims, "tool-client").is_ok());
    }

    #[test]
    fn azp_required_for_multiple_audiences() {
        let many = Audience::Many(vec!["tool-client".into(), "other".into()]);

        assert!(check_authorized_party(&raw_claims(many.clone(), None), "tool-client").is_err());
        assert!(check_authorized_party(&raw_claims(many, Some("tool-client")), "tool-client").is_ok());
    }

    #[test]
    fn foreign_azp_is_rejected() {
        let claims = raw_claims(Audience::Single("tool-client".into()), Some("someone-else"));

        assert!(check_authorized_party(&claims, "tool-client").is_err());
    }

    #[test]
    fn only_rsa_algorithms_are_accepted() {
        assert!(pinned_algorithm(Algorithm::RS256).is_ok());
        assert!(pinned_algorithm(Algorithm::RS512).is_ok());
        assert!(pinned_algorithm(Algorithm::HS256).is_err());
        assert!(pinned_algorithm(Algorithm::ES256).is_err());
    }

    #[test]
    fn peek_issuer_reads_unverified_payload() {
        // GIVEN: a JWT-shaped string with an unsigned payload
        let payload = URL_SAFE_NO_PAD.encode(br#"{"iss":"https://lms.example.com"}"#);
        let token = format!("e30.{payload}.sig");

        // THEN: iss is extracted
        assert_eq!(peek_issuer(&token).unwrap(), "https://lms.example.com");
    }

    #[test]
    fn peek_issuer_rejects_malformed_token() {
        assert!(peek_issuer("not-a-jwt").is_err());
        assert!(peek_issuer("a.!!!.c").is_err());
    }
}
