//! Launch error taxonomy.
//!
//! Every failure in the login/launch handshake is one of these kinds. The
//! `Display` output is the short, caller-safe message; anything a verifier
//! library said lives in [`LaunchError::JwtInvalid::reason`] and only reaches
//! the logs.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Error variants for login initiation and launch validation.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The `iss` is not a registered platform.
    #[error("Unknown issuer: {0}")]
    UnknownIssuer(String),

    /// The `lti_deployment_id` supplied at login is not registered for the platform.
    #[error("Unknown deployment: {0}")]
    UnknownDeployment(String),

    /// The `state` was never issued, has expired, or was already used.
    ///
    /// The three cases are deliberately indistinguishable.
    #[error("Login state is missing, expired, or already used")]
    StateInvalid,

    /// Signature, issuer, audience, expiry, or key retrieval failed.
    #[error("ID token verification failed")]
    JwtInvalid {
        /// Internal reason, for logs only.
        reason: String,
    },

    /// The signed `nonce` does not belong to the login transaction.
    #[error("ID token does not match the login request")]
    NonceMismatch,

    /// The `version` claim is not `1.3.0`.
    #[error("Unsupported LTI version: {0}")]
    UnsupportedVersion(String),
}

impl LaunchError {
    /// Build a [`LaunchError::JwtInvalid`] from anything displayable.
    pub fn jwt_invalid(reason: impl std::fmt::Display) -> Self {
        Self::JwtInvalid {
            reason: reason.to_string(),
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownIssuer(_) | Self::UnknownDeployment(_) | Self::UnsupportedVersion(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::StateInvalid | Self::JwtInvalid { .. } | Self::NonceMismatch => {
                StatusCode::UNAUTHORIZED
            }
        }
    }

    /// Stable machine-readable code used in JSON error bodies and audit events.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownIssuer(_) => "unknown_issuer",
            Self::UnknownDeployment(_) => "unknown_deployment",
            Self::StateInvalid => "invalid_state",
            Self::JwtInvalid { .. } => "invalid_token",
            Self::NonceMismatch => "nonce_mismatch",
            Self::UnsupportedVersion(_) => "unsupported_version",
        }
    }

    /// Whether this is a security failure (as opposed to a client-correctable one).
    #[must_use]
    pub fn is_security_failure(&self) -> bool {
        self.status_code() == StatusCode::UNAUTHORIZED
    }

    /// Internal detail worth logging; never sent to the caller.
    #[must_use]
    pub fn log_reason(&self) -> String {
        match self {
            Self::JwtInvalid { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for LaunchError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(json!({"error": self.code(), "message": self.to_string()})),
        )
            .into_response()
    }
}
