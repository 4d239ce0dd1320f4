//! Audit logging for login and launch events.
//!
//! Every event is emitted via `tracing::info!` with the event serialized as
//! JSON in the `audit` field, so the trail can be filtered by any log
//! aggregator.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `login.initiated` | A state/nonce pair was stored and the redirect issued |
//! | `login.rejected` | Login initiation failed (malformed request, unknown issuer or deployment) |
//! | `launch.accepted` | A launch passed every check |
//! | `launch.rejected` | Launch validation failed, or the platform posted an OIDC error |

use std::net::IpAddr;

use serde::Serialize;

use super::claims::LaunchClaims;
use super::error::LaunchError;

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"launch.accepted"`).
    pub event: &'static str,
    /// The login `state` this event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Platform issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Platform user id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// LTI deployment id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    /// Landing path chosen for an accepted launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Error code for rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    /// Internal reason for rejections (never sent to the caller).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Client IP address (when available).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,
}

impl AuditEvent {
    fn blank(event: &'static str, client_ip: Option<IpAddr>) -> Self {
        Self {
            event,
            state: None,
            issuer: None,
            subject: None,
            deployment_id: None,
            target: None,
            error: None,
            reason: None,
            client_ip,
        }
    }

    /// Construct a `login.initiated` event.
    #[must_use]
    pub fn login_initiated(
        state: &str,
        issuer: &str,
        deployment_id: Option<&str>,
        client_ip: Option<IpAddr>,
    ) -> Self {
        Self {
            state: Some(state.to_string()),
            issuer: Some(issuer.to_string()),
            deployment_id: deployment_id.map(str::to_string),
            ..Self::blank("login.initiated", client_ip)
        }
    }

    /// Construct a `login.rejected` event.
    #[must_use]
    pub fn login_rejected(issuer: &str, err: &LaunchError, client_ip: Option<IpAddr>) -> Self {
        Self {
            issuer: Some(issuer.to_string()),
            error: Some(err.code()),
            reason: Some(err.log_reason()),
            ..Self::blank("login.rejected", client_ip)
        }
    }

    /// Construct a `login.rejected` event for a request missing required fields.
    #[must_use]
    pub fn login_malformed(detail: &str, client_ip: Option<IpAddr>) -> Self {
        Self {
            error: Some("invalid_request"),
            reason: Some(detail.to_string()),
            ..Self::blank("login.rejected", client_ip)
        }
    }

    /// Construct a `launch.accepted` event.
    #[must_use]
    pub fn launch_accepted(
        state: &str,
        claims: &LaunchClaims,
        target: &str,
        client_ip: Option<IpAddr>,
    ) -> Self {
        Self {
            state: Some(state.to_string()),
            issuer: Some(claims.issuer().to_string()),
            subject: Some(claims.subject().to_string()),
            deployment_id: Some(claims.deployment_id().to_string()),
            target: Some(target.to_string()),
            ..Self::blank("launch.accepted", client_ip)
        }
    }

    /// Construct a `launch.rejected` event.
    #[must_use]
    pub fn launch_rejected(state: &str, err: &LaunchError, client_ip: Option<IpAddr>) -> Self {
        Self {
            state: Some(state.to_string()),
            error: Some(err.code()),
            reason: Some(err.log_reason()),
            ..Self::blank("launch.rejected", client_ip)
        }
    }

    /// Construct a `launch.rejected` event for an OIDC error posted by the
    /// platform instead of an `id_token`.
    #[must_use]
    pub fn platform_error(
        state: Option<&str>,
        error: &str,
        description: Option<&str>,
        client_ip: Option<IpAddr>,
    ) -> Self {
        let reason = match description {
            Some(description) => format!("{error}: {description}"),
            None => error.to_string(),
        };
        Self {
            state: state.map(str::to_string),
            error: Some("platform_error"),
            reason: Some(reason),
            ..Self::blank("launch.rejected", client_ip)
        }
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
///
/// ```text
/// INFO lti_launch::lti::audit audit={"event":"launch.accepted","state":...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "lti audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
