//! Launch claims carried by the platform's `id_token`.
//!
//! [`LtiTokenClaims`] is the wire shape, with the IMS-namespaced claim names.
//! It is crate-private: the only way to obtain a public [`LaunchClaims`] is
//! through [`LaunchValidator::validate`](super::validator::LaunchValidator::validate),
//! after signature, issuer, audience, nonce and version checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only LTI version this tool accepts.
pub const LTI_VERSION: &str = "1.3.0";

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(values) => values.len(),
        }
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

/// `https://purl.imsglobal.org/spec/lti/claim/resource_link`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    /// Platform-unique id of the placement.
    #[serde(default)]
    pub id: String,
    /// Link title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Link description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `https://purl.imsglobal.org/spec/lti/claim/context`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchContext {
    /// Context (course) id.
    pub id: String,
    /// Short label, e.g. a course code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Full title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Context type URIs.
    #[serde(default, rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
}

/// Raw `id_token` payload as signed by the platform.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LtiTokenClaims {
    pub(crate) iss: String,
    pub(crate) sub: String,
    pub(crate) aud: Audience,
    pub(crate) exp: u64,
    pub(crate) iat: u64,
    #[serde(default)]
    pub(crate) nonce: String,
    #[serde(default)]
    pub(crate) azp: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) email: Option<String>,
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/version")]
    pub(crate) version: String,
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/message_type")]
    pub(crate) message_type: String,
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/deployment_id")]
    pub(crate) deployment_id: String,
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/target_link_uri")]
    pub(crate) target_link_uri: String,
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/resource_link")]
    pub(crate) resource_link: ResourceLink,
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/roles")]
    pub(crate) roles: Vec<String>,
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/context")]
    pub(crate) context: Option<LaunchContext>,
    #[serde(default, rename = "https://purl.imsglobal.org/spec/lti/claim/custom")]
    pub(crate) custom: Option<BTreeMap<String, Value>>,
}

/// Verified launch claims.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchClaims {
    subject: String,
    issuer: String,
    audience: Vec<String>,
    expires_at: u64,
    issued_at: u64,
    nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    version: String,
    message_type: String,
    deployment_id: String,
    target_link_uri: String,
    resource_link: ResourceLink,
    roles: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<LaunchContext>,
    custom: BTreeMap<String, Value>,
}

impl From<LtiTokenClaims> for LaunchClaims {
    fn from(raw: LtiTokenClaims) -> Self {
        Self {
            subject: raw.sub,
            issuer: raw.iss,
            audience: raw.aud.into_vec(),
            expires_at: raw.exp,
            issued_at: raw.iat,
            nonce: raw.nonce,
            name: raw.name,
            email: raw.email,
            version: raw.version,
            message_type: raw.message_type,
            deployment_id: raw.deployment_id,
            target_link_uri: raw.target_link_uri,
            resource_link: raw.resource_link,
            roles: raw.roles,
            context: raw.context,
            custom: raw.custom.unwrap_or_default(),
        }
    }
}

impl LaunchClaims {
    /// `sub`: the platform's user id.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// `iss`
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `aud`, normalised to a list.
    #[must_use]
    pub fn audience(&self) -> &[String] {
        &self.audience
    }

    /// `exp` (Unix seconds).
    #[must_use]
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// `iat` (Unix seconds).
    #[must_use]
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    /// `nonce`
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Display name, when the platform shares it.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Email, when the platform shares it.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// LTI `version` (always `1.3.0` once validated).
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// LTI `message_type`, e.g. `LtiResourceLinkRequest`.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// LTI `deployment_id`.
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// LTI `target_link_uri`, untrusted.
    #[must_use]
    pub fn target_link_uri(&self) -> &str {
        &self.target_link_uri
    }

    /// LTI `resource_link`.
    #[must_use]
    pub fn resource_link(&self) -> &ResourceLink {
        &self.resource_link
    }

    /// LTI `roles` URIs.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// LTI `context`, if the launch happened inside one.
    #[must_use]
    pub fn context(&self) -> Option<&LaunchContext> {
        self.context.as_ref()
    }

    /// All LTI `custom` parameters.
    #[must_use]
    pub fn custom(&self) -> &BTreeMap<String, Value> {
        &self.custom
    }

    /// A custom parameter as text. Numbers and booleans are rendered;
    /// empty strings, objects and arrays count as absent.
    #[must_use]
    pub fn custom_str(&self, key: &str) -> Option<String> {
        match self.custom.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns `true` if any role URI ends with `#<role>` or equals `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles
            .iter()
            .any(|r| r == role || r.rsplit_once('#').is_some_and(|(_, short)| short == role))
    }
}

#[cfg(test)]
pub(crate) fn claims_from_json(value: Value) -> LaunchClaims {
    LaunchClaims::from(serde_json::from_value::<LtiTokenClaims>(value).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_payload() -> Value {
        json!({
            "iss": "https://lms.example.com",
            "sub": "user-1",
            "aud": ["tool-client", "other"],
            "exp": 2_000_000_000u64,
            "iat": 1_700_000_000u64,
            "nonce": "n1",
            "azp": "tool-client",
            "https://purl.imsglobal.org/spec/lti/claim/version": "1.3.0",
            "https://purl.imsglobal.org/spec/lti/claim/message_type": "LtiResourceLinkRequest",
            "https://purl.imsglobal.org/spec/lti/claim/deployment_id": "dep-1",
            "https://purl.imsglobal.org/spec/lti/claim/target_link_uri": "https://tool.example.com/launch",
            "https://purl.imsglobal.org/spec/lti/claim/resource_link": {"id": "rl-1", "title": "Week 1"},
            "https://purl.imsglobal.org/spec/lti/claim/roles": [
                "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner"
            ],
            "https://purl.imsglobal.org/spec/lti/claim/context": {"id": "ctx-1", "type": ["CourseOffering"]},
            "https://purl.imsglobal.org/spec/lti/claim/custom": {"edusphere_course_id": 42, "blank": ""}
        })
    }

    #[test]
    fn namespaced_claims_are_mapped() {
        // GIVEN/WHEN: a full LTI payload
        let claims = claims_from_json(full_payload());

        // THEN: IMS claims land in named fields
        assert_eq!(claims.subject(), "user-1");
        assert_eq!(claims.audience(), ["tool-client".to_string(), "other".to_string()]);
        assert_eq!(claims.version(), LTI_VERSION);
        assert_eq!(claims.message_type(), "LtiResourceLinkRequest");
        assert_eq!(claims.deployment_id(), "dep-1");
        assert_eq!(claims.resource_link().id, "rl-1");
        assert_eq!(claims.context().unwrap().types, vec!["CourseOffering".to_string()]);
        assert!(claims.has_role("Learner"));
        assert!(!claims.has_role("Instructor"));
    }

    #[test]
    fn custom_str_renders_scalars_and_skips_blanks() {
        let claims = claims_from_json(full_payload());

        assert_eq!(claims.custom_str("edusphere_course_id").as_deref(), Some("42"));
        assert_eq!(claims.custom_str("blank"), None);
        assert_eq!(claims.custom_str("missing"), None);
    }

    #[test]
    fn missing_lti_claims_default_to_empty() {
        // GIVEN: only the standard OIDC claims
        let claims = claims_from_json(json!({
            "iss": "https://lms.example.com",
            "sub": "user-1",
            "aud": "tool-client",
            "exp": 2_000_000_000u64,
            "iat": 1_700_000_000u64
        }));

        // THEN: LTI fields are empty rather than a decode failure
        assert_eq!(claims.version(), "");
        assert_eq!(claims.nonce(), "");
        assert!(claims.context().is_none());
        assert!(claims.custom().is_empty());
        assert_eq!(claims.audience(), ["tool-client".to_string()]);
    }

    #[test]
    fn audience_len_counts_values() {
        assert_eq!(Audience::Single("a".into()).len(), 1);
        assert_eq!(Audience::Many(vec!["a".into(), "b".into()]).len(), 2);
    }
}
