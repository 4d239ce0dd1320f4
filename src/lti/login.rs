//! Login initiation: the first leg of the OIDC third-party-initiated login.
//!
//! The platform calls `/lti/login` with its issuer and a `login_hint`. The tool
//! answers with a redirect to the platform's authorization endpoint carrying a
//! fresh `state` and `nonce`, and a `redirect_uri` the tool alone controls.

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use super::error::LaunchError;
use super::registry::PlatformRegistry;

/// Path of the launch callback, relative to the tool's base URL.
pub const CALLBACK_PATH: &str = "/lti/callback";

/// OIDC login initiation parameters sent by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginRequest {
    /// Platform issuer.
    pub iss: String,
    /// Opaque user hint, echoed back verbatim.
    pub login_hint: String,
    /// Where the platform wants the launch to land.
    pub target_link_uri: String,
    /// Opaque platform hint, echoed back when present.
    #[serde(default)]
    pub lti_message_hint: Option<String>,
    /// Client id override.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Deployment the launch belongs to.
    #[serde(default)]
    pub lti_deployment_id: Option<String>,
}

/// Builds the authorization redirect sent back to the platform.
#[derive(Debug, Clone)]
pub struct AuthUrlBuilder {
    registry: Arc<PlatformRegistry>,
    redirect_uri: String,
}

impl AuthUrlBuilder {
    /// Create a builder whose `redirect_uri` is derived from the tool's base URL.
    #[must_use]
    pub fn new(registry: Arc<PlatformRegistry>, tool_base_url: &Url) -> Self {
        let base = tool_base_url.as_str().trim_end_matches('/');
        Self {
            registry,
            redirect_uri: format!("{base}{CALLBACK_PATH}"),
        }
    }

    /// The fixed callback URL registered with platforms.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Build the authorization URL for `request`.
    ///
    /// # Errors
    ///
    /// [`LaunchError::UnknownIssuer`] if `request.iss` is not registered;
    /// [`LaunchError::UnknownDeployment`] if a supplied deployment id is not
    /// registered for that platform.
    pub fn build(&self, request: &LoginRequest, state: &str, nonce: &str) -> Result<Url, LaunchError> {
        let platform = self.registry.resolve(Some(&request.iss))?;

        if let Some(deployment_id) = request.lti_deployment_id.as_deref() {
            if !platform.accepts_deployment(deployment_id) {
                return Err(LaunchError::UnknownDeployment(deployment_id.to_string()));
            }
        }

        let client_id = request
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&platform.client_id);

        let mut url = platform.auth_endpoint.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("state", state);
            params.append_pair("nonce", nonce);
            params.append_pair("scope", "openid");
            params.append_pair("response_type", "id_token");
            params.append_pair("response_mode", "form_post");
            params.append_pair("prompt", "none");
            params.append_pair("client_id", client_id);
            params.append_pair("redirect_uri", &self.redirect_uri);
            params.append_pair("login_hint", &request.login_hint);
            if let Some(hint) = request.lti_message_hint.as_deref() {
                params.append_pair("lti_message_hint", hint);
            }
        }

        Ok(url)
    }
}

/// Generate a `state` or `nonce`: 16 random bytes, hex-encoded (32 chars).
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}
