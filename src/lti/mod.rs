//! LTI 1.3 tool-side launch: OIDC login initiation and `id_token` validation.
//!
//! # Flow
//!
//! ```text
//! Platform --(iss, login_hint)--> /lti/login
//!   -> store state + nonce, redirect to platform auth endpoint
//! Platform --(id_token, state)--> /lti/callback
//!   -> consume state, verify JWT against platform JWKS, check nonce,
//!      deployment, version -> 303 to the resolved landing path
//! ```
//!
//! [`LtiTool`] wires the components together; [`handler`] exposes them over
//! HTTP.

pub mod audit;
pub mod claims;
pub mod error;
pub mod handler;
pub mod jwks;
pub mod login;
pub mod registry;
pub mod state;
pub mod target;
pub mod tool_keys;
pub mod validator;

use std::sync::Arc;

use jsonwebtoken::jwk::JwkSet;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::{Error, Result};

pub use claims::{LaunchClaims, LaunchContext, ResourceLink};
pub use error::LaunchError;
pub use jwks::{HttpJwksFetcher, JwksCache, JwksError, JwksFetcher};
pub use login::{AuthUrlBuilder, LoginRequest};
pub use registry::{PlatformConfig, PlatformRegistry};
pub use state::{InMemoryStateStore, StateEntry, StateStore};
pub use target::resolve_target;
pub use tool_keys::ToolKeys;
pub use validator::LaunchValidator;

/// Result of a successful login initiation.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    /// The stored `state` key.
    pub state: String,
    /// Authorization URL at the platform.
    pub url: Url,
}

/// Result of a successful launch.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    /// Verified launch claims.
    pub claims: LaunchClaims,
    /// Root-relative landing path.
    pub target: String,
}

/// The LTI tool: central coordinator for login and launch.
pub struct LtiTool {
    registry: Arc<PlatformRegistry>,
    states: Arc<dyn StateStore>,
    login: AuthUrlBuilder,
    validator: LaunchValidator,
    tool_keys: ToolKeys,
}

impl LtiTool {
    /// Build the tool from configuration, fetching platform keys over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration cannot serve launches,
    /// or [`Error::Internal`] if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let fetcher = HttpJwksFetcher::new(&config.jwks)
            .map_err(|e| Error::Internal(format!("failed to build JWKS client: {e}")))?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Build the tool with a custom platform key source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration cannot serve launches.
    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn JwksFetcher>) -> Result<Self> {
        config.validate()?;
        let base_url = config
            .tool
            .base_url
            .as_ref()
            .ok_or_else(|| Error::Config("tool.base_url is required".to_string()))?;

        let registry = Arc::new(PlatformRegistry::new(config.all_platforms())?);
        let states: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::with_limits(
            config.state.ttl,
            config.state.capacity,
        ));
        let jwks = Arc::new(JwksCache::new(fetcher, &config.jwks));

        let login = AuthUrlBuilder::new(Arc::clone(&registry), base_url);
        let validator = LaunchValidator::new(
            Arc::clone(&registry),
            Arc::clone(&states),
            jwks,
            config.jwks.leeway_secs,
        );
        let private_key = config.tool.resolve_private_key();
        let tool_keys = ToolKeys::from_pem(private_key.as_deref(), &config.tool.key_id);

        info!(
            platforms = registry.len(),
            redirect_uri = %login.redirect_uri(),
            tool_key = tool_keys.is_configured(),
            "LTI tool initialized"
        );

        Ok(Self {
            registry,
            states,
            login,
            validator,
            tool_keys,
        })
    }

    /// Start a login: mint `state` and `nonce`, remember them, and build the
    /// platform redirect.
    ///
    /// Nothing is stored when the issuer or deployment is rejected.
    ///
    /// # Errors
    ///
    /// [`LaunchError::UnknownIssuer`] or [`LaunchError::UnknownDeployment`].
    pub async fn initiate_login(&self, request: &LoginRequest) -> std::result::Result<LoginRedirect, LaunchError> {
        let state = login::generate_token();
        let nonce = login::generate_token();

        let url = self.login.build(request, &state, &nonce)?;
        self.states.put(&state, &nonce, &request.login_hint).await;

        Ok(LoginRedirect { state, url })
    }

    /// Validate a launch and resolve where it lands.
    ///
    /// # Errors
    ///
    /// Any [`LaunchError`] raised by [`LaunchValidator::validate`].
    pub async fn complete_launch(
        &self,
        id_token: &str,
        state: &str,
    ) -> std::result::Result<LaunchOutcome, LaunchError> {
        let claims = self.validator.validate(id_token, state).await?;
        let target = resolve_target(&claims);
        Ok(LaunchOutcome { claims, target })
    }

    /// The tool's public key set.
    #[must_use]
    pub fn public_jwks(&self) -> &JwkSet {
        self.tool_keys.public_jwks()
    }

    /// The login state store, shared with the background reaper.
    #[must_use]
    pub fn states(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.states)
    }

    /// Registered platforms.
    #[must_use]
    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    /// The `redirect_uri` sent to platforms.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        self.login.redirect_uri()
    }
}
