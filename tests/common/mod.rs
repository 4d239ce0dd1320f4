//! Shared fixtures for integration tests: platform keys, token minting,
//! an in-memory JWKS source, and a ready-to-serve configuration.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::JwkSet};
use parking_lot::Mutex;
use serde_json::{Value, json};
use url::Url;

use lti_launch::config::{Config, ToolConfig};
use lti_launch::lti::{JwksError, JwksFetcher, LoginRequest, LtiTool, PlatformConfig, ToolKeys};

pub const PLATFORM_KEY: &str = include_str!("../fixtures/platform_key.pem");
pub const ROGUE_KEY: &str = include_str!("../fixtures/rogue_key.pem");
pub const TOOL_KEY: &str = include_str!("../fixtures/tool_key.pem");

pub const ISSUER: &str = "https://lms.example.com";
pub const CLIENT_ID: &str = "tool-client";
pub const DEPLOYMENT_ID: &str = "dep-1";
pub const PLATFORM_KID: &str = "platform-1";
pub const TOOL_BASE_URL: &str = "https://tool.example.com";

/// Public JWKS for a PEM private key, stamped with `kid`.
pub fn jwks_for(pem: &str, kid: &str) -> JwkSet {
    ToolKeys::from_pem(Some(pem), kid).public_jwks().clone()
}

/// Platform key source backed by a mutable in-memory map.
#[derive(Default)]
pub struct StaticJwks {
    sets: Mutex<HashMap<String, JwkSet>>,
    fetches: AtomicUsize,
}

impl StaticJwks {
    pub fn with(self, jwks_uri: &str, set: JwkSet) -> Self {
        self.set(jwks_uri, set);
        self
    }

    /// Replace the key set published at `jwks_uri` (key rotation).
    pub fn set(&self, jwks_uri: &str, set: JwkSet) {
        self.sets.lock().insert(jwks_uri.to_string(), set);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl JwksFetcher for StaticJwks {
    async fn fetch(&self, jwks_uri: &str) -> Result<JwkSet, JwksError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.sets
            .lock()
            .get(jwks_uri)
            .cloned()
            .ok_or(JwksError::Status(404))
    }
}

pub fn platform(issuer: &str) -> PlatformConfig {
    PlatformConfig {
        issuer: issuer.to_string(),
        client_id: CLIENT_ID.to_string(),
        auth_endpoint: Url::parse(&format!("{issuer}/auth")).unwrap(),
        jwks_uri: Url::parse(&format!("{issuer}/jwks")).unwrap(),
        deployment_ids: vec![DEPLOYMENT_ID.to_string()],
    }
}

pub fn jwks_uri(issuer: &str) -> String {
    format!("{issuer}/jwks")
}

/// A configuration for one platform at [`ISSUER`] with a tool key.
pub fn test_config() -> Config {
    Config {
        tool: ToolConfig {
            base_url: Some(Url::parse(TOOL_BASE_URL).unwrap()),
            private_key: Some(TOOL_KEY.to_string()),
            ..ToolConfig::default()
        },
        platform: Some(platform(ISSUER)),
        ..Config::default()
    }
}

/// A tool for [`test_config`] whose platform keys come from `PLATFORM_KEY`.
pub fn test_tool() -> (LtiTool, Arc<StaticJwks>) {
    let jwks = Arc::new(StaticJwks::default().with(&jwks_uri(ISSUER), jwks_for(PLATFORM_KEY, PLATFORM_KID)));
    let tool = LtiTool::with_fetcher(&test_config(), Arc::clone(&jwks) as Arc<dyn JwksFetcher>).unwrap();
    (tool, jwks)
}

pub fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap()
}

/// A complete, valid resource link launch payload.
pub fn launch_claims(nonce: &str) -> Value {
    let now = now();
    json!({
        "iss": ISSUER,
        "sub": "user-42",
        "aud": CLIENT_ID,
        "exp": now + 300,
        "iat": now,
        "nonce": nonce,
        "name": "Ada Lovelace",
        "https://purl.imsglobal.org/spec/lti/claim/message_type": "LtiResourceLinkRequest",
        "https://purl.imsglobal.org/spec/lti/claim/version": "1.3.0",
        "https://purl.imsglobal.org/spec/lti/claim/deployment_id": DEPLOYMENT_ID,
        "https://purl.imsglobal.org/spec/lti/claim/target_link_uri": "https://tool.example.com/launch",
        "https://purl.imsglobal.org/spec/lti/claim/resource_link": {"id": "rl-1"},
        "https://purl.imsglobal.org/spec/lti/claim/roles": [
            "http://purl.imsglobal.org/vocab/lis/v2/membership#Learner"
        ],
        "https://purl.imsglobal.org/spec/lti/claim/context": {"id": "course-7", "label": "C7"}
    })
}

/// Sign `claims` as an RS256 JWT.
pub fn mint(claims: &Value, pem: &str, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

/// A token the platform would send for `nonce`.
pub fn platform_token(nonce: &str) -> String {
    mint(&launch_claims(nonce), PLATFORM_KEY, PLATFORM_KID)
}

pub fn login_request(iss: &str) -> LoginRequest {
    LoginRequest {
        iss: iss.to_string(),
        login_hint: "hint".to_string(),
        target_link_uri: "/x".to_string(),
        lti_message_hint: None,
        client_id: None,
        lti_deployment_id: None,
    }
}

/// Run login initiation and return the issued `(state, nonce)`.
pub async fn login(tool: &LtiTool, iss: &str) -> (String, String) {
    let redirect = tool.initiate_login(&login_request(iss)).await.unwrap();
    let nonce = redirect
        .url
        .query_pairs()
        .find(|(k, _)| k == "nonce")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    (redirect.state, nonce)
}
