//! LTI 1.3 Launch Library
//!
//! Tool-side implementation of the LTI 1.3 / OIDC third-party initiated login.
//!
//! # Features
//!
//! - **Login initiation**: one-time `state`/`nonce` pairs with TTL and bounded capacity
//! - **Launch validation**: RS256 `id_token` verification against cached platform JWKS
//! - **Multi-platform**: issuer-keyed platform registry with deployment allow-lists
//! - **Safe landing**: root-relative target resolution with open-redirect defense
//! - **Tool JWKS**: public key publication derived from the tool's private key

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod lti;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
        _ => {
            subscriber
                .with(fmt::layer())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
    }

    Ok(())
}
