//! LTI tool server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::lti::{LtiTool, handler::lti_routes, state::spawn_reaper};
use crate::{Error, Result};

/// Build the HTTP router for a tool.
pub fn create_router(tool: Arc<LtiTool>) -> Router {
    lti_routes(tool)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// LTI tool HTTP server
pub struct Server {
    /// Configuration
    config: Config,
    /// Login/launch coordinator
    tool: Arc<LtiTool>,
}

impl Server {
    /// Create a new server
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot serve launches.
    pub fn new(config: Config) -> Result<Self> {
        let tool = Arc::new(LtiTool::new(&config)?);
        Ok(Self { config, tool })
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        // Create shutdown channel
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        let reaper = spawn_reaper(
            self.tool.states(),
            self.config.state.reap_interval,
            shutdown_tx.subscribe(),
        );

        let app = create_router(Arc::clone(&self.tool));

        let listener = TcpListener::bind(addr).await?;
        info!(
            addr = %addr,
            redirect_uri = %self.tool.redirect_uri(),
            platforms = ?self.tool.registry().issuers(),
            "LTI tool listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        if let Err(e) = reaper.await {
            warn!(error = %e, "State reaper task failed");
        }
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
