//! LTI Launch - tool-side LTI 1.3 login and launch service

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use lti_launch::{
    cli::{Cli, Command},
    config::Config,
    lti::ToolKeys,
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Jwks { pretty }) => run_jwks(&cli, pretty),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Print the tool's public key set
fn run_jwks(cli: &Cli, pretty: bool) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let private_key = config.tool.resolve_private_key();
    let keys = ToolKeys::from_pem(private_key.as_deref(), &config.tool.key_id);

    let rendered = if pretty {
        serde_json::to_string_pretty(keys.public_jwks())
    } else {
        serde_json::to_string(keys.public_jwks())
    };

    match rendered {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize JWKS: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the tool server
async fn run_server(cli: Cli) -> ExitCode {
    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        platforms = config.all_platforms().len(),
        "Starting LTI launch service"
    );

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
