//! Browser-based SSH client server.
//!
//! Run with: cargo run -p webssh-server -- --port 3000
//!
//! Clients open `/ws`, send a `connect` event, and get a terminal plus SFTP
//! file operations on the remote host.

mod config;
mod suggest;

use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webssh_session::SessionManager;
use webssh_ssh::SshConnector;
use webssh_transport::{AppState, create_router};

use crate::{config::Config, suggest::ChatSuggestionClient};

#[derive(Debug, Error)]
enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::parse();

    let connector = Arc::new(SshConnector::new(config.keepalive()));
    let mut manager = SessionManager::new(connector, config.session());
    match &config.command_suggestion_api_key {
        Some(key) if !key.is_empty() => {
            info!(endpoint = %config.suggestion_endpoint, "External command suggestions enabled");
            manager = manager.with_suggestion_provider(Arc::new(ChatSuggestionClient::new(
                config.suggestion_endpoint.clone(),
                config.suggestion_model.clone(),
                key.clone(),
            )));
        }
        _ => info!("No suggestion API key, using local command hints"),
    }

    let state = AppState::new(Arc::new(manager), config.uploads());
    let app = create_router(state);

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("Server listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
