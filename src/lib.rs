pub mod commands;
pub mod config;
pub mod node;
pub mod poller;
pub mod serial;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;

use crate::commands::AppState;
use crate::config::Config;
use crate::node::NodeManager;
use crate::poller::Poller;
use crate::serial::{open_transport, Correlator};
use crate::storage::open_store;

/// Process-wide context: one radio link, one store, one manager
pub struct RelayContext {
    pub correlator: Arc<Correlator>,
    pub manager: Arc<NodeManager>,
}

impl RelayContext {
    /// Open the radio link (falling back to mock mode) and the reading store
    pub async fn build(config: &Config) -> Result<Self> {
        let transport = open_transport(&config.radio.link_settings(), config.radio.mock);
        let correlator = Arc::new(Correlator::with_timing(
            transport,
            config.radio.reply_timeout(),
            config.radio.poll_interval(),
        ));

        let store = open_store(&config.storage.database)
            .await
            .with_context(|| format!("failed to open reading store {}", config.storage.database))?;

        let manager = Arc::new(NodeManager::new(
            correlator.clone(),
            store,
            config.nodes.ids.clone(),
        ));

        Ok(Self {
            correlator,
            manager,
        })
    }

    pub fn router(&self) -> Router {
        commands::router(AppState {
            manager: self.manager.clone(),
        })
    }

    /// Release the radio link and reset its mode lines
    pub async fn close(&self) {
        self.correlator.close().await;
    }
}

/// Serve the HTTP API and run the poller until Ctrl-C
pub async fn run(config: Config) -> Result<()> {
    let context = RelayContext::build(&config).await?;
    if context.correlator.is_mock() {
        log::warn!("Radio link unavailable: commands will be logged, no replies will arrive");
    }

    let poller = if config.schedule.enabled {
        Some(Poller::start(context.manager.clone(), &config.schedule))
    } else {
        log::info!("Scheduled polling disabled");
        None
    };

    let listener = tokio::net::TcpListener::bind(&config.http.bind)
        .await
        .with_context(|| format!("failed to bind HTTP server to {}", config.http.bind))?;
    log::info!("HTTP API listening on {}", config.http.bind);

    let served = axum::serve(listener, context.router())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    if let Some(poller) = poller {
        poller.shutdown().await;
    }
    context.close().await;
    served
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown requested, cleaning up"),
        Err(e) => log::warn!("Failed to listen for Ctrl-C: {}", e),
    }
}
