use std::sync::Arc;

use cdl_ledger::{Ledger, SealScheduler};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// CDL HTTP server.
pub struct CdlServer {
    config: ServerConfig,
    ledger: Arc<Ledger>,
}

impl CdlServer {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let ledger = Arc::new(Ledger::new(config.ledger.clone())?);
        Ok(Self { config, ledger })
    }

    /// Serve an existing ledger.
    pub fn with_ledger(config: ServerConfig, ledger: Arc<Ledger>) -> Self {
        Self { config, ledger }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.ledger))
    }

    /// Serve until ctrl-c.
    pub async fn serve(self) -> ServerResult<()> {
        let scheduler = self.config.seal_on_interval.then(|| {
            SealScheduler::spawn(Arc::clone(&self.ledger), self.config.ledger.seal_interval())
        });

        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            difficulty = self.config.ledger.difficulty,
            "CDL server listening on {}",
            self.config.bind_addr
        );
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
        served
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
