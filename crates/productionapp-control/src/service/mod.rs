//! Service lifecycle management.
//!
//! Provides the main service runner with signal handling and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api;
use crate::config::ControlConfig;
use crate::deployment::DeploymentManager;
use crate::engine::create_engine;
use crate::error::{ControlError, ControlResult};
use crate::types::ProjectName;
use crate::workspace::Workspace;

/// The control service.
///
/// Wires the automation engine, the deployment manager and the HTTP API
/// together, and runs until a shutdown signal arrives.
pub struct ControlService {
    config: ControlConfig,
    cancel: CancellationToken,
}

impl ControlService {
    /// Create a new control service with the given configuration.
    #[must_use]
    pub fn new(config: ControlConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Run the control service.
    ///
    /// This will:
    /// 1. Create the automation engine
    /// 2. Bind a workspace to the configured project
    /// 3. Start the HTTP API server
    /// 4. Wait for shutdown signal
    pub async fn run(&self) -> ControlResult<()> {
        let engine = create_engine(&self.config.engine)?;
        info!(
            engine_type = ?self.config.engine.engine_type,
            "automation engine configured"
        );

        let project = ProjectName::new(&self.config.project.name);
        let workspace = Workspace::new(project, engine);
        info!(project = %workspace.project(), "workspace bound");

        let state = api::AppState {
            manager: Arc::new(DeploymentManager::new(workspace)),
        };
        let app = api::router(state);

        info!(listen = %self.config.server.listen, "control service listening");

        serve(self.config.server.listen, app, self.cancel.clone()).await?;

        info!("control service shutdown complete");
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Serve an axum router over TCP with graceful shutdown.
async fn serve(addr: SocketAddr, app: axum::Router, cancel: CancellationToken) -> ControlResult<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControlError::Config(format!("failed to bind {addr}: {e}")))?;

    // In-flight requests finish; their engine subprocesses are not interrupted.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .map_err(|e| ControlError::internal(format!("server error: {e}")))
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = cancel.cancelled() => {
            info!("shutdown requested");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::EngineType;

    fn mock_config() -> ControlConfig {
        let mut config = ControlConfig::default();
        config.engine.engine_type = EngineType::Mock;
        config.server.listen = "127.0.0.1:0".parse().unwrap();
        config
    }

    #[test]
    fn service_shutdown() {
        let service = ControlService::new(ControlConfig::default());
        assert!(!service.cancel.is_cancelled());
        service.shutdown();
        assert!(service.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let service = Arc::new(ControlService::new(mock_config()));

        let task = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.run().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        service.shutdown();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn run_fails_on_bad_engine_config() {
        let mut config = mock_config();
        config.engine.engine_type = EngineType::Cli;
        config.engine.binary = std::path::PathBuf::new();

        let err = ControlService::new(config).run().await.unwrap_err();
        assert!(matches!(err, ControlError::Config(_)));
    }
}
