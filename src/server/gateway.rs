//! HTTP server with axum router and graceful shutdown.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::error::StartupError;
use super::handlers::{get_home, get_stream, AppState};
use crate::config::ServerConfig;

/// Serves the bootstrap page and the stream endpoint for one target file.
pub struct Gateway {
    /// Server configuration.
    config: ServerConfig,
    /// Application state shared across handlers.
    state: AppState,
}

impl Gateway {
    /// Create a gateway for a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::Config`] if the configuration is invalid.
    pub fn new(config: ServerConfig) -> Result<Self, StartupError> {
        config.validate()?;

        let state = AppState {
            detector: Arc::new(config.detector()),
            timings: config.timings(),
            filename: config.target_path.display().to_string(),
            shutdown: CancellationToken::new(),
        };

        Ok(Self { config, state })
    }

    /// Use `token` to stop the server and all sessions (builder pattern).
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.state.shutdown = token;
        self
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/", get(get_home))
            .route("/stream", get(get_stream))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run(self) -> Result<(), StartupError> {
        let address = self.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| StartupError::Bind { address, source })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StartupError> {
        let cancel = self.state.shutdown.clone();
        let app = self.build_router();

        tracing::info!(
            address = %listener.local_addr()?,
            target = %self.state.filename,
            "Starting frontail server"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("Server shutting down gracefully");
        })
        .await?;

        Ok(())
    }
}

/// Cancel `token` once `signal` fires.
///
/// If the signal handler cannot be installed the token is left alone, so
/// the server keeps running without Ctrl-C support.
pub async fn cancel_on_signal<F>(signal: F, token: CancellationToken)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            tracing::info!("Received Ctrl-C");
            token.cancel();
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    }
}
