//! ServerBuilder for fluent API to build HTTP servers

use super::boundary::{ErrorBoundary, with_error_boundary};
use crate::config::AppConfig;
use crate::core::classify::Classifier;
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Builder for an axum application running behind the error boundary
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new(AppConfig::from_env())
///     .with_routes(account_routes)
///     .with_routes(transaction_routes)
///     .build()?;
/// ```
pub struct ServerBuilder {
    config: AppConfig,
    classifier: Option<Classifier>,
    routes: Vec<Router>,
}

impl ServerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            classifier: None,
            routes: Vec::new(),
        }
    }

    /// Replace the standard classification chain
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Add routes; all of them end up behind the same boundary
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes.push(routes);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Merge the registered routes and install the error boundary
    pub fn build(self) -> Result<Router> {
        if self.routes.is_empty() {
            anyhow::bail!("No routes registered. Call .with_routes()");
        }

        let boundary = ErrorBoundary::new(
            self.classifier.unwrap_or_default(),
            self.config.mode,
            self.config.boundary.clone(),
        );

        let router = self
            .routes
            .into_iter()
            .fold(Router::new(), |app, routes| app.merge(routes));

        Ok(with_error_boundary(router, boundary))
    }

    /// Serve the application with graceful shutdown
    ///
    /// Peer addresses are made available to the boundary for its logs.
    ///
    /// # Example
    ///
    /// ```ignore
    /// ServerBuilder::new(config)
    ///     .with_routes(routes)
    ///     .serve("127.0.0.1:3000").await?;
    /// ```
    pub async fn serve(self, addr: &str) -> Result<()> {
        let mode = self.config.mode;
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(addr = %addr, mode = ?mode, "Server listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
