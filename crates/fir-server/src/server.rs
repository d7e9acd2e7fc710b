//! HTTP server wrapper

use crate::coordinator::SessionCoordinator;
use crate::handlers;
use axum::Router;
use fir_common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// HTTP server for the recommender API
pub struct Server {
    coordinator: Arc<SessionCoordinator>,
}

impl Server {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Bind and serve until the process is told to shut down
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let app = self.create_app();

        info!("starting server on {bind_addr}");
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::Network(format!("failed to bind {bind_addr}: {e}")))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("server error: {e}")))?;
        Ok(())
    }

    pub fn create_app(&self) -> Router {
        handlers::create_router(Arc::clone(&self.coordinator)).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any)
                        .max_age(Duration::from_secs(3600)),
                ),
        )
    }
}
