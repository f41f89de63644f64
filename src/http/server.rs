//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the relay endpoint
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Bind the router to a listener and shut down gracefully

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown;
use crate::relay::{relay_handler, HttpUpstream, RelayState, Upstream, UpstreamError};

/// HTTP server exposing the relay endpoint.
pub struct HttpServer {
    router: Router,
    config: RelayConfig,
}

impl HttpServer {
    /// Server relaying through the real HTTP client.
    pub fn new(config: RelayConfig) -> Result<Self, UpstreamError> {
        let upstream = HttpUpstream::new()?;
        Ok(Self::with_state(config, Arc::new(RelayState::new(upstream))))
    }

    /// Server with caller-provided relay state (limiter, upstream, deadline).
    pub fn with_state<U: Upstream>(config: RelayConfig, state: Arc<RelayState<U>>) -> Self {
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router<U: Upstream>(config: &RelayConfig, state: Arc<RelayState<U>>) -> Router {
        Router::new()
            .route(&config.relay.path, post(relay_handler::<U>))
            .with_state(state)
            .layer(SetResponseHeaderLayer::overriding(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store"),
            ))
            .layer(RequestBodyLimitLayer::new(config.relay.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// A clone of the router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown_rx` fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            path = %self.config.relay.path,
            "Relay server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("Relay server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}
