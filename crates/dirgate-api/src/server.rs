//! Dirgate HTTP server

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use dirgate_core::{config::DirgateConfig, Result};
use dirgate_ldap::{DirectoryConnector, LdapConnector};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::metrics::{metrics_handler, metrics_middleware, MetricsRecorder};
use crate::routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DirgateConfig>,
    pub directory: Arc<dyn DirectoryConnector>,
    pub start_time: Instant,
    pub metrics: Arc<MetricsRecorder>,
}

impl AppState {
    pub fn new(
        config: DirgateConfig,
        directory: Arc<dyn DirectoryConnector>,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            directory,
            start_time: Instant::now(),
            metrics,
        }
    }
}

/// Dirgate server
pub struct DirgateServer {
    config: DirgateConfig,
}

impl DirgateServer {
    pub fn new(config: DirgateConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let metrics = Arc::new(MetricsRecorder::new()?);
        info!("Prometheus metrics initialized");

        let connector = LdapConnector::new(&self.config.ldap);
        info!("Directory server: {}", connector.url());

        let addr = self.config.server.socket_addr();
        let state = AppState::new(self.config, Arc::new(connector), metrics);
        let app = create_router(state);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| dirgate_core::Error::Bind {
                addr: addr.clone(),
                source,
            })?;

        info!("Dirgate listening on http://{}", addr);
        info!("Prometheus metrics at http://{}/metrics", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Build the router with every endpoint and layer
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(routes::health_check))
        .route(
            "/users",
            post(routes::create_user).get(routes::search_users),
        )
        .route("/login", post(routes::login))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics_middleware,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
