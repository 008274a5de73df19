#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, future_incompatible)]
use std::sync::Arc;

// Explicitly acknowledge dependencies used only by the binary entrypoint
use anyhow as _;
use tracing_subscriber as _;

// Dev dependencies used in integration tests (acknowledged to prevent clippy warnings)
#[cfg(test)]
use reqwest as _;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub mod aggregate;
pub mod cluster;
pub mod config;
pub mod decision;
pub mod documentation;
pub mod errors;
pub mod escalation;
pub mod fixtures;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod rules;
pub mod subjects;
pub mod validation;

use cluster::ClusterView;
use config::EvaluatorConfig;
use identity::IdentityResolver;
use metrics::admission_metrics_middleware;

/// Shared request-handling state: evaluation settings plus the cluster
/// and identity backends behind their trait seams.
pub struct AppState {
    pub evaluator: EvaluatorConfig,
    pub cluster: Arc<dyn ClusterView>,
    pub resolver: Arc<dyn IdentityResolver>,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/validate", post(handlers::validate))
        .route("/metrics", get(handlers::get_metrics))
        .layer(middleware::from_fn(admission_metrics_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub use cluster::ReflectorView;
pub use config::AppConfig;
pub use documentation::ApiDoc;
pub use identity::TokenReviewResolver;
