// Explicitly acknowledge dependencies pulled in through the library crate
use async_trait as _;
use chrono as _;
use dotenvy as _;
use futures as _;
use k8s_openapi as _;
use once_cell as _;
use prometheus as _;
use serde as _;
use serde_json as _;
use thiserror as _;
use tower_http as _;

// Dev dependencies used in tests (acknowledged to prevent clippy warnings)
#[cfg(test)]
use reqwest as _;

use std::sync::Arc;

use kube::Client;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use admission_service::{app, ApiDoc, AppConfig, AppState, ReflectorView, TokenReviewResolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = AppConfig::from_env()?;

    let client = Client::try_default().await?;
    let cluster = ReflectorView::spawn(client.clone());
    cluster.wait_until_ready().await?;
    tracing::info!("cluster caches warmed up");

    let state = Arc::new(AppState {
        evaluator: cfg.evaluator.clone(),
        cluster: Arc::new(cluster),
        resolver: Arc::new(TokenReviewResolver::new(client)),
    });
    let openapi = ApiDoc::openapi();

    let app = app(state).route(
        "/openapi.json",
        axum::routing::get(move || async { axum::Json(openapi) }),
    );

    let listener = TcpListener::bind(cfg.bind_addr).await?;
    tracing::info!("admission-service listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
