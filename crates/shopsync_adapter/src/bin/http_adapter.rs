#![forbid(unsafe_code)]

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use shopsync_adapter::{AdapterHealthResponse, AdapterRuntime, WebhookAdapterResponse};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "shopsync_adapter=info,shopsync_os=info,warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let bind = env::var("SHOPSYNC_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:5000".to_string());
    let addr: SocketAddr = bind
        .trim()
        .parse()
        .with_context(|| format!("invalid SHOPSYNC_HTTP_BIND '{bind}'"))?;

    let runtime = Arc::new(AdapterRuntime::default_from_env().map_err(anyhow::Error::msg)?);
    let app = Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/webhook/:category/:operation", post(run_webhook))
        .with_state(runtime);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "shopsync_http listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shopsync_http stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

async fn index() -> &'static str {
    "Shopify to spreadsheet sync service is running"
}

async fn healthz(
    State(runtime): State<Arc<AdapterRuntime>>,
) -> (StatusCode, Json<AdapterHealthResponse>) {
    (StatusCode::OK, Json(runtime.health_report()))
}

async fn run_webhook(
    State(runtime): State<Arc<AdapterRuntime>>,
    Path((category, operation)): Path<(String, String)>,
    body: Bytes,
) -> (StatusCode, Json<WebhookAdapterResponse>) {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookAdapterResponse::rejected(
                    "MALFORMED_PAYLOAD",
                    format!("request body is not valid JSON: {err}"),
                )),
            );
        }
    };
    let worker = tokio::task::spawn_blocking(move || {
        runtime.run_webhook(&category, &operation, body)
    });
    match worker.await {
        Ok((status, response)) => (status, Json(response)),
        Err(err) => {
            error!(error = %err, "webhook worker failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookAdapterResponse::rejected(
                    "INTERNAL_ERROR",
                    "webhook worker failed".to_string(),
                )),
            )
        }
    }
}
