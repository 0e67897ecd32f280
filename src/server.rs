//! HTTP surface of the tool.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /` | run one conversion: [`ConversionRequest`] in, [`ConversionResult`] out |
//! | `GET /` | tool description for discovery by calling agents |
//! | `GET /_healtz` | liveness |
//!
//! A caller may bound an invocation with a `Timeout: <seconds>` header;
//! otherwise [`crate::ServiceConfig::invocation_timeout_secs`] applies. A
//! timed-out invocation is dropped mid-flight; anything it already uploaded
//! stays in the store.

use crate::error::JobError;
use crate::job::ConversionJob;
use crate::schema::{tool_description, ConversionRequest, ConversionResult, ToolDescription};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Header carrying the caller's timeout in whole seconds.
pub const TIMEOUT_HEADER: &str = "timeout";

#[derive(Clone)]
pub struct AppState {
    job: ConversionJob,
    default_timeout: Option<Duration>,
    description: Arc<ToolDescription>,
}

impl AppState {
    pub fn new(job: ConversionJob, default_timeout_secs: Option<u64>) -> Self {
        Self {
            job,
            default_timeout: default_timeout_secs.map(Duration::from_secs),
            description: Arc::new(tool_description()),
        }
    }
}

/// Errors as seen by HTTP callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("invocation did not finish within {secs}s")]
    Timeout { secs: u64 },
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ServiceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid-request"),
            ServiceError::Job(_) => (StatusCode::INTERNAL_SERVER_ERROR, "job-failed"),
            ServiceError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        };
        let body = Json(json!({ "error": kind, "message": self.to_string() }));
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(describe).post(invoke))
        .route("/_healtz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C / SIGTERM.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ConversionRequest>, JsonRejection>,
) -> Result<Json<ConversionResult>, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::InvalidRequest(e.body_text()))?;
    request
        .validate()
        .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

    let timeout = caller_timeout(&headers)?.or(state.default_timeout);
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, state.job.convert(&request))
            .await
            .map_err(|_| {
                warn!("conversion of {} timed out after {:?}", request.document, limit);
                ServiceError::Timeout {
                    secs: limit.as_secs(),
                }
            })??,
        None => state.job.convert(&request).await?,
    };
    Ok(Json(result))
}

async fn describe(State(state): State<AppState>) -> Json<ToolDescription> {
    Json(state.description.as_ref().clone())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

fn caller_timeout(headers: &HeaderMap) -> Result<Option<Duration>, ServiceError> {
    let Some(value) = headers.get(TIMEOUT_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(|secs| Some(Duration::from_secs(secs)))
        .ok_or_else(|| {
            ServiceError::InvalidRequest(format!(
                "'{TIMEOUT_HEADER}' header must be a positive number of seconds"
            ))
        })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}
