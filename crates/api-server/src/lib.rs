//! HTTP surface for signal generation and human review.

pub mod config;
pub mod decision_store;
pub mod http_source;
pub mod request_id;
pub mod signal_routes;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use confidence_scorer::ConfidenceScorer;
use risk_manager::RiskEngine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use signal_core::{DecisionStore, MarketDataSource};
use signal_lifecycle::LifecycleError;
use signal_orchestrator::{ChangeDetector, InMemoryDecisionStore, PipelineError, SignalOrchestrator};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use config::ServerConfig;
use decision_store::SqliteDecisionStore;
use http_source::HttpMarketDataSource;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SignalOrchestrator>,
}

/// Machine-readable error carried in the response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ErrorBody, data: Option<T>) -> Self {
        Self {
            success: false,
            data,
            error: Some(error),
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    Pipeline(PipelineError),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        AppError::Pipeline(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Pipeline(e) => match e {
                PipelineError::Validation(_) | PipelineError::Risk(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PipelineError::TimeoutExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
                PipelineError::Lifecycle(_)
                | PipelineError::GenerationInProgress(_)
                | PipelineError::NothingToPersist(_) => StatusCode::CONFLICT,
                PipelineError::PersistenceFailure { .. } => StatusCode::BAD_GATEWAY,
                PipelineError::SignalNotFound(_) => StatusCode::NOT_FOUND,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            AppError::Pipeline(e) => ErrorBody {
                code: e.code().to_string(),
                message: e.to_string(),
                retryable: e.is_retryable(),
            },
            AppError::BadRequest(message) => ErrorBody {
                code: "INVALID_REQUEST".to_string(),
                message: message.clone(),
                retryable: false,
            },
            AppError::Internal(e) => ErrorBody {
                code: "INTERNAL_ERROR".to_string(),
                message: format!("{:#}", e),
                retryable: true,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if status.is_server_error() {
            error!("{} {}: {}", status.as_u16(), body.code, body.message);
        } else {
            warn!("{} {}: {}", status.as_u16(), body.code, body.message);
        }

        // A decision that was made but not saved is still returned
        let data = match &self {
            AppError::Pipeline(PipelineError::PersistenceFailure { decision, .. }) => {
                serde_json::to_value(decision).ok()
            }
            AppError::Pipeline(PipelineError::Lifecycle(LifecycleError::InvalidStateTransition {
                from,
                ..
            })) => Some(json!({ "currentStatus": from })),
            _ => None,
        };

        (status, Json(ApiResponse::failure(body, data))).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "status": "ok",
        "sources": orchestrator.source_count(),
        "inFlight": orchestrator.in_flight().len(),
        "pendingReview": orchestrator.pending_signals().len(),
        "timestamp": chrono::Utc::now(),
    }))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(signal_routes::signal_routes())
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wires sources, store and policy from `config` into an orchestrator.
pub async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let timeout = config.orchestrator.fetch_timeout();
    let mut sources: Vec<Arc<dyn MarketDataSource>> = Vec::with_capacity(config.sources.len());
    for spec in &config.sources {
        let source = HttpMarketDataSource::from_spec(spec, timeout)
            .with_context(|| format!("failed to build HTTP client for source {}", spec.name))?;
        info!("Data source {} ({:?}) at {}", spec.name, spec.role, spec.url);
        sources.push(Arc::new(source));
    }
    if sources.is_empty() {
        warn!("DATA_SOURCES is empty; every generation will fail validation");
    }

    let store: Arc<dyn DecisionStore> = match &config.database_url {
        Some(url) => {
            info!("Recording decisions in {}", url);
            Arc::new(SqliteDecisionStore::connect(url).await?)
        }
        None => {
            warn!("DATABASE_URL not set; decisions are kept in memory only");
            Arc::new(InMemoryDecisionStore::new())
        }
    };

    let orchestrator = SignalOrchestrator::new(sources, store)
        .with_scorer(
            ConfidenceScorer::new(config.scorer.clone()).context("invalid confidence settings")?,
        )
        .with_risk_engine(RiskEngine::new(config.risk.clone()).context("invalid risk parameters")?)
        .with_change_detector(ChangeDetector::new(config.change_detector.clone()))
        .with_config(config.orchestrator.clone());

    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
    })
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!("Signal API listening on {}", config.bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Signal API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
