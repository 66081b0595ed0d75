use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use signal_core::{ApprovalDecision, SymbolKey, Timeframe};
use signal_lifecycle::ReviewAction;
use signal_orchestrator::{GenerateRequest, RefreshReport, ReviewOutcome, SignalView};
use uuid::Uuid;

use crate::{ApiResponse, AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    #[serde(flatten)]
    pub action: ReviewAction,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
}

pub fn signal_routes() -> Router<AppState> {
    Router::new()
        .route("/api/signals/generate", post(generate_signal))
        .route("/api/signals/refresh", post(refresh_signal))
        .route("/api/signals/pending", get(pending_signals))
        .route("/api/signals/:id", get(get_signal))
        .route("/api/signals/:id/lineage", get(signal_lineage))
        .route("/api/signals/:id/review", post(review_signal))
        .route("/api/signals/:id/persist", post(retry_persistence))
}

fn require_symbol(symbol: &str) -> Result<(), AppError> {
    if symbol.trim().is_empty() {
        return Err(AppError::BadRequest("symbol is required".to_string()));
    }
    Ok(())
}

async fn generate_signal(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<ApiResponse<SignalView>>, AppError> {
    require_symbol(&request.symbol)?;
    let view = state.orchestrator.generate(&request).await?;
    Ok(Json(ApiResponse::success(view)))
}

async fn refresh_signal(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<RefreshReport>>, AppError> {
    require_symbol(&request.symbol)?;
    let key = SymbolKey::new(&request.symbol, request.timeframe);
    let report = state.orchestrator.refresh(&key).await?;
    Ok(Json(ApiResponse::success(report)))
}

async fn pending_signals(State(state): State<AppState>) -> Json<ApiResponse<Vec<SignalView>>> {
    Json(ApiResponse::success(state.orchestrator.pending_signals()))
}

async fn get_signal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SignalView>>, AppError> {
    let view = state
        .orchestrator
        .get_signal(id)
        .ok_or(signal_orchestrator::PipelineError::SignalNotFound(id))?;
    Ok(Json(ApiResponse::success(view)))
}

async fn signal_lineage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<SignalView>>>, AppError> {
    let chain = state.orchestrator.lineage(id)?;
    Ok(Json(ApiResponse::success(chain)))
}

async fn review_signal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<ApiResponse<ReviewOutcome>>, AppError> {
    if let ReviewAction::Modify { adjustments } = &request.action {
        if adjustments.is_empty() {
            return Err(AppError::BadRequest(
                "modify needs at least one adjustment".to_string(),
            ));
        }
    }
    let outcome = state
        .orchestrator
        .review(id, request.action, request.reason)
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn retry_persistence(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ApprovalDecision>>, AppError> {
    let decision = state.orchestrator.retry_persistence(id).await?;
    Ok(Json(ApiResponse::success(decision)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use signal_core::{MarketDataSource, SourceError, SourceRole};
    use signal_orchestrator::{InMemoryDecisionStore, SignalOrchestrator};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct StaticSource(Value);

    #[async_trait]
    impl MarketDataSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        fn role(&self) -> SourceRole {
            SourceRole::Market
        }

        async fn fetch(&self, _key: &SymbolKey) -> Result<Value, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn live_payload() -> Value {
        json!({
            "currentPrice": 3000,
            "isLiveData": true,
            "technicalIndicators": {"rsi": 44, "macd": "bearish", "trend": "downtrend", "atr": 40, "score": 62},
            "marketSentiment": {"score": 41, "label": "fear"},
            "onChainData": {"score": 55},
            "riskMetrics": {"score": 58}
        })
    }

    fn router(payload: Value) -> Router {
        let source: Arc<dyn MarketDataSource> = Arc::new(StaticSource(payload));
        let orchestrator = SignalOrchestrator::new(vec![source], Arc::new(InMemoryDecisionStore::new()));
        crate::app(AppState {
            orchestrator: Arc::new(orchestrator),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(b) => Body::from(b.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn generate(app: &Router) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/signals/generate",
            Some(json!({"symbol": "ethusdt", "timeframe": "1h"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["signal"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(live_payload());
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["sources"], json!(1));
    }

    #[tokio::test]
    async fn test_generate_returns_pending_signal() {
        let app = router(live_payload());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signals/generate",
            Some(json!({"symbol": "ethusdt", "timeframe": "1h"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["state"]["status"], json!("PENDING_REVIEW"));
        assert_eq!(body["data"]["signal"]["symbol"], json!("ETHUSDT"));
        // Bearish trend, MACD and sentiment vote short
        assert_eq!(body["data"]["signal"]["positionType"], json!("SHORT"));
        assert_eq!(body["data"]["analysis"]["directionInferred"], json!(true));

        let (_, pending) = send(&app, "GET", "/api/signals/pending", None).await;
        assert_eq!(pending["data"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_rejected_data_maps_to_422() {
        let app = router(json!({"currentPrice": 3000, "isLiveData": false}));
        let (status, body) = send(
            &app,
            "POST",
            "/api/signals/generate",
            Some(json!({"symbol": "ETHUSDT", "timeframe": "1h"})),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"]["code"], json!("NOT_LIVE_DATA"));
        assert_eq!(body["error"]["retryable"], json!(true));

        let (_, pending) = send(&app, "GET", "/api/signals/pending", None).await;
        assert_eq!(pending["data"], json!([]));
    }

    #[tokio::test]
    async fn test_blank_symbol_is_bad_request() {
        let app = router(live_payload());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signals/generate",
            Some(json!({"symbol": "  ", "timeframe": "1h"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("INVALID_REQUEST"));
    }

    #[tokio::test]
    async fn test_review_then_conflict() {
        let app = router(live_payload());
        let id = generate(&app).await;
        let uri = format!("/api/signals/{}/review", id);

        let (status, body) = send(&app, "POST", &uri, Some(json!({"action": "approve", "reason": "ok"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["decision"]["outcome"], json!("APPROVED"));
        assert_eq!(body["data"]["signal"]["persistence"]["state"], json!("persisted"));

        let (status, body) = send(&app, "POST", &uri, Some(json!({"action": "reject"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], json!("INVALID_STATE_TRANSITION"));
        assert_eq!(body["error"]["retryable"], json!(false));
        assert_eq!(body["data"]["currentStatus"], json!("APPROVED"));
    }

    #[tokio::test]
    async fn test_modify_returns_successor() {
        let app = router(live_payload());
        let id = generate(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/signals/{}/review", id),
            Some(json!({"action": "modify", "adjustments": {"entry": 3010}, "reason": "better fill"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let successor_id = body["data"]["successor"]["signal"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["decision"]["successorId"], json!(successor_id));
        assert_eq!(body["data"]["successor"]["signal"]["lineage"]["parentId"], json!(id));

        let (status, chain) = send(&app, "GET", &format!("/api/signals/{}/lineage", successor_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(chain["data"].as_array().map(Vec::len), Some(2));

        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/signals/{}/review", successor_id),
            Some(json!({"action": "modify"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_signal_and_nothing_to_persist() {
        let app = router(live_payload());
        let (status, body) = send(&app, "GET", &format!("/api/signals/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], json!("SIGNAL_NOT_FOUND"));

        let id = generate(&app).await;
        let (status, body) = send(&app, "POST", &format!("/api/signals/{}/persist", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], json!("NOTHING_TO_PERSIST"));
    }

    #[tokio::test]
    async fn test_refresh_reports_quality() {
        let app = router(live_payload());
        let (status, body) = send(
            &app,
            "POST",
            "/api/signals/refresh",
            Some(json!({"symbol": "ETHUSDT", "timeframe": "1h"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["success"], json!(true));
        assert!(body["data"]["dataQuality"]["overall"].is_number());
        assert!(body["data"]["changes"].is_null());
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let app = router(live_payload());
        let request = Request::builder()
            .uri("/health")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }
}
