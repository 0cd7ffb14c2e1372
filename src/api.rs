//! REST API server for the advisor swarm
//!
//! Thin presentation adapter: submits missions, renders the blackboard and
//! the message log, and exposes the manual override paths.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agents::StageOverrides;
use crate::blackboard::Payload;
use crate::error::OrchestrationError;
use crate::message::AgentId;
use crate::models::{Language, MarketPreference, MissionInputs};
use crate::orchestrator::Orchestrator;
use crate::questionnaire::risk_questions;
use crate::tutor::Tutor;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct MissionRequest {
    pub answers: BTreeMap<String, String>,
    #[serde(default)]
    pub market: MarketPreference,
}

#[derive(Debug, Deserialize)]
pub struct TutorRequest {
    pub query: String,
    pub focus: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuestionsQuery {
    pub lang: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type Reply = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(status: StatusCode, data: T) -> Reply {
    (status, Json(ApiResponse::success(data)))
}

fn fail(e: OrchestrationError) -> Reply {
    let status = match &e {
        OrchestrationError::InvalidInput(_) | OrchestrationError::SerializationError(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestrationError::UnknownAgent(_) => StatusCode::NOT_FOUND,
        OrchestrationError::InferenceError(_)
        | OrchestrationError::MalformedResult(_)
        | OrchestrationError::HttpError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(status = %status, error = %e, "Request failed");
    (status, Json(ApiResponse::error(e.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub tutor: Arc<Tutor>,
    pub language: Language,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Mission Endpoints
/// =============================

async fn list_questions(State(state): State<ApiState>, Query(query): Query<QuestionsQuery>) -> Reply {
    let language = query
        .lang
        .as_deref()
        .and_then(Language::parse)
        .unwrap_or(state.language);
    ok(StatusCode::OK, risk_questions(language))
}

async fn start_mission(State(state): State<ApiState>, Json(req): Json<MissionRequest>) -> Reply {
    let inputs = MissionInputs::new(req.answers, req.market);

    match state.orchestrator.spawn_mission(inputs).await {
        Ok((generation, _handle)) => {
            info!(generation, "Mission accepted");
            ok(
                StatusCode::ACCEPTED,
                serde_json::json!({ "generation": generation }),
            )
        }
        Err(e) => fail(e),
    }
}

async fn get_blackboard(State(state): State<ApiState>) -> Reply {
    ok(StatusCode::OK, state.orchestrator.current_blackboard().await)
}

async fn force_set_field(State(state): State<ApiState>, Json(payload): Json<Payload>) -> Reply {
    let field = payload.field();
    state.orchestrator.force_set_field(payload).await;
    ok(StatusCode::OK, serde_json::json!({ "field": field.to_string() }))
}

async fn get_messages(State(state): State<ApiState>) -> Reply {
    ok(StatusCode::OK, state.orchestrator.message_log().await)
}

async fn get_status(State(state): State<ApiState>) -> Reply {
    let orchestrator = &state.orchestrator;
    ok(
        StatusCode::OK,
        serde_json::json!({
            "status": orchestrator.status().await,
            "activeAgent": orchestrator.active_agent().await,
            "generation": orchestrator.generation().await,
            "logLength": orchestrator.message_log().await.len(),
            "fingerprint": orchestrator.log_fingerprint().await,
        }),
    )
}

async fn rerun_stage(
    State(state): State<ApiState>,
    Path(stage): Path<String>,
    Json(overrides): Json<StageOverrides>,
) -> Reply {
    let agent = match AgentId::parse(&stage) {
        Some(id) if id != AgentId::System => id,
        _ => {
            return fail(OrchestrationError::InvalidInput(format!(
                "Unknown stage '{}'",
                stage
            )))
        }
    };

    info!(agent = %agent, "Manual re-run requested");
    match state.orchestrator.rerun_stage(agent, overrides).await {
        Ok(payload) => ok(StatusCode::OK, payload),
        Err(e) => fail(e),
    }
}

/// =============================
/// Tutor Endpoint
/// =============================

async fn tutor(State(state): State<ApiState>, Json(req): Json<TutorRequest>) -> Reply {
    let board = state.orchestrator.current_blackboard().await;
    match state.tutor.explain(&req.query, &board, req.focus.as_deref()).await {
        Ok(response) => ok(StatusCode::OK, response),
        Err(e) => fail(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/questions", get(list_questions))
        .route("/api/missions", post(start_mission))
        .route("/api/blackboard", get(get_blackboard).put(force_set_field))
        .route("/api/messages", get(get_messages))
        .route("/api/status", get(get_status))
        .route("/api/stages/:stage/rerun", post(rerun_stage))
        .route("/api/tutor", post(tutor))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
