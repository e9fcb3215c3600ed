//! Question answering API.
//!
//! - `POST /query`        answer one question through the agent runtime
//! - `GET  /analytics`    usage snapshot
//! - `GET  /cache/stats`  response cache counters
//! - `DELETE /cache`      drop every cached answer

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use holdwise_agent::{AgentRequest, AgentRuntime, Outcome};
use holdwise_core::errors::{ApplicationError, InterfaceError};
use holdwise_core::{
    AnalyticsRecorder, AnalyticsSnapshot, ApiKeyIdentityVerifier, CacheStats, HistoryEntry,
    IdentityVerifier, Question, ResponseCache, VerifiedIdentity,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct QueryState {
    runtime: Arc<AgentRuntime>,
    cache: Arc<ResponseCache<Outcome>>,
    analytics: Arc<AnalyticsRecorder>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl QueryState {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        cache: Arc<ResponseCache<Outcome>>,
        analytics: Arc<AnalyticsRecorder>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self { runtime, cache, analytics, verifier }
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_true")]
    pub include_sql: bool,
    #[serde(default)]
    pub include_raw_data: bool,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessage>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn router(state: QueryState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/analytics", get(analytics))
        .route("/cache/stats", get(cache_stats))
        .route("/cache", delete(clear_cache))
        .with_state(state)
}

pub async fn query(
    State(state): State<QueryState>,
    headers: HeaderMap,
    Json(body): Json<QueryRequest>,
) -> Result<Json<Outcome>, ApiError> {
    let started = Instant::now();
    let correlation_id = format!("req-{}", Uuid::new_v4());

    let question = Question::parse(body.query)
        .map_err(|error| api_error(ApplicationError::from(error).into_interface(&correlation_id)))?;
    let history = body
        .conversation_history
        .into_iter()
        .enumerate()
        .map(|(index, message)| HistoryEntry::parse(index, &message.role, message.content))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| api_error(ApplicationError::from(error).into_interface(&correlation_id)))?;
    let identity = resolve_identity(state.verifier.as_ref(), &headers).await;

    info!(
        event_name = "api.query.received",
        correlation_id = %correlation_id,
        question = %question.preview(),
        history_len = history.len(),
        identified = identity.is_some(),
        "query received"
    );

    // Answers that depend on prior turns or on who is asking are never shared.
    let cache_key = (history.is_empty() && identity.is_none()).then(|| {
        format!(
            "{}\nsql={} rows={}",
            question.as_str(),
            body.include_sql,
            body.include_raw_data
        )
    });
    if let Some(cached) = cache_key.as_deref().and_then(|key| state.cache.get(key)) {
        let elapsed = elapsed_ms(started);
        state.analytics.record(question.as_str(), elapsed, true, None);
        info!(
            event_name = "api.query.cache_hit",
            correlation_id = %correlation_id,
            elapsed_ms = elapsed,
            "answered from cache"
        );
        return Ok(Json(cached));
    }

    let preview = question.preview();
    let request = AgentRequest::new(question, correlation_id.clone())
        .with_history(history)
        .with_identity(identity)
        .include_sql(body.include_sql)
        .include_rows(body.include_raw_data);

    // Dropping this handler (client went away) cancels the run at its next checkpoint.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let runtime = Arc::clone(&state.runtime);
    let question_text = request.question.as_str().to_string();
    let outcome = tokio::spawn(async move { runtime.answer(&request, &cancel).await })
        .await
        .map_err(|join_error| {
            error!(
                event_name = "api.query.task_failed",
                correlation_id = %correlation_id,
                error = %join_error,
                "agent task did not complete"
            );
            api_error(InterfaceError::Internal {
                message: join_error.to_string(),
                correlation_id: correlation_id.clone(),
            })
        })?;
    guard.disarm();

    state.analytics.record(
        &question_text,
        outcome.execution_time_ms,
        outcome.success,
        outcome.error_label().as_deref(),
    );
    if outcome.success {
        if let Some(key) = cache_key.as_deref() {
            state.cache.set(key, outcome.clone());
        }
    }

    info!(
        event_name = "api.query.completed",
        correlation_id = %correlation_id,
        question = %preview,
        success = outcome.success,
        turns = outcome.turns,
        tool_calls = outcome.tool_calls,
        elapsed_ms = elapsed_ms(started),
        "query completed"
    );
    Ok(Json(outcome))
}

pub async fn analytics(State(state): State<QueryState>) -> Json<AnalyticsSnapshot> {
    Json(state.analytics.snapshot())
}

pub async fn cache_stats(State(state): State<QueryState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

pub async fn clear_cache(State(state): State<QueryState>) -> StatusCode {
    state.cache.clear();
    info!(event_name = "api.cache.cleared", correlation_id = "admin", "response cache cleared");
    StatusCode::NO_CONTENT
}

async fn resolve_identity(
    verifier: &dyn IdentityVerifier,
    headers: &HeaderMap,
) -> Option<VerifiedIdentity> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = ApiKeyIdentityVerifier::bearer_token(header)?;
    verifier.verify(token).await
}

fn api_error(error: InterfaceError) -> ApiError {
    let (status, detail) = match &error {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::ServiceUnavailable { message, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, message.clone())
        }
        InterfaceError::Internal { message, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: error.user_message(),
            detail,
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
