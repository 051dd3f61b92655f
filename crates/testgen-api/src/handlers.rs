//! API Handlers
use crate::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use testgen_core::{MaterialCategory, RunId, TestgenError, TESTGEN_VERSION};
use testgen_resolver::ResolutionChoice;
use testgen_runner::{ReviewResponse, RunHandle, RunStatus};

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Ticket key or ticket URL
    pub subject: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Block until the run is suspended or terminal
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Deserialize)]
pub struct MissingRequest {
    pub category: MaterialCategory,
    pub choice: ResolutionChoice,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub accept: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl FeedbackRequest {
    fn into_review(self) -> Result<ReviewResponse, TestgenError> {
        match (self.accept, self.feedback) {
            (true, None) => Ok(ReviewResponse::Accept),
            (false, Some(text)) => Ok(ReviewResponse::Feedback(text)),
            (true, Some(_)) => Err(TestgenError::InvalidPayload(
                "send either accept or feedback, not both".into(),
            )),
            (false, None) => Err(TestgenError::InvalidPayload("accept or feedback is required".into())),
        }
    }
}

fn run_id(raw: &str) -> Result<RunId, ApiError> {
    Ok(RunId::from_str(raw)?)
}

pub async fn start_run(
    State(state): State<AppState>,
    Json(payload): Json<StartRequest>,
) -> Result<(StatusCode, Json<RunHandle>), ApiError> {
    let handle = state.runs.start(&payload.subject).await?;
    Ok((StatusCode::CREATED, Json(handle)))
}

pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<RunStatus>, ApiError> {
    let run_id = run_id(&id)?;
    let status = if query.wait {
        state.runs.wait(run_id).await?
    } else {
        state.runs.status(run_id).await?
    };
    Ok(Json(status))
}

pub async fn supply_missing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<MissingRequest>,
) -> Result<Json<RunStatus>, ApiError> {
    let status = state
        .runs
        .supply_missing(run_id(&id)?, payload.category, payload.choice, payload.payload)
        .await?;
    Ok(Json(status))
}

pub async fn supply_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<RunStatus>, ApiError> {
    let run_id = run_id(&id)?;
    let response = payload.into_review()?;
    Ok(Json(state.runs.supply_feedback(run_id, response).await?))
}

pub async fn supply_override(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunStatus>, ApiError> {
    Ok(Json(state.runs.supply_override(run_id(&id)?).await?))
}

pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunStatus>, ApiError> {
    Ok(Json(state.runs.cancel(run_id(&id)?).await?))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": TESTGEN_VERSION,
            "runs": state.runs.len().await,
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let Some(metrics) = state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match metrics.encode() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
