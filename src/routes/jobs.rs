// Job control handlers: translate HTTP requests to supervisor calls and typed outcomes

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::AppState;
use crate::error::JobError;
use crate::models::{
    Direction, JobResults, JobSnapshot, JobSpec, ResultDetail, SpanMethod, StartAccepted, StopAck,
};

/// Body of POST /v1/monitor/jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobRequest {
    pub port: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub span_method: SpanMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub duration_sec: i64,
    #[serde(default)]
    pub otlp_export: bool,
    #[serde(default)]
    pub result_detail: ResultDetail,
}

fn default_sample_rate() -> u32 {
    1
}

impl StartJobRequest {
    /// Validates the request and converts it into a job spec. `max_duration`
    /// bounds `duration_sec`.
    pub fn into_spec(self, max_duration: Duration) -> Result<JobSpec, String> {
        if self.port.trim().is_empty() {
            return Err("port must be non-empty".into());
        }
        if self.duration_sec <= 0 {
            return Err(format!(
                "duration_sec must be > 0, got {}",
                self.duration_sec
            ));
        }
        if self.duration_sec as u64 > max_duration.as_secs() {
            return Err(format!(
                "duration_sec must be <= {}, got {}",
                max_duration.as_secs(),
                self.duration_sec
            ));
        }
        if self.sample_rate == 0 {
            return Err("sample_rate must be > 0".into());
        }
        Ok(JobSpec {
            port: self.port,
            direction: self.direction,
            span_method: self.span_method,
            vlan: self.vlan,
            filters: self.filters,
            sample_rate: self.sample_rate,
            duration: Duration::from_secs(self.duration_sec as u64),
            export: self.otlp_export,
            result_detail: self.result_detail,
        })
    }
}

pub(super) enum ApiError {
    BadRequest(String),
    Job(JobError),
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        ApiError::Job(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "bad_request", "message": message })),
            )
                .into_response(),
            ApiError::Job(e) => e.into_response(),
        }
    }
}

pub(super) async fn start_job(
    State(state): State<AppState>,
    payload: Result<Json<StartJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartAccepted>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let spec = req
        .into_spec(state.supervisor.max_job_duration())
        .map_err(ApiError::BadRequest)?;
    let accepted = state.supervisor.start_job(spec).await?;
    Ok((StatusCode::CREATED, Json(accepted)))
}

pub(super) async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    Ok(Json(state.supervisor.get_job(&job_id)?))
}

pub(super) async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StopAck>, ApiError> {
    Ok(Json(state.supervisor.stop_job(&job_id)?))
}

pub(super) async fn get_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResults>, ApiError> {
    Ok(Json(state.supervisor.get_results(&job_id)?))
}
