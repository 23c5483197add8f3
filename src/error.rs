// Job-control errors and their HTTP mapping

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Which provisioning step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    Mirror,
    Attach,
}

impl std::fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionStage::Mirror => f.write_str("mirror"),
            ProvisionStage::Attach => f.write_str("attach"),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),

    /// Retry-later outcome, never fatal.
    #[error("at most {max} concurrent jobs are allowed, try again later")]
    AdmissionLimitExceeded { max: usize },

    #[error("{stage} provisioning failed: {cause:#}")]
    ProvisioningFailed {
        stage: ProvisionStage,
        cause: anyhow::Error,
    },
}

impl JobError {
    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            JobError::NotFound(_) => "not_found",
            JobError::AdmissionLimitExceeded { .. } => "admission_limit",
            JobError::ProvisioningFailed { .. } => "provisioning_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::AdmissionLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            JobError::ProvisioningFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::AdmissionLimitExceeded { .. })
    }
}

/// Seconds suggested to clients rejected by admission control.
const RETRY_AFTER_SECS: &str = "5";

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let body = axum::Json(serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        let mut response = (self.status(), body).into_response();
        if self.is_retryable() {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from_static(RETRY_AFTER_SECS),
            );
        }
        response
    }
}
