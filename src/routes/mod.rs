// HTTP routes: job control under /v1/monitor/jobs, plus version and metrics

mod http;
mod jobs;

pub use jobs::StartJobRequest;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::metrics::MetricsRegistry;
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) supervisor: Arc<Supervisor>,
    pub(crate) metrics: Option<Arc<MetricsRegistry>>,
}

/// Builds the router. `metrics` is served at `metrics_path` when present.
pub fn app(
    supervisor: Arc<Supervisor>,
    metrics: Option<Arc<MetricsRegistry>>,
    metrics_path: &str,
) -> Router {
    let serve_metrics = metrics.is_some();
    let state = AppState {
        supervisor,
        metrics,
    };
    let mut router = Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/v1/monitor/jobs", post(jobs::start_job)) // POST /v1/monitor/jobs
        .route(
            "/v1/monitor/jobs/{job_id}",
            get(jobs::get_job).delete(jobs::stop_job),
        ) // GET, DELETE /v1/monitor/jobs/{job_id}
        .route("/v1/monitor/jobs/{job_id}/results", get(jobs::get_results)); // GET .../results
    if serve_metrics {
        router = router.route(metrics_path, get(http::metrics_handler));
    }
    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
