// Job supervisor: admission, provisioning with rollback, lifecycle, registry

mod admission;
mod teardown;

pub use admission::{Admission, AdmissionSlot};
pub use teardown::TeardownStack;

use chrono::Utc;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::collector::{Collector, ResultsProvider};
use crate::error::{JobError, ProvisionStage};
use crate::models::{Job, JobResults, JobSnapshot, JobSpec, JobState, StartAccepted, StopAck};
use crate::provision::{AttachProvider, MirrorProvider};

type Registry = Arc<RwLock<HashMap<String, Job>>>;

/// Longest accepted job duration unless configured otherwise.
pub const DEFAULT_MAX_JOB_DURATION: Duration = Duration::from_secs(24 * 60 * 60);
/// How long a finished job stays queryable unless configured otherwise.
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Deadline used when `now + duration` is not representable (about 30 years out).
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// External collaborators the supervisor drives.
pub struct Providers {
    pub mirror: Arc<dyn MirrorProvider>,
    pub attach: Arc<dyn AttachProvider>,
    pub collector: Arc<dyn Collector>,
}

pub struct Supervisor {
    mirror: Arc<dyn MirrorProvider>,
    attach: Arc<dyn AttachProvider>,
    collector: Arc<dyn Collector>,
    admission: Arc<Admission>,
    jobs: Registry,
    tasks: TaskTracker,
    max_job_duration: Duration,
    retention: Duration,
}

fn deadline_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Token cancelled at `deadline` unless cancelled earlier.
fn deadline_scope(deadline: Instant) -> CancellationToken {
    let scope = CancellationToken::new();
    let watcher = scope.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = watcher.cancelled() => {}
            _ = tokio::time::sleep_until(deadline) => watcher.cancel(),
        }
    });
    scope
}

fn set_state(jobs: &Registry, id: &str, next: JobState) {
    let mut jobs = jobs.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(job) = jobs.get_mut(id) {
        let prev = job.state;
        if job.transition(next) {
            info!(job_id = %id, from = %prev, to = %next, "job state changed");
        } else {
            debug!(job_id = %id, from = %prev, to = %next, "ignored state transition");
        }
    }
}

/// Drops a finished job from the registry once `retention` has passed.
/// Runs outside the task tracker so shutdown does not wait on it.
fn evict_after(jobs: Registry, id: String, retention: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(retention).await;
        let evicted = jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if evicted {
            debug!(job_id = %id, "finished job evicted");
        }
    });
}

/// Body of a job's background task, up to (not including) teardown.
async fn run_lifecycle(
    jobs: &Registry,
    collector: &dyn Collector,
    scope: &CancellationToken,
    id: &str,
    spec: &JobSpec,
) {
    set_state(jobs, id, JobState::Running);

    match collector.run(scope.child_token(), id, spec).await {
        Ok(results) => {
            let mut jobs = jobs.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(job) = jobs.get_mut(id) {
                job.results = Some(results);
            }
        }
        Err(e) => warn!(error = %e, "collector failed to start, job continues without results"),
    }

    scope.cancelled().await;
    set_state(jobs, id, JobState::Done);
}

impl Supervisor {
    pub fn new(providers: Providers, max_concurrent_jobs: usize) -> Self {
        Self {
            mirror: providers.mirror,
            attach: providers.attach,
            collector: providers.collector,
            admission: Admission::new(max_concurrent_jobs),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            tasks: TaskTracker::new(),
            max_job_duration: DEFAULT_MAX_JOB_DURATION,
            retention: DEFAULT_JOB_RETENTION,
        }
    }

    pub fn with_max_job_duration(mut self, max: Duration) -> Self {
        self.max_job_duration = max;
        self
    }

    /// How long a finished job stays in the registry before it is evicted.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Upper bound the HTTP boundary enforces on requested durations.
    pub fn max_job_duration(&self) -> Duration {
        self.max_job_duration
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.admission.max()
    }

    /// Jobs currently holding an admission slot (starting, running or tearing down).
    pub fn active_jobs(&self) -> usize {
        self.admission.active()
    }

    /// Jobs in the registry, finished ones included.
    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub async fn start_job(&self, spec: JobSpec) -> Result<StartAccepted, JobError> {
        let Some(slot) = self.admission.try_reserve() else {
            let max = self.admission.max();
            warn!(max, port = %spec.port, "admission limit reached");
            return Err(JobError::AdmissionLimitExceeded { max });
        };

        let id = Uuid::new_v4().to_string();
        let mut job = Job::new(id.clone(), spec.clone(), Utc::now());
        let deadline = deadline_after(Instant::now(), spec.duration);
        let mut teardown = TeardownStack::new(id.clone());

        let (interface, mirror_cleanup) = match self.mirror.create(&spec).await {
            Ok(created) => created,
            Err(cause) => {
                job.transition(JobState::Failed);
                warn!(error = %cause, job_id = %id, port = %spec.port, "mirror provisioning failed");
                drop(slot);
                return Err(JobError::ProvisioningFailed {
                    stage: ProvisionStage::Mirror,
                    cause,
                });
            }
        };
        teardown.push("mirror", mirror_cleanup);
        job.interface = interface.clone();

        match self.attach.attach(&interface, &spec).await {
            Ok(attach_cleanup) => teardown.push("attach", attach_cleanup),
            Err(cause) => {
                job.transition(JobState::Failed);
                warn!(error = %cause, job_id = %id, interface = %interface, "attach failed, rolling back");
                teardown.unwind().await;
                drop(slot);
                return Err(JobError::ProvisioningFailed {
                    stage: ProvisionStage::Attach,
                    cause,
                });
            }
        }

        let scope = deadline_scope(deadline);
        job.cancel = Some(scope.clone());
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), job);
        info!(
            job_id = %id,
            port = %spec.port,
            interface = %interface,
            duration_ms = spec.duration.as_millis() as u64,
            "job admitted"
        );

        let jobs = self.jobs.clone();
        let collector = self.collector.clone();
        let task_id = id.clone();
        let retention = self.retention;
        let span = tracing::info_span!("job", job_id = %id);
        self.tasks.spawn(
            async move {
                let lifecycle = AssertUnwindSafe(run_lifecycle(
                    &jobs,
                    collector.as_ref(),
                    &scope,
                    &task_id,
                    &spec,
                ))
                .catch_unwind()
                .await;
                if lifecycle.is_err() {
                    error!("job lifecycle panicked, tearing down");
                    scope.cancel();
                    set_state(&jobs, &task_id, JobState::Done);
                }
                teardown.unwind().await;
                drop(slot);
                info!("job finished");
                evict_after(jobs, task_id, retention);
            }
            .instrument(span),
        );

        Ok(StartAccepted {
            job_id: id,
            status: JobState::Starting,
            interface,
        })
    }

    pub fn get_job(&self, id: &str) -> Result<JobSnapshot, JobError> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id)
            .map(Job::snapshot)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Requests early termination. Returns immediately; teardown runs in the
    /// job's own task. Stopping a finished or already-stopped job is a no-op.
    pub fn stop_job(&self, id: &str) -> Result<StopAck, JobError> {
        let cancel = {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            let job = jobs
                .get(id)
                .ok_or_else(|| JobError::NotFound(id.to_string()))?;
            job.cancel.clone()
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        info!(job_id = %id, "job stop requested");
        Ok(StopAck::stopped(id))
    }

    /// Collector summary for a job; zeroed if collection never started.
    pub fn get_results(&self, id: &str) -> Result<JobResults, JobError> {
        let results: Option<Arc<dyn ResultsProvider>> = {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            let job = jobs
                .get(id)
                .ok_or_else(|| JobError::NotFound(id.to_string()))?;
            job.results.clone()
        };
        Ok(results.map(|r| r.summary()).unwrap_or_default())
    }

    /// Cancels every job and waits up to `grace` for their teardown to finish.
    pub async fn shutdown(&self, grace: Duration) {
        let tokens: Vec<CancellationToken> = {
            let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
            jobs.values().filter_map(|j| j.cancel.clone()).collect()
        };
        for token in &tokens {
            token.cancel();
        }

        self.tasks.close();
        if tokio::time::timeout(grace, self.tasks.wait()).await.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "shutdown grace elapsed with jobs still tearing down"
            );
        } else {
            info!(cancelled = tokens.len(), "all jobs torn down");
        }
    }
}
