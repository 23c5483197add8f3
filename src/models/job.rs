// Job models: the immutable request, the runtime record, and per-operation outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::collector::ResultsProvider;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ingress,
    Egress,
    Both,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
            Direction::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanMethod {
    #[default]
    Span,
    Erspan,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultDetail {
    #[default]
    Summary,
    Flows,
    Pcaplike,
}

/// What to monitor and for how long. Immutable once a job is admitted.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub port: String,
    pub direction: Direction,
    pub span_method: SpanMethod,
    pub vlan: Option<u16>,
    pub filters: BTreeMap<String, serde_json::Value>,
    pub sample_rate: u32,
    pub duration: Duration,
    pub export: bool,
    pub result_detail: ResultDetail,
}

impl JobSpec {
    /// Spec with defaults for everything but the port and duration.
    pub fn new(port: impl Into<String>, duration: Duration) -> Self {
        Self {
            port: port.into(),
            direction: Direction::default(),
            span_method: SpanMethod::default(),
            vlan: None,
            filters: BTreeMap::new(),
            sample_rate: 1,
            duration,
            export: true,
            result_detail: ResultDetail::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Starting,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Starting -> Running -> Done, or Starting -> Failed. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Starting, JobState::Running)
                | (JobState::Starting, JobState::Failed)
                | (JobState::Running, JobState::Done)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Runtime record of one monitoring job. Owned by the supervisor's registry.
pub struct Job {
    pub id: String,
    pub spec: JobSpec,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub interface: String,
    pub cancel: Option<CancellationToken>,
    pub results: Option<Arc<dyn ResultsProvider>>,
}

impl Job {
    pub fn new(id: String, spec: JobSpec, now: DateTime<Utc>) -> Self {
        let lifetime = chrono::Duration::from_std(spec.duration).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id,
            spec,
            state: JobState::Starting,
            started_at: now,
            expires_at,
            interface: String::new(),
            cancel: None,
            results: None,
        }
    }

    /// Moves forward in the lifecycle. Returns false (and leaves the state alone)
    /// for a backwards or out-of-terminal transition.
    pub fn transition(&mut self, next: JobState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.state,
            started_at: self.started_at,
            expires_at: self.expires_at,
            port: self.spec.port.clone(),
            interface: self.interface.clone(),
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .field("expires_at", &self.expires_at)
            .field("interface", &self.interface)
            .field("has_results", &self.results.is_some())
            .finish()
    }
}

/// Point-in-time copy of a registered job, as returned by `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobState,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub port: String,
    pub interface: String,
}

/// Outcome of an admitted `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartAccepted {
    pub job_id: String,
    pub status: JobState,
    pub interface: String,
}

/// Outcome of `stop`; status is always "stopped".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopAck {
    pub job_id: String,
    pub status: String,
}

impl StopAck {
    pub fn stopped(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: "stopped".into(),
        }
    }
}
