// Per-job kernel counter collection: scrape loop, results tally, Collector contract

mod aggregator;
#[cfg(target_os = "linux")]
mod pinned;
mod source;

pub use aggregator::{Aggregator, CycleReport};
pub use source::{CounterSource, InterfaceRow, pinned_source};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

use crate::config::CollectorConfig;
use crate::metrics::MetricsSink;
use crate::models::{
    ExportInfo, Histogram, IfProtoKey, JobResults, JobSpec, ProtoStats, TopFlow,
};

/// Most flows reported in a results summary.
pub const TOP_FLOWS_LIMIT: usize = 10;

/// Failure of a single scrape cycle. Logged and counted, never surfaced to job control.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("BPF map unavailable: {0}")]
    MapUnavailable(String),

    #[error("lookup {table}[{key}]: {reason}")]
    Lookup {
        table: &'static str,
        key: String,
        reason: String,
    },

    #[error("iterate {table}: {reason}")]
    Iterate { table: &'static str, reason: String },

    #[error("scrape task failed: {0}")]
    Task(String),
}

impl CollectError {
    /// Key used in the results summary's error counts.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectError::MapUnavailable(_) => "map_unavailable",
            CollectError::Lookup { .. } => "lookup",
            CollectError::Iterate { .. } => "iterate",
            CollectError::Task(_) => "task",
        }
    }
}

/// Summary of what a job's collector has seen so far.
pub trait ResultsProvider: Send + Sync {
    fn summary(&self) -> JobResults;
}

/// Starts collection for one job. The returned provider stays readable after
/// `scope` ends; collection itself stops when `scope` is cancelled.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn run(
        &self,
        scope: CancellationToken,
        job_id: &str,
        spec: &JobSpec,
    ) -> anyhow::Result<Arc<dyn ResultsProvider>>;
}

#[derive(Default)]
struct Totals {
    packets: u64,
    bytes: u64,
    errors: BTreeMap<String, u64>,
    flows: HashMap<IfProtoKey, ProtoStats>,
}

/// Running totals of the deltas one job's aggregator emitted.
pub struct JobTally {
    started: Instant,
    window: Duration,
    export: ExportInfo,
    totals: Mutex<Totals>,
}

impl JobTally {
    pub fn new(window: Duration, export: ExportInfo) -> Self {
        Self {
            started: Instant::now(),
            window,
            export,
            totals: Mutex::new(Totals::default()),
        }
    }

    pub fn record(&self, report: &CycleReport) {
        let total = report.total();
        let mut t = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        t.packets = t.packets.saturating_add(total.packets);
        t.bytes = t.bytes.saturating_add(total.bytes);
        for (key, delta) in &report.per_interface {
            let flow = t.flows.entry(*key).or_default();
            flow.packets = flow.packets.saturating_add(delta.packets);
            flow.bytes = flow.bytes.saturating_add(delta.bytes);
        }
    }

    pub fn record_error(&self, kind: &str) {
        let mut t = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        *t.errors.entry(kind.to_string()).or_default() += 1;
    }
}

impl ResultsProvider for JobTally {
    fn summary(&self) -> JobResults {
        let t = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        let mut flows: Vec<(&IfProtoKey, &ProtoStats)> = t.flows.iter().collect();
        flows.sort_by(|a, b| b.1.bytes.cmp(&a.1.bytes).then_with(|| a.0.cmp(b.0)));
        let top_flows = flows
            .into_iter()
            .take(TOP_FLOWS_LIMIT)
            .map(|(key, stats)| TopFlow {
                flow: format!("if{}/{}", key.ifindex, key.category()),
                pkts: stats.packets,
                bytes: stats.bytes,
            })
            .collect();

        JobResults {
            window_sec: self.started.elapsed().min(self.window).as_secs(),
            packets_total: t.packets,
            bytes_total: t.bytes,
            errors: t.errors.clone(),
            top_flows,
            latency_histogram_ns: Histogram::default(),
            export: self.export.clone(),
        }
    }
}

/// A job's tally as seen by the shared scrape loop.
struct Subscriber {
    tally: Arc<JobTally>,
    /// The first report after joining covers time before the job started.
    skip_next: bool,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    active: HashMap<u64, Subscriber>,
    /// Stops the running scrape loop; `None` while no loop runs.
    running: Option<CancellationToken>,
}

type Shared = Arc<Mutex<Subscribers>>;

/// Collector that scrapes the kernel counter maps on a fixed interval.
///
/// The maps are global to the host, so there is one aggregator (one set of
/// baselines) per process and one scrape loop, running while at least one job
/// is subscribed. Each cycle's deltas reach the sink once and are fanned out to
/// every subscribed job's tally.
pub struct KernelCollector {
    aggregator: Arc<Mutex<Aggregator>>,
    subscribers: Shared,
    interval: Duration,
    suppress_first_cycle: bool,
    /// Where exported metrics can be read; `None` when export is disabled.
    export_endpoint: Option<String>,
}

impl KernelCollector {
    pub fn new(
        source: Arc<dyn CounterSource>,
        sink: Arc<dyn MetricsSink>,
        config: &CollectorConfig,
        export_endpoint: Option<String>,
    ) -> Self {
        Self {
            aggregator: Arc::new(Mutex::new(Aggregator::new(
                source,
                sink,
                config.suppress_first_cycle,
            ))),
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            interval: config.scrape_interval(),
            suppress_first_cycle: config.suppress_first_cycle,
            export_endpoint,
        }
    }

    /// Jobs currently receiving scrape results.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).active.len()
    }

    /// Whether the shared scrape loop is running.
    pub fn is_scraping(&self) -> bool {
        lock(&self.subscribers).running.is_some()
    }

    fn subscribe(&self, tally: Arc<JobTally>) -> u64 {
        let mut subs = lock(&self.subscribers);
        let id = subs.next_id;
        subs.next_id += 1;
        subs.active.insert(
            id,
            Subscriber {
                tally,
                skip_next: self.suppress_first_cycle,
            },
        );
        if subs.running.is_none() {
            let stop = CancellationToken::new();
            subs.running = Some(stop.clone());
            tokio::spawn(scrape_loop(
                self.aggregator.clone(),
                self.subscribers.clone(),
                self.interval,
                stop,
            ));
        }
        id
    }
}

fn lock(subscribers: &Shared) -> std::sync::MutexGuard<'_, Subscribers> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unsubscribe(subscribers: &Shared, id: u64) {
    let mut subs = lock(subscribers);
    subs.active.remove(&id);
    if subs.active.is_empty() {
        if let Some(stop) = subs.running.take() {
            stop.cancel();
        }
    }
}

async fn scrape(aggregator: &Arc<Mutex<Aggregator>>) -> Result<CycleReport, CollectError> {
    let aggregator = aggregator.clone();
    tokio::task::spawn_blocking(move || {
        aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .collect_once()
    })
    .await
    .map_err(|e| CollectError::Task(e.to_string()))?
}

fn fan_out(subscribers: &Shared, outcome: Result<CycleReport, CollectError>) {
    let mut subs = lock(subscribers);
    match outcome {
        Ok(report) => {
            for sub in subs.active.values_mut() {
                if sub.skip_next {
                    sub.skip_next = false;
                } else {
                    sub.tally.record(&report);
                }
            }
        }
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "scrape cycle failed");
            for sub in subs.active.values() {
                sub.tally.record_error(e.kind());
            }
        }
    }
}

async fn scrape_loop(
    aggregator: Arc<Mutex<Aggregator>>,
    subscribers: Shared,
    period: Duration,
    stop: CancellationToken,
) {
    let span = tracing::debug_span!("scrape", interval_ms = period.as_millis() as u64);
    async move {
        debug!("scrape loop started");
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = tick.tick() => {
                    let outcome = scrape(&aggregator).await;
                    if stop.is_cancelled() {
                        break;
                    }
                    fan_out(&subscribers, outcome);
                }
            }
        }
        debug!("scrape loop stopped");
    }
    .instrument(span)
    .await
}

#[async_trait]
impl Collector for KernelCollector {
    async fn run(
        &self,
        scope: CancellationToken,
        job_id: &str,
        spec: &JobSpec,
    ) -> anyhow::Result<Arc<dyn ResultsProvider>> {
        let export = ExportInfo {
            exported: spec.export && self.export_endpoint.is_some(),
            endpoint: self.export_endpoint.clone().unwrap_or_default(),
        };
        let tally = Arc::new(JobTally::new(spec.duration, export));
        let id = self.subscribe(tally.clone());
        debug!(job_id = %job_id, subscriber = id, "job subscribed to scrape loop");

        let subscribers = self.subscribers.clone();
        tokio::spawn(async move {
            scope.cancelled().await;
            unsubscribe(&subscribers, id);
        });

        Ok(tally)
    }
}
