// Shared test fakes: providers that log into an ordered event list, counter source, sink
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telegen::collector::{CollectError, Collector, CounterSource, InterfaceRow, ResultsProvider};
use telegen::metrics::MetricsSink;
use telegen::models::{Category, JobResults, JobSpec, ProtoStats};
use telegen::provision::{AttachProvider, Cleanup, MirrorProvider};
use telegen::supervisor::{Providers, Supervisor};
use tokio_util::sync::CancellationToken;

pub type Events = Arc<Mutex<Vec<String>>>;

pub fn events() -> Events {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

pub fn count(events: &Events, name: &str) -> usize {
    events.lock().unwrap().iter().filter(|e| *e == name).count()
}

fn logged_cleanup(events: &Events, name: &'static str) -> Cleanup {
    let events = events.clone();
    Cleanup::new(async move {
        events.lock().unwrap().push(name.to_string());
        Ok(())
    })
}

pub struct FakeMirror {
    pub events: Events,
    pub ifname: String,
    pub fail: bool,
}

#[async_trait]
impl MirrorProvider for FakeMirror {
    async fn create(&self, _spec: &JobSpec) -> anyhow::Result<(String, Cleanup)> {
        self.events.lock().unwrap().push("mirror:create".into());
        if self.fail {
            anyhow::bail!("ip link add failed");
        }
        Ok((self.ifname.clone(), logged_cleanup(&self.events, "mirror:cleanup")))
    }
}

pub struct FakeAttach {
    pub events: Events,
    pub fail: bool,
}

#[async_trait]
impl AttachProvider for FakeAttach {
    async fn attach(&self, interface: &str, _spec: &JobSpec) -> anyhow::Result<Cleanup> {
        self.events
            .lock()
            .unwrap()
            .push(format!("attach:{}", interface));
        if self.fail {
            anyhow::bail!("tc attach failed");
        }
        Ok(logged_cleanup(&self.events, "attach:cleanup"))
    }
}

pub struct StaticResults(pub JobResults);

impl ResultsProvider for StaticResults {
    fn summary(&self) -> JobResults {
        self.0.clone()
    }
}

#[derive(Default)]
pub struct FakeCollector {
    pub fail: bool,
    pub panic: bool,
    pub runs: AtomicUsize,
    pub scopes: Mutex<Vec<CancellationToken>>,
    pub results: JobResults,
}

#[async_trait]
impl Collector for FakeCollector {
    async fn run(
        &self,
        scope: CancellationToken,
        _job_id: &str,
        _spec: &JobSpec,
    ) -> anyhow::Result<Arc<dyn ResultsProvider>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.scopes.lock().unwrap().push(scope);
        if self.panic {
            panic!("collector blew up");
        }
        if self.fail {
            anyhow::bail!("collector unavailable");
        }
        Ok(Arc::new(StaticResults(self.results.clone())))
    }
}

pub struct Harness {
    pub supervisor: Arc<Supervisor>,
    pub events: Events,
    pub collector: Arc<FakeCollector>,
}

pub fn harness(max: usize, mirror_fails: bool, attach_fails: bool) -> Harness {
    harness_with_collector(max, mirror_fails, attach_fails, FakeCollector::default())
}

pub fn harness_with_collector(
    max: usize,
    mirror_fails: bool,
    attach_fails: bool,
    collector: FakeCollector,
) -> Harness {
    build_harness(max, mirror_fails, attach_fails, collector, |s| s)
}

/// Harness whose supervisor is adjusted by `tune` (retention, duration limit).
pub fn build_harness(
    max: usize,
    mirror_fails: bool,
    attach_fails: bool,
    collector: FakeCollector,
    tune: impl FnOnce(Supervisor) -> Supervisor,
) -> Harness {
    let events = events();
    let collector = Arc::new(collector);
    let supervisor = Arc::new(tune(Supervisor::new(
        Providers {
            mirror: Arc::new(FakeMirror {
                events: events.clone(),
                ifname: "mirror0".into(),
                fail: mirror_fails,
            }),
            attach: Arc::new(FakeAttach {
                events: events.clone(),
                fail: attach_fails,
            }),
            collector: collector.clone(),
        },
        max,
    )));
    Harness {
        supervisor,
        events,
        collector,
    }
}

pub fn spec(duration: Duration) -> JobSpec {
    JobSpec::new("Ethernet0", duration)
}

/// Polls `cond` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Counter source whose shard values tests set directly.
#[derive(Default)]
pub struct FakeSource {
    pub global: Mutex<[Vec<ProtoStats>; 4]>,
    pub rows: Mutex<Option<Vec<InterfaceRow>>>,
    pub fail: AtomicBool,
    pub fail_rows: AtomicBool,
}

impl FakeSource {
    pub fn set_global(&self, idx: usize, shards: Vec<ProtoStats>) {
        self.global.lock().unwrap()[idx] = shards;
    }

    pub fn set_rows(&self, rows: Option<Vec<InterfaceRow>>) {
        *self.rows.lock().unwrap() = rows;
    }
}

impl CounterSource for FakeSource {
    fn global_shards(&self, idx: u32) -> Result<Vec<ProtoStats>, CollectError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollectError::MapUnavailable("stats_percpu gone".into()));
        }
        Ok(self.global.lock().unwrap()[idx as usize].clone())
    }

    fn interface_rows(&self) -> Result<Option<Vec<InterfaceRow>>, CollectError> {
        if self.fail_rows.load(Ordering::SeqCst) {
            return Err(CollectError::Iterate {
                table: "if_stats_percpu",
                reason: "map iteration interrupted".into(),
            });
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Emitted {
    Packets(u64, Category, Option<u32>),
    Bytes(u64, Category, Option<u32>),
}

#[derive(Default)]
pub struct RecordingSink {
    pub emitted: Mutex<Vec<Emitted>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<Emitted> {
        std::mem::take(&mut *self.emitted.lock().unwrap())
    }

    /// Sum of packet increments received for a category.
    pub fn packets(&self, category: Category) -> u64 {
        self.emitted
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                Emitted::Packets(n, c, _) if *c == category => *n,
                _ => 0,
            })
            .sum()
    }
}

impl MetricsSink for RecordingSink {
    fn add_packets(&self, delta: u64, category: Category, ifindex: Option<u32>) {
        self.emitted
            .lock()
            .unwrap()
            .push(Emitted::Packets(delta, category, ifindex));
    }

    fn record_bytes(&self, delta: u64, category: Category, ifindex: Option<u32>) {
        self.emitted
            .lock()
            .unwrap()
            .push(Emitted::Bytes(delta, category, ifindex));
    }
}
