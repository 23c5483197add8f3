// Turns cumulative per-CPU counters into per-cycle deltas and pushes them to the sink

use std::collections::HashMap;
use std::sync::Arc;

use super::CollectError;
use super::source::CounterSource;
use crate::metrics::MetricsSink;
use crate::models::{CATEGORY_COUNT, Category, IfProtoKey, ProtoStats};

/// Deltas produced by one scrape cycle. Empty when the cycle only set baselines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub global: Vec<(Category, ProtoStats)>,
    pub per_interface: Vec<(IfProtoKey, ProtoStats)>,
}

impl CycleReport {
    pub fn total(&self) -> ProtoStats {
        ProtoStats::sum(self.global.iter().map(|(_, d)| d))
    }
}

/// Baseline state of one aggregator. Lives as long as the scrape loop that owns it;
/// nothing is persisted across restarts.
pub struct Aggregator {
    source: Arc<dyn CounterSource>,
    sink: Arc<dyn MetricsSink>,
    last_global: [ProtoStats; CATEGORY_COUNT as usize],
    last_interface: HashMap<IfProtoKey, ProtoStats>,
    suppress_first_cycle: bool,
    primed: bool,
}

impl Aggregator {
    pub fn new(
        source: Arc<dyn CounterSource>,
        sink: Arc<dyn MetricsSink>,
        suppress_first_cycle: bool,
    ) -> Self {
        Self {
            source,
            sink,
            last_global: [ProtoStats::default(); CATEGORY_COUNT as usize],
            last_interface: HashMap::new(),
            suppress_first_cycle,
            primed: false,
        }
    }

    /// Last cumulative value seen for a global category.
    pub fn baseline(&self, category: Category) -> ProtoStats {
        self.last_global[category.index() as usize]
    }

    /// Last cumulative value seen for a per-interface key, if it was ever observed.
    pub fn interface_baseline(&self, key: &IfProtoKey) -> Option<ProtoStats> {
        self.last_interface.get(key).copied()
    }

    /// One scrape: read, diff against baselines, emit, update baselines.
    /// Every table is read before anything is emitted, so a failed read leaves
    /// the baselines untouched and exports nothing. The first successful cycle
    /// only records baselines when suppression is on.
    pub fn collect_once(&mut self) -> Result<CycleReport, CollectError> {
        let mut global = [ProtoStats::default(); CATEGORY_COUNT as usize];
        for (idx, slot) in (0..CATEGORY_COUNT).zip(global.iter_mut()) {
            *slot = ProtoStats::sum(&self.source.global_shards(idx)?);
        }
        let rows = self.source.interface_rows()?;

        let emit = self.primed || !self.suppress_first_cycle;
        let mut report = CycleReport::default();

        for (idx, current) in (0..CATEGORY_COUNT).zip(global) {
            let slot = &mut self.last_global[idx as usize];
            let delta = current.delta_since(slot);
            *slot = current;

            if emit && !delta.is_zero() {
                let category = Category::from_index(idx);
                self.emit(delta, category, None);
                report.global.push((category, delta));
            }
        }

        for (key, shards) in rows.unwrap_or_default() {
            let current = ProtoStats::sum(&shards);
            let prev = self.last_interface.get(&key).copied().unwrap_or_default();
            let delta = current.delta_since(&prev);
            self.last_interface.insert(key, current);

            if emit && !delta.is_zero() {
                self.emit(delta, key.category(), Some(key.ifindex));
                report.per_interface.push((key, delta));
            }
        }

        self.primed = true;
        Ok(report)
    }

    fn emit(&self, delta: ProtoStats, category: Category, ifindex: Option<u32>) {
        if delta.packets > 0 {
            self.sink.add_packets(delta.packets, category, ifindex);
        }
        if delta.bytes > 0 {
            self.sink.record_bytes(delta.bytes, category, ifindex);
        }
    }
}
