// Results summary returned by GET /v1/monitor/jobs/{id}/results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    pub window_sec: u64,
    pub packets_total: u64,
    pub bytes_total: u64,
    /// Scrape failures by kind (e.g. "map_unavailable", "lookup").
    pub errors: BTreeMap<String, u64>,
    pub top_flows: Vec<TopFlow>,
    pub latency_histogram_ns: Histogram,
    pub export: ExportInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFlow {
    pub flow: String,
    pub pkts: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bounds: Vec<u64>,
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub exported: bool,
    pub endpoint: String,
}
