// Metrics export for scraped kernel counters: sink contract and the Prometheus registry

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::models::Category;

/// Buckets for the per-cycle byte deltas (frame sizes up to jumbo, then bulk).
pub const BYTES_BUCKETS: &[f64] = &[
    64.0, 128.0, 256.0, 512.0, 1024.0, 1500.0, 9000.0, 65536.0, 262144.0, 1048576.0,
];

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Destination for per-cycle counter deltas. Increments are never negative.
pub trait MetricsSink: Send + Sync {
    fn add_packets(&self, delta: u64, category: Category, ifindex: Option<u32>);
    fn record_bytes(&self, delta: u64, category: Category, ifindex: Option<u32>);
}

/// Sink that drops everything (metrics export disabled).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn add_packets(&self, _delta: u64, _category: Category, _ifindex: Option<u32>) {}
    fn record_bytes(&self, _delta: u64, _category: Category, _ifindex: Option<u32>) {}
}

/// `telegen_bpf_packets_total` (counter) and `telegen_bpf_bytes` (histogram),
/// both labelled by `proto` and `ifindex` (empty for global rows).
#[derive(Clone)]
pub struct PrometheusSink {
    packets_total: IntCounterVec,
    bytes: HistogramVec,
}

impl PrometheusSink {
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        let packets_total = IntCounterVec::new(
            Opts::new(
                "telegen_bpf_packets_total",
                "Packets observed by the tc eBPF program",
            ),
            &["proto", "ifindex"],
        )?;
        registry.register(Box::new(packets_total.clone()))?;

        let bytes = HistogramVec::new(
            HistogramOpts::new(
                "telegen_bpf_bytes",
                "Bytes observed by the tc eBPF program per scrape cycle",
            )
            .buckets(BYTES_BUCKETS.to_vec()),
            &["proto", "ifindex"],
        )?;
        registry.register(Box::new(bytes.clone()))?;

        Ok(Self {
            packets_total,
            bytes,
        })
    }
}

fn ifindex_label(ifindex: Option<u32>) -> String {
    ifindex.map(|i| i.to_string()).unwrap_or_default()
}

impl MetricsSink for PrometheusSink {
    fn add_packets(&self, delta: u64, category: Category, ifindex: Option<u32>) {
        let ifindex = ifindex_label(ifindex);
        self.packets_total
            .with_label_values(&[category.as_str(), ifindex.as_str()])
            .inc_by(delta);
    }

    fn record_bytes(&self, delta: u64, category: Category, ifindex: Option<u32>) {
        let ifindex = ifindex_label(ifindex);
        self.bytes
            .with_label_values(&[category.as_str(), ifindex.as_str()])
            .observe(delta as f64);
    }
}

/// Owns the Prometheus registry for the lifetime of the process. The binary
/// injects its sink into the collector and serves `encode_text` over HTTP.
pub struct MetricsRegistry {
    registry: Registry,
    sink: PrometheusSink,
}

impl MetricsRegistry {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();
        let sink = PrometheusSink::new(&registry)?;
        Ok(Self { registry, sink })
    }

    pub fn sink(&self) -> PrometheusSink {
        self.sink.clone()
    }

    /// Prometheus text exposition of everything registered.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}
