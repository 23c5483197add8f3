use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub attach: AttachConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Concurrency ceiling: jobs in starting/running never exceed this.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Largest `duration_sec` a start request may ask for.
    #[serde(default = "default_max_job_duration_sec")]
    pub max_job_duration_sec: u64,
    /// Seconds a finished job stays queryable before it is evicted.
    #[serde(default = "default_job_retention_sec")]
    pub job_retention_sec: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_job_duration_sec: default_max_job_duration_sec(),
            job_retention_sec: default_job_retention_sec(),
        }
    }
}

impl SupervisorConfig {
    pub fn max_job_duration(&self) -> Duration {
        Duration::from_secs(self.max_job_duration_sec)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_sec)
    }
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_max_job_duration_sec() -> u64 {
    86400
}

fn default_job_retention_sec() -> u64 {
    3600
}

/// Scrape interval used when `scrape_interval_ms` is unset or zero.
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// 0 means the default (5s).
    #[serde(default)]
    pub scrape_interval_ms: u64,
    #[serde(default = "default_pin_dir")]
    pub pin_dir: PathBuf,
    /// Skip export on the first scrape, which only establishes baselines.
    #[serde(default = "default_true")]
    pub suppress_first_cycle: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            scrape_interval_ms: 0,
            pin_dir: default_pin_dir(),
            suppress_first_cycle: true,
        }
    }
}

impl CollectorConfig {
    pub fn scrape_interval(&self) -> Duration {
        if self.scrape_interval_ms == 0 {
            DEFAULT_SCRAPE_INTERVAL
        } else {
            Duration::from_millis(self.scrape_interval_ms)
        }
    }
}

fn default_pin_dir() -> PathBuf {
    PathBuf::from("/sys/fs/bpf/telegen-sonic")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorMode {
    #[default]
    Erspan,
    Placeholder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub mode: MirrorMode,
    /// Name of the ERSPAN netdev.
    #[serde(default = "default_mirror_name")]
    pub name: String,
    /// Source device for mirroring; the job's port when unset.
    #[serde(default)]
    pub source_dev: Option<String>,
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default = "default_erspan_key")]
    pub key: u32,
    #[serde(default = "default_erspan_ttl")]
    pub ttl: u8,
    #[serde(default = "default_erspan_tos")]
    pub tos: String,
    /// On ERSPAN failure, hand out `name` anyway with a no-op cleanup.
    #[serde(default = "default_true")]
    pub fallback_to_placeholder: bool,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            mode: MirrorMode::default(),
            name: default_mirror_name(),
            source_dev: None,
            remote: None,
            local: None,
            key: default_erspan_key(),
            ttl: default_erspan_ttl(),
            tos: default_erspan_tos(),
            fallback_to_placeholder: true,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_mirror_name() -> String {
    "erspan0".into()
}

fn default_erspan_key() -> u32 {
    10
}

fn default_erspan_ttl() -> u8 {
    64
}

fn default_erspan_tos() -> String {
    "inherit".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachConfig {
    #[serde(default = "default_bpf_object")]
    pub bpf_object: PathBuf,
    #[serde(default = "default_bpf_section")]
    pub section: String,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            bpf_object: default_bpf_object(),
            section: default_bpf_section(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_bpf_object() -> PathBuf {
    PathBuf::from("/bpf/tc_ingress.bpf.o")
}

fn default_bpf_section() -> String {
    "classifier".into()
}

fn default_command_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP path serving the Prometheus text exposition.
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".into()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");
        anyhow::ensure!(
            self.supervisor.max_concurrent_jobs > 0,
            "supervisor.max_concurrent_jobs must be > 0, got {}",
            self.supervisor.max_concurrent_jobs
        );
        anyhow::ensure!(
            self.supervisor.max_job_duration_sec > 0
                && self.supervisor.max_job_duration_sec <= i64::MAX as u64,
            "supervisor.max_job_duration_sec must be between 1 and {}, got {}",
            i64::MAX,
            self.supervisor.max_job_duration_sec
        );
        anyhow::ensure!(
            !self.collector.pin_dir.as_os_str().is_empty(),
            "collector.pin_dir must be non-empty"
        );
        anyhow::ensure!(!self.mirror.name.is_empty(), "mirror.name must be non-empty");
        anyhow::ensure!(
            self.mirror.command_timeout_ms > 0,
            "mirror.command_timeout_ms must be > 0, got {}",
            self.mirror.command_timeout_ms
        );
        anyhow::ensure!(
            !self.attach.section.is_empty(),
            "attach.section must be non-empty"
        );
        anyhow::ensure!(
            self.attach.command_timeout_ms > 0,
            "attach.command_timeout_ms must be > 0, got {}",
            self.attach.command_timeout_ms
        );
        anyhow::ensure!(
            self.metrics.path.starts_with('/'),
            "metrics.path must start with '/', got {:?}",
            self.metrics.path
        );
        Ok(())
    }
}
