// Config loading and validation tests

use std::path::PathBuf;
use std::time::Duration;
use telegen::config::{AppConfig, DEFAULT_SCRAPE_INTERVAL, MirrorMode};

const VALID_CONFIG: &str = r#"
[server]
port = 8080
host = "0.0.0.0"

[supervisor]
max_concurrent_jobs = 3

[collector]
scrape_interval_ms = 2000
pin_dir = "/sys/fs/bpf/test"
suppress_first_cycle = false

[mirror]
mode = "erspan"
name = "erspan7"
remote = "10.0.0.2"
local = "10.0.0.1"
key = 42

[attach]
bpf_object = "/opt/bpf/counter.o"
section = "tc"
command_timeout_ms = 2500

[metrics]
enabled = true
path = "/prom"
"#;

const MINIMAL_CONFIG: &str = r#"
[server]
port = 8080
host = "127.0.0.1"
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.supervisor.max_concurrent_jobs, 3);
    assert_eq!(config.collector.scrape_interval(), Duration::from_millis(2000));
    assert_eq!(config.collector.pin_dir, PathBuf::from("/sys/fs/bpf/test"));
    assert!(!config.collector.suppress_first_cycle);
    assert_eq!(config.mirror.mode, MirrorMode::Erspan);
    assert_eq!(config.mirror.name, "erspan7");
    assert_eq!(config.mirror.remote.as_deref(), Some("10.0.0.2"));
    assert_eq!(config.mirror.key, 42);
    assert_eq!(config.attach.section, "tc");
    assert_eq!(config.attach.command_timeout_ms, 2500);
    assert_eq!(config.metrics.path, "/prom");
}

#[test]
fn test_config_defaults_for_omitted_sections() {
    let config = AppConfig::load_from_str(MINIMAL_CONFIG).expect("load_from_str");
    assert_eq!(config.supervisor.max_concurrent_jobs, 2);
    assert_eq!(
        config.supervisor.max_job_duration(),
        Duration::from_secs(86400)
    );
    assert_eq!(config.supervisor.job_retention(), Duration::from_secs(3600));
    assert_eq!(config.collector.scrape_interval(), DEFAULT_SCRAPE_INTERVAL);
    assert!(config.collector.suppress_first_cycle);
    assert_eq!(
        config.collector.pin_dir,
        PathBuf::from("/sys/fs/bpf/telegen-sonic")
    );
    assert_eq!(config.mirror.mode, MirrorMode::Erspan);
    assert_eq!(config.mirror.name, "erspan0");
    assert_eq!(config.mirror.ttl, 64);
    assert_eq!(config.mirror.tos, "inherit");
    assert!(config.mirror.fallback_to_placeholder);
    assert!(config.mirror.source_dev.is_none());
    assert_eq!(config.attach.section, "classifier");
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.path, "/metrics");
}

#[test]
fn test_zero_scrape_interval_means_default() {
    let cfg = format!("{MINIMAL_CONFIG}\n[collector]\nscrape_interval_ms = 0\n");
    let config = AppConfig::load_from_str(&cfg).unwrap();
    assert_eq!(config.collector.scrape_interval(), Duration::from_secs(5));
}

#[test]
fn test_placeholder_mode_parses() {
    let cfg = format!("{MINIMAL_CONFIG}\n[mirror]\nmode = \"placeholder\"\n");
    let config = AppConfig::load_from_str(&cfg).unwrap();
    assert_eq!(config.mirror.mode, MirrorMode::Placeholder);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8080", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_empty_host() {
    let bad = VALID_CONFIG.replace("host = \"0.0.0.0\"", "host = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.host"));
}

#[test]
fn test_config_validation_rejects_zero_max_jobs() {
    let bad = VALID_CONFIG.replace("max_concurrent_jobs = 3", "max_concurrent_jobs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("supervisor.max_concurrent_jobs"));
}

#[test]
fn test_config_validation_rejects_zero_max_job_duration() {
    let cfg = format!("{MINIMAL_CONFIG}\n[supervisor]\nmax_job_duration_sec = 0\n");
    let err = AppConfig::load_from_str(&cfg).unwrap_err();
    assert!(err.to_string().contains("supervisor.max_job_duration_sec"));
}

#[test]
fn test_config_validation_rejects_unrepresentable_max_job_duration() {
    let cfg = format!(
        "{MINIMAL_CONFIG}\n[supervisor]\nmax_job_duration_sec = {}\n",
        i64::MAX as u64 + 1
    );
    assert!(AppConfig::load_from_str(&cfg).is_err());
}

#[test]
fn test_config_validation_rejects_empty_mirror_name() {
    let bad = VALID_CONFIG.replace("name = \"erspan7\"", "name = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("mirror.name"));
}

#[test]
fn test_config_validation_rejects_zero_attach_timeout() {
    let bad = VALID_CONFIG.replace("command_timeout_ms = 2500", "command_timeout_ms = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("attach.command_timeout_ms"));
}

#[test]
fn test_config_validation_rejects_relative_metrics_path() {
    let bad = VALID_CONFIG.replace("path = \"/prom\"", "path = \"prom\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("metrics.path"));
}

#[test]
fn test_config_rejects_unknown_mirror_mode() {
    let bad = VALID_CONFIG.replace("mode = \"erspan\"", "mode = \"span\"");
    assert!(AppConfig::load_from_str(&bad).is_err());
}

#[test]
fn test_config_requires_server_section() {
    assert!(AppConfig::load_from_str("[supervisor]\nmax_concurrent_jobs = 1\n").is_err());
}

#[test]
fn test_example_config_is_valid() {
    let config = AppConfig::load_from_str(include_str!("../config.example.toml"))
        .expect("config.example.toml");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.collector.scrape_interval(), DEFAULT_SCRAPE_INTERVAL);
}
