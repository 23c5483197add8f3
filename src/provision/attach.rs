// tc clsact attach of the counting program

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{AttachProvider, Cleanup, exec};
use crate::config::AttachConfig;
use crate::models::{Direction, JobSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcHook {
    Ingress,
    Egress,
}

impl TcHook {
    pub fn as_str(self) -> &'static str {
        match self {
            TcHook::Ingress => "ingress",
            TcHook::Egress => "egress",
        }
    }
}

pub fn hooks_for(direction: Direction) -> &'static [TcHook] {
    match direction {
        Direction::Ingress => &[TcHook::Ingress],
        Direction::Egress => &[TcHook::Egress],
        Direction::Both => &[TcHook::Ingress, TcHook::Egress],
    }
}

/// Arguments for `tc` that install the program as a direct-action filter.
pub fn tc_filter_args(interface: &str, hook: TcHook, object: &Path, section: &str) -> Vec<String> {
    vec![
        "filter".into(),
        "replace".into(),
        "dev".into(),
        interface.into(),
        hook.as_str().into(),
        "prio".into(),
        "1".into(),
        "handle".into(),
        "1".into(),
        "bpf".into(),
        "da".into(),
        "obj".into(),
        object.display().to_string(),
        "sec".into(),
        section.into(),
    ]
}

pub struct TcAttach {
    config: AttachConfig,
}

impl TcAttach {
    pub fn new(config: AttachConfig) -> Self {
        Self { config }
    }
}

async fn detach(interface: &str, hooks: &[TcHook], timeout: Duration) {
    for hook in hooks.iter().rev() {
        if let Err(e) = exec::run(
            "tc",
            &["filter", "del", "dev", interface, hook.as_str()],
            timeout,
        )
        .await
        {
            warn!(error = %e, interface, hook = hook.as_str(), "tc filter del failed");
        }
    }
}

#[async_trait]
impl AttachProvider for TcAttach {
    async fn attach(&self, interface: &str, spec: &JobSpec) -> anyhow::Result<Cleanup> {
        let timeout = Duration::from_millis(self.config.command_timeout_ms);
        let object: PathBuf = self.config.bpf_object.clone();
        if tokio::fs::metadata(&object).await.is_err() {
            anyhow::bail!("missing BPF object: {}", object.display());
        }

        if let Err(e) = exec::run("tc", &["qdisc", "add", "dev", interface, "clsact"], timeout).await
        {
            debug!(error = %e, interface, "clsact qdisc add failed (may already exist)");
        }

        let mut attached: Vec<TcHook> = Vec::new();
        for &hook in hooks_for(spec.direction) {
            let args = tc_filter_args(interface, hook, &object, &self.config.section);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            if let Err(e) = exec::run("tc", &args, timeout).await {
                detach(interface, &attached, timeout).await;
                return Err(e.context(format!("tc attach {} on {}", hook.as_str(), interface)));
            }
            attached.push(hook);
        }
        info!(
            interface,
            direction = spec.direction.as_str(),
            "tc program attached"
        );

        let interface = interface.to_string();
        Ok(Cleanup::new(async move {
            detach(&interface, &attached, timeout).await;
            if let Err(e) =
                exec::run("tc", &["qdisc", "del", "dev", interface.as_str(), "clsact"], timeout).await
            {
                warn!(error = %e, interface = %interface, "clsact qdisc del failed");
            }
            info!(interface = %interface, "tc program detached");
            Ok(())
        }))
    }
}
