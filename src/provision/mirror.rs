// ERSPAN v2 mirror netdev via `ip link`, with a placeholder fallback for dev/CI hosts

use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::{Cleanup, MirrorProvider, exec};
use crate::config::{MirrorConfig, MirrorMode};
use crate::models::JobSpec;

pub struct ErspanMirror {
    config: MirrorConfig,
}

impl ErspanMirror {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.command_timeout_ms)
    }

    async fn ensure_erspan(&self, spec: &JobSpec) -> anyhow::Result<(String, Cleanup)> {
        let name = self.config.name.clone();
        let dev = self
            .config
            .source_dev
            .clone()
            .unwrap_or_else(|| spec.port.clone());
        let (Some(remote), Some(local)) = (&self.config.remote, &self.config.local) else {
            anyhow::bail!("mirror.remote and mirror.local are required for erspan");
        };
        anyhow::ensure!(!dev.is_empty(), "no source device (mirror.source_dev or job port)");

        let timeout = self.timeout();
        if exec::run("ip", &["link", "show", "dev", name.as_str()], timeout)
            .await
            .is_ok()
        {
            info!(interface = %name, "reusing existing mirror interface");
            return Ok((name, Cleanup::noop()));
        }

        let args = erspan_link_args(&self.config, &dev, remote, local);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        exec::run("ip", &args, timeout).await?;

        if let Err(e) = exec::run("ip", &["link", "set", name.as_str(), "up"], timeout).await {
            if let Err(del) = exec::run("ip", &["link", "del", name.as_str()], timeout).await {
                warn!(error = %del, interface = %name, "failed to remove half-created mirror");
            }
            return Err(e);
        }

        let link = name.clone();
        let cleanup = Cleanup::new(async move {
            exec::run("ip", &["link", "del", link.as_str()], timeout).await?;
            info!(interface = %link, "mirror interface removed");
            Ok(())
        });
        Ok((name, cleanup))
    }

    fn placeholder(&self, spec: &JobSpec) -> (String, Cleanup) {
        let name = self.config.name.clone();
        info!(
            port = %spec.port,
            direction = spec.direction.as_str(),
            interface = %name,
            "mirror session (placeholder)"
        );
        (name, Cleanup::noop())
    }
}

#[async_trait]
impl MirrorProvider for ErspanMirror {
    async fn create(&self, spec: &JobSpec) -> anyhow::Result<(String, Cleanup)> {
        if self.config.mode == MirrorMode::Erspan {
            match self.ensure_erspan(spec).await {
                Ok((name, cleanup)) => {
                    info!(
                        port = %spec.port,
                        direction = spec.direction.as_str(),
                        interface = %name,
                        "ERSPAN mirror created"
                    );
                    return Ok((name, cleanup));
                }
                Err(e) if self.config.fallback_to_placeholder => {
                    warn!(error = %e, "ERSPAN provisioning failed, using placeholder");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.placeholder(spec))
    }
}

/// Arguments for `ip` that create the ERSPAN v2 netdev.
pub fn erspan_link_args(config: &MirrorConfig, dev: &str, remote: &str, local: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "link".into(),
        "add".into(),
        "name".into(),
        config.name.clone(),
        "type".into(),
        "erspan".into(),
        "erspan_ver".into(),
        "2".into(),
        "key".into(),
        config.key.to_string(),
        "remote".into(),
        remote.into(),
        "local".into(),
        local.into(),
        "dev".into(),
        dev.into(),
        "ttl".into(),
        config.ttl.to_string(),
    ];
    if !config.tos.is_empty() {
        args.push("tos".into());
        args.push(config.tos.clone());
    }
    args
}
