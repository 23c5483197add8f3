use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use telegen::collector::{self, KernelCollector};
use telegen::metrics::{MetricsRegistry, MetricsSink, NoopSink};
use telegen::provision::{ErspanMirror, TcAttach};
use telegen::supervisor::{Providers, Supervisor};
use telegen::*;
use tikv_jemallocator::Jemalloc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// How long shutdown waits for in-flight jobs to release their interfaces.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Received shutdown signal");
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let metrics = if app_config.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new()?))
    } else {
        None
    };
    let sink: Arc<dyn MetricsSink> = match &metrics {
        Some(registry) => Arc::new(registry.sink()),
        None => Arc::new(NoopSink),
    };
    let export_endpoint = metrics
        .as_ref()
        .map(|_| app_config.metrics.path.clone());

    let collector = KernelCollector::new(
        collector::pinned_source(&app_config.collector.pin_dir),
        sink,
        &app_config.collector,
        export_endpoint,
    );
    let supervisor = Arc::new(
        Supervisor::new(
            Providers {
                mirror: Arc::new(ErspanMirror::new(app_config.mirror.clone())),
                attach: Arc::new(TcAttach::new(app_config.attach.clone())),
                collector: Arc::new(collector),
            },
            app_config.supervisor.max_concurrent_jobs,
        )
        .with_max_job_duration(app_config.supervisor.max_job_duration())
        .with_retention(app_config.supervisor.job_retention()),
    );

    let app = routes::app(supervisor.clone(), metrics, &app_config.metrics.path);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        version = version::VERSION,
        max_concurrent_jobs = app_config.supervisor.max_concurrent_jobs,
        scrape_interval_ms = app_config.collector.scrape_interval().as_millis() as u64,
        "Listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}
