use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use sysmon::config::AppConfig;
use sysmon::docker_repo::{CollectorConfig, ContainerStatsCollector, DockerRuntime};
use sysmon::render::{JsonRenderer, Renderer, SummaryRenderer};
use sysmon::scheduler::{Control, Scheduler, SchedulerConfig};
use sysmon::sysinfo_repo::SysinfoRepo;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

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

#[derive(Parser, Debug)]
#[command(name = "sysmon", version, about = "Host and container metrics dashboard")]
struct Cli {
    /// Refresh interval in seconds (0.5 to 60)
    #[arg(short, long)]
    refresh: Option<f64>,
    /// Skip the process list
    #[arg(long)]
    no_processes: bool,
    /// Skip container metrics
    #[arg(long, conflicts_with = "docker_only")]
    no_docker: bool,
    /// Containers only; implies --no-processes
    #[arg(long)]
    docker_only: bool,
    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
    /// Emit one JSON snapshot per tick instead of the text summary
    #[arg(long)]
    json: bool,
    /// Config file (default: $CONFIG_FILE or ./sysmon.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of processes to list
    #[arg(long)]
    top: Option<usize>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(r) = self.refresh {
            config.monitoring.refresh_interval_secs = r;
        }
        if let Some(n) = self.top {
            config.collectors.top_processes = n;
        }
        if self.no_processes {
            config.collectors.processes = false;
        }
        if self.no_docker {
            config.collectors.containers = false;
        }
        if self.docker_only {
            config.collectors.processes = false;
            config.collectors.containers = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut app_config = AppConfig::read(cli.config.as_deref())?;
    cli.apply(&mut app_config);
    app_config.validate()?;

    let host = SysinfoRepo::new(app_config.collectors.processes);
    let containers = app_config.collectors.containers.then(|| {
        ContainerStatsCollector::new(
            DockerRuntime::connect(),
            CollectorConfig {
                timeout: app_config.docker_timeout(),
                reprobe_every_ticks: app_config.docker.reprobe_every_ticks,
            },
        )
    });
    let mut scheduler = Scheduler::new(host, containers, SchedulerConfig::from_app(&app_config));

    let mut renderer: Box<dyn Renderer> = if cli.json {
        Box::new(JsonRenderer::new(std::io::stdout()))
    } else {
        Box::new(SummaryRenderer::new(std::io::stdout()))
    };

    if cli.once {
        scheduler.run_once(renderer.as_mut()).await?;
        return Ok(());
    }

    let (control_tx, control_rx) = mpsc::channel(8);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Received shutdown signal");
        let _ = control_tx.send(Control::Stop).await;
    });

    tracing::info!(
        refresh_interval_secs = app_config.monitoring.refresh_interval_secs,
        processes = app_config.collectors.processes,
        containers = app_config.collectors.containers,
        "sysmon started"
    );
    scheduler.run(renderer.as_mut(), control_rx).await
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
}
