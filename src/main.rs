use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use serde::Serialize;
use tracing::{info, warn};

use harbortop::app::App;
use harbortop::config::{self, Config, load_config, load_config_from_path};
use harbortop::event::{Dispatcher, EventHandler};
use harbortop::grouping::group_workloads;
use harbortop::logging;
use harbortop::refresh::{RefreshOrchestrator, RefreshReport, RefreshSettings};
use harbortop::runtime::RuntimeClient;
use harbortop::runtime::docker::DockerClient;
use harbortop::runtime::workload::WorkloadSnapshot;
use harbortop::ui;

/// Gap between the two collections of `--snapshot`, so CPU has a delta.
const SNAPSHOT_SAMPLE_GAP: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(
    name = "harbortop",
    version,
    about = "Live TUI dashboard for containers, grouped by name, with stats and logs"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Refresh rate in milliseconds
    #[arg(long)]
    refresh_rate: Option<u64>,

    /// Docker host: unix:///path, tcp://host:port or http://host:port
    #[arg(long)]
    host: Option<String>,

    /// Only list running containers
    #[arg(long, default_value_t = false)]
    running_only: bool,

    /// Color support: auto, 256, truecolor, mono
    #[arg(long)]
    color: Option<String>,

    /// Write diagnostics to this file instead of the configured one
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print grouped containers with CPU/memory as JSON and exit
    #[arg(long, default_value_t = false)]
    snapshot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);
    let log_file = logging::init(&config.logging, cli.log_file.as_deref())?;
    info!(log_file = ?log_file, "harbortop starting");

    let client = Arc::new(DockerClient::connect(&config.runtime)?);

    if cli.snapshot {
        client.ping().await?;
        return run_snapshot(client, &config).await;
    }
    // The dashboard still starts; the header shows the error until the
    // runtime answers.
    if let Err(err) = client.ping().await {
        warn!(endpoint = client.endpoint(), error = %err, "runtime did not answer ping");
    }

    let mut terminal = ratatui::init();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        ratatui::restore();
        original_hook(panic_info);
    }));

    let result = run(&mut terminal, client, config).await;

    ratatui::restore();

    result
}

fn refresh_settings(config: &Config) -> RefreshSettings {
    RefreshSettings {
        running_only: config.general.running_only,
        log_tail_lines: config.logs.tail_lines,
        action_settle: Duration::from_millis(config.general.action_settle_ms),
        max_concurrent_fetches: config.general.max_concurrent_fetches,
    }
}

async fn run(
    terminal: &mut ratatui::DefaultTerminal,
    client: Arc<DockerClient>,
    config: Config,
) -> Result<()> {
    let refresh_rate = Duration::from_millis(config.general.refresh_rate_ms);
    // Ticks only drive status expiry and the busy indicator.
    let mut events = EventHandler::new(Duration::from_millis(250));
    let orchestrator =
        RefreshOrchestrator::new(client, events.dispatcher(), refresh_settings(&config));
    let timer = orchestrator.spawn_timer(refresh_rate);
    let mut app = App::new(&config, orchestrator.clone());

    // The timer's first tick starts the initial cycle.
    terminal.draw(|frame| ui::draw(frame, &app))?;

    while app.running {
        let Some(event) = events.next().await else {
            warn!("event channel closed");
            break;
        };
        if app.handle_event(event) && app.running {
            terminal.draw(|frame| ui::draw(frame, &app))?;
        }
    }

    orchestrator.shutdown();
    timer.abort();
    info!(cycles = orchestrator.cycles(), "harbortop exiting");
    Ok(())
}

#[derive(Serialize)]
struct SnapshotGroup<'a> {
    prefix: &'a str,
    workloads: Vec<SnapshotWorkload<'a>>,
}

#[derive(Serialize)]
struct SnapshotWorkload<'a> {
    id: &'a str,
    name: &'a str,
    image: &'a str,
    status: &'static str,
    cpu_percent: Option<f64>,
    memory_used: Option<u64>,
    memory_percent: Option<f64>,
}

impl<'a> From<&'a WorkloadSnapshot> for SnapshotWorkload<'a> {
    fn from(w: &'a WorkloadSnapshot) -> Self {
        SnapshotWorkload {
            id: w.short_id(),
            name: &w.name,
            image: &w.image,
            status: w.status.label(),
            cpu_percent: w.cpu_percent(),
            memory_used: w.counters.as_ref().map(|pair| pair.current.memory_used),
            memory_percent: w.memory_percent(),
        }
    }
}

/// Collects twice, a second apart, and prints the second report grouped.
async fn run_snapshot(client: Arc<DockerClient>, config: &Config) -> Result<()> {
    let (dispatcher, _rx) = Dispatcher::channel();
    let orchestrator = RefreshOrchestrator::new(client, dispatcher, refresh_settings(config));

    orchestrator
        .collect_once()
        .await
        .map_err(|e| eyre!("listing containers failed: {e}"))?;
    tokio::time::sleep(SNAPSHOT_SAMPLE_GAP).await;
    let report = orchestrator
        .collect_once()
        .await
        .map_err(|e| eyre!("listing containers failed: {e}"))?;

    println!("{}", snapshot_json(&report)?);
    Ok(())
}

fn snapshot_json(report: &RefreshReport) -> Result<String> {
    let pairs: Vec<(&str, &str)> = report
        .workloads
        .iter()
        .map(|w| (w.id.as_str(), w.name.as_str()))
        .collect();
    let groups = group_workloads(&pairs, &[]);

    let out: Vec<SnapshotGroup> = groups
        .iter()
        .map(|group| SnapshotGroup {
            prefix: &group.prefix,
            workloads: group
                .members
                .iter()
                .filter_map(|id| report.workloads.iter().find(|w| &w.id == id))
                .map(SnapshotWorkload::from)
                .collect(),
        })
        .collect();

    Ok(serde_json::to_string_pretty(&out)?)
}

fn load_config_for_cli(cli: &Cli) -> config::Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(rate) = cli.refresh_rate {
        config.general.refresh_rate_ms = rate;
    }
    if let Some(ref host) = cli.host {
        config.runtime.docker_host = host.clone();
    }
    if cli.running_only {
        config.general.running_only = true;
    }
    if let Some(ref support) = cli.color {
        config.colors.color_support = support.clone();
    }

    config
}
