use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use journey_client::{EventSink, HttpEventSink, LogEventSink};
use journey_fleet::config::parse_port_range;
use journey_fleet::{FleetConfig, ProcessLauncher};
use journey_protocol::{FailurePolicy, WorkerDescriptor};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "journey-fleet", version, about = "Journey worker fleet control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control plane HTTP API
    Serve(ServeArgs),

    /// Run a single step worker (spawned by the control plane)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address for the control plane API (env: JOURNEY_BIND)
    #[arg(long, env = "JOURNEY_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Worker port range, e.g. 4101-4199 (env: JOURNEY_PORT_RANGE)
    #[arg(long, env = "JOURNEY_PORT_RANGE", default_value = "4101-4199", value_parser = parse_port_range)]
    port_range: RangeInclusive<u16>,

    /// Spawn plus health-probe budget in milliseconds (env: JOURNEY_PROVISION_TIMEOUT_MS)
    #[arg(long, env = "JOURNEY_PROVISION_TIMEOUT_MS", default_value_t = 10_000)]
    provision_timeout_ms: u64,

    /// Terminate workers idle this long (env: JOURNEY_IDLE_TTL_SECS)
    #[arg(long, env = "JOURNEY_IDLE_TTL_SECS", default_value_t = 300)]
    idle_ttl_secs: u64,

    /// Reaper period in seconds (env: JOURNEY_REAP_INTERVAL_SECS)
    #[arg(long, env = "JOURNEY_REAP_INTERVAL_SECS", default_value_t = 30)]
    reap_interval_secs: u64,

    /// Cap on one step call in milliseconds (env: JOURNEY_STEP_TIMEOUT_MS)
    #[arg(long, env = "JOURNEY_STEP_TIMEOUT_MS", default_value_t = 10_000)]
    step_timeout_ms: u64,

    /// Collector URL for business events and flag notices (env: JOURNEY_EVENTS_URL)
    #[arg(long, env = "JOURNEY_EVENTS_URL")]
    events_url: Option<Url>,

    /// Keep executing steps after a failure
    #[arg(long, env = "JOURNEY_CONTINUE_ON_FAILURE")]
    continue_on_failure: bool,

    /// errorsPerTransaction applied when load tests toggle injection on
    #[arg(long, env = "JOURNEY_INJECTION_RATE", default_value_t = 0.1)]
    injection_rate: f64,
}

#[derive(Args, Debug)]
struct WorkerArgs {
    /// Worker descriptor as JSON
    #[arg(long)]
    descriptor: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Worker(args) => cmd_worker(args).await,
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(args: &ServeArgs) -> Result<FleetConfig> {
    if !(0.0..=1.0).contains(&args.injection_rate) {
        bail!("--injection-rate must be within [0, 1]");
    }
    let mut config = FleetConfig::default();
    config.http.bind = args.bind;
    config.supervisor.port_range = args.port_range.clone();
    config.supervisor.provision_timeout = Duration::from_millis(args.provision_timeout_ms);
    config.supervisor.idle_ttl = Duration::from_secs(args.idle_ttl_secs);
    config.supervisor.reap_interval = Duration::from_secs(args.reap_interval_secs.max(1));
    config.supervisor.events_url = args.events_url.as_ref().map(Url::to_string);
    config.orchestrator.step_timeout = Duration::from_millis(args.step_timeout_ms);
    if args.continue_on_failure {
        config.orchestrator.default_policy = FailurePolicy::ContinueOnFailure;
    }
    config.load.injection_rate = args.injection_rate;
    Ok(config)
}

async fn cmd_serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args)?;
    let notifier: Arc<dyn EventSink> = match &config.supervisor.events_url {
        Some(url) => Arc::new(HttpEventSink::new(url.clone(), Duration::from_secs(5))?),
        None => Arc::new(LogEventSink),
    };
    let launcher = Arc::new(ProcessLauncher::current_exe()?);
    let running = journey_fleet::start(config, launcher, notifier)
        .await
        .context("start control plane")?;
    tracing::info!(url = %running.base_url(), "control plane ready");

    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down...");
        }
        _ = async {
            match term.as_mut() {
                Some(t) => {
                    t.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        } => {
            tracing::info!("SIGTERM received, shutting down...");
        }
    }
    running.shutdown().await;
    Ok(())
}

async fn cmd_worker(args: WorkerArgs) -> Result<()> {
    let descriptor: WorkerDescriptor =
        serde_json::from_str(&args.descriptor).context("parse --descriptor")?;
    journey_worker::run(descriptor).await?;
    Ok(())
}
