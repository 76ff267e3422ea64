//! Container entrypoint for the TravelMate backend.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use travelmate_bootstrap::{
    build_waiter, load_topology, BootConfig, SequenceReport, Sequencer, ServerCommand,
    ServerLauncher, StartupPlan,
};
use travelmate_telemetry::{audit::write_startup_report, init_logging, LogFormat, Metrics};
use travelmate_topology::Topology;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "travelmate-boot")]
#[command(about = "Prepares the TravelMate web container and starts the server")]
struct Cli {
    /// Log level or filter directive (e.g. "info", "travelmate_probe=debug")
    #[arg(long, global = true, env = "BOOT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format: json or pretty
    #[arg(long, global = true, default_value = "json", env = "BOOT_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for dependencies, run the preparation steps, then start the server
    Run {
        /// Keep this process as the server's parent instead of exec'ing it
        #[arg(long, default_value = "false")]
        supervise: bool,

        /// Append a JSON report of the run to this file
        #[arg(long, env = "BOOT_REPORT_PATH")]
        report: Option<PathBuf>,

        /// Serve Prometheus metrics while the sequence runs
        #[arg(long, env = "BOOT_METRICS_ADDR")]
        metrics_bind_address: Option<String>,
    },
    /// Only wait until every dependency accepts connections
    Wait,
    /// Only apply database migrations (after waiting for dependencies)
    Migrate,
    /// Print the service startup order of a topology
    Plan {
        /// Compose file; the built-in web stack is used when omitted
        #[arg(long, env = "BOOT_COMPOSE_FILE")]
        compose: Option<PathBuf>,

        /// Service whose dependencies should be listed
        #[arg(long, default_value = "django")]
        service: String,

        /// Compose profiles to enable
        #[arg(long = "profile")]
        profiles: Vec<String>,
    },
    /// Resolve configuration and print what `run` would do, without doing it
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref(), cli.log_format)?;

    match cli.command {
        Commands::Run {
            supervise,
            report,
            metrics_bind_address,
        } => run(supervise, report, metrics_bind_address).await,
        Commands::Wait => wait().await,
        Commands::Migrate => migrate().await,
        Commands::Plan {
            compose,
            service,
            profiles,
        } => plan(compose, &service, profiles),
        Commands::Check => check(),
    }
}

async fn run(
    supervise: bool,
    report_path: Option<PathBuf>,
    metrics_addr: Option<String>,
) -> anyhow::Result<()> {
    info!("Starting TravelMate bootstrap");

    let config = BootConfig::from_env()?;
    let metrics = Metrics::new()?;
    if let Some(addr) = &metrics_addr {
        start_metrics_server(addr, metrics.clone()).await?;
    }

    let topology = load_topology(&config)?;
    let waiter = build_waiter(&config, &topology, metrics.clone())?;
    let plan = StartupPlan::django(&config);
    let command = ServerCommand::parse(&config.server_command, &config.host, config.port)?;
    let launcher = ServerLauncher::new(command, config.host.clone(), config.port);

    let report = match Sequencer::new(metrics.clone()).run(&waiter, &plan).await {
        Ok(report) => report,
        Err(failure) => {
            record_failed_run(report_path.as_ref(), &failure.report);
            return Err(failure.into());
        }
    };
    write_startup_report(report_path.as_ref(), &report)?;

    if supervise {
        let status = launcher.supervise(&config.retry, &metrics).await?;
        if !status.success() {
            error!(code = ?status.code(), "Server exited unsuccessfully");
            std::process::exit(status.code().unwrap_or(1));
        }
        info!("Server exited");
        return Ok(());
    }

    Err(launcher.exec().into())
}

/// Write the report of a failed run. A write error is only logged, so the
/// startup error stays the one returned.
fn record_failed_run(path: Option<&PathBuf>, report: &SequenceReport) -> bool {
    match write_startup_report(path, report) {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "Failed to write startup report");
            false
        }
    }
}

async fn wait() -> anyhow::Result<()> {
    let config = BootConfig::from_env()?;
    let metrics = Metrics::new()?;
    let topology = load_topology(&config)?;
    let waiter = build_waiter(&config, &topology, metrics.clone())?;

    Sequencer::new(metrics).run(&waiter, &StartupPlan::new()).await?;
    info!("All dependencies ready");
    Ok(())
}

async fn migrate() -> anyhow::Result<()> {
    let config = BootConfig::from_env()?;
    let metrics = Metrics::new()?;
    let topology = load_topology(&config)?;
    let waiter = build_waiter(&config, &topology, metrics.clone())?;
    let plan = StartupPlan::django(&config).only(&["migrate"]);

    let report = Sequencer::new(metrics).run(&waiter, &plan).await?;
    if let Some(step) = report.step("migrate") {
        info!(status = ?step.status, "Migration step finished");
    }
    Ok(())
}

fn plan(compose: Option<PathBuf>, service: &str, profiles: Vec<String>) -> anyhow::Result<()> {
    let topology = match &compose {
        Some(path) => Topology::from_compose_file(path)?,
        None => Topology::default_web_stack(),
    }
    .with_profiles(profiles);

    let order: Vec<_> = topology
        .startup_order()?
        .into_iter()
        .map(|s| {
            serde_json::json!({
                "service": s.name,
                "kind": s.kind,
                "depends_on": s.depends_on.iter().map(|d| &d.service).collect::<Vec<_>>(),
            })
        })
        .collect();
    let dependencies: Vec<_> = topology
        .dependencies_of(service)?
        .into_iter()
        .map(|s| s.name.clone())
        .collect();
    let disabled: Vec<_> = topology.disabled_services().map(|s| s.name.clone()).collect();

    let output = serde_json::json!({
        "startup_order": order,
        "target": service,
        "target_dependencies": dependencies,
        "disabled": disabled,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn check() -> anyhow::Result<()> {
    let config = BootConfig::from_env()?;
    let metrics = Metrics::new()?;
    let topology = load_topology(&config)?;
    let waiter = build_waiter(&config, &topology, metrics)?;
    let plan = StartupPlan::django(&config);
    let command = ServerCommand::parse(&config.server_command, &config.host, config.port)?;

    if waiter.is_empty() {
        warn!(service = %config.target_service, "Target service has no dependencies to wait for");
    }

    let output = serde_json::json!({
        "env_files": config.env_files,
        "dependencies": waiter
            .describe()
            .into_iter()
            .map(|(service, target, required)| serde_json::json!({
                "service": service,
                "target": target,
                "required": required,
            }))
            .collect::<Vec<_>>(),
        "steps": plan
            .steps()
            .iter()
            .map(|s| serde_json::json!({ "name": s.name(), "command": s.describe() }))
            .collect::<Vec<_>>(),
        "server": command.display(),
        "bind": format!("{}:{}", config.host, config.port),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn start_metrics_server(addr: &str, metrics: Metrics) -> anyhow::Result<()> {
    use axum::{
        extract::State,
        http::StatusCode,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::sync::Arc;

    let metrics = Arc::new(metrics);

    async fn metrics_handler(
        State(metrics): State<Arc<Metrics>>,
    ) -> Result<impl IntoResponse, StatusCode> {
        match metrics.gather() {
            Ok(body) => Ok((StatusCode::OK, body)),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Metrics server listening on http://{}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}
