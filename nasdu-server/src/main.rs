//! # nasdu
//!
//! Directory-size tracking for NAS shares.
//!
//! - `nasdu serve` runs the HTTP API and executes triggered scans.
//! - `nasdu scan <scan>` runs one scan in-process and renders its progress.
//! - `nasdu watch <scan>` follows the progress of a scan on a running server.
//! - `nasdu check-config` validates the configuration and exits.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, anyhow, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nasdu_core::model::{ScanResult, TotalSize};
use nasdu_core::progress::{PollStatus, ProgressReport, ProgressView};
use nasdu_server::{
    infra::{
        config::{ConfigLoad, ConfigLoader, ConfigLoaderOptions},
        startup::{ProdStartupHooks, StartupHooks, build_production_state},
    },
    routes,
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "nasdu", version)]
#[command(about = "Track directory sizes of NAS shares")]
struct Cli {
    /// Path to nasdu.toml (defaults to NASDU_CONFIG, then ./nasdu.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Alternative .env file
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve(ServeArgs),
    /// Run one scan in-process and print its progress
    Scan(ScanArgs),
    /// Follow the progress of a scan on a running server
    Watch(WatchArgs),
    /// Validate the configuration and exit
    CheckConfig,
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
struct ScanArgs {
    /// Scan slug or display name
    scan: String,

    /// How often progress is rendered
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    interval: Duration,
}

#[derive(ClapArgs, Debug, Clone)]
struct WatchArgs {
    /// Scan slug or display name
    scan: String,

    /// Base URL of the nasdu server
    #[arg(long, env = "NASDU_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Polling interval
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    interval: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "info,nasdu=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let loader = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: cli.config.clone(),
        env_file: cli.env_file.clone(),
        ignore_env: false,
    });

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => run_server(&loader, args).await,
        Command::Scan(args) => run_scan(&loader, args).await,
        Command::Watch(args) => watch(args).await,
        Command::CheckConfig => check_config(&loader),
    }
}

fn load_config(loader: &ConfigLoader) -> anyhow::Result<ConfigLoad> {
    let load = loader.load().context("failed to load configuration")?;

    if load.config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &load.config.metadata.config_path {
        info!(path = %path.display(), "configuration loaded");
    }
    for warning in &load.warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }
    Ok(load)
}

async fn run_server(loader: &ConfigLoader, args: ServeArgs) -> anyhow::Result<()> {
    let ConfigLoad { mut config, .. } = load_config(loader)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let addr = config.bind_address();
    let state = build_production_state(config).await?;
    ProdStartupHooks.run(&state).await?;

    let scan_control = state.scan_control.clone();
    let app = routes::create_app(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "nasdu listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down; cancelling active scans");
    scan_control.shutdown().await;
    Ok(())
}

async fn run_scan(loader: &ConfigLoader, args: ScanArgs) -> anyhow::Result<()> {
    let ConfigLoad { config, .. } = load_config(loader)?;
    let state = build_production_state(config).await?;
    let control = state.scan_control.clone();

    let ack = control.trigger(&args.scan)?;
    let slug = ack.scan_slug.clone();
    println!("{}", ack.message);

    let mut ticker = tokio::time::interval(args.interval);
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let report = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                warn!(scan = %slug, "interrupted; cancelling scan");
                if let Err(err) = control.cancel(slug.as_str()) {
                    warn!(scan = %slug, error = %err, "cancel request ignored");
                }
                control.shutdown().await;
                ctrl_c.set(tokio::signal::ctrl_c());
            }
        }

        match state.progress.get_progress(slug.as_str())? {
            ProgressView::Found(report) => {
                println!("{}", render_progress(&report));
                if report.status.is_terminal() {
                    break report;
                }
            }
            ProgressView::NotFound => bail!("progress for scan '{slug}' disappeared"),
        }
    };

    control.shutdown().await;

    match state.history.latest(&slug).await? {
        Some(result) if result.run_id == report.run_id => print_result(&result),
        _ => warn!(scan = %slug, "no stored result for this run"),
    }

    if report.status == PollStatus::Failed {
        bail!("scan '{}' failed", report.scan_name);
    }
    Ok(())
}

async fn watch(args: WatchArgs) -> anyhow::Result<()> {
    let mut url = reqwest::Url::parse(&args.server).context("invalid server URL")?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("server URL cannot carry a path"))?
        .pop_if_empty()
        .extend(["api", "v1", "scans", args.scan.as_str(), "progress"]);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let mut ticker = tokio::time::interval(args.interval);
    loop {
        ticker.tick().await;
        let response = client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                println!("no progress available for '{}'", args.scan);
                return Ok(());
            }
            status if status.is_success() => {
                let report: ProgressReport = response
                    .json()
                    .await
                    .context("unexpected progress payload")?;
                println!("{}", render_progress(&report));
                if report.status.is_terminal() {
                    for error in &report.errors {
                        println!("  failed {}: {}", error.path, error.message);
                    }
                    return match report.status {
                        PollStatus::Failed => Err(anyhow!("scan '{}' failed", report.scan_name)),
                        _ => Ok(()),
                    };
                }
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                bail!("server answered {status}: {body}");
            }
        }
    }
}

fn check_config(loader: &ConfigLoader) -> anyhow::Result<()> {
    let ConfigLoad { config, warnings } = load_config(loader)?;
    println!(
        "configuration ok: {} scan(s), {} warning(s)",
        config.scans.len(),
        warnings.len()
    );
    for scan in &config.scans {
        let paths: Vec<&str> = scan.paths.iter().map(|p| p.as_str()).collect();
        println!(
            "  {:<24} {:<10} {}{}",
            scan.slug,
            format!("{:?}", scan.mode).to_lowercase(),
            paths.join(", "),
            if scan.enabled { "" } else { " (disabled)" }
        );
    }
    Ok(())
}

fn render_progress(report: &ProgressReport) -> String {
    let progress = &report.progress;
    let size = TotalSize::from_bytes(progress.total_size);
    let percent = match progress.progress_percent.display() {
        Some(value) => format!("{value:>6.2}%"),
        None => "     -?".to_string(),
    };
    let mut line = format!(
        "[{}] {percent} {:>9.2} {:<2} {:>7} dirs {:>9} files {:>5}s",
        report.status.as_str(),
        size.formatted,
        size.unit,
        progress.num_dir,
        progress.num_file,
        progress.waited,
    );
    if let Some(path) = &progress.current_path {
        line.push_str(&format!("  {path}"));
    }
    line
}

fn print_result(result: &ScanResult) {
    println!("{} ({})", result.scan_name, result.status.as_str());
    for outcome in &result.results {
        let size = &outcome.total_size;
        match &outcome.error {
            None => println!(
                "  ok     {:<40} {:>9.2} {:<2} {:>7} dirs {:>9} files",
                outcome.path.as_str(),
                size.formatted,
                size.unit,
                outcome.num_dir,
                outcome.num_file
            ),
            Some(error) => println!("  failed {:<40} {error}", outcome.path.as_str()),
        }
    }
    if let Some(error) = &result.error {
        println!("  error: {error}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
