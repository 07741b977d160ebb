use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use ride_insights::config::{AppConfig, SAMPLE_CONFIG_PATH};
use ride_insights::handlers::database::{connect, RideStore};
use ride_insights::http_server::{self, AppState};
use ride_insights::logging::{init_logging, LogConfig};
use ride_insights::views::RideViews;
use ride_insights::AnomalyDetector;

#[derive(Parser)]
#[command(name = "ride-insights")]
#[command(author, version, about = "Filtered ride aggregates and anomaly detection")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "RIDES_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Also write logs to this directory (overrides configuration)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the aggregate views over HTTP
    Serve {
        /// Bind address (overrides configuration)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run anomaly detection once and print the report as JSON
    Anomalies {
        /// Snapshot size (overrides configuration)
        #[arg(short, long)]
        limit: Option<u32>,

        /// Pretty-print the report
        #[arg(short, long)]
        pretty: bool,
    },

    /// Write a commented sample configuration file
    SampleConfig {
        /// Output path
        #[arg(short, long, default_value = SAMPLE_CONFIG_PATH)]
        output: PathBuf,
    },
}

/// 設定読み込み・ログ初期化・ストア接続
///
/// 返されたガードは処理が終わるまで保持すること
async fn bootstrap(
    cli_config: Option<&Path>,
    debug: bool,
    log_dir: Option<PathBuf>,
) -> Result<(AppConfig, Arc<dyn RideStore>, Option<WorkerGuard>)> {
    let config = match cli_config {
        Some(path) => AppConfig::load_path(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    let mut log_config = LogConfig::from_server_config(&config.server);
    if debug {
        log_config.level = "debug".to_string();
    }
    if let Some(dir) = log_dir {
        log_config = log_config.with_log_dir(dir);
    }
    let guard = init_logging(&log_config)?;

    let store = connect(&config.database)
        .await
        .with_context(|| format!("failed to connect to {} store", config.database.dialect))?;

    Ok((config, store, guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::SampleConfig { output } => {
            AppConfig::generate_sample_config(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("sample configuration written to {}", output.display());
        }
        Commands::Serve { bind } => {
            let (config, store, _guard) =
                bootstrap(cli.config.as_deref(), cli.debug, cli.log_dir).await?;

            let addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
            let state = AppState::new(store, config.analytics.clone());
            http_server::serve(&addr, state).await?;
        }
        Commands::Anomalies { limit, pretty } => {
            let (config, store, _guard) =
                bootstrap(cli.config.as_deref(), cli.debug, cli.log_dir).await?;

            let limit = limit.unwrap_or(config.analytics.snapshot_limit);
            let views = RideViews::new(store);
            let rides = views.fetch_anomaly_snapshot(limit).await?;
            info!(rides = rides.len(), limit, "snapshot fetched");

            let detector = AnomalyDetector::new(config.analytics.detector_config());
            info!(
                z_threshold = detector.config().z_threshold,
                min_zone_trips = detector.config().min_zone_trips,
                "running anomaly detection"
            );
            let report = detector.detect(&rides);
            let output = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{}", output);
        }
    }

    Ok(())
}
