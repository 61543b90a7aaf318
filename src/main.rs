use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use floodlink_service::config::{
    load_config, AlertSettings, FileConfig, NotifierConfig, StoreSettings, DEFAULT_CONFIG_PATH,
};
use floodlink_service::engine::{AlertEngine, Evaluation};
use floodlink_service::logging::{self, DataSource};
use floodlink_service::notify::{LogNotifier, Notifier, WebhookNotifier};
use floodlink_service::pipeline::{evaluate_glofas, evaluate_live};
use floodlink_service::store::JsonFileStore;

#[derive(Parser, Debug)]
#[command(name = "floodlink")]
#[command(about = "Flood risk evaluation with level-change alerts", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; missing means all defaults
    #[arg(short, long, env = "FLOODLINK_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of the console
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log notifications instead of sending them, whatever the config says
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score GIS features against the Open-Meteo hourly forecast
    Live,
    /// Evaluate GloFAS river flood hotspots
    Glofas,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logger(&cli.log_level, cli.log_file.as_deref())
        .with_context(|| format!("cannot open log file {:?}", cli.log_file))?;

    let config: FileConfig = load_config(&cli.config)?;
    let notifier = build_notifier(&config.notifier, cli.dry_run)?;
    let throttle = Duration::from_secs(config.notifier.min_seconds_between);
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("floodlink/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    match cli.command {
        Command::Live => {
            let settings = config.live.alert_settings()?;
            logging::info(DataSource::OpenMeteo, None, "FloodLink live risk evaluation started");
            let evaluation = evaluate_live(
                &config.live,
                &settings.breakpoints,
                settings.key_precision,
                &client,
                Utc::now(),
            )
            .context("live evaluation failed")?;
            run_alerts(
                evaluation,
                settings,
                config.live.store_settings(),
                notifier,
                throttle,
                DataSource::OpenMeteo,
            )
        }
        Command::Glofas => {
            let settings = config.glofas.alert_settings()?;
            logging::info(DataSource::GloFas, None, "FloodLink GloFAS hotspot evaluation started");
            let evaluation = evaluate_glofas(
                &config.glofas,
                &settings.breakpoints,
                settings.key_precision,
                &client,
            )
            .context("GloFAS evaluation failed")?;
            run_alerts(
                evaluation,
                settings,
                config.glofas.store_settings(),
                notifier,
                throttle,
                DataSource::GloFas,
            )
        }
    }
}

fn build_notifier(config: &NotifierConfig, dry_run: bool) -> Result<Box<dyn Notifier>> {
    if dry_run || !config.enabled {
        logging::info(
            DataSource::Notifier,
            None,
            "Notifications disabled, running dry (set NOTIFICATIONS_ENABLED=true to send)",
        );
        return Ok(Box::new(LogNotifier::new()));
    }
    let Some(url) = config.webhook_url.as_deref() else {
        bail!("notifications are enabled but no webhook_url / FLOODLINK_WEBHOOK_URL is set");
    };
    let notifier = WebhookNotifier::new(url, Duration::from_secs(config.timeout_secs))?;
    Ok(Box::new(notifier))
}

fn run_alerts(
    evaluation: Evaluation,
    settings: AlertSettings,
    store: StoreSettings,
    notifier: Box<dyn Notifier>,
    throttle: Duration,
    source: DataSource,
) -> Result<()> {
    let store = JsonFileStore::new(store.snapshot_path, store.ledger_path, store.history);
    let mut engine = AlertEngine::new(store, notifier, settings, throttle).with_log_source(source);
    let report = engine
        .run(&evaluation, Utc::now())
        .context("failed to persist alert state")?;
    logging::info(
        source,
        None,
        &format!(
            "{} transitions, {} suppressed, {} ledger entries cleaned",
            report.transitions, report.suppressed, report.cleaned
        ),
    );
    Ok(())
}
