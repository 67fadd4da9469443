//! VIGIL — Resilient market-data acquisition and options signal alerting
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the acquisition → scoring → dispatch pipeline, and either runs a
//! single cycle (`--once`, for an external scheduler) or its own interval
//! loop with graceful shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use vigil::clock::{Clock, SystemClock};
use vigil::config::AppConfig;
use vigil::dashboard::{self, AppState};
use vigil::data;
use vigil::engine::{
    AcquisitionManager, AcquisitionSettings, AlertDispatcher, CycleOrchestrator,
    DispatchSettings, SignalEngine, SignalSettings, TradingHours,
};
use vigil::model::features::RollingFeatures;
use vigil::model::logistic::LogisticModel;
use vigil::model::FeatureSource;
use vigil::notify::telegram::TelegramNotifier;
use vigil::notify::{format, LogNotifier, Notifier};
use vigil::storage::{DispatchLog, SnapshotCache};

const BANNER: &str = r#"
 __     _____ ____ ___ _
 \ \   / /_ _/ ___|_ _| |
  \ \ / / | | |  _ | || |
   \ V /  | | |_| || || |___
    \_/  |___\____|___|_____|

  Options signal watch
  v0.1.0
"#;

#[derive(Debug, Parser)]
#[command(name = "vigil")]
#[command(about = "Market-data acquisition and options signal alerting", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", env = "VIGIL_CONFIG", default_value = "config.toml")]
    config: String,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    init_logging();

    if !cli.once {
        println!("{BANNER}");
    }
    info!(
        agent_name = %cfg.agent.name,
        instrument = %cfg.agent.instrument,
        sources = ?cfg.acquisition.sources,
        fetch_interval_secs = cfg.agent.fetch_interval_secs,
        once = cli.once,
        "VIGIL starting up"
    );

    // -- Initialise components -------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let sources = data::build_sources(
        &cfg.acquisition.sources,
        cfg.acquisition.request_timeout(),
    )?;
    let acquisition = AcquisitionManager::new(
        sources,
        AcquisitionSettings::from(&cfg.acquisition),
        SnapshotCache::new(),
        clock.clone(),
    );

    let features = RollingFeatures::new(cfg.signal.feature_window);
    let model = LogisticModel::load(&cfg.signal.model_path)?;
    model.ensure_features(features.feature_names())?;
    let engine = SignalEngine::new(SignalSettings::from(&cfg.signal), clock.clone());

    let (notifier, destination) = build_notifier(&cfg)?;
    let dispatcher = AlertDispatcher::new(
        notifier,
        DispatchLog::new(),
        clock.clone(),
        DispatchSettings::from_config(
            &cfg.alerts,
            destination,
            &cfg.agent.instrument,
            &cfg.agent.instrument_name,
        ),
    );

    let orchestrator = CycleOrchestrator::new(
        &cfg.agent.name,
        &cfg.agent.instrument,
        acquisition,
        Box::new(features),
        Box::new(model),
        engine,
        dispatcher,
        clock,
    )
    .with_trading_hours(TradingHours::from_config(&cfg.schedule))
    .with_history_interval(cfg.signal.history_interval)
    .with_error_alerts(cfg.alerts.error_alert_threshold);

    let state = AppState::new(orchestrator, cfg.clone());

    // -- Single-shot mode ------------------------------------------------

    if cli.once {
        let report = state.run_cycle().await;
        info!(report = %report, "Single cycle finished");
        return Ok(());
    }

    // -- Daemon mode -----------------------------------------------------

    if cfg.alerts.notify_on_startup {
        let text = format::startup_message(
            &cfg.agent.name,
            &cfg.agent.instrument_name,
            cfg.agent.fetch_interval_secs,
        );
        if !state.orchestrator.lock().await.notify_operator(&text).await {
            warn!("Startup notice was not delivered");
        }
    }

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port);
    }

    let fetch_interval = Duration::from_secs(cfg.agent.fetch_interval_secs);
    let mut interval = tokio::time::interval(fetch_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.fetch_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                state.run_cycle().await;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let orch = state.orchestrator.lock().await;
    info!(
        cycles = orch.cycle_count(),
        signals_sent = orch.signals_sent(),
        "VIGIL shut down cleanly."
    );
    Ok(())
}

/// Pick the alert transport. Dry-run logs alerts; otherwise both Telegram
/// credentials must be present in the environment.
fn build_notifier(cfg: &AppConfig) -> Result<(Arc<dyn Notifier>, String)> {
    if cfg.alerts.dry_run {
        warn!("Dry-run mode: alerts are logged, not delivered");
        return Ok((Arc::new(LogNotifier::new()), "dry-run".to_string()));
    }

    let token = AppConfig::resolve_env(&cfg.alerts.telegram_bot_token_env)?;
    let chat_id = AppConfig::resolve_env(&cfg.alerts.telegram_chat_id_env)?;
    let notifier = TelegramNotifier::new(
        SecretString::new(token),
        Duration::from_secs(cfg.alerts.request_timeout_secs),
    )
    .context("Failed to initialise Telegram notifier")?;
    info!(transport = notifier.name(), "Alert transport ready");
    Ok((Arc::new(notifier), chat_id))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vigil=info"));

    let json_logging = std::env::var("VIGIL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
