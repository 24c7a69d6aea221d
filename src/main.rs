use anyhow::Context;
use clap::Parser;
use lstm_trader::api::{AlpacaClient, YahooClient};
use lstm_trader::config::{Credentials, TraderConfig};
use lstm_trader::execution::{Executor, FillConfirmation};
use lstm_trader::forecast::LstmForecaster;
use lstm_trader::trader::Trader;
use chrono::Utc;
use std::path::PathBuf;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

type LiveTrader = Trader<YahooClient, LstmForecaster, AlpacaClient>;

/// Forecast-driven single-stock trader
#[derive(Parser, Debug)]
#[command(name = "lstm-trader", version, about)]
struct Cli {
    /// TOML config file (defaults to ./trader.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = TraderConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    setup_logging(&config.log_filter);

    tracing::info!("🚀 lstm-trader starting");

    let mut trader = build_trader(&config).await?;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {}", config.symbol);
    tracing::info!("  Shares per order: {}", config.share_count);
    tracing::info!("  Trigger margin: {:.2}", config.trigger_margin);
    tracing::info!("  Poll interval: {}s", config.poll_interval_seconds);
    tracing::info!(
        "  Account: {} ({})",
        if config.demo_mode { "paper" } else { "LIVE" },
        config.broker_base_url()
    );
    tracing::info!("  Fill confirmation: {}", config.confirm_fills);

    if cli.once {
        run_cycle(&mut trader).await;
        return Ok(());
    }

    run_loop(&mut trader, &config).await;

    tracing::info!("👋 lstm-trader stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_forecaster(config: &TraderConfig) -> lstm_trader::Result<LstmForecaster> {
    LstmForecaster::load(&config.model_path, &config.x_scaler_path, &config.y_scaler_path)
}

async fn build_trader(config: &TraderConfig) -> anyhow::Result<LiveTrader> {
    let credentials = Credentials::from_env().context("Broker credentials are required")?;

    // Model artifacts are loaded once; the bot cannot trade without them
    let forecaster = load_forecaster(config).context("Failed to load model artifacts")?;

    let market_data = YahooClient::new(&config.market_data_url, config.request_timeout())
        .context("Failed to build market data client")?;
    let broker = AlpacaClient::new(config.broker_base_url(), credentials, config.request_timeout())
        .context("Failed to build broker client")?;

    let mut executor = Executor::new(broker, config.symbol.clone());
    if config.confirm_fills {
        executor = executor.with_fill_confirmation(FillConfirmation {
            attempts: config.confirm_attempts,
            delay: config.confirm_delay(),
        });
    }

    if config.reconcile_on_start {
        match executor.sync_with_broker().await {
            Ok(state) => tracing::info!("Starting from broker-reported state {}", state),
            Err(e) => tracing::warn!("Could not read positions from broker, starting FLAT: {}", e),
        }
    }

    Ok(Trader::new(config.clone(), market_data, forecaster, executor))
}

// ============================================================================
// Scheduling
// ============================================================================

/// Cycle now, then every `poll_interval_seconds` until Ctrl+C
async fn run_loop(trader: &mut LiveTrader, config: &TraderConfig) {
    let interval = config.poll_interval();
    let mut ticker = interval_at(Instant::now(), interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    #[cfg(unix)]
    let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!("SIGHUP model reload unavailable: {}", e);
            None
        }
    };

    tracing::info!("\nPress Ctrl+C to stop...\n");

    loop {
        #[cfg(unix)]
        let reload = async {
            match hangup.as_mut() {
                Some(s) => s.recv().await,
                None => std::future::pending().await,
            }
        };
        #[cfg(not(unix))]
        let reload = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = ticker.tick() => {
                run_cycle(trader).await;
                tracing::info!("Sleeping for {} seconds", interval.as_secs());
            }
            _ = reload => {
                tracing::info!("🔁 Reloading model artifacts...");
                match load_forecaster(config) {
                    Ok(forecaster) => {
                        trader.set_forecaster(forecaster);
                        tracing::info!("  ✓ Model reloaded");
                    }
                    Err(e) => tracing::error!("  ✗ Reload failed, keeping current model: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("\n⚠️  Received Ctrl+C, shutting down...");
                break;
            }
        }
    }
}

async fn run_cycle(trader: &mut LiveTrader) {
    tracing::info!("💹 [CYCLE] Tick at {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));

    match trader.run_cycle().await {
        Ok(report) => {
            tracing::info!(
                "  ✓ Cycle complete: {:?}, position {}",
                report.action,
                report.state
            );
        }
        Err(e @ lstm_trader::TraderError::InsufficientHistory { .. }) => {
            tracing::warn!("  → Skipping cycle: {}", e);
        }
        Err(e @ lstm_trader::TraderError::Broker { .. }) => {
            tracing::error!(
                "  ✗ Broker call failed, position stays {}: {}",
                trader.state(),
                e
            );
        }
        Err(e) if e.is_transient() => {
            tracing::warn!("  ✗ Transient failure, will retry next cycle: {}", e);
        }
        Err(e) => {
            tracing::error!("  ✗ Cycle failed: {}", e);
        }
    }
}
