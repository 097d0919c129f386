//! Ratewatch - ETH/BTC cross-exchange rate monitor
//!
//! Main entry point: spawns one updater task per source plus the
//! aggregator, and wires the shared stop channel.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratewatch_core::{Source, WatchConfig};
use ratewatch_feed::{
    run_aggregator, run_source_updater, HttpQuoteFetcher, PriceBoard, QuoteFetcher, QuoteRecorder,
    TerminationReason,
};

fn load_config() -> anyhow::Result<WatchConfig> {
    let settings = config::Config::builder()
        .add_source(config::Config::try_from(&WatchConfig::default())?)
        .add_source(config::Environment::with_prefix("RATEWATCH").try_parsing(true))
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting ratewatch v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config().context("Failed to load configuration")?;

    let board = Arc::new(PriceBoard::new());
    let fetcher: Arc<dyn QuoteFetcher> =
        Arc::new(HttpQuoteFetcher::new(&config).context("Failed to build HTTP client")?);

    let recorder = match &config.record_dir {
        Some(dir) => Some(Arc::new(
            QuoteRecorder::new(dir.clone(), config.rotate_every_secs)
                .context("Failed to open quote log directory")?,
        )),
        None => None,
    };

    let (stop_tx, _) = watch::channel(false);
    let deadline = config.run_for().map(|d| tokio::time::Instant::now() + d);

    let mut updaters = Vec::with_capacity(Source::ALL.len());
    for source in Source::ALL {
        updaters.push(tokio::spawn(run_source_updater(
            source,
            Arc::clone(&fetcher),
            Arc::clone(&board),
            recorder.clone(),
            config.poll_delay(),
            deadline,
            stop_tx.subscribe(),
        )));
    }
    info!(sources = Source::ALL.len(), "updater tasks started");

    let aggregator = tokio::spawn(run_aggregator(
        Arc::clone(&board),
        config.clone(),
        stop_tx.clone(),
    ));

    // Spawn shutdown signal handler
    let signal_stop = stop_tx.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(err) => tracing::error!(error = %err, "failed to install signal handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C");
            }
            _ = terminate => {
                info!("Received termination signal");
            }
        }

        let _ = signal_stop.send(true);
    });

    let reason = aggregator
        .await
        .context("Aggregator task failed")?;

    // Either path has flipped the stop channel; wait for updaters to drain
    let _ = stop_tx.send(true);
    for handle in updaters {
        let _ = handle.await;
    }

    match reason {
        TerminationReason::StalenessExceeded => {
            info!("Shutdown: staleness limit reached");
        }
        TerminationReason::Stopped => {
            info!("Shutdown complete");
        }
    }

    Ok(())
}
