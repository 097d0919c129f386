//! Per-source polling loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use ratewatch_core::Source;

use crate::board::PriceBoard;
use crate::fetcher::QuoteFetcher;
use crate::recorder::QuoteRecorder;

/// Keeps one source's board entry fresh.
///
/// Fetch failures never leave this loop: the board is untouched, a warning
/// is logged, and the next cycle starts after the fixed delay. The delay
/// runs whether or not the fetch succeeded. The stop signal is honored at
/// the top of every iteration and cuts the inter-cycle sleep short.
pub async fn run_source_updater(
    source: Source,
    fetcher: Arc<dyn QuoteFetcher>,
    board: Arc<PriceBoard>,
    recorder: Option<Arc<QuoteRecorder>>,
    delay: Duration,
    deadline: Option<Instant>,
    mut stop: watch::Receiver<bool>,
) {
    info!(source = %source, every_ms = delay.as_millis() as u64, "source updater started");

    loop {
        if *stop.borrow() {
            break;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                info!(source = %source, "deadline reached, no further updates");
                break;
            }
        }

        match fetcher.fetch(source).await {
            Ok(quote) => {
                board.publish(quote);
                if let Some(recorder) = &recorder {
                    recorder.append(&quote);
                }
                debug!(source = %source, price = quote.price, "quote published");
            }
            Err(err) => {
                warn!(source = %source, error = %err, "fetch failed, keeping last quote");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    info!(source = %source, "source updater stopped");
}
