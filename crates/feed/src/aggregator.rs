//! Periodic aggregation and the staleness shutdown policy

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use ratewatch_core::{Quote, Source, WatchConfig};

use crate::board::PriceBoard;

/// One emitted report line, derived fresh from a board snapshot
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub at: DateTime<Local>,
    /// Per-source price in `Source::ALL` order, None for sources that
    /// have never reported
    pub prices: [Option<f64>; 5],
    pub highest: f64,
    pub lowest: f64,
    /// Mean of all quotes excluding the single highest and single lowest
    pub trimmed_mean: f64,
}

impl SummaryRow {
    /// Computes the row statistics. The caller guarantees the snapshot
    /// holds at least the quorum (3) of quotes.
    fn compute(snapshot: &BTreeMap<Source, Quote>, at: DateTime<Local>) -> Self {
        debug_assert!(snapshot.len() >= 3);

        let mut values: Vec<f64> = snapshot.values().map(|q| q.price).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let lowest = values[0];
        let highest = values[values.len() - 1];
        let trimmed: f64 = values[1..values.len() - 1].iter().sum();
        let trimmed_mean = trimmed / (values.len() - 2) as f64;

        let mut prices = [None; 5];
        for (slot, source) in prices.iter_mut().zip(Source::ALL) {
            *slot = snapshot.get(&source).map(|q| q.price);
        }

        Self {
            at,
            prices,
            highest,
            lowest,
            trimmed_mean,
        }
    }

    /// Fixed-width data line matching `table_header`.
    pub fn render(&self) -> String {
        let mut cols = vec![format!("{:<20}", self.at.format("%d/%m/%Y %H:%M:%S"))];
        for price in self.prices {
            match price {
                Some(p) => cols.push(format!("{:<10}", format!("{p:.6}"))),
                None => cols.push(format!("{:<10}", "-")),
            }
        }
        for value in [self.highest, self.lowest, self.trimmed_mean] {
            cols.push(format!("{:<10}", format!("{value:.6}")));
        }
        cols.join(" ")
    }
}

/// Header line for the report table.
pub fn table_header() -> String {
    let mut cols = vec![format!("{:<20}", "Timestamp")];
    for source in Source::ALL {
        cols.push(format!("{:<10}", source.name()));
    }
    for name in ["Highest", "Lowest", "Average"] {
        cols.push(format!("{:<10}", name));
    }
    cols.join(" ")
}

/// Result of one aggregation cycle
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Below quorum; no row this cycle
    Skipped { stale_cycles: u32 },
    Row(SummaryRow),
    /// Staleness budget exhausted; no further cycles run
    Terminated,
}

/// Why the aggregation loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    StalenessExceeded,
    Stopped,
}

/// Aggregation policy: quorum gate, staleness budget, row statistics
///
/// The staleness counter resets on every quorum-meeting cycle, so shutdown
/// fires only on `staleness_limit` consecutive dry cycles. Terminated is
/// terminal.
#[derive(Debug)]
pub struct Aggregator {
    quorum: usize,
    staleness_limit: u32,
    stale_cycles: u32,
    terminated: bool,
}

impl Aggregator {
    pub fn new(config: &WatchConfig) -> Self {
        Self {
            // The trimmed mean is undefined below 3 quotes
            quorum: config.quorum.max(3),
            staleness_limit: config.staleness_limit,
            stale_cycles: 0,
            terminated: false,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// One aggregation step over a board snapshot.
    ///
    /// The quorum gate runs before any statistics, so the trimmed mean never
    /// sees fewer than `quorum` values.
    pub fn cycle(&mut self, snapshot: &BTreeMap<Source, Quote>, at: DateTime<Local>) -> CycleOutcome {
        if self.terminated {
            return CycleOutcome::Terminated;
        }

        if snapshot.len() < self.quorum {
            self.stale_cycles += 1;
            if self.stale_cycles >= self.staleness_limit {
                self.terminated = true;
                return CycleOutcome::Terminated;
            }
            return CycleOutcome::Skipped {
                stale_cycles: self.stale_cycles,
            };
        }

        self.stale_cycles = 0;
        CycleOutcome::Row(SummaryRow::compute(snapshot, at))
    }
}

/// Drives the aggregation policy on a fixed cadence.
///
/// Prints the table header once, then one row per quorum-meeting cycle.
/// On staleness shutdown it flips the shared stop channel so every updater
/// winds down deterministically, then returns.
pub async fn run_aggregator(
    board: Arc<PriceBoard>,
    config: WatchConfig,
    stop_tx: watch::Sender<bool>,
) -> TerminationReason {
    let mut stop = stop_tx.subscribe();
    let mut ticker = interval(config.poll_delay());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Consume the immediate first tick; real cycles start one delay in,
    // giving the updaters a head start on the first fetch.
    ticker.tick().await;

    let mut aggregator = Aggregator::new(&config);

    info!(every_ms = config.poll_delay().as_millis() as u64, "aggregator started");
    println!("ETH/BTC Rate History");
    println!("{}", table_header());

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    info!("aggregator stopped");
                    return TerminationReason::Stopped;
                }
                continue;
            }
        }

        let snapshot = board.snapshot();
        match aggregator.cycle(&snapshot, Local::now()) {
            CycleOutcome::Skipped { stale_cycles } => {
                warn!(
                    populated = snapshot.len(),
                    quorum = config.quorum,
                    stale_cycles,
                    "below quorum, no row emitted"
                );
            }
            CycleOutcome::Row(row) => {
                println!("{}", row.render());
            }
            CycleOutcome::Terminated => {
                error!(
                    limit = config.staleness_limit,
                    "staleness limit reached, shutting down"
                );
                println!("Check your network connection please.");
                let _ = stop_tx.send(true);
                return TerminationReason::StalenessExceeded;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn snapshot(prices: &[(Source, f64)]) -> BTreeMap<Source, Quote> {
        prices
            .iter()
            .map(|&(source, price)| (source, Quote::new(source, price, 1).unwrap()))
            .collect()
    }

    fn config(quorum: usize, limit: u32) -> WatchConfig {
        WatchConfig {
            quorum,
            staleness_limit: limit,
            ..WatchConfig::default()
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2023, 1, 15, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_three_quotes_trimmed_mean_is_the_middle_value() {
        let snap = snapshot(&[
            (Source::Binance, 0.051),
            (Source::Kucoin, 0.052),
            (Source::Wazirx, 0.053),
        ]);
        let mut agg = Aggregator::new(&config(3, 10));

        match agg.cycle(&snap, now()) {
            CycleOutcome::Row(row) => {
                assert_eq!(row.highest, 0.053);
                assert_eq!(row.lowest, 0.051);
                // n = 3 divides the single middle value by 1
                assert_eq!(row.trimmed_mean, 0.052);
            }
            other => panic!("expected a row, got {other:?}"),
        }
    }

    #[test]
    fn test_four_quotes_trimmed_mean() {
        let snap = snapshot(&[
            (Source::Binance, 1.0),
            (Source::Kucoin, 2.0),
            (Source::Wazirx, 3.0),
            (Source::Coinhar, 4.0),
        ]);
        let mut agg = Aggregator::new(&config(3, 10));

        match agg.cycle(&snap, now()) {
            CycleOutcome::Row(row) => {
                assert_eq!(row.highest, 4.0);
                assert_eq!(row.lowest, 1.0);
                assert_eq!(row.trimmed_mean, 2.5);
            }
            other => panic!("expected a row, got {other:?}"),
        }
    }

    #[test]
    fn test_below_quorum_increments_once_per_cycle() {
        let snap = snapshot(&[(Source::Binance, 0.05), (Source::Kucoin, 0.051)]);
        let mut agg = Aggregator::new(&config(3, 10));

        match agg.cycle(&snap, now()) {
            CycleOutcome::Skipped { stale_cycles } => assert_eq!(stale_cycles, 1),
            other => panic!("expected a skip, got {other:?}"),
        }
        match agg.cycle(&snap, now()) {
            CycleOutcome::Skipped { stale_cycles } => assert_eq!(stale_cycles, 2),
            other => panic!("expected a skip, got {other:?}"),
        }
    }

    #[test]
    fn test_ten_dry_cycles_terminate_for_good() {
        let empty = BTreeMap::new();
        let mut agg = Aggregator::new(&config(3, 10));

        for _ in 0..9 {
            assert!(matches!(
                agg.cycle(&empty, now()),
                CycleOutcome::Skipped { .. }
            ));
        }
        assert!(matches!(agg.cycle(&empty, now()), CycleOutcome::Terminated));
        assert!(agg.is_terminated());

        // Terminal: even a full snapshot no longer produces a row
        let full = snapshot(&[
            (Source::Binance, 0.05),
            (Source::Kucoin, 0.051),
            (Source::Wazirx, 0.052),
        ]);
        assert!(matches!(agg.cycle(&full, now()), CycleOutcome::Terminated));
    }

    #[test]
    fn test_quorum_cycle_resets_the_staleness_budget() {
        let empty = BTreeMap::new();
        let full = snapshot(&[
            (Source::Binance, 0.05),
            (Source::Kucoin, 0.051),
            (Source::Wazirx, 0.052),
        ]);
        let mut agg = Aggregator::new(&config(3, 10));

        for _ in 0..9 {
            agg.cycle(&empty, now());
        }
        assert!(matches!(agg.cycle(&full, now()), CycleOutcome::Row(_)));

        // Budget is whole again: nine more dry cycles stay below the limit
        for i in 1..=9 {
            match agg.cycle(&empty, now()) {
                CycleOutcome::Skipped { stale_cycles } => assert_eq!(stale_cycles, i),
                other => panic!("expected a skip, got {other:?}"),
            }
        }
        assert!(matches!(agg.cycle(&empty, now()), CycleOutcome::Terminated));
    }

    #[test]
    fn test_render_marks_absent_sources() {
        let snap = snapshot(&[
            (Source::Binance, 0.052314),
            (Source::Kucoin, 0.0522),
            (Source::Indodax, 0.0521),
        ]);
        let mut agg = Aggregator::new(&config(3, 10));

        let row = match agg.cycle(&snap, now()) {
            CycleOutcome::Row(row) => row,
            other => panic!("expected a row, got {other:?}"),
        };

        let line = row.render();
        assert!(line.starts_with("15/01/2023 09:30:00"));
        assert!(line.contains("0.052314"));
        assert!(line.contains(" -  "));
        assert_eq!(row.prices[2], None); // Wazirx never reported
        assert_eq!(row.prices[3], None); // Coinhar never reported
    }

    #[test]
    fn test_header_matches_row_column_count() {
        let header = table_header();
        for name in ["Timestamp", "Binance", "Indodax", "Highest", "Lowest", "Average"] {
            assert!(header.contains(name), "missing column {name}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_exits_success_after_sustained_staleness() {
        let board = Arc::new(PriceBoard::new());
        let cfg = WatchConfig {
            poll_delay_secs: 5,
            staleness_limit: 3,
            ..WatchConfig::default()
        };
        let (stop_tx, _) = watch::channel(false);
        let stop_probe = stop_tx.subscribe();

        let handle = tokio::spawn(run_aggregator(board, cfg, stop_tx));

        let reason = handle.await.unwrap();
        assert_eq!(reason, TerminationReason::StalenessExceeded);
        // The stop channel was flipped for the updaters
        assert!(*stop_probe.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_honors_external_stop() {
        let board = Arc::new(PriceBoard::new());
        let cfg = WatchConfig {
            poll_delay_secs: 5,
            staleness_limit: 1_000,
            ..WatchConfig::default()
        };
        let (stop_tx, _) = watch::channel(false);

        let handle = tokio::spawn(run_aggregator(board, cfg, stop_tx.clone()));

        tokio::time::sleep(Duration::from_secs(12)).await;
        stop_tx.send(true).unwrap();

        let reason = handle.await.unwrap();
        assert_eq!(reason, TerminationReason::Stopped);
    }
}
