//! Multi-source rate feed
//!
//! Features:
//! - One polling task per exchange source
//! - Lock-free concurrent quote publishing
//! - Periodic aggregation with trimmed-mean summary rows
//! - Sustained-staleness shutdown policy
//! - Optional rotating quote log

pub mod aggregator;
pub mod board;
pub mod fetcher;
pub mod recorder;
pub mod updater;

pub use aggregator::{run_aggregator, Aggregator, CycleOutcome, SummaryRow, TerminationReason};
pub use board::PriceBoard;
pub use fetcher::{HttpQuoteFetcher, QuoteFetcher};
pub use recorder::QuoteRecorder;
pub use updater::run_source_updater;
