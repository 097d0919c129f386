//! Shared quote state
//!
//! Uses DashMap for concurrent reads/writes with minimal contention

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use ratewatch_core::{Quote, Source};

/// Latest quote per source, shared by all updaters and the aggregator
///
/// A write replaces one source's slot atomically; readers never observe a
/// half-written quote. No guarantee spans sources: a snapshot may mix quotes
/// taken moments apart, which the aggregation policy tolerates.
#[derive(Debug)]
pub struct PriceBoard {
    quotes: DashMap<Source, Quote>,

    /// Stats
    update_count: std::sync::atomic::AtomicU64,
    last_update: RwLock<Instant>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self {
            quotes: DashMap::new(),
            update_count: std::sync::atomic::AtomicU64::new(0),
            last_update: RwLock::new(Instant::now()),
        }
    }

    /// Publish a quote, overwriting the previous one for its source.
    pub fn publish(&self, quote: Quote) {
        self.quotes.insert(quote.source, quote);
        self.update_count
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        *self.last_update.write() = Instant::now();
    }

    pub fn get(&self, source: Source) -> Option<Quote> {
        self.quotes.get(&source).map(|r| *r.value())
    }

    /// Per-key-consistent view of the board.
    ///
    /// Each entry reflects the latest completed publish for that source at
    /// the moment it is read; entries are not taken at a single instant.
    pub fn snapshot(&self) -> BTreeMap<Source, Quote> {
        self.quotes
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Number of sources that have reported at least once.
    pub fn populated(&self) -> usize {
        self.quotes.len()
    }

    /// Stats
    pub fn stats(&self) -> BoardStats {
        BoardStats {
            populated: self.quotes.len(),
            update_count: self
                .update_count
                .load(std::sync::atomic::Ordering::Relaxed),
            last_update_age: self.last_update.read().elapsed(),
        }
    }
}

impl Default for PriceBoard {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about board activity
#[derive(Debug, Clone)]
pub struct BoardStats {
    pub populated: usize,
    pub update_count: u64,
    pub last_update_age: Duration,
}
