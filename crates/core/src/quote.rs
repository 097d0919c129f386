//! Quote type

use serde::{Deserialize, Serialize};

use crate::{FetchError, Source};

/// A single source's most recent reported price for the tracked pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub source: Source,
    pub price: f64,
    pub observed_at_ms: u64,
}

impl Quote {
    /// Builds a quote, rejecting non-finite and non-positive prices.
    pub fn new(source: Source, price: f64, observed_at_ms: u64) -> Result<Self, FetchError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(FetchError::InvalidPrice(price));
        }
        Ok(Self {
            source,
            price,
            observed_at_ms,
        })
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.observed_at_ms)
    }

    pub fn is_stale(&self, max_age_ms: u64, now_ms: u64) -> bool {
        self.age_ms(now_ms) > max_age_ms
    }
}
