//! Quote source definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported exchange sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Binance,
    Kucoin,
    Wazirx,
    Coinhar,
    Indodax,
}

impl Source {
    /// Every known source, in report column order.
    pub const ALL: [Source; 5] = [
        Source::Binance,
        Source::Kucoin,
        Source::Wazirx,
        Source::Coinhar,
        Source::Indodax,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Source::Binance => "Binance",
            Source::Kucoin => "Kucoin",
            Source::Wazirx => "Wazirx",
            Source::Coinhar => "Coinhar",
            Source::Indodax => "Indodax",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
