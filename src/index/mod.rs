//! Time indexing for irregular clocks
//!
//! Reads by time interval are translated to sample positions by binary
//! searching a clock's stored times. Windowed reads mostly move forward
//! through a recording, so each search is narrowed by breakpoints found
//! by earlier searches.
//!
//! ```text
//! read_interval(start, duration)
//!        ↓
//! ClockData::index_right(start)   → ceiling IndexCache → stored times
//! ClockData::index_right(end)     → ceiling IndexCache → stored times
//!        ↓
//! Dataset::read(left, right - left + 1)
//! ```

mod cache;

pub use cache::IndexCache;

use serde::{Deserialize, Serialize};

/// Direction a time query resolves towards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bias {
    /// Last sample at or before the time
    Floor,
    /// First sample at or after the time
    Ceiling,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Floor => write!(f, "floor"),
            Bias::Ceiling => write!(f, "ceiling"),
        }
    }
}
