//! Clock datasets and time → index translation
//!
//! A regular clock stores only its rate, and its sample times are
//! `n / rate`. An irregular clock stores one time per sample and answers
//! time queries through a pair of [`IndexCache`]s, one per bias.

use crate::index::{Bias, IndexCache};
use crate::storage::dataset::Dataset;
use crate::storage::error::{StoreError, StoreResult};
use std::sync::Mutex;

/// Relative distance from an integer under which `t * rate` counts as exact
const RATE_SNAP: f64 = 1e-9;

fn snap(x: f64) -> f64 {
    let r = x.round();
    if (x - r).abs() <= RATE_SNAP * r.abs().max(1.0) {
        r
    } else {
        x
    }
}

/// Floor index of `t` on a clock sampled at `rate`
pub(crate) fn regular_index(rate: f64, t: f64) -> i64 {
    (snap(t * rate).floor() as i64).max(-1)
}

/// Ceiling index of `t` on a clock sampled at `rate`
pub(crate) fn regular_index_right(rate: f64, t: f64) -> i64 {
    (snap(t * rate).ceil() as i64).max(0)
}

/// Clock dataset with time indexing
pub struct ClockData {
    dataset: Dataset,
    rate: Option<f64>,
    resolution: Option<f64>,
    floor: Mutex<IndexCache>,
    ceiling: Mutex<IndexCache>,
}

impl std::fmt::Debug for ClockData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockData")
            .field("uri", &self.dataset.uri())
            .field("rate", &self.rate)
            .finish()
    }
}

impl ClockData {
    pub(crate) fn new(dataset: Dataset, cache_capacity: usize) -> StoreResult<Self> {
        let attributes = dataset.attributes()?;
        Ok(Self {
            dataset,
            rate: attributes.rate,
            resolution: attributes.resolution,
            floor: Mutex::new(IndexCache::new(Bias::Floor, cache_capacity)),
            ceiling: Mutex::new(IndexCache::new(Bias::Ceiling, cache_capacity)),
        })
    }

    pub fn uri(&self) -> &str {
        self.dataset.uri()
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn units(&self) -> StoreResult<String> {
        self.dataset.units()
    }

    /// Sampling rate of a regular clock
    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    pub fn resolution(&self) -> Option<f64> {
        self.resolution
    }

    pub fn is_regular(&self) -> bool {
        self.rate.is_some()
    }

    /// Number of stored times; zero for a regular clock
    pub fn size(&self) -> StoreResult<u64> {
        self.dataset.size()
    }

    /// Append sample times
    pub fn extend(&self, times: &[f64]) -> StoreResult<()> {
        if self.is_regular() {
            return Err(StoreError::Configuration(format!(
                "Clock '{}' is defined by its rate and stores no times",
                self.uri()
            )));
        }
        self.dataset.extend(times, times.len() as u64)
    }

    /// Time of sample `n`
    pub fn time(&self, n: u64) -> StoreResult<f64> {
        match self.rate {
            Some(rate) => Ok(n as f64 / rate),
            None => self.dataset.value(n),
        }
    }

    /// Times of up to `length` samples from `pos`.
    ///
    /// Stored clocks are clipped like a dataset read, where a negative
    /// `length` reads to the end. A regular clock has no end, so it needs
    /// an explicit `length`.
    pub fn times(&self, pos: u64, length: i64) -> StoreResult<Vec<f64>> {
        match self.rate {
            Some(rate) => {
                if length < 0 {
                    return Err(StoreError::Configuration(format!(
                        "Clock '{}' is defined by its rate and has no end; give a length",
                        self.uri()
                    )));
                }
                Ok((pos..pos + length as u64).map(|n| n as f64 / rate).collect())
            }
            None => self.dataset.read(pos, length),
        }
    }

    fn cache(&self, bias: Bias) -> StoreResult<std::sync::MutexGuard<'_, IndexCache>> {
        let cache = match bias {
            Bias::Floor => &self.floor,
            Bias::Ceiling => &self.ceiling,
        };
        cache
            .lock()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire {} cache lock: {}", bias, e)))
    }

    fn search(&self, t: f64, bias: Bias) -> StoreResult<i64> {
        let size = self.size()?;
        let mut cache = self.cache(bias)?;
        cache.find(t, size, |n| self.dataset.value(n))
    }

    /// Largest `n` with `time(n) <= t`, or -1 when `t` precedes every sample
    pub fn index(&self, t: f64) -> StoreResult<i64> {
        match self.rate {
            Some(rate) => Ok(regular_index(rate, t)),
            None => self.search(t, Bias::Floor),
        }
    }

    /// Smallest `n` with `time(n) >= t`, or `size()` when `t` follows every
    /// sample
    pub fn index_right(&self, t: f64) -> StoreResult<i64> {
        match self.rate {
            Some(rate) => Ok(regular_index_right(rate, t)),
            None => self.search(t, Bias::Ceiling),
        }
    }

    /// Rows `[left, right)` covering the half-open window
    /// `[start, start + duration)`
    pub fn interval(&self, start: f64, duration: f64) -> StoreResult<(i64, i64)> {
        let left = self.index_right(start)?;
        let right = self.index_right(start + duration)?;
        Ok((left, right))
    }

    /// Drop every cached breakpoint
    pub fn clear_cache(&self) -> StoreResult<()> {
        self.cache(Bias::Floor)?.clear();
        self.cache(Bias::Ceiling)?.clear();
        Ok(())
    }
}
