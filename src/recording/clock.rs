//! Clock handles

use crate::storage::clock_data::ClockData;
use crate::storage::error::{StoreError, StoreResult};
use std::sync::Arc;

/// Builder for clocks needing more than a URI and units
#[derive(Debug, Clone, Default)]
pub struct ClockBuilder {
    pub(crate) uri: String,
    pub(crate) units: String,
    pub(crate) rate: Option<f64>,
    pub(crate) times: Option<Vec<f64>>,
    pub(crate) resolution: Option<f64>,
    pub(crate) label: Option<String>,
}

impl ClockBuilder {
    pub fn new(uri: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            units: units.into(),
            ..Self::default()
        }
    }

    /// Make this a regular clock
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Initial stored times of an irregular clock
    pub fn times(mut self, times: impl Into<Vec<f64>>) -> Self {
        self.times = Some(times.into());
        self
    }

    /// Time resolution, in the clock's units
    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        if self.rate.is_some() && self.times.is_some() {
            return Err(StoreError::Configuration(format!(
                "Clock '{}' can have a rate or stored times, not both",
                self.uri
            )));
        }
        Ok(())
    }
}

/// A time reference owned by a recording
#[derive(Debug, Clone)]
pub struct Clock {
    data: Arc<ClockData>,
}

impl Clock {
    pub(crate) fn new(data: ClockData) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub(crate) fn data(&self) -> &Arc<ClockData> {
        &self.data
    }

    pub fn uri(&self) -> &str {
        self.data.uri()
    }

    pub fn units(&self) -> StoreResult<String> {
        self.data.units()
    }

    pub fn rate(&self) -> Option<f64> {
        self.data.rate()
    }

    pub fn resolution(&self) -> Option<f64> {
        self.data.resolution()
    }

    pub fn is_regular(&self) -> bool {
        self.data.is_regular()
    }

    /// Number of stored times
    pub fn size(&self) -> StoreResult<u64> {
        self.data.size()
    }

    pub fn extend(&self, times: &[f64]) -> StoreResult<()> {
        self.data.extend(times)
    }

    pub fn time(&self, n: u64) -> StoreResult<f64> {
        self.data.time(n)
    }

    pub fn times(&self, pos: u64, length: i64) -> StoreResult<Vec<f64>> {
        self.data.times(pos, length)
    }

    /// Largest `n` with `time(n) <= t`, or -1
    pub fn index(&self, t: f64) -> StoreResult<i64> {
        self.data.index(t)
    }

    /// Smallest `n` with `time(n) >= t`, or `size()`
    pub fn index_right(&self, t: f64) -> StoreResult<i64> {
        self.data.index_right(t)
    }
}
