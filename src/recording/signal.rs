//! Signal and signal array handles
//!
//! Signals hold a weak link to their clock. The recording owns every
//! clock, so a signal outliving its recording can no longer resolve
//! times and reports the container as closed.

use crate::recording::clock::Clock;
use crate::storage::clock_data::ClockData;
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::file::SignalAttributes;
use crate::storage::signal_data::SignalData;
use crate::timeseries::TimeSeries;
use std::sync::{Arc, Weak};

/// Builder for signals with scaling or time-unit attributes
#[derive(Debug, Clone, Default)]
pub struct SignalBuilder {
    pub(crate) uri: String,
    pub(crate) units: String,
    pub(crate) attributes: SignalAttributes,
    pub(crate) data: Option<Vec<f64>>,
    pub(crate) label: Option<String>,
}

impl SignalBuilder {
    pub fn new(uri: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            units: units.into(),
            ..Self::default()
        }
    }

    pub fn rate(mut self, rate: f64) -> Self {
        self.attributes.rate = Some(rate);
        self
    }

    pub fn clock(mut self, clock: &Clock) -> Self {
        self.attributes.clock = Some(clock.uri().to_string());
        self
    }

    pub fn gain(mut self, gain: f64) -> Self {
        self.attributes.gain = Some(gain);
        self
    }

    pub fn offset(mut self, offset: f64) -> Self {
        self.attributes.offset = Some(offset);
        self
    }

    pub fn timeunits(mut self, timeunits: impl Into<String>) -> Self {
        self.attributes.timeunits = Some(timeunits.into());
        self
    }

    /// Initial samples
    pub fn data(mut self, data: impl Into<Vec<f64>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

fn upgrade(clock: &Option<Weak<ClockData>>) -> StoreResult<Option<Arc<ClockData>>> {
    match clock {
        Some(weak) => weak.upgrade().map(Some).ok_or(StoreError::Closed),
        None => Ok(None),
    }
}

/// A single channel of samples
#[derive(Debug, Clone)]
pub struct Signal {
    data: SignalData,
    clock: Option<Weak<ClockData>>,
}

impl Signal {
    pub(crate) fn new(data: SignalData, clock: Option<&Clock>) -> Self {
        Self {
            data,
            clock: clock.map(|c| Arc::downgrade(c.data())),
        }
    }

    pub(crate) fn data(&self) -> &SignalData {
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

    pub fn gain(&self) -> Option<f64> {
        self.data.gain()
    }

    pub fn offset(&self) -> Option<f64> {
        self.data.offset()
    }

    pub fn timeunits(&self) -> Option<&str> {
        self.data.timeunits()
    }

    /// URI of the timing clock, if any
    pub fn clock_uri(&self) -> StoreResult<Option<String>> {
        Ok(upgrade(&self.clock)?.map(|c| c.uri().to_string()))
    }

    pub fn size(&self) -> StoreResult<u64> {
        self.data.size()
    }

    /// Append samples. Members of a signal array are extended through the
    /// array.
    pub fn extend(&self, values: &[f64]) -> StoreResult<()> {
        self.data.extend(values)
    }

    /// Up to `length` samples from `pos`; a negative length reads to the end
    pub fn read(&self, pos: u64, length: i64) -> StoreResult<TimeSeries> {
        let clock = upgrade(&self.clock)?;
        self.data.read(pos, length, clock.as_deref())
    }

    /// Samples with times in `[start, start + duration)`
    pub fn read_interval(&self, start: f64, duration: f64) -> StoreResult<TimeSeries> {
        let clock = upgrade(&self.clock)?;
        self.data.read_interval(start, duration, clock.as_deref())
    }
}

/// Signals sharing one compound dataset and timing source
#[derive(Debug, Clone)]
pub struct SignalArray {
    data: SignalData,
    signals: Vec<Signal>,
    clock: Option<Weak<ClockData>>,
}

impl SignalArray {
    pub(crate) fn new(data: SignalData, clock: Option<&Clock>) -> StoreResult<Self> {
        let signals = data
            .members()?
            .into_iter()
            .map(|member| Signal::new(member, clock))
            .collect();
        Ok(Self {
            data,
            signals,
            clock: clock.map(|c| Arc::downgrade(c.data())),
        })
    }

    pub(crate) fn data(&self) -> &SignalData {
        &self.data
    }

    pub fn uris(&self) -> Vec<&str> {
        self.signals.iter().map(|s| s.uri()).collect()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Position of the member `uri`
    pub fn index(&self, uri: &str) -> Option<usize> {
        self.signals.iter().position(|s| s.uri() == uri)
    }

    pub fn signal(&self, index: usize) -> Option<&Signal> {
        self.signals.get(index)
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn rate(&self) -> Option<f64> {
        self.data.rate()
    }

    /// Rows stored; every member has this many samples
    pub fn size(&self) -> StoreResult<u64> {
        self.data.size()
    }

    /// Append whole rows, one value per member in member order. Nothing is
    /// written unless `values` fills complete rows.
    pub fn extend(&self, values: &[f64]) -> StoreResult<()> {
        self.data.extend(values)
    }

    /// One series per member, `length` rows from `pos`
    pub fn read(&self, pos: u64, length: i64) -> StoreResult<Vec<TimeSeries>> {
        let clock = upgrade(&self.clock)?;
        self.data.read_members(pos, length, clock.as_deref())
    }

    /// One series per member over `[start, start + duration)`
    pub fn read_interval(&self, start: f64, duration: f64) -> StoreResult<Vec<TimeSeries>> {
        let clock = upgrade(&self.clock)?;
        let (left, right) = self.data.interval(start, duration, clock.as_deref())?;
        if right <= left {
            return Ok(vec![TimeSeries::empty(); self.len()]);
        }
        self.data
            .read_members(left, (right - left) as i64, clock.as_deref())
    }
}
