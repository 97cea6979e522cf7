//! Signal datasets
//!
//! A signal is timed either by a fixed rate or by a clock dataset. Members
//! of a signal array are column handles onto one compound dataset; the
//! array itself is the whole-row handle.

use crate::storage::catalog::DatasetPath;
use crate::storage::clock_data::{regular_index_right, ClockData};
use crate::storage::dataset::Dataset;
use crate::storage::error::{StoreError, StoreResult};
use crate::timeseries::TimeSeries;

/// Signal or signal-array dataset
#[derive(Debug, Clone)]
pub struct SignalData {
    dataset: Dataset,
    rate: Option<f64>,
    clock: Option<DatasetPath>,
    gain: Option<f64>,
    offset: Option<f64>,
    timeunits: Option<String>,
}

impl SignalData {
    pub(crate) fn new(dataset: Dataset) -> StoreResult<Self> {
        let attributes = dataset.attributes()?;
        Ok(Self {
            dataset,
            rate: attributes.rate,
            clock: attributes.clock,
            gain: attributes.gain,
            offset: attributes.offset,
            timeunits: attributes.timeunits,
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

    pub fn rate(&self) -> Option<f64> {
        self.rate
    }

    /// Clock dataset timing this signal
    pub fn clock_path(&self) -> Option<DatasetPath> {
        self.clock
    }

    pub fn gain(&self) -> Option<f64> {
        self.gain
    }

    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    pub fn timeunits(&self) -> Option<&str> {
        self.timeunits.as_deref()
    }

    /// Whether this handle covers a whole compound dataset
    pub fn is_array(&self) -> StoreResult<bool> {
        Ok(self.dataset.column().is_none() && self.dataset.columns()? > 1)
    }

    /// Member handles, one per column, for a signal array
    pub fn members(&self) -> StoreResult<Vec<SignalData>> {
        let uris = self.dataset.uris()?;
        Ok(uris
            .into_iter()
            .enumerate()
            .map(|(column, uri)| SignalData {
                dataset: self.dataset.member(column, uri),
                ..self.clone()
            })
            .collect())
    }

    pub fn size(&self) -> StoreResult<u64> {
        self.dataset.size()
    }

    /// Append whole rows of values
    pub fn extend(&self, values: &[f64]) -> StoreResult<()> {
        let width = self.dataset.width()?;
        if values.len() % width != 0 {
            return Err(StoreError::LengthMismatch(format!(
                "{} values do not fill rows of {} signals in '{}'",
                values.len(),
                width,
                self.uri()
            )));
        }
        self.dataset.extend(values, (values.len() / width) as u64)
    }

    /// Raw rows, interleaved for an array
    pub fn read_rows(&self, pos: u64, length: i64) -> StoreResult<Vec<f64>> {
        self.dataset.read(pos, length)
    }

    fn check_clock(&self, clock: Option<&ClockData>) -> StoreResult<()> {
        match (self.clock, clock) {
            (Some(path), Some(c)) if c.dataset().path() == path => Ok(()),
            (None, None) => Ok(()),
            _ => Err(StoreError::Configuration(format!(
                "Signal '{}' is not timed by the clock supplied",
                self.uri()
            ))),
        }
    }

    /// Time series of up to `length` samples from `pos`.
    ///
    /// `clock` must be the signal's own clock when it has one. Only valid
    /// for single-column handles.
    pub fn read(&self, pos: u64, length: i64, clock: Option<&ClockData>) -> StoreResult<TimeSeries> {
        self.check_clock(clock)?;
        let values = self.dataset.read(pos, length)?;
        self.series(pos, values, clock)
    }

    fn series(&self, pos: u64, values: Vec<f64>, clock: Option<&ClockData>) -> StoreResult<TimeSeries> {
        if values.is_empty() {
            return Ok(TimeSeries::empty());
        }
        match (clock, self.rate) {
            (Some(clock), _) => match clock.rate() {
                Some(rate) => Ok(TimeSeries::uniform(rate, pos, values)),
                None => {
                    let times = clock.times(pos, values.len() as i64)?;
                    Ok(TimeSeries::with_times(times, values))
                }
            },
            (None, Some(rate)) => Ok(TimeSeries::uniform(rate, pos, values)),
            (None, None) => Err(StoreError::Configuration(format!(
                "Signal '{}' has neither a rate nor a clock",
                self.uri()
            ))),
        }
    }

    /// Rows `[left, right)` covering `[start, start + duration)`
    pub fn interval(
        &self,
        start: f64,
        duration: f64,
        clock: Option<&ClockData>,
    ) -> StoreResult<(u64, u64)> {
        self.check_clock(clock)?;
        let (left, right) = match (clock, self.rate) {
            (Some(clock), _) => clock.interval(start, duration)?,
            (None, Some(rate)) => (
                regular_index_right(rate, start),
                regular_index_right(rate, start + duration),
            ),
            (None, None) => {
                return Err(StoreError::Configuration(format!(
                    "Signal '{}' has neither a rate nor a clock",
                    self.uri()
                )))
            }
        };
        Ok((left.max(0) as u64, right.max(0) as u64))
    }

    /// Samples whose times fall in `[start, start + duration)`. A window
    /// holding no samples gives an empty series.
    pub fn read_interval(
        &self,
        start: f64,
        duration: f64,
        clock: Option<&ClockData>,
    ) -> StoreResult<TimeSeries> {
        let (left, right) = self.interval(start, duration, clock)?;
        if right <= left {
            return Ok(TimeSeries::empty());
        }
        self.read(left, (right - left) as i64, clock)
    }

    /// One series per member of an array, read from a single pass over the rows
    pub fn read_members(
        &self,
        pos: u64,
        length: i64,
        clock: Option<&ClockData>,
    ) -> StoreResult<Vec<TimeSeries>> {
        self.check_clock(clock)?;
        let width = self.dataset.width()?;
        let rows = self.dataset.read(pos, length)?;
        (0..width)
            .map(|c| {
                let column: Vec<f64> = rows.iter().skip(c).step_by(width).copied().collect();
                self.series(pos, column, clock)
            })
            .collect()
    }

    pub fn close(&self) {
        self.dataset.close();
    }
}
