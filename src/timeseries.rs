//! Time series values returned by signal reads

use serde::{Deserialize, Serialize};

/// How the sample times of a series are known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleTimes {
    /// One time per value, read from a clock
    Explicit(Vec<f64>),
    /// `time(i) = (first_index + i) / rate`
    Uniform { rate: f64, first_index: u64 },
}

/// Ordered `(time, value)` samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    times: SampleTimes,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Series with explicit sample times. Extra trailing times or values
    /// beyond the shorter of the two are dropped.
    pub fn with_times(mut times: Vec<f64>, mut values: Vec<f64>) -> Self {
        let n = times.len().min(values.len());
        times.truncate(n);
        values.truncate(n);
        Self {
            times: SampleTimes::Explicit(times),
            values,
        }
    }

    /// Series sampled at `rate`, starting at sample `first_index`
    pub fn uniform(rate: f64, first_index: u64, values: Vec<f64>) -> Self {
        Self {
            times: SampleTimes::Uniform { rate, first_index },
            values,
        }
    }

    pub fn empty() -> Self {
        Self::with_times(Vec::new(), Vec::new())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn sample_times(&self) -> &SampleTimes {
        &self.times
    }

    /// Time of the i'th sample
    pub fn time(&self, i: usize) -> Option<f64> {
        if i >= self.values.len() {
            return None;
        }
        match &self.times {
            SampleTimes::Explicit(times) => times.get(i).copied(),
            SampleTimes::Uniform { rate, first_index } => {
                Some((*first_index + i as u64) as f64 / rate)
            }
        }
    }

    /// Every sample time, materialised
    pub fn times(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.time(i)).collect()
    }

    /// `(time, value)` pairs, computed as they are iterated
    pub fn points(&self) -> Points<'_> {
        Points {
            series: self,
            next: 0,
        }
    }

    /// Apply `value * gain + offset` to every sample
    pub fn scaled(mut self, gain: f64, offset: f64) -> Self {
        for v in &mut self.values {
            *v = *v * gain + offset;
        }
        self
    }
}

/// Iterator over the points of a [`TimeSeries`]
pub struct Points<'a> {
    series: &'a TimeSeries,
    next: usize,
}

impl Iterator for Points<'_> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.next;
        let time = self.series.time(i)?;
        self.next += 1;
        Some((time, self.series.values[i]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.series.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Points<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_times() {
        let series = TimeSeries::uniform(4.0, 2, vec![1.0, 2.0, 3.0]);
        let points: Vec<_> = series.points().collect();
        assert_eq!(points, vec![(0.5, 1.0), (0.75, 2.0), (1.0, 3.0)]);
        assert_eq!(series.time(3), None);
    }

    #[test]
    fn test_explicit_times_are_trimmed_to_values() {
        let series = TimeSeries::with_times(vec![0.0, 0.1, 0.3], vec![5.0, 6.0]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.times(), vec![0.0, 0.1]);
        assert_eq!(series.points().len(), 2);
    }

    #[test]
    fn test_empty_series() {
        let series = TimeSeries::empty();
        assert!(series.is_empty());
        assert_eq!(series.points().next(), None);
    }

    #[test]
    fn test_scaled() {
        let series = TimeSeries::uniform(1.0, 0, vec![1.0, 2.0]).scaled(2.0, -1.0);
        assert_eq!(series.values(), &[1.0, 3.0]);
    }
}
