//! Recordings
//!
//! A [`Recording`] owns one container file together with the clocks,
//! signals and signal arrays stored in it, and the description written to
//! the container's metadata slot when it is closed.
//!
//! # Example
//!
//! ```rust,no_run
//! use biosignal_store::config::StoreConfig;
//! use biosignal_store::recording::Recording;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::default();
//!     let mut rec = Recording::create("http://ex.org/rec", "rec.bsml", true, &config)?;
//!
//!     let clock = rec.new_clock("http://ex.org/rec/clock", "s", Some(&[0.0, 0.25, 0.5]))?;
//!     let ecg = rec.new_signal("http://ex.org/rec/ecg", "mV", None, Some(&clock))?;
//!     ecg.extend(&[0.1, 0.4, 0.2])?;
//!
//!     for (t, v) in ecg.read_interval(0.0, 0.5)?.points() {
//!         println!("{} {}", t, v);
//!     }
//!
//!     rec.close()?;
//!     Ok(())
//! }
//! ```

mod clock;
mod signal;

pub use clock::{Clock, ClockBuilder};
pub use signal::{Signal, SignalArray, SignalBuilder};

use crate::config::StoreConfig;
use crate::metadata::{ClockInfo, RecordingDescription, RecordingInfo, SignalInfo, METADATA_MIMETYPE};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::file::{BsmlFile, ClockTiming, SignalAttributes};
use crate::storage::signal_data::SignalData;
use std::path::Path;

/// A recording and its container
pub struct Recording {
    file: BsmlFile,
    description: RecordingDescription,
    clocks: Vec<Clock>,
    signals: Vec<Signal>,
    arrays: Vec<SignalArray>,
    /// Metadata slot holds a blob this crate did not write
    foreign_metadata: bool,
    closed: bool,
}

impl Recording {
    /// Create a recording in a new container
    pub fn create(
        uri: &str,
        path: impl AsRef<Path>,
        replace: bool,
        config: &StoreConfig,
    ) -> StoreResult<Self> {
        let file = BsmlFile::create(uri, path, replace, config)?;
        Ok(Self {
            file,
            description: RecordingDescription::new(uri),
            clocks: Vec::new(),
            signals: Vec::new(),
            arrays: Vec::new(),
            foreign_metadata: false,
            closed: false,
        })
    }

    /// Open a recording, reconstructing its clocks, signals and description
    pub fn open(path: impl AsRef<Path>, readonly: bool, config: &StoreConfig) -> StoreResult<Self> {
        let file = BsmlFile::open(path, readonly, config)?;

        let (text, mimetype) = file.get_metadata()?;
        let mut foreign_metadata = false;
        let mut description = if mimetype == METADATA_MIMETYPE {
            match RecordingDescription::from_json(&text) {
                Ok(description) => description,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable metadata in {:?}: {}", file.path(), e);
                    RecordingDescription::new(file.uri())
                }
            }
        } else {
            if !mimetype.is_empty() {
                tracing::debug!("Metadata in {:?} is {}, leaving it as stored", file.path(), mimetype);
                foreign_metadata = true;
            }
            RecordingDescription::new(file.uri())
        };
        if description.recording.uri != file.uri() {
            tracing::warn!(
                "Metadata describes <{}> but the container holds <{}>",
                description.recording.uri,
                file.uri()
            );
            description.recording.uri = file.uri().to_string();
        }

        let clocks: Vec<Clock> = file.get_clocks()?.into_iter().map(Clock::new).collect();

        let mut signals = Vec::new();
        let mut arrays = Vec::new();
        for data in file.get_signals()? {
            let clock = Self::clock_for(&clocks, &data);
            if data.dataset().column().is_none() {
                signals.push(Signal::new(data, clock));
            }
        }
        for data in file.get_signal_arrays()? {
            let clock = Self::clock_for(&clocks, &data);
            let array = SignalArray::new(data, clock)?;
            signals.extend(array.signals().iter().cloned());
            arrays.push(array);
        }

        let mut recording = Self {
            file,
            description,
            clocks,
            signals,
            arrays,
            foreign_metadata,
            closed: false,
        };
        recording.describe_datasets()?;
        Ok(recording)
    }

    fn clock_for<'a>(clocks: &'a [Clock], data: &SignalData) -> Option<&'a Clock> {
        let path = data.clock_path()?;
        clocks.iter().find(|c| c.data().dataset().path() == path)
    }

    /// Add descriptions for datasets the stored metadata does not mention
    fn describe_datasets(&mut self) -> StoreResult<()> {
        for clock in &self.clocks {
            if !self.description.clocks.contains_key(clock.uri()) {
                let info = ClockInfo {
                    uri: clock.uri().to_string(),
                    units: clock.units()?,
                    rate: clock.rate(),
                    resolution: clock.resolution(),
                    ..ClockInfo::default()
                };
                self.description.clocks.insert(info.uri.clone(), info);
            }
        }
        for signal in &self.signals {
            if !self.description.signals.contains_key(signal.uri()) {
                let info = SignalInfo {
                    uri: signal.uri().to_string(),
                    units: signal.units()?,
                    rate: signal.rate(),
                    clock: signal.clock_uri()?,
                    ..SignalInfo::default()
                };
                self.description.signals.insert(info.uri.clone(), info);
            }
        }
        Ok(())
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    pub fn uri(&self) -> &str {
        self.file.uri()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Container format version
    pub fn version(&self) -> StoreResult<String> {
        self.file.version()
    }

    pub fn file(&self) -> &BsmlFile {
        &self.file
    }

    pub fn info(&self) -> &RecordingInfo {
        &self.description.recording
    }

    pub fn info_mut(&mut self) -> &mut RecordingInfo {
        &mut self.description.recording
    }

    pub fn description(&self) -> &RecordingDescription {
        &self.description
    }

    pub fn clock_info(&self, uri: &str) -> Option<&ClockInfo> {
        self.description.clocks.get(uri)
    }

    pub fn clock_info_mut(&mut self, uri: &str) -> Option<&mut ClockInfo> {
        self.description.clocks.get_mut(uri)
    }

    pub fn signal_info(&self, uri: &str) -> Option<&SignalInfo> {
        self.description.signals.get(uri)
    }

    pub fn signal_info_mut(&mut self, uri: &str) -> Option<&mut SignalInfo> {
        self.description.signals.get_mut(uri)
    }

    /// New irregular clock, optionally with its first sample times
    pub fn new_clock(&mut self, uri: &str, units: &str, samples: Option<&[f64]>) -> StoreResult<Clock> {
        let mut builder = ClockBuilder::new(uri, units);
        builder.times = samples.map(|s| s.to_vec());
        self.new_clock_with(builder)
    }

    /// New clock sampled at a fixed rate
    pub fn new_regular_clock(&mut self, uri: &str, units: &str, rate: f64) -> StoreResult<Clock> {
        self.new_clock_with(ClockBuilder::new(uri, units).rate(rate))
    }

    pub fn new_clock_with(&mut self, builder: ClockBuilder) -> StoreResult<Clock> {
        self.check_open()?;
        builder.validate()?;

        let timing = match (builder.rate, &builder.times) {
            (Some(rate), _) => ClockTiming::Regular(rate),
            (None, Some(times)) => ClockTiming::Irregular(times.as_slice()),
            (None, None) => ClockTiming::Irregular(&[]),
        };
        let data = self
            .file
            .create_clock(&builder.uri, &builder.units, timing, builder.resolution)?;
        let clock = Clock::new(data);

        self.description.clocks.insert(
            builder.uri.clone(),
            ClockInfo {
                uri: builder.uri,
                units: builder.units,
                rate: builder.rate,
                resolution: builder.resolution,
                label: builder.label,
                ..ClockInfo::default()
            },
        );
        self.clocks.push(clock.clone());
        Ok(clock)
    }

    fn timing(
        &self,
        uri: &str,
        rate: Option<f64>,
        clock: Option<&Clock>,
    ) -> StoreResult<SignalAttributes> {
        match (rate, clock) {
            (Some(rate), None) => Ok(SignalAttributes::with_rate(rate)),
            (None, Some(clock)) => {
                self.owned_clock(clock)?;
                Ok(SignalAttributes::with_clock(clock.uri()))
            }
            (Some(_), Some(_)) => Err(StoreError::Configuration(format!(
                "Signal '{}' can have a rate or a clock, not both",
                uri
            ))),
            (None, None) => Err(StoreError::Configuration(format!(
                "Signal '{}' needs a rate or a clock",
                uri
            ))),
        }
    }

    fn owned_clock(&self, clock: &Clock) -> StoreResult<&Clock> {
        self.clocks
            .iter()
            .find(|c| c.uri() == clock.uri())
            .ok_or_else(|| {
                StoreError::NotFound(format!("Clock '{}' is not part of this recording", clock.uri()))
            })
    }

    /// New signal timed by exactly one of `rate` and `clock`
    pub fn new_signal(
        &mut self,
        uri: &str,
        units: &str,
        rate: Option<f64>,
        clock: Option<&Clock>,
    ) -> StoreResult<Signal> {
        let attributes = self.timing(uri, rate, clock)?;
        self.new_signal_with(SignalBuilder {
            uri: uri.to_string(),
            units: units.to_string(),
            attributes,
            ..SignalBuilder::default()
        })
    }

    pub fn new_signal_with(&mut self, builder: SignalBuilder) -> StoreResult<Signal> {
        self.check_open()?;
        let clock = match &builder.attributes.clock {
            Some(uri) => Some(self.get_clock(uri)?),
            None => None,
        };

        let data = self.file.create_signal(
            &builder.uri,
            &builder.units,
            &builder.attributes,
            builder.data.as_deref(),
        )?;
        let signal = Signal::new(data, clock.as_ref());

        self.description.signals.insert(
            builder.uri.clone(),
            SignalInfo {
                uri: builder.uri,
                units: builder.units,
                rate: builder.attributes.rate,
                clock: builder.attributes.clock,
                label: builder.label,
                ..SignalInfo::default()
            },
        );
        self.signals.push(signal.clone());
        Ok(signal)
    }

    /// New signal array: one compound dataset shared by `uris.len()` signals
    pub fn new_signalarray<S: AsRef<str>>(
        &mut self,
        uris: &[S],
        units: &[S],
        rate: Option<f64>,
        clock: Option<&Clock>,
    ) -> StoreResult<SignalArray> {
        self.check_open()?;
        if uris.len() != units.len() {
            return Err(StoreError::LengthMismatch(format!(
                "{} signal URIs given with {} units",
                uris.len(),
                units.len()
            )));
        }
        let first = uris.first().map(|u| u.as_ref()).unwrap_or_default();
        let attributes = self.timing(first, rate, clock)?;

        let data = self.file.create_signal_array(uris, units, &attributes, None)?;
        let array = SignalArray::new(data, clock)?;

        for (uri, units) in uris.iter().zip(units) {
            self.description.signals.insert(
                uri.as_ref().to_string(),
                SignalInfo {
                    uri: uri.as_ref().to_string(),
                    units: units.as_ref().to_string(),
                    rate,
                    clock: clock.map(|c| c.uri().to_string()),
                    ..SignalInfo::default()
                },
            );
        }
        self.signals.extend(array.signals().iter().cloned());
        self.arrays.push(array.clone());
        Ok(array)
    }

    pub fn get_clock(&self, uri: &str) -> StoreResult<Clock> {
        self.clocks
            .iter()
            .find(|c| c.uri() == uri)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Unknown clock '{}'", uri)))
    }

    pub fn get_clocks(&self) -> &[Clock] {
        &self.clocks
    }

    /// Signal by URI, including members of signal arrays
    pub fn get_signal(&self, uri: &str) -> StoreResult<Signal> {
        self.signals
            .iter()
            .find(|s| s.uri() == uri)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Unknown signal '{}'", uri)))
    }

    pub fn get_signals(&self) -> &[Signal] {
        &self.signals
    }

    /// The array holding the member `uri`
    pub fn get_signal_array(&self, uri: &str) -> StoreResult<SignalArray> {
        self.arrays
            .iter()
            .find(|a| a.index(uri).is_some())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("No signal array holds '{}'", uri)))
    }

    pub fn get_signal_arrays(&self) -> &[SignalArray] {
        &self.arrays
    }

    /// Write the description, release every dataset and close the
    /// container. Repeated calls do nothing.
    pub fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Ok(());
        }

        if !self.file.is_readonly()? && !self.file.is_closed()? {
            if self.foreign_metadata {
                tracing::debug!("Keeping foreign metadata of <{}>", self.uri());
            } else {
                let json = self.description.to_json()?;
                self.file.store_metadata(&json, METADATA_MIMETYPE)?;
            }
        }

        for clock in &self.clocks {
            clock.data().dataset().close();
        }
        for signal in &self.signals {
            signal.data().close();
        }
        for array in &self.arrays {
            array.data().close();
        }
        self.file.close()?;
        self.closed = true;

        tracing::info!("Closed recording <{}>", self.uri());
        Ok(())
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close recording <{}>: {}", self.uri(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyValue;
    use tempfile::tempdir;

    fn create(dir: &Path) -> Recording {
        Recording::create("http://ex.org/rec", dir.join("rec.bsml"), false, &StoreConfig::default())
            .unwrap()
    }

    #[test]
    fn test_quarter_second_scenario() {
        let dir = tempdir().unwrap();
        let mut rec = create(dir.path());
        let clock = rec
            .new_clock("clk", "s", Some(&[0.0, 0.25, 0.5, 0.75, 1.0]))
            .unwrap();
        let signal = rec.new_signal("sig", "mV", None, Some(&clock)).unwrap();
        signal.extend(&[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();

        let points: Vec<_> = signal.read_interval(0.25, 0.25).unwrap().points().collect();
        assert_eq!(points, vec![(0.25, 1.0)]);

        let points: Vec<_> = signal.read_interval(0.0, 1.0).unwrap().points().collect();
        assert_eq!(points.len(), 4);
        assert!(signal.read_interval(-1.0, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_signal_needs_exactly_one_timing_source() {
        let dir = tempdir().unwrap();
        let mut rec = create(dir.path());
        let clock = rec.new_regular_clock("clk", "s", 100.0).unwrap();

        let both = rec.new_signal("a", "mV", Some(100.0), Some(&clock));
        assert!(matches!(both, Err(StoreError::Configuration(_))));
        let neither = rec.new_signal("a", "mV", None, None);
        assert!(matches!(neither, Err(StoreError::Configuration(_))));

        assert!(rec.get_signals().is_empty());
        assert!(rec.file().get_signals().unwrap().is_empty());
        assert!(rec.signal_info("a").is_none());
    }

    #[test]
    fn test_signalarray_length_mismatch() {
        let dir = tempdir().unwrap();
        let mut rec = create(dir.path());
        let err = rec
            .new_signalarray(&["a", "b", "c"], &["mV", "mV"], Some(10.0), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch(_)));
        assert!(rec.get_signal_arrays().is_empty());
        assert!(rec.file().get_signals().unwrap().is_empty());
    }

    #[test]
    fn test_signalarray_extend_and_read() {
        let dir = tempdir().unwrap();
        let mut rec = create(dir.path());
        let array = rec
            .new_signalarray(&["a", "b"], &["mV", "uV"], Some(2.0), None)
            .unwrap();

        array.extend(&[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]).unwrap();
        assert!(matches!(array.extend(&[4.0]), Err(StoreError::LengthMismatch(_))));
        assert_eq!(array.size().unwrap(), 3);
        assert_eq!(array.index("b"), Some(1));
        assert_eq!(array.index("z"), None);

        let series = array.read(1, -1).unwrap();
        assert_eq!(series[0].points().collect::<Vec<_>>(), vec![(0.5, 2.0), (1.0, 3.0)]);
        assert_eq!(series[1].values(), &[20.0, 30.0]);

        let b = rec.get_signal("b").unwrap();
        assert_eq!(b.read(0, 2).unwrap().values(), &[10.0, 20.0]);
        assert!(matches!(b.extend(&[40.0]), Err(StoreError::Configuration(_))));

        let window = array.read_interval(0.5, 0.5).unwrap();
        assert_eq!(window[0].values(), &[2.0]);
        assert_eq!(window[1].values(), &[20.0]);
    }

    #[test]
    fn test_duplicate_signal_uri() {
        let dir = tempdir().unwrap();
        let mut rec = create(dir.path());
        let first = rec.new_signal("sig", "mV", Some(10.0), None).unwrap();
        first.extend(&[1.0, 2.0]).unwrap();

        let err = rec.new_signal("sig", "mV", Some(10.0), None).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUri(_)));
        assert_eq!(rec.get_signals().len(), 1);
        assert_eq!(rec.get_signal("sig").unwrap().read(0, -1).unwrap().values(), &[1.0, 2.0]);
    }

    #[test]
    fn test_rejected_signal_data_can_be_retried() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        {
            let mut rec = create(dir.path());
            let clock = rec
                .new_clock_with(ClockBuilder::new("clk", "s").times(vec![0.0, 1.0]))
                .unwrap();

            let err = rec
                .new_signal_with(SignalBuilder::new("sig", "mV").clock(&clock).data(vec![1.0, 2.0, 3.0]))
                .unwrap_err();
            assert!(matches!(err, StoreError::Timing(_)));
            assert!(rec.get_signals().is_empty());

            rec.new_signal_with(SignalBuilder::new("sig", "mV").clock(&clock).data(vec![1.0, 2.0]))
                .unwrap();
            rec.close().unwrap();
        }

        let rec = Recording::open(&path, true, &StoreConfig::default()).unwrap();
        assert_eq!(rec.get_signals().len(), 1);
        let series = rec.get_signal("sig").unwrap().read(0, -1).unwrap();
        assert_eq!(series.points().collect::<Vec<_>>(), vec![(0.0, 1.0), (1.0, 2.0)]);
    }

    #[test]
    fn test_reopen_restores_everything() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        {
            let mut rec = create(dir.path());
            rec.info_mut().label = Some("Overnight".into());
            rec.info_mut()
                .properties
                .insert("http://ex.org/site".into(), PropertyValue::Text("ward 4".into()));

            let clock = rec
                .new_clock_with(ClockBuilder::new("clk", "s").times(vec![0.0, 0.1, 0.3]).resolution(0.001))
                .unwrap();
            rec.new_signal_with(
                SignalBuilder::new("ecg", "mV")
                    .clock(&clock)
                    .gain(2.0)
                    .timeunits("s")
                    .data(vec![5.0, 6.0, 7.0])
                    .label("Lead II"),
            )
            .unwrap();
            rec.new_signalarray(&["x", "y"], &["g", "g"], Some(50.0), None)
                .unwrap()
                .extend(&[0.1, 0.2])
                .unwrap();
            rec.close().unwrap();
            rec.close().unwrap();
        }

        let rec = Recording::open(&path, true, &StoreConfig::default()).unwrap();
        assert_eq!(rec.uri(), "http://ex.org/rec");
        assert_eq!(rec.info().label.as_deref(), Some("Overnight"));
        assert_eq!(
            rec.info().properties.get("http://ex.org/site"),
            Some(&PropertyValue::Text("ward 4".into()))
        );
        assert_eq!(rec.get_clocks().len(), 1);
        assert_eq!(rec.get_signals().len(), 3);
        assert_eq!(rec.get_signal_arrays().len(), 1);
        assert_eq!(rec.signal_info("ecg").unwrap().label.as_deref(), Some("Lead II"));

        let ecg = rec.get_signal("ecg").unwrap();
        assert_eq!(ecg.gain(), Some(2.0));
        assert_eq!(ecg.timeunits(), Some("s"));
        assert_eq!(ecg.clock_uri().unwrap().as_deref(), Some("clk"));
        assert_eq!(
            ecg.read_interval(0.1, 1.0).unwrap().points().collect::<Vec<_>>(),
            vec![(0.1, 6.0), (0.3, 7.0)]
        );
        assert_eq!(rec.get_clock("clk").unwrap().resolution(), Some(0.001));
        assert_eq!(rec.get_signal_array("y").unwrap().read(0, -1).unwrap()[1].values(), &[0.2]);
    }

    #[test]
    fn test_foreign_metadata_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        {
            let file = BsmlFile::create("http://ex.org/rec", &path, false, &StoreConfig::default()).unwrap();
            file.store_metadata("<rdf/>", "application/rdf+xml").unwrap();
        }
        {
            let mut rec = Recording::open(&path, false, &StoreConfig::default()).unwrap();
            rec.new_regular_clock("clk", "s", 10.0).unwrap();
            rec.close().unwrap();
        }

        let file = BsmlFile::open(&path, true, &StoreConfig::default()).unwrap();
        assert_eq!(
            file.get_metadata().unwrap(),
            ("<rdf/>".to_string(), "application/rdf+xml".to_string())
        );
        assert!(file.get_clock("clk").unwrap().is_regular());
    }

    #[test]
    fn test_closed_recording_rejects_work() {
        let dir = tempdir().unwrap();
        let mut rec = create(dir.path());
        let signal = rec.new_signal("sig", "mV", Some(1.0), None).unwrap();
        rec.close().unwrap();

        assert!(matches!(signal.extend(&[1.0]), Err(StoreError::Closed)));
        assert!(matches!(rec.new_regular_clock("c", "s", 1.0), Err(StoreError::Closed)));
    }

    #[test]
    fn test_signal_outliving_recording() {
        let dir = tempdir().unwrap();
        let signal = {
            let mut rec = create(dir.path());
            let clock = rec.new_clock("clk", "s", Some(&[0.0])).unwrap();
            let signal = rec.new_signal("sig", "mV", None, Some(&clock)).unwrap();
            signal.extend(&[1.0]).unwrap();
            signal
        };
        assert!(matches!(signal.read(0, -1), Err(StoreError::Closed)));
    }
}
