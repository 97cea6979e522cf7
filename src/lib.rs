//! # biosignal-store
//!
//! Storage engine for BioSignalML recordings: time-series biosignals and
//! their clocks held in a single extensible container file.
//!
//! ## Features
//!
//! - **Extensible datasets**: Append-only chunked arrays with LZ4 compression
//! - **Signal arrays**: Several signals sharing one interleaved dataset
//! - **Time reads**: Interval reads over irregular clocks via cached binary search
//! - **Integrity**: Checksummed header, chunks and catalog
//!
//! ## Modules
//!
//! - [`storage`]: Container format, datasets and the file API
//! - [`index`]: Time → sample index caches
//! - [`recording`]: Recordings, clocks, signals and signal arrays
//! - [`metadata`]: Recording/clock/signal descriptions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use biosignal_store::{Recording, StoreConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut rec = Recording::create("http://ex.org/rec", "rec.bsml", true, &StoreConfig::default())?;
//!
//!     let ecg = rec.new_signal("http://ex.org/rec/ecg", "mV", Some(250.0), None)?;
//!     ecg.extend(&[0.12, 0.15, 0.11, 0.40])?;
//!
//!     let window = ecg.read_interval(0.0, 0.01)?;
//!     println!("Found {} samples", window.len());
//!
//!     rec.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod metadata;
pub mod recording;
pub mod storage;
pub mod timeseries;

// Re-export top-level types for convenience
pub use storage::{
    BsmlFile, ClockData, ClockTiming, CompressionType, Dataset, SignalAttributes, SignalData,
    StoreError, StoreResult,
};

pub use index::{Bias, IndexCache};

pub use recording::{Clock, ClockBuilder, Recording, Signal, SignalArray, SignalBuilder};

pub use metadata::{
    ClockInfo, PropertyValue, RecordingDescription, RecordingInfo, SignalInfo, METADATA_MIMETYPE,
};

pub use timeseries::{SampleTimes, TimeSeries};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig, StoreConfig};
