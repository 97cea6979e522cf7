//! BioSignalML storage engine
//!
//! This module maps recordings onto a single container file:
//!
//! - **container**: File format (header, chunk records, catalog)
//! - **catalog**: URI table and dataset descriptors
//! - **compression**: Chunk encodings
//! - **dataset**: Extensible dataset handles
//! - **clock_data** / **signal_data**: Typed datasets with time indexing
//! - **file**: Dataset creation, lookup and the metadata slot
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Signal::extend → Dataset → check clock extent → Compress → Chunk records → Catalog
//!
//! Read Path:
//!   read_interval → ClockData (IndexCache) → row range → Decompress chunks → TimeSeries
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use biosignal_store::config::StoreConfig;
//! use biosignal_store::storage::{BsmlFile, ClockTiming, SignalAttributes};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = BsmlFile::create("http://ex.org/rec", "rec.bsml", true, &StoreConfig::default())?;
//!     let clock = file.create_clock("http://ex.org/rec/clock", "s", ClockTiming::Irregular(&[0.0, 0.5]), None)?;
//!     let signal = file.create_signal(
//!         "http://ex.org/rec/resp",
//!         "l/min",
//!         &SignalAttributes::with_clock("http://ex.org/rec/clock"),
//!         Some(&[12.0, 12.5]),
//!     )?;
//!
//!     let series = signal.read_interval(0.0, 1.0, Some(&clock))?;
//!     println!("{} samples", series.len());
//!
//!     file.close()?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod clock_data;
pub mod compression;
pub mod container;
pub mod dataset;
pub mod error;
pub mod file;
pub mod signal_data;

// Re-export commonly used types
pub use catalog::{Catalog, DatasetAttributes, DatasetMeta, DatasetPath, Group, ObjectRef};
pub use clock_data::ClockData;
pub use compression::{compress_chunk, decompress_chunk, CompressionType};
pub use container::{format_version, parse_version, Container, ContainerHeader, BSML_MAJOR, BSML_MINOR};
pub use dataset::{chunk_rows, Dataset};
pub use error::{StoreError, StoreResult};
pub use file::{BsmlFile, ClockTiming, SignalAttributes};
pub use signal_data::SignalData;
