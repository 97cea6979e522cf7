//! Recording container files
//!
//! [`BsmlFile`] is the entry point to a container: it creates and opens
//! files, allocates clock and signal datasets, resolves URIs back to them
//! and holds the recording's metadata blob.

use crate::config::StoreConfig;
use crate::storage::catalog::{DatasetAttributes, DatasetMeta, DatasetPath, Group, MetadataBlob, ObjectRef};
use crate::storage::clock_data::ClockData;
use crate::storage::container::{lock_container, Container, SharedContainer};
use crate::storage::dataset::{chunk_rows, Dataset};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::signal_data::SignalData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// How a new clock is timed
#[derive(Debug, Clone, Copy)]
pub enum ClockTiming<'a> {
    /// Sample `n` is at `n / rate`; no times are stored
    Regular(f64),
    /// Stored times, possibly empty and grown later
    Irregular(&'a [f64]),
}

/// Attributes of a new signal or signal array
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalAttributes {
    pub rate: Option<f64>,
    /// URI of the clock timing the signal
    pub clock: Option<String>,
    pub gain: Option<f64>,
    pub offset: Option<f64>,
    pub timeunits: Option<String>,
}

impl SignalAttributes {
    pub fn with_rate(rate: f64) -> Self {
        Self {
            rate: Some(rate),
            ..Self::default()
        }
    }

    pub fn with_clock(clock: impl Into<String>) -> Self {
        Self {
            clock: Some(clock.into()),
            ..Self::default()
        }
    }
}

fn check_rate(uri: &str, rate: f64) -> StoreResult<()> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(StoreError::Configuration(format!(
            "Rate of '{}' must be positive, got {}",
            uri, rate
        )));
    }
    Ok(())
}

/// An open recording container
pub struct BsmlFile {
    container: SharedContainer,
    config: StoreConfig,
    uri: String,
    path: PathBuf,
}

impl BsmlFile {
    /// Create a container for the recording `uri`.
    ///
    /// Fails with an I/O error when `path` exists unless `replace` is set.
    pub fn create(
        uri: &str,
        path: impl AsRef<Path>,
        replace: bool,
        config: &StoreConfig,
    ) -> StoreResult<Self> {
        let container = Container::create(path.as_ref(), uri, replace)?;
        Ok(Self::wrap(container, config))
    }

    /// Open an existing container
    pub fn open(path: impl AsRef<Path>, readonly: bool, config: &StoreConfig) -> StoreResult<Self> {
        let container = Container::open(path.as_ref(), readonly, config.supported_major)?;
        Ok(Self::wrap(container, config))
    }

    fn wrap(container: Container, config: &StoreConfig) -> Self {
        Self {
            uri: container.root_uri().to_string(),
            path: container.path().to_path_buf(),
            container: Arc::new(Mutex::new(container)),
            config: config.clone(),
        }
    }

    /// URI of the recording held by this container
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Version string from the container header
    pub fn version(&self) -> StoreResult<String> {
        Ok(lock_container(&self.container)?.header().version.clone())
    }

    pub fn is_readonly(&self) -> StoreResult<bool> {
        Ok(lock_container(&self.container)?.is_readonly())
    }

    fn new_meta(&self, uris: Vec<String>, units: Vec<String>, attributes: DatasetAttributes) -> DatasetMeta {
        let columns = uris.len() as u32;
        DatasetMeta {
            uris,
            units,
            columns,
            rows: 0,
            chunk_rows: chunk_rows(columns, &self.config),
            compression: self.config.compression,
            attributes,
            chunks: Vec::new(),
        }
    }

    /// Create a clock dataset
    pub fn create_clock(
        &self,
        uri: &str,
        units: &str,
        timing: ClockTiming<'_>,
        resolution: Option<f64>,
    ) -> StoreResult<ClockData> {
        let mut attributes = DatasetAttributes {
            resolution,
            ..DatasetAttributes::default()
        };
        let initial = match timing {
            ClockTiming::Regular(rate) => {
                check_rate(uri, rate)?;
                attributes.rate = Some(rate);
                None
            }
            ClockTiming::Irregular(times) => Some(times),
        };

        let meta = self.new_meta(vec![uri.to_string()], vec![units.to_string()], attributes);
        let path = lock_container(&self.container)?.add_dataset(Group::Clock, meta, initial)?;
        tracing::debug!("Created clock <{}> at {}", uri, path);

        ClockData::new(
            Dataset::new(Arc::clone(&self.container), path, None, uri),
            self.config.index_cache_capacity,
        )
    }

    /// Check rate/clock exclusivity and resolve the clock URI
    fn signal_attributes(&self, uri: &str, attrs: &SignalAttributes) -> StoreResult<DatasetAttributes> {
        let clock = match (attrs.rate, &attrs.clock) {
            (Some(_), Some(_)) => {
                return Err(StoreError::Configuration(format!(
                    "Signal '{}' can have a rate or a clock, not both",
                    uri
                )))
            }
            (None, None) => {
                return Err(StoreError::Configuration(format!(
                    "Signal '{}' needs a rate or a clock",
                    uri
                )))
            }
            (Some(rate), None) => {
                check_rate(uri, rate)?;
                None
            }
            (None, Some(clock)) => Some(self.clock_path(clock)?),
        };

        Ok(DatasetAttributes {
            gain: attrs.gain,
            offset: attrs.offset,
            rate: attrs.rate,
            timeunits: attrs.timeunits.clone(),
            clock,
            resolution: None,
        })
    }

    /// Create a single-channel signal dataset
    pub fn create_signal(
        &self,
        uri: &str,
        units: &str,
        attrs: &SignalAttributes,
        data: Option<&[f64]>,
    ) -> StoreResult<SignalData> {
        let attributes = self.signal_attributes(uri, attrs)?;
        let meta = self.new_meta(vec![uri.to_string()], vec![units.to_string()], attributes);
        let path = lock_container(&self.container)?.add_dataset(Group::Signal, meta, data)?;
        tracing::debug!("Created signal <{}> at {}", uri, path);

        SignalData::new(Dataset::new(Arc::clone(&self.container), path, None, uri))
    }

    /// Create one compound dataset shared by several signals.
    ///
    /// `data` holds whole rows, one value per signal, interleaved.
    pub fn create_signal_array<S: AsRef<str>>(
        &self,
        uris: &[S],
        units: &[S],
        attrs: &SignalAttributes,
        data: Option<&[f64]>,
    ) -> StoreResult<SignalData> {
        if uris.len() != units.len() {
            return Err(StoreError::LengthMismatch(format!(
                "{} signal URIs given with {} units",
                uris.len(),
                units.len()
            )));
        }
        let first = uris.first().map(|u| u.as_ref().to_string()).ok_or_else(|| {
            StoreError::Configuration("A signal array needs at least one signal".into())
        })?;

        let attributes = self.signal_attributes(&first, attrs)?;
        let meta = self.new_meta(
            uris.iter().map(|u| u.as_ref().to_string()).collect(),
            units.iter().map(|u| u.as_ref().to_string()).collect(),
            attributes,
        );
        let path = lock_container(&self.container)?.add_dataset(Group::Signal, meta, data)?;
        tracing::debug!("Created signal array of {} signals at {}", uris.len(), path);

        SignalData::new(Dataset::new(Arc::clone(&self.container), path, None, first))
    }

    fn resolve(&self, uri: &str, group: Group) -> StoreResult<DatasetPath> {
        let container = lock_container(&self.container)?;
        match container.catalog().resolve(uri) {
            Some(ObjectRef::Dataset(path)) if path.group == group => Ok(path),
            Some(_) => Err(StoreError::NotFound(format!("'{}' is not a {}", uri, group))),
            None => Err(StoreError::NotFound(format!("Unknown {} '{}'", group, uri))),
        }
    }

    fn clock_path(&self, uri: &str) -> StoreResult<DatasetPath> {
        self.resolve(uri, Group::Clock)
    }

    /// URI of the clock dataset at `path`
    pub fn clock_uri(&self, path: DatasetPath) -> StoreResult<String> {
        let container = lock_container(&self.container)?;
        container
            .dataset(path)?
            .uris
            .first()
            .cloned()
            .ok_or_else(|| StoreError::Format(format!("Clock {} has no URI", path)))
    }

    pub fn get_clock(&self, uri: &str) -> StoreResult<ClockData> {
        let path = self.clock_path(uri)?;
        ClockData::new(
            Dataset::new(Arc::clone(&self.container), path, None, uri),
            self.config.index_cache_capacity,
        )
    }

    /// Signal by URI; members of an array come back as column handles
    pub fn get_signal(&self, uri: &str) -> StoreResult<SignalData> {
        let path = self.resolve(uri, Group::Signal)?;
        let column = {
            let container = lock_container(&self.container)?;
            let meta = container.dataset(path)?;
            if meta.is_compound() {
                meta.column_of(uri)
            } else {
                None
            }
        };
        SignalData::new(Dataset::new(Arc::clone(&self.container), path, column, uri))
    }

    /// Whole-row handle onto the array holding `uri`
    pub fn get_signal_array(&self, uri: &str) -> StoreResult<SignalData> {
        let path = self.resolve(uri, Group::Signal)?;
        self.array_at(path)?
            .ok_or_else(|| StoreError::NotFound(format!("'{}' is not part of a signal array", uri)))
    }

    fn array_at(&self, path: DatasetPath) -> StoreResult<Option<SignalData>> {
        let first = {
            let container = lock_container(&self.container)?;
            let meta = container.dataset(path)?;
            if !meta.is_compound() {
                return Ok(None);
            }
            meta.uris[0].clone()
        };
        SignalData::new(Dataset::new(Arc::clone(&self.container), path, None, first)).map(Some)
    }

    fn paths(&self, group: Group) -> StoreResult<Vec<DatasetPath>> {
        Ok(lock_container(&self.container)?.catalog().paths(group))
    }

    pub fn get_clocks(&self) -> StoreResult<Vec<ClockData>> {
        let mut clocks = Vec::new();
        for path in self.paths(Group::Clock)? {
            let uri = self.clock_uri(path)?;
            clocks.push(ClockData::new(
                Dataset::new(Arc::clone(&self.container), path, None, uri),
                self.config.index_cache_capacity,
            )?);
        }
        Ok(clocks)
    }

    /// Every signal, one entry per member of each array
    pub fn get_signals(&self) -> StoreResult<Vec<SignalData>> {
        let mut signals = Vec::new();
        for path in self.paths(Group::Signal)? {
            match self.array_at(path)? {
                Some(array) => signals.extend(array.members()?),
                None => {
                    let uri = {
                        let container = lock_container(&self.container)?;
                        container.dataset(path)?.uris.first().cloned().unwrap_or_default()
                    };
                    signals.push(SignalData::new(Dataset::new(
                        Arc::clone(&self.container),
                        path,
                        None,
                        uri,
                    ))?);
                }
            }
        }
        Ok(signals)
    }

    /// Whole-row handles of every signal array
    pub fn get_signal_arrays(&self) -> StoreResult<Vec<SignalData>> {
        let mut arrays = Vec::new();
        for path in self.paths(Group::Signal)? {
            if let Some(array) = self.array_at(path)? {
                arrays.push(array);
            }
        }
        Ok(arrays)
    }

    /// Replace the metadata blob
    pub fn store_metadata(&self, text: &str, mimetype: &str) -> StoreResult<()> {
        lock_container(&self.container)?.set_metadata(MetadataBlob {
            text: text.to_string(),
            mimetype: mimetype.to_string(),
        })
    }

    /// `(text, mimetype)` of the metadata blob; both empty when none is stored
    pub fn get_metadata(&self) -> StoreResult<(String, String)> {
        let container = lock_container(&self.container)?;
        Ok(container
            .catalog()
            .metadata
            .as_ref()
            .map(|m| (m.text.clone(), m.mimetype.clone()))
            .unwrap_or_default())
    }

    pub fn is_closed(&self) -> StoreResult<bool> {
        Ok(lock_container(&self.container)?.is_closed())
    }

    /// Flush and release the container. Repeated calls do nothing.
    pub fn close(&self) -> StoreResult<()> {
        lock_container(&self.container)?.close()
    }
}
