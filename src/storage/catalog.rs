//! Container catalog: URI table, dataset groups and the metadata slot
//!
//! The catalog is the structural index of a container. It is kept in memory
//! while the container is open and written as a single checksummed record
//! after the chunk area on every commit.
//!
//! ```text
//! root ─── version "BSML 1.0", root URI
//!  ├── uris:    URI → Recording | clock/N | signal/N
//!  ├── clock/   0, 1, 2 ...  (1-D datasets of times, or rate only)
//!  ├── signal/  0, 1, 2 ...  (1 column, or N columns for a signal array)
//!  └── metadata (text, mimetype)
//! ```

use crate::storage::compression::CompressionType;
use crate::storage::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dataset groups inside the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Group {
    Clock,
    Signal,
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Group::Clock => write!(f, "clock"),
            Group::Signal => write!(f, "signal"),
        }
    }
}

/// Location of a dataset: its group and sequence number within the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetPath {
    pub group: Group,
    pub number: u32,
}

impl DatasetPath {
    pub fn new(group: Group, number: u32) -> Self {
        Self { group, number }
    }
}

impl std::fmt::Display for DatasetPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/recording/{}/{}", self.group, self.number)
    }
}

/// Target of an entry in the URI table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectRef {
    /// The recording root object
    Recording,
    /// A clock or signal dataset
    Dataset(DatasetPath),
}

/// Scalar attributes attached to a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetAttributes {
    pub gain: Option<f64>,
    pub offset: Option<f64>,
    /// Sampling rate; present for regular clocks and rate-timed signals
    pub rate: Option<f64>,
    pub timeunits: Option<String>,
    /// Backing clock dataset for clock-timed signals
    pub clock: Option<DatasetPath>,
    /// Clock time resolution, supplied by the caller
    pub resolution: Option<f64>,
}

/// One stored chunk of rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Offset of the chunk record from start of file
    pub offset: u64,
    /// Size of the encoded payload
    pub size: u32,
    /// First row held by the chunk
    pub first_row: u64,
    /// Number of rows in the chunk
    pub row_count: u32,
}

impl ChunkMeta {
    pub fn end_row(&self) -> u64 {
        self.first_row + self.row_count as u64
    }
}

/// Descriptor of one extensible dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    /// One URI for a simple dataset, one per column for a compound dataset
    pub uris: Vec<String>,
    /// Units, parallel to `uris`
    pub units: Vec<String>,
    /// Secondary dimension, immutable after creation
    pub columns: u32,
    /// Primary dimension extent
    pub rows: u64,
    /// Maximum rows per chunk
    pub chunk_rows: u32,
    pub compression: CompressionType,
    pub attributes: DatasetAttributes,
    pub chunks: Vec<ChunkMeta>,
}

impl DatasetMeta {
    pub fn is_compound(&self) -> bool {
        self.uris.len() > 1
    }

    /// Column holding `uri`, if this dataset carries it
    pub fn column_of(&self, uri: &str) -> Option<usize> {
        self.uris.iter().position(|u| u == uri)
    }
}

/// Stored metadata blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataBlob {
    pub text: String,
    pub mimetype: String,
}

/// Structural index of a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub root_uri: String,
    pub uris: BTreeMap<String, ObjectRef>,
    pub clocks: Vec<DatasetMeta>,
    pub signals: Vec<DatasetMeta>,
    pub metadata: Option<MetadataBlob>,
}

impl Catalog {
    /// Fresh catalog with only the recording registered
    pub fn new(root_uri: impl Into<String>) -> Self {
        let root_uri = root_uri.into();
        let mut uris = BTreeMap::new();
        uris.insert(root_uri.clone(), ObjectRef::Recording);
        Self {
            root_uri,
            uris,
            clocks: Vec::new(),
            signals: Vec::new(),
            metadata: None,
        }
    }

    fn group(&self, group: Group) -> &Vec<DatasetMeta> {
        match group {
            Group::Clock => &self.clocks,
            Group::Signal => &self.signals,
        }
    }

    fn group_mut(&mut self, group: Group) -> &mut Vec<DatasetMeta> {
        match group {
            Group::Clock => &mut self.clocks,
            Group::Signal => &mut self.signals,
        }
    }

    pub fn dataset(&self, path: DatasetPath) -> Option<&DatasetMeta> {
        self.group(path.group).get(path.number as usize)
    }

    pub fn dataset_mut(&mut self, path: DatasetPath) -> Option<&mut DatasetMeta> {
        self.group_mut(path.group).get_mut(path.number as usize)
    }

    /// Paths of every dataset in a group, in creation order
    pub fn paths(&self, group: Group) -> Vec<DatasetPath> {
        (0..self.group(group).len() as u32)
            .map(|n| DatasetPath::new(group, n))
            .collect()
    }

    pub fn is_registered(&self, uri: &str) -> bool {
        self.uris.contains_key(uri)
    }

    pub fn resolve(&self, uri: &str) -> Option<ObjectRef> {
        self.uris.get(uri).copied()
    }

    /// Append a dataset to its group and register its URIs.
    ///
    /// Fails with `DuplicateUri` before touching anything if any URI is
    /// already known, or repeated within `meta.uris`.
    pub fn insert(&mut self, group: Group, meta: DatasetMeta) -> StoreResult<DatasetPath> {
        for (i, uri) in meta.uris.iter().enumerate() {
            if self.is_registered(uri) || meta.uris[..i].contains(uri) {
                return Err(StoreError::DuplicateUri(uri.clone()));
            }
        }

        let datasets = self.group_mut(group);
        let path = DatasetPath::new(group, datasets.len() as u32);
        let uris = meta.uris.clone();
        datasets.push(meta);
        for uri in uris {
            self.uris.insert(uri, ObjectRef::Dataset(path));
        }
        Ok(path)
    }

    /// Undo the most recent `insert` into the group of `path`.
    ///
    /// Returns `None` when `path` is not the last dataset of its group.
    pub fn remove_last(&mut self, path: DatasetPath) -> Option<DatasetMeta> {
        let datasets = self.group_mut(path.group);
        if datasets.len() as u32 != path.number + 1 {
            return None;
        }
        let meta = datasets.pop()?;
        for uri in &meta.uris {
            self.uris.remove(uri);
        }
        Some(meta)
    }

    /// Check the cross references a well-formed container must satisfy
    pub fn validate(&self) -> StoreResult<()> {
        match self.uris.get(&self.root_uri) {
            Some(ObjectRef::Recording) => {}
            _ => {
                return Err(StoreError::Format(format!(
                    "Root URI '{}' does not refer to the recording",
                    self.root_uri
                )))
            }
        }

        for (uri, target) in &self.uris {
            if let ObjectRef::Dataset(path) = target {
                let meta = self.dataset(*path).ok_or_else(|| {
                    StoreError::Format(format!("URI '{}' refers to missing dataset {}", uri, path))
                })?;
                if meta.column_of(uri).is_none() {
                    return Err(StoreError::Format(format!(
                        "Dataset {} does not carry URI '{}'",
                        path, uri
                    )));
                }
            }
        }

        for group in [Group::Clock, Group::Signal] {
            for (n, meta) in self.group(group).iter().enumerate() {
                let path = DatasetPath::new(group, n as u32);
                if meta.is_compound() && meta.columns as usize != meta.uris.len() {
                    return Err(StoreError::Format(format!(
                        "Dataset {} has {} columns for {} URIs",
                        path,
                        meta.columns,
                        meta.uris.len()
                    )));
                }
                let stored: u64 = meta.chunks.iter().map(|c| c.row_count as u64).sum();
                if stored != meta.rows {
                    return Err(StoreError::Format(format!(
                        "Dataset {} records {} rows but its chunks hold {}",
                        path, meta.rows, stored
                    )));
                }
                if let Some(clock) = meta.attributes.clock {
                    if clock.group != Group::Clock || self.dataset(clock).is_none() {
                        return Err(StoreError::Format(format!(
                            "Dataset {} refers to missing clock {}",
                            path, clock
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}
