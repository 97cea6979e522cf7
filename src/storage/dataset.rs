//! Extensible dataset handles
//!
//! A [`Dataset`] is a cheap handle onto one dataset of a shared container.
//! Handles for members of a compound dataset carry the member's column and
//! read only that column; growing a compound dataset goes through the
//! whole-row handle.

use crate::config::StoreConfig;
use crate::storage::catalog::{DatasetAttributes, DatasetPath};
use crate::storage::container::{lock_container, SharedContainer};
use crate::storage::error::{StoreError, StoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rows per chunk for a dataset with `columns` f64 columns.
///
/// Starts at the configured baseline and doubles until a chunk reaches the
/// configured byte target.
pub fn chunk_rows(columns: u32, config: &StoreConfig) -> u32 {
    let row_bytes = 8 * columns.max(1) as usize;
    let mut rows = config.chunk_rows.max(1);
    while (rows as usize) * row_bytes < config.chunk_bytes && rows < u32::MAX / 2 {
        rows *= 2;
    }
    rows
}

/// Handle to one dataset, or to one column of a compound dataset
#[derive(Clone)]
pub struct Dataset {
    container: SharedContainer,
    path: DatasetPath,
    column: Option<usize>,
    uri: String,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("column", &self.column)
            .field("uri", &self.uri)
            .finish()
    }
}

impl Dataset {
    pub(crate) fn new(
        container: SharedContainer,
        path: DatasetPath,
        column: Option<usize>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            container,
            path,
            column,
            uri: uri.into(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle onto one column of this (compound) dataset
    pub(crate) fn member(&self, column: usize, uri: impl Into<String>) -> Self {
        Self {
            container: Arc::clone(&self.container),
            path: self.path,
            column: Some(column),
            uri: uri.into(),
            closed: Arc::clone(&self.closed),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn path(&self) -> DatasetPath {
        self.path
    }

    /// Column within a compound dataset, for member handles
    pub fn column(&self) -> Option<usize> {
        self.column
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Number of columns of the underlying dataset
    pub fn columns(&self) -> StoreResult<usize> {
        let container = lock_container(&self.container)?;
        Ok(container.dataset(self.path)?.columns.max(1) as usize)
    }

    /// Width of a row as seen through this handle
    pub fn width(&self) -> StoreResult<usize> {
        match self.column {
            Some(_) => Ok(1),
            None => self.columns(),
        }
    }

    /// Every URI carried by the underlying dataset
    pub fn uris(&self) -> StoreResult<Vec<String>> {
        let container = lock_container(&self.container)?;
        Ok(container.dataset(self.path)?.uris.clone())
    }

    /// Units of this handle's column, or of the first column
    pub fn units(&self) -> StoreResult<String> {
        let container = lock_container(&self.container)?;
        let meta = container.dataset(self.path)?;
        Ok(meta
            .units
            .get(self.column.unwrap_or(0))
            .cloned()
            .unwrap_or_default())
    }

    pub fn all_units(&self) -> StoreResult<Vec<String>> {
        let container = lock_container(&self.container)?;
        Ok(container.dataset(self.path)?.units.clone())
    }

    pub fn attributes(&self) -> StoreResult<DatasetAttributes> {
        let container = lock_container(&self.container)?;
        Ok(container.dataset(self.path)?.attributes.clone())
    }

    /// Current primary extent
    pub fn size(&self) -> StoreResult<u64> {
        let container = lock_container(&self.container)?;
        Ok(container.dataset(self.path)?.rows)
    }

    /// Append `row_count` rows. `values` holds whole rows, interleaved.
    pub fn extend(&self, values: &[f64], row_count: u64) -> StoreResult<()> {
        self.check_open()?;
        if self.column.is_some() {
            let container = lock_container(&self.container)?;
            if container.dataset(self.path)?.is_compound() {
                return Err(StoreError::Configuration(format!(
                    "'{}' is a member of a signal array; extend the array instead",
                    self.uri
                )));
            }
        }
        let mut container = lock_container(&self.container)?;
        container.append_rows(self.path, values, row_count)
    }

    /// Read up to `length` rows from `pos`; a negative length reads to the
    /// end and windows past the extent are clipped.
    pub fn read(&self, pos: u64, length: i64) -> StoreResult<Vec<f64>> {
        self.check_open()?;
        let mut container = lock_container(&self.container)?;
        container.read_rows(self.path, pos, length, self.column)
    }

    /// A single value of this handle's column
    pub fn value(&self, row: u64) -> StoreResult<f64> {
        self.check_open()?;
        let mut container = lock_container(&self.container)?;
        container.value_at(self.path, row, self.column.unwrap_or(0))
    }

    /// Release this handle and every handle cloned from it
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::trace!("Closed dataset {} ({})", self.path, self.uri);
        }
    }
}
