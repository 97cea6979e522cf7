//! Container file format
//!
//! A container is a single file holding every dataset of one recording.
//!
//! Layout:
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ HEADER (64 bytes)                       │
//! │   magic: [u8; 4] = "BSML"               │
//! │   version: [u8; 16] = "BSML 1.0\0..."   │
//! │   catalog_offset: u64                   │
//! │   catalog_len: u32                      │
//! │   reserved: [u8; 28]                    │
//! │   checksum: u32                         │
//! ├─────────────────────────────────────────┤
//! │ CHUNKS (variable, append-only)          │
//! │   For each chunk:                       │
//! │     chunk_size: u32                     │
//! │     encoded_rows: [u8; chunk_size]      │
//! │     chunk_checksum: u32                 │
//! ├─────────────────────────────────────────┤
//! │ CATALOG                                 │
//! │   bincode(Catalog): [u8; catalog_len]   │
//! │   catalog_checksum: u32                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! New chunks are written over the old catalog, then a fresh catalog is
//! written after them and the header is rewritten to point at it. An
//! interrupted commit leaves a header whose catalog checksum no longer
//! matches, which `open` reports as a format error.
//!
//! Extends top up a dataset's last chunk until it holds `chunk_rows` rows,
//! so the catalog keeps roughly one chunk entry per `chunk_rows` rows.

use crate::storage::catalog::{Catalog, ChunkMeta, DatasetMeta, DatasetPath, Group, MetadataBlob};
use crate::storage::compression::{compress_chunk, decompress_chunk};
use crate::storage::error::{StoreError, StoreResult};
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Magic bytes for container file identification
const CONTAINER_MAGIC: [u8; 4] = *b"BSML";

/// Major format version this build reads and writes
pub const BSML_MAJOR: u32 = 1;

/// Minor format version this build writes
pub const BSML_MINOR: u32 = 0;

/// Prefix of every version string
const VERSION_PREFIX: &str = "BSML ";

/// Header size in bytes
const HEADER_SIZE: usize = 64;

/// Width of the version string field
const VERSION_FIELD: usize = 16;

/// Version string written by this build
pub fn format_version() -> String {
    format!("{}{}.{}", VERSION_PREFIX, BSML_MAJOR, BSML_MINOR)
}

/// Parse `"BSML <major>.<minor>"` into its components
pub fn parse_version(version: &str) -> StoreResult<(u32, u32)> {
    let numbers = version
        .strip_prefix(VERSION_PREFIX)
        .ok_or_else(|| StoreError::Format(format!("Not a BioSignalML container: '{}'", version)))?;
    let (major, minor) = numbers
        .split_once('.')
        .ok_or_else(|| StoreError::Format(format!("Malformed version: '{}'", version)))?;
    let major = major
        .trim()
        .parse()
        .map_err(|_| StoreError::Format(format!("Malformed version: '{}'", version)))?;
    let minor = minor
        .trim()
        .parse()
        .map_err(|_| StoreError::Format(format!("Malformed version: '{}'", version)))?;
    Ok((major, minor))
}

/// Container file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Format version string
    pub version: String,
    /// Offset of the catalog record
    pub catalog_offset: u64,
    /// Length of the encoded catalog (excluding its checksum)
    pub catalog_len: u32,
}

impl ContainerHeader {
    pub fn new() -> Self {
        Self {
            version: format_version(),
            catalog_offset: HEADER_SIZE as u64,
            catalog_len: 0,
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&CONTAINER_MAGIC);
        let version = self.version.as_bytes();
        let n = version.len().min(VERSION_FIELD);
        buf[4..4 + n].copy_from_slice(&version[..n]);
        buf[20..28].copy_from_slice(&self.catalog_offset.to_le_bytes());
        buf[28..32].copy_from_slice(&self.catalog_len.to_le_bytes());
        // bytes 32-59 reserved

        let checksum = crc32fast::hash(&buf[0..60]);
        buf[60..64].copy_from_slice(&checksum.to_le_bytes());

        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> StoreResult<Self> {
        if buf[0..4] != CONTAINER_MAGIC {
            return Err(StoreError::Format(format!("Invalid magic: {:?}", &buf[0..4])));
        }

        let stored_checksum = u32::from_le_bytes([buf[60], buf[61], buf[62], buf[63]]);
        let computed_checksum = crc32fast::hash(&buf[0..60]);
        if stored_checksum != computed_checksum {
            return Err(StoreError::Format(format!(
                "Header checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        let version_bytes = &buf[4..4 + VERSION_FIELD];
        let end = version_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(VERSION_FIELD);
        let version = std::str::from_utf8(&version_bytes[..end])
            .map_err(|_| StoreError::Format("Version string is not UTF-8".into()))?
            .to_string();

        let catalog_offset = u64::from_le_bytes([
            buf[20], buf[21], buf[22], buf[23], buf[24], buf[25], buf[26], buf[27],
        ]);
        let catalog_len = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);

        Ok(Self {
            version,
            catalog_offset,
            catalog_len,
        })
    }

    /// Reject versions whose major component is above `supported_major`
    pub fn check_version(&self, supported_major: u32) -> StoreResult<()> {
        let (major, _minor) = parse_version(&self.version)?;
        if major > supported_major {
            return Err(StoreError::Format(format!(
                "Container version '{}' is not compatible with {}",
                self.version,
                format_version()
            )));
        }
        Ok(())
    }
}

impl Default for ContainerHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Container handle shared by a file and the datasets created from it
pub type SharedContainer = Arc<Mutex<Container>>;

/// Acquire the container lock
pub fn lock_container(container: &SharedContainer) -> StoreResult<MutexGuard<'_, Container>> {
    container
        .lock()
        .map_err(|e| StoreError::Lock(format!("Failed to acquire container lock: {}", e)))
}

/// Most recently decoded chunk, kept for row-by-row access
struct CachedChunk {
    path: DatasetPath,
    index: usize,
    values: Arc<Vec<f64>>,
}

/// An open container file
pub struct Container {
    /// File path
    path: PathBuf,
    /// File handle; `None` once closed
    file: Option<File>,
    /// Container header
    header: ContainerHeader,
    /// Structural index
    catalog: Catalog,
    /// End of the chunk area (where the catalog record starts)
    data_end: u64,
    readonly: bool,
    cached: Option<CachedChunk>,
}

impl Container {
    /// Create a new container file.
    ///
    /// Fails with an I/O error if the file exists and `replace` is false.
    pub fn create(path: impl AsRef<Path>, root_uri: &str, replace: bool) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if replace {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(&path)?;

        let mut container = Self {
            path,
            file: Some(file),
            header: ContainerHeader::new(),
            catalog: Catalog::new(root_uri),
            data_end: HEADER_SIZE as u64,
            readonly: false,
            cached: None,
        };
        container.commit()?;

        tracing::info!("Created container {:?} for <{}>", container.path, root_uri);
        Ok(container)
    }

    /// Open an existing container file. Nothing is written during open.
    pub fn open(path: impl AsRef<Path>, readonly: bool, supported_major: u32) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(!readonly).open(&path)?;

        let mut header_buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                StoreError::Format(format!("{:?} is too short to be a container", path))
            }
            _ => StoreError::Io(e),
        })?;
        let header = ContainerHeader::from_bytes(&header_buf)?;
        header.check_version(supported_major)?;

        let catalog = Self::read_catalog(&mut file, &header)?;
        catalog.validate()?;

        tracing::info!(
            "Opened container {:?} (<{}>, {}, {} clocks, {} signals)",
            path,
            catalog.root_uri,
            header.version,
            catalog.clocks.len(),
            catalog.signals.len()
        );

        Ok(Self {
            path,
            file: Some(file),
            data_end: header.catalog_offset,
            header,
            catalog,
            readonly,
            cached: None,
        })
    }

    fn read_catalog(file: &mut File, header: &ContainerHeader) -> StoreResult<Catalog> {
        if header.catalog_offset < HEADER_SIZE as u64 {
            return Err(StoreError::Format(format!(
                "Catalog offset {} overlaps the header",
                header.catalog_offset
            )));
        }
        let file_len = file.metadata()?.len();
        if header.catalog_offset + header.catalog_len as u64 + 4 > file_len {
            return Err(StoreError::Format("Catalog extends past end of file".into()));
        }

        file.seek(SeekFrom::Start(header.catalog_offset))?;
        let mut data = vec![0u8; header.catalog_len as usize];
        file.read_exact(&mut data)?;

        let mut checksum_buf = [0u8; 4];
        file.read_exact(&mut checksum_buf)?;
        let stored_checksum = u32::from_le_bytes(checksum_buf);
        if stored_checksum != crc32fast::hash(&data) {
            return Err(StoreError::Format("Catalog checksum mismatch".into()));
        }

        bincode::deserialize(&data)
            .map_err(|e| StoreError::Format(format!("Unreadable catalog: {}", e)))
    }

    /// Write the catalog after the chunk area and point the header at it
    fn commit(&mut self) -> StoreResult<()> {
        let data_end = self.data_end;
        let encoded = bincode::serialize(&self.catalog)?;
        let checksum = crc32fast::hash(&encoded);

        let file = self.file.as_mut().ok_or(StoreError::Closed)?;
        {
            let mut writer = BufWriter::new(&mut *file);
            writer.seek(SeekFrom::Start(data_end))?;
            writer.write_all(&encoded)?;
            writer.write_all(&checksum.to_le_bytes())?;

            self.header.catalog_offset = data_end;
            self.header.catalog_len = encoded.len() as u32;
            writer.seek(SeekFrom::Start(0))?;
            writer.write_all(&self.header.to_bytes())?;
            writer.flush()?;
        }
        file.set_len(data_end + encoded.len() as u64 + 4)?;

        Ok(())
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.file.is_none() {
            return Err(StoreError::Closed);
        }
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn root_uri(&self) -> &str {
        &self.catalog.root_uri
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    pub fn dataset(&self, path: DatasetPath) -> StoreResult<&DatasetMeta> {
        self.catalog
            .dataset(path)
            .ok_or_else(|| StoreError::NotFound(format!("dataset {}", path)))
    }

    /// Register a new dataset, optionally seeded with initial rows
    pub fn add_dataset(
        &mut self,
        group: Group,
        meta: DatasetMeta,
        initial: Option<&[f64]>,
    ) -> StoreResult<DatasetPath> {
        self.check_writable()?;

        if let Some(values) = initial {
            if values.len() % meta.columns.max(1) as usize != 0 {
                return Err(StoreError::LengthMismatch(format!(
                    "{} values do not fill rows of {} columns",
                    values.len(),
                    meta.columns
                )));
            }
        }

        let initial_rows = initial.map_or(0, |v| v.len() as u64 / meta.columns.max(1) as u64);
        self.check_clock_extent(&meta, initial_rows)?;

        let path = self.catalog.insert(group, meta)?;
        let written = match initial {
            Some(values) if !values.is_empty() => self.append_rows(path, values, initial_rows),
            _ => self.commit(),
        };
        if let Err(e) = written {
            self.catalog.remove_last(path);
            return Err(e);
        }

        tracing::debug!("Created dataset {}", path);
        Ok(path)
    }

    /// Fail with `Timing` when the clock of `meta` holds fewer than
    /// `new_total` samples. Rate clocks and untimed datasets always pass.
    fn check_clock_extent(&self, meta: &DatasetMeta, new_total: u64) -> StoreResult<()> {
        if let Some(clock_path) = meta.attributes.clock {
            let clock = self.dataset(clock_path)?;
            if clock.attributes.rate.is_none() && clock.rows < new_total {
                return Err(StoreError::Timing(format!(
                    "clock does not have sufficient samples for this extend of {} ({} available, {} needed)",
                    meta.uris.join(", "),
                    clock.rows,
                    new_total
                )));
            }
        }
        Ok(())
    }

    /// Append `rows` rows to a dataset.
    ///
    /// A row spans every column, so `values.len()` must equal
    /// `rows * columns`. When the dataset is timed by a clock with stored
    /// samples, the clock must already hold at least the new row total.
    pub fn append_rows(&mut self, path: DatasetPath, values: &[f64], rows: u64) -> StoreResult<()> {
        self.check_writable()?;

        let meta = self.dataset(path)?;
        let columns = meta.columns.max(1) as u64;
        if values.len() as u64 != rows * columns {
            return Err(StoreError::LengthMismatch(format!(
                "{} values given for {} rows of {} columns in {}",
                values.len(),
                rows,
                columns,
                path
            )));
        }
        if rows == 0 {
            return Ok(());
        }

        let new_total = meta.rows + rows;
        self.check_clock_extent(meta, new_total)?;

        let compression = meta.compression;
        let chunk_rows = meta.chunk_rows.max(1);
        let chunk_values = chunk_rows as usize * columns as usize;
        let tail = match meta.chunks.last() {
            Some(chunk) if chunk.row_count < chunk_rows => Some((meta.chunks.len() - 1, *chunk)),
            _ => None,
        };
        let mut next_row = meta.rows;
        let mut offset = self.data_end;
        let mut written = Vec::new();

        // A partly filled tail chunk is re-encoded together with the new
        // rows. When it is the last record in the file it is overwritten.
        let pending: Cow<'_, [f64]> = match tail {
            Some((index, chunk)) => {
                let existing = self.chunk_values(path, index)?;
                let mut merged = Vec::with_capacity(existing.len() + values.len());
                merged.extend_from_slice(&existing);
                merged.extend_from_slice(values);
                next_row = chunk.first_row;
                if chunk.offset + chunk.size as u64 + 8 == self.data_end {
                    offset = chunk.offset;
                }
                Cow::Owned(merged)
            }
            None => Cow::Borrowed(values),
        };
        if tail.is_some() {
            self.cached = None;
        }

        let file = self.file.as_mut().ok_or(StoreError::Closed)?;
        {
            let mut writer = BufWriter::new(&mut *file);
            writer.seek(SeekFrom::Start(offset))?;
            for block in pending.chunks(chunk_values) {
                let encoded = compress_chunk(block, compression);
                let checksum = crc32fast::hash(&encoded);
                writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
                writer.write_all(&encoded)?;
                writer.write_all(&checksum.to_le_bytes())?;

                let row_count = (block.len() as u64 / columns) as u32;
                written.push(ChunkMeta {
                    offset,
                    size: encoded.len() as u32,
                    first_row: next_row,
                    row_count,
                });
                offset += encoded.len() as u64 + 8;
                next_row += row_count as u64;
            }
            writer.flush()?;
        }

        let meta = self
            .catalog
            .dataset_mut(path)
            .ok_or_else(|| StoreError::NotFound(format!("dataset {}", path)))?;
        if tail.is_some() {
            meta.chunks.pop();
        }
        meta.chunks.extend(written);
        meta.rows = new_total;
        self.data_end = offset;

        tracing::debug!("Extended {} by {} rows to {}", path, rows, new_total);
        self.commit()
    }

    /// Decode one chunk, reusing the last decoded chunk when possible
    fn chunk_values(&mut self, path: DatasetPath, index: usize) -> StoreResult<Arc<Vec<f64>>> {
        if let Some(cached) = &self.cached {
            if cached.path == path && cached.index == index {
                return Ok(Arc::clone(&cached.values));
            }
        }

        let meta = self.dataset(path)?;
        let chunk = *meta.chunks.get(index).ok_or_else(|| {
            StoreError::Format(format!("Chunk index {} out of range for {}", index, path))
        })?;
        let compression = meta.compression;
        let expected = chunk.row_count as usize * meta.columns.max(1) as usize;

        let file = self.file.as_mut().ok_or(StoreError::Closed)?;
        file.seek(SeekFrom::Start(chunk.offset))?;

        let mut size_buf = [0u8; 4];
        file.read_exact(&mut size_buf)?;
        let size = u32::from_le_bytes(size_buf);
        if size != chunk.size {
            return Err(StoreError::Format(format!(
                "Chunk {} of {} has size {}, catalog says {}",
                index, path, size, chunk.size
            )));
        }

        let mut data = vec![0u8; size as usize];
        file.read_exact(&mut data)?;

        let mut checksum_buf = [0u8; 4];
        file.read_exact(&mut checksum_buf)?;
        if u32::from_le_bytes(checksum_buf) != crc32fast::hash(&data) {
            return Err(StoreError::Format(format!(
                "Chunk {} of {} checksum mismatch",
                index, path
            )));
        }

        let values = decompress_chunk(&data, compression)?;
        if values.len() != expected {
            return Err(StoreError::Format(format!(
                "Chunk {} of {} holds {} values, expected {}",
                index,
                path,
                values.len(),
                expected
            )));
        }

        let values = Arc::new(values);
        self.cached = Some(CachedChunk {
            path,
            index,
            values: Arc::clone(&values),
        });
        Ok(values)
    }

    /// Index of the chunk holding `row`
    fn chunk_for_row(meta: &DatasetMeta, row: u64) -> usize {
        meta.chunks.partition_point(|c| c.end_row() <= row)
    }

    /// Read up to `length` rows starting at `pos`.
    ///
    /// A negative `length` reads to the end. Requests past the extent are
    /// clipped, so out-of-range windows give an empty result. With
    /// `column` set only that column is returned, otherwise whole rows.
    pub fn read_rows(
        &mut self,
        path: DatasetPath,
        pos: u64,
        length: i64,
        column: Option<usize>,
    ) -> StoreResult<Vec<f64>> {
        if self.file.is_none() {
            return Err(StoreError::Closed);
        }
        let meta = self.dataset(path)?;
        let columns = meta.columns.max(1) as usize;
        if let Some(c) = column {
            if c >= columns {
                return Err(StoreError::NotFound(format!(
                    "column {} of {} ({} columns)",
                    c, path, columns
                )));
            }
        }

        let start = pos.min(meta.rows);
        let end = if length < 0 {
            meta.rows
        } else {
            start.saturating_add(length as u64).min(meta.rows)
        };
        if start >= end {
            return Ok(Vec::new());
        }

        let first = Self::chunk_for_row(meta, start);
        let chunks: Vec<(usize, ChunkMeta)> = meta.chunks[first..]
            .iter()
            .copied()
            .enumerate()
            .take_while(|(_, c)| c.first_row < end)
            .map(|(i, c)| (first + i, c))
            .collect();

        let width = if column.is_some() { 1 } else { columns };
        let mut result = Vec::with_capacity((end - start) as usize * width);
        for (index, chunk) in chunks {
            let values = self.chunk_values(path, index)?;
            let lo = start.max(chunk.first_row) - chunk.first_row;
            let hi = end.min(chunk.end_row()) - chunk.first_row;
            for row in lo as usize..hi as usize {
                let base = row * columns;
                match column {
                    Some(c) => result.push(values[base + c]),
                    None => result.extend_from_slice(&values[base..base + columns]),
                }
            }
        }
        Ok(result)
    }

    /// Value of a single cell
    pub fn value_at(&mut self, path: DatasetPath, row: u64, column: usize) -> StoreResult<f64> {
        let meta = self.dataset(path)?;
        if row >= meta.rows {
            return Err(StoreError::NotFound(format!(
                "row {} of {} ({} rows)",
                row, path, meta.rows
            )));
        }
        let columns = meta.columns.max(1) as usize;
        if column >= columns {
            return Err(StoreError::NotFound(format!(
                "column {} of {} ({} columns)",
                column, path, columns
            )));
        }
        let index = Self::chunk_for_row(meta, row);
        let first_row = meta.chunks[index].first_row;
        let values = self.chunk_values(path, index)?;
        Ok(values[(row - first_row) as usize * columns + column])
    }

    /// Replace the metadata slot
    pub fn set_metadata(&mut self, blob: MetadataBlob) -> StoreResult<()> {
        self.check_writable()?;
        self.catalog.metadata = Some(blob);
        self.commit()
    }

    /// Flush and release the file. Repeated calls do nothing.
    pub fn close(&mut self) -> StoreResult<()> {
        if let Some(file) = self.file.take() {
            if !self.readonly {
                file.sync_all()?;
            }
            self.cached = None;
            tracing::info!("Closed container {:?}", self.path);
        }
        Ok(())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close container {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::catalog::DatasetAttributes;
    use crate::storage::compression::CompressionType;
    use tempfile::tempdir;

    fn meta(uris: &[&str], chunk_rows: u32) -> DatasetMeta {
        DatasetMeta {
            uris: uris.iter().map(|u| u.to_string()).collect(),
            units: uris.iter().map(|_| "mV".to_string()).collect(),
            columns: uris.len() as u32,
            rows: 0,
            chunk_rows,
            compression: CompressionType::Lz4,
            attributes: DatasetAttributes::default(),
            chunks: Vec::new(),
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = ContainerHeader {
            version: "BSML 1.0".to_string(),
            catalog_offset: 4096,
            catalog_len: 321,
        };
        let restored = ContainerHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(restored, header);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("BSML 1.0").unwrap(), (1, 0));
        assert_eq!(parse_version("BSML 12.7").unwrap(), (12, 7));
        assert!(matches!(parse_version("HDF5 1.0"), Err(StoreError::Format(_))));
        assert!(matches!(parse_version("BSML 1"), Err(StoreError::Format(_))));
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        Container::create(&path, "http://ex.org/rec", false).unwrap();

        let err = Container::create(&path, "http://ex.org/rec", false).err().unwrap();
        assert!(matches!(err, StoreError::Io(_)));

        Container::create(&path, "http://ex.org/other", true).unwrap();
        let reopened = Container::open(&path, true, BSML_MAJOR).unwrap();
        assert_eq!(reopened.root_uri(), "http://ex.org/other");
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        let err = Container::open(dir.path().join("absent.bsml"), false, BSML_MAJOR).err().unwrap();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_append_and_read_across_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        let values: Vec<f64> = (0..25).map(|i| i as f64).collect();

        let ds = {
            let mut container = Container::create(&path, "rec", false).unwrap();
            let ds = container.add_dataset(Group::Signal, meta(&["s"], 4), None).unwrap();
            container.append_rows(ds, &values[..10], 10).unwrap();
            container.append_rows(ds, &values[10..], 15).unwrap();
            assert_eq!(container.dataset(ds).unwrap().rows, 25);
            ds
        };

        let mut container = Container::open(&path, true, BSML_MAJOR).unwrap();
        assert_eq!(container.read_rows(ds, 0, -1, None).unwrap(), values);
        assert_eq!(container.read_rows(ds, 3, 6, None).unwrap(), values[3..9].to_vec());
        assert_eq!(container.read_rows(ds, 20, 100, None).unwrap(), values[20..].to_vec());
        assert!(container.read_rows(ds, 25, 5, None).unwrap().is_empty());
        assert!(container.read_rows(ds, 1000, -1, None).unwrap().is_empty());
        assert_eq!(container.value_at(ds, 17, 0).unwrap(), 17.0);
    }

    #[test]
    fn test_compound_rows_and_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        let mut container = Container::create(&path, "rec", false).unwrap();
        let ds = container
            .add_dataset(Group::Signal, meta(&["a", "b", "c"], 2), None)
            .unwrap();

        let rows: Vec<f64> = (0..15).map(|i| i as f64).collect();
        container.append_rows(ds, &rows, 5).unwrap();

        assert_eq!(container.read_rows(ds, 1, 2, None).unwrap(), rows[3..9].to_vec());
        assert_eq!(
            container.read_rows(ds, 0, -1, Some(1)).unwrap(),
            vec![1.0, 4.0, 7.0, 10.0, 13.0]
        );

        let err = container.append_rows(ds, &rows[..4], 2).unwrap_err();
        assert!(matches!(err, StoreError::LengthMismatch(_)));
        assert_eq!(container.dataset(ds).unwrap().rows, 5);
    }

    #[test]
    fn test_clock_limits_extend() {
        let dir = tempdir().unwrap();
        let mut container = Container::create(dir.path().join("rec.bsml"), "rec", false).unwrap();
        let clock = container
            .add_dataset(Group::Clock, meta(&["clk"], 16), Some(&[0.0, 0.5, 1.0]))
            .unwrap();

        let mut signal = meta(&["sig"], 16);
        signal.attributes.clock = Some(clock);
        let sig = container.add_dataset(Group::Signal, signal, None).unwrap();

        container.append_rows(sig, &[1.0, 2.0], 2).unwrap();
        let err = container.append_rows(sig, &[3.0, 4.0], 2).unwrap_err();
        assert!(matches!(err, StoreError::Timing(_)));
        assert_eq!(container.dataset(sig).unwrap().rows, 2);

        container.append_rows(clock, &[1.5], 1).unwrap();
        container.append_rows(sig, &[3.0, 4.0], 2).unwrap();
    }

    #[test]
    fn test_rejected_initial_data_creates_no_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        let mut container = Container::create(&path, "rec", false).unwrap();
        let clock = container
            .add_dataset(Group::Clock, meta(&["clk"], 16), Some(&[0.0, 1.0]))
            .unwrap();

        let mut signal = meta(&["sig"], 16);
        signal.attributes.clock = Some(clock);
        let err = container
            .add_dataset(Group::Signal, signal.clone(), Some(&[1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Timing(_)));
        assert!(container.catalog().signals.is_empty());
        assert!(!container.catalog().is_registered("sig"));

        let sig = container
            .add_dataset(Group::Signal, signal, Some(&[1.0, 2.0]))
            .unwrap();
        assert_eq!(sig, DatasetPath::new(Group::Signal, 0));
        container.close().unwrap();

        let mut reopened = Container::open(&path, true, BSML_MAJOR).unwrap();
        assert_eq!(reopened.catalog().signals.len(), 1);
        assert_eq!(reopened.read_rows(sig, 0, -1, None).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_small_extends_fill_the_tail_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        let ds = {
            let mut container = Container::create(&path, "rec", false).unwrap();
            let ds = container.add_dataset(Group::Signal, meta(&["s"], 4096), None).unwrap();
            for i in 0..1000 {
                container.append_rows(ds, &[i as f64], 1).unwrap();
            }
            let stored = container.dataset(ds).unwrap();
            assert_eq!(stored.rows, 1000);
            assert!(stored.chunks.len() <= 1);
            ds
        };

        // the tail record is rewritten in place, so the file stays small
        assert!(std::fs::metadata(&path).unwrap().len() < 64 * 1024);

        let mut container = Container::open(&path, false, BSML_MAJOR).unwrap();
        let expected: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        assert_eq!(container.read_rows(ds, 0, -1, None).unwrap(), expected);

        container.append_rows(ds, &[1000.0], 1).unwrap();
        assert_eq!(container.dataset(ds).unwrap().chunks.len(), 1);
        assert_eq!(container.value_at(ds, 1000, 0).unwrap(), 1000.0);
    }

    #[test]
    fn test_interleaved_extends_keep_chunks_full() {
        let dir = tempdir().unwrap();
        let mut container = Container::create(dir.path().join("rec.bsml"), "rec", false).unwrap();
        let a = container.add_dataset(Group::Signal, meta(&["a"], 4), None).unwrap();
        let b = container.add_dataset(Group::Signal, meta(&["b"], 4), None).unwrap();

        for i in 0..10 {
            container.append_rows(a, &[i as f64], 1).unwrap();
            container.append_rows(b, &[-(i as f64)], 1).unwrap();
        }

        let rows: Vec<u32> = container.dataset(a).unwrap().chunks.iter().map(|c| c.row_count).collect();
        assert_eq!(rows, vec![4, 4, 2]);
        assert_eq!(container.dataset(b).unwrap().chunks.len(), 3);
        assert_eq!(
            container.read_rows(a, 0, -1, None).unwrap(),
            (0..10).map(|i| i as f64).collect::<Vec<_>>()
        );
        assert_eq!(container.read_rows(b, 8, -1, None).unwrap(), vec![-8.0, -9.0]);
    }

    #[test]
    fn test_readonly_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        let ds = {
            let mut container = Container::create(&path, "rec", false).unwrap();
            container.add_dataset(Group::Signal, meta(&["s"], 8), None).unwrap()
        };

        let mut container = Container::open(&path, true, BSML_MAJOR).unwrap();
        assert!(matches!(
            container.append_rows(ds, &[1.0], 1),
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(
            container.set_metadata(MetadataBlob {
                text: String::new(),
                mimetype: String::new()
            }),
            Err(StoreError::ReadOnly)
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut container = Container::create(dir.path().join("rec.bsml"), "rec", false).unwrap();
        let ds = container.add_dataset(Group::Signal, meta(&["s"], 8), None).unwrap();
        container.close().unwrap();
        container.close().unwrap();
        assert!(container.is_closed());
        assert!(matches!(
            container.append_rows(ds, &[1.0], 1),
            Err(StoreError::Closed)
        ));
        assert!(matches!(
            container.read_rows(ds, 0, -1, None),
            Err(StoreError::Closed)
        ));
    }

    #[test]
    fn test_newer_major_version_is_rejected_without_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        Container::create(&path, "rec", false).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let mut header_buf = [0u8; HEADER_SIZE];
        header_buf.copy_from_slice(&bytes[..HEADER_SIZE]);
        let mut header = ContainerHeader::from_bytes(&header_buf).unwrap();
        header.version = "BSML 2.0".to_string();
        bytes[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let err = Container::open(&path, false, BSML_MAJOR).err().unwrap();
        assert!(matches!(err, StoreError::Format(_)));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_corrupt_catalog_is_a_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.bsml");
        Container::create(&path, "rec", false).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 6;
        bytes[last] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let err = Container::open(&path, true, BSML_MAJOR).err().unwrap();
        assert!(matches!(err, StoreError::Format(_)));
    }
}
