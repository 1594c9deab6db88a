//! Disk-backed segment cache
//!
//! Stores one file per segment under a scratch directory owned by the
//! cache instance.
//!
//! # Directory Structure
//!
//! ```text
//! root_dir/
//!   instance-{uuid}/                 - effective root, wiped on construction
//!     {schema}/{cube}/{fact_table}/
//!       {bitkey}/
//!         {unique_id_hex}.seg        - one segment body
//! ```
//!
//! Every component is percent-encoded with
//! [`encode_path_component`](crate::security::encode_path_component).
//!
//! # File Format
//!
//! ```text
//! ┌──────────────┬────────────────────┬────────────────────┐
//! │ "STSEG001"   │ CRC-64 (LE, 8 B)   │ JSON body          │
//! └──────────────┴────────────────────┴────────────────────┘
//! ```
//!
//! The checksum is CRC-64/ECMA-182 over the JSON body.
//!
//! # Index
//!
//! An in-memory set of unique ids gates every read: an id that was never
//! stored is a miss without touching the filesystem. One mutex covers the
//! set and the file operation it guards, so the set and the files change
//! together. `put` writes a temporary file, renames it into place, and only
//! then records the id.

use super::{EventType, ListenerRegistry, SegmentCache, SegmentCacheListener};
use crate::error::CacheError;
use crate::metrics;
use crate::security::{encode_path_component, validate_cache_root};
use crate::segment::{ByteString, SegmentBody, SegmentHeader};
use crc::{Crc, CRC_64_ECMA_182};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Segment file magic
const MAGIC: &[u8; 8] = b"STSEG001";

/// Magic plus checksum
const PREAMBLE_LEN: usize = 16;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

const BACKEND: &str = "disk";

/// Disk cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Directory the cache creates its files under
    pub root_dir: PathBuf,
    /// Use a fresh `instance-{uuid}` subdirectory of `root_dir`
    pub per_instance_dir: bool,
    /// Delete the segment file on `remove`
    pub reclaim_on_remove: bool,
    /// `fsync` each segment file before it becomes visible
    pub sync_writes: bool,
}

impl DiskCacheConfig {
    /// Settings rooted at `root_dir` with every safety option on
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            per_instance_dir: true,
            reclaim_on_remove: true,
            sync_writes: true,
        }
    }
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("starcache"))
    }
}

/// Segment cache that keeps bodies in files
///
/// # Example
///
/// ```rust,no_run
/// use starcache::cache::{DiskCacheConfig, DiskSegmentCache, SegmentCache};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = DiskSegmentCache::new(DiskCacheConfig::new("/tmp/starcache"))?;
/// assert!(cache.root().starts_with("/tmp/starcache"));
/// assert!(!cache.supports_rich_index());
/// cache.tear_down();
/// # Ok(())
/// # }
/// ```
pub struct DiskSegmentCache {
    /// Effective root directory
    root: PathBuf,

    config: DiskCacheConfig,

    /// Unique ids of stored segments
    index: Mutex<HashSet<ByteString>>,

    listeners: ListenerRegistry,
}

impl DiskSegmentCache {
    /// Create a cache, deleting and recreating its effective root
    ///
    /// # Errors
    ///
    /// Returns error if the root is rejected by
    /// [`validate_cache_root`] or cannot be recreated.
    pub fn new(config: DiskCacheConfig) -> Result<Self, CacheError> {
        let root_dir = validate_cache_root(&config.root_dir).map_err(CacheError::InvalidPath)?;
        let root = if config.per_instance_dir {
            root_dir.join(format!("instance-{}", Uuid::new_v4()))
        } else {
            root_dir
        };

        match fs::remove_dir_all(&root) {
            Ok(()) => debug!(root = %root.display(), "wiped existing cache root"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&root)?;

        info!(
            root = %root.display(),
            reclaim_on_remove = config.reclaim_on_remove,
            sync_writes = config.sync_writes,
            "disk segment cache created"
        );

        Ok(Self {
            root,
            config,
            index: Mutex::new(HashSet::new()),
            listeners: ListenerRegistry::new(),
        })
    }

    /// Effective root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settings the cache was created with
    pub fn config(&self) -> &DiskCacheConfig {
        &self.config
    }

    /// Number of tracked segments
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    /// Whether no segment is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Directory holding segments of one BitKey
    fn segment_dir(&self, header: &SegmentHeader) -> PathBuf {
        self.root
            .join(encode_path_component(&header.schema_name))
            .join(encode_path_component(&header.cube_name))
            .join(encode_path_component(&header.fact_table_name))
            .join(encode_path_component(&header.constrained_columns.to_string()))
    }

    /// File path of a segment
    pub fn segment_path(&self, header: &SegmentHeader) -> PathBuf {
        self.segment_dir(header)
            .join(format!("{}.seg", header.unique_id().to_hex()))
    }

    fn write_segment(&self, header: &SegmentHeader, body: &SegmentBody) -> Result<(), CacheError> {
        let bytes = encode_body(body)?;
        let dir = self.segment_dir(header);
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.seg", header.unique_id().to_hex()));
        let tmp = dir.join(format!(".{}.{}.tmp", header.unique_id().to_hex(), Uuid::new_v4()));

        let written = (|| -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            if self.config.sync_writes {
                file.sync_all()?;
            }
            fs::rename(&tmp, &path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Frame a body as magic, checksum, JSON
pub(crate) fn encode_body(body: &SegmentBody) -> Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(body)?;
    let mut buf = Vec::with_capacity(PREAMBLE_LEN + json.len());
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&CRC64.checksum(&json).to_le_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Verify and parse a framed body
pub(crate) fn decode_body(bytes: &[u8]) -> Result<SegmentBody, CacheError> {
    if bytes.len() < PREAMBLE_LEN {
        return Err(CacheError::InvalidFormat(format!(
            "file is {} bytes, shorter than the {} byte preamble",
            bytes.len(),
            PREAMBLE_LEN
        )));
    }
    if &bytes[..8] != MAGIC {
        return Err(CacheError::InvalidFormat("bad magic".to_string()));
    }
    let mut stored = [0u8; 8];
    stored.copy_from_slice(&bytes[8..PREAMBLE_LEN]);
    let expected = u64::from_le_bytes(stored);

    let payload = &bytes[PREAMBLE_LEN..];
    let actual = CRC64.checksum(payload);
    if expected != actual {
        return Err(CacheError::ChecksumMismatch { expected, actual });
    }
    Ok(serde_json::from_slice(payload)?)
}

impl SegmentCache for DiskSegmentCache {
    fn get(&self, header: &SegmentHeader) -> Option<SegmentBody> {
        let id = header.unique_id();
        {
            let mut index = self.index.lock();
            if !index.contains(id) {
                metrics::record_cache_op(BACKEND, "get", "miss");
                return None;
            }

            let path = self.segment_path(header);
            let read = fs::read(&path)
                .map_err(CacheError::from)
                .and_then(|bytes| decode_body(&bytes));
            match read {
                Ok(body) => {
                    metrics::record_cache_op(BACKEND, "get", "hit");
                    return Some(body);
                }
                Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    index.remove(id);
                    debug!(unique_id = %id, "segment file vanished; forgetting entry");
                    metrics::record_cache_op(BACKEND, "get", "healed");
                }
                Err(e) => {
                    warn!(unique_id = %id, path = %path.display(), error = %e, "failed to read segment");
                    metrics::record_cache_op(BACKEND, "get", "error");
                    return None;
                }
            }
        }
        self.listeners.fire(header, EventType::EntryDeleted);
        None
    }

    fn contains(&self, header: &SegmentHeader) -> bool {
        let id = header.unique_id();
        {
            let mut index = self.index.lock();
            if !index.contains(id) {
                return false;
            }
            match fs::metadata(self.segment_path(header)) {
                Ok(_) => return true,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    index.remove(id);
                    debug!(unique_id = %id, "segment file vanished; forgetting entry");
                    metrics::record_cache_op(BACKEND, "contains", "healed");
                }
                Err(e) => {
                    warn!(unique_id = %id, error = %e, "failed to stat segment");
                    return true;
                }
            }
        }
        self.listeners.fire(header, EventType::EntryDeleted);
        false
    }

    fn put(&self, header: &SegmentHeader, body: &SegmentBody) -> bool {
        let id = header.unique_id();
        {
            let mut index = self.index.lock();
            if let Err(e) = self.write_segment(header, body) {
                warn!(unique_id = %id, error = %e, "failed to store segment");
                metrics::record_cache_op(BACKEND, "put", "error");
                return false;
            }
            index.insert(id.clone());
        }
        debug!(unique_id = %id, header = %header, "segment stored");
        metrics::record_cache_op(BACKEND, "put", "success");
        self.listeners.fire(header, EventType::EntryCreated);
        true
    }

    fn remove(&self, header: &SegmentHeader) -> bool {
        let id = header.unique_id();
        {
            let mut index = self.index.lock();
            if !index.remove(id) {
                return false;
            }
            if self.config.reclaim_on_remove {
                match fs::remove_file(self.segment_path(header)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => warn!(unique_id = %id, error = %e, "failed to delete segment file"),
                }
            }
        }
        debug!(unique_id = %id, "segment removed");
        metrics::record_cache_op(BACKEND, "remove", "success");
        self.listeners.fire(header, EventType::EntryDeleted);
        true
    }

    fn tear_down(&self) {
        let mut index = self.index.lock();
        index.clear();
        self.listeners.clear();
        match fs::remove_dir_all(&self.root) {
            Ok(()) => info!(root = %self.root.display(), "disk segment cache torn down"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(root = %self.root.display(), error = %e, "failed to delete cache root"),
        }
    }

    fn add_listener(&self, listener: Arc<dyn SegmentCacheListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn SegmentCacheListener>) {
        self.listeners.remove(listener);
    }

    fn segment_headers(&self) -> Vec<SegmentHeader> {
        Vec::new()
    }

    fn supports_rich_index(&self) -> bool {
        false
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

impl std::fmt::Debug for DiskSegmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskSegmentCache")
            .field("root", &self.root)
            .field("entries", &self.len())
            .field("listeners", &self.listeners)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
