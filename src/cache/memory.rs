//! In-process segment cache

use super::{EventType, ListenerRegistry, SegmentCache, SegmentCacheListener};
use crate::metrics;
use crate::segment::{ByteString, SegmentBody, SegmentHeader};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const BACKEND: &str = "memory";

/// Segment cache held in a map
///
/// Emits the same events as the disk backend and can enumerate its headers.
#[derive(Debug, Default)]
pub struct MemorySegmentCache {
    entries: RwLock<HashMap<ByteString, (SegmentHeader, SegmentBody)>>,
    listeners: ListenerRegistry,
}

impl MemorySegmentCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored segments
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no segment is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl SegmentCache for MemorySegmentCache {
    fn get(&self, header: &SegmentHeader) -> Option<SegmentBody> {
        let body = self
            .entries
            .read()
            .get(header.unique_id())
            .map(|(_, body)| body.clone());
        metrics::record_cache_op(BACKEND, "get", if body.is_some() { "hit" } else { "miss" });
        body
    }

    fn contains(&self, header: &SegmentHeader) -> bool {
        self.entries.read().contains_key(header.unique_id())
    }

    fn put(&self, header: &SegmentHeader, body: &SegmentBody) -> bool {
        self.entries
            .write()
            .insert(header.unique_id().clone(), (header.clone(), body.clone()));
        debug!(unique_id = %header.unique_id(), "segment stored");
        metrics::record_cache_op(BACKEND, "put", "success");
        self.listeners.fire(header, EventType::EntryCreated);
        true
    }

    fn remove(&self, header: &SegmentHeader) -> bool {
        let removed = self.entries.write().remove(header.unique_id()).is_some();
        if removed {
            debug!(unique_id = %header.unique_id(), "segment removed");
            metrics::record_cache_op(BACKEND, "remove", "success");
            self.listeners.fire(header, EventType::EntryDeleted);
        }
        removed
    }

    fn tear_down(&self) {
        self.entries.write().clear();
        self.listeners.clear();
    }

    fn add_listener(&self, listener: Arc<dyn SegmentCacheListener>) {
        self.listeners.add(listener);
    }

    fn remove_listener(&self, listener: &Arc<dyn SegmentCacheListener>) {
        self.listeners.remove(listener);
    }

    fn segment_headers(&self) -> Vec<SegmentHeader> {
        self.entries
            .read()
            .values()
            .map(|(header, _)| header.clone())
            .collect()
    }

    fn supports_rich_index(&self) -> bool {
        false
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}
