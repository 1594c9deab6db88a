//! Segment cache SPI
//!
//! A [`SegmentCache`] maps segment headers to bodies. Backends are
//! pluggable: the aggregation layer only sees this trait.
//!
//! # Failure Model
//!
//! A cache miss is always safe; the caller recomputes from the fact table.
//! No operation returns an error. I/O and serialization failures collapse to
//! `None` or `false` and are logged inside the backend.
//!
//! # Entry Lifecycle
//!
//! ```text
//!            put
//!   absent ───────► present
//!      ▲               │
//!      └───────────────┘
//!   remove, or self-heal when the backing artifact vanished
//! ```
//!
//! # Events
//!
//! `put` fires [`EventType::EntryCreated`] and `remove` fires
//! [`EventType::EntryDeleted`] to every registered listener, synchronously,
//! in registration order. A self-healed entry also fires `EntryDeleted`.
//! Transport adapters forward events received from other processes through
//! [`SegmentCache::fire_remote`].

pub mod disk;
pub mod memory;

pub use disk::{DiskCacheConfig, DiskSegmentCache};
pub use memory::MemorySegmentCache;

use crate::segment::{SegmentBody, SegmentHeader};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Pluggable header → body store
pub trait SegmentCache: Send + Sync {
    /// Body stored under `header`, or `None` on miss or any failure
    fn get(&self, header: &SegmentHeader) -> Option<SegmentBody>;

    /// Whether a body is stored under `header`
    fn contains(&self, header: &SegmentHeader) -> bool;

    /// Store `body` under `header`; `false` on failure
    fn put(&self, header: &SegmentHeader, body: &SegmentBody) -> bool;

    /// Forget `header`; `true` if anything was tracked
    fn remove(&self, header: &SegmentHeader) -> bool;

    /// Release all resources and forget all entries and listeners
    fn tear_down(&self);

    /// Register a listener
    fn add_listener(&self, listener: Arc<dyn SegmentCacheListener>);

    /// Unregister a listener, matched by pointer identity
    fn remove_listener(&self, listener: &Arc<dyn SegmentCacheListener>);

    /// Headers currently stored; empty when the backend cannot enumerate
    fn segment_headers(&self) -> Vec<SegmentHeader>;

    /// Whether the backend supports rich header queries
    fn supports_rich_index(&self) -> bool;

    /// Listeners registered on this cache
    fn listeners(&self) -> &ListenerRegistry;

    /// Deliver an event that happened in another process
    ///
    /// Listeners see it with `local == false`. The cache's own contents are
    /// not changed.
    fn fire_remote(&self, header: &SegmentHeader, event_type: EventType) {
        self.listeners().fire_remote(header, event_type);
    }
}

/// Kind of a cache event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A segment was stored
    EntryCreated,
    /// A segment was removed
    EntryDeleted,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::EntryCreated => write!(f, "ENTRY_CREATED"),
            EventType::EntryDeleted => write!(f, "ENTRY_DELETED"),
        }
    }
}

/// A change to a cache's contents
#[derive(Debug, Clone)]
pub struct SegmentCacheEvent {
    /// What happened
    pub event_type: EventType,
    /// Header of the affected segment
    pub source: SegmentHeader,
    /// Whether the change originated in this process
    pub local: bool,
}

/// Receives cache events
pub trait SegmentCacheListener: Send + Sync {
    /// Handle one event; runs on the thread that changed the cache
    fn handle(&self, event: &SegmentCacheEvent);
}

/// Copy-on-write listener list
///
/// Delivery iterates a snapshot, so listeners may register or unregister
/// (even themselves) while an event is being delivered. Changes apply to the
/// next event.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Arc<Vec<Arc<dyn SegmentCacheListener>>>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&self, listener: Arc<dyn SegmentCacheListener>) {
        let mut guard = self.listeners.write();
        let mut next = Vec::clone(&guard);
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Unregister a listener; returns whether it was registered
    pub fn remove(&self, listener: &Arc<dyn SegmentCacheListener>) -> bool {
        let mut guard = self.listeners.write();
        let before = guard.len();
        let next: Vec<_> = guard
            .iter()
            .filter(|l| !Arc::ptr_eq(l, listener))
            .cloned()
            .collect();
        let removed = next.len() != before;
        *guard = Arc::new(next);
        removed
    }

    /// Drop every listener
    pub fn clear(&self) {
        *self.listeners.write() = Arc::new(Vec::new());
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Vec<Arc<dyn SegmentCacheListener>>> {
        Arc::clone(&self.listeners.read())
    }

    /// Deliver a locally sourced event
    pub fn fire(&self, header: &SegmentHeader, event_type: EventType) {
        self.deliver(header, event_type, true);
    }

    /// Deliver an event received from another process
    pub fn fire_remote(&self, header: &SegmentHeader, event_type: EventType) {
        self.deliver(header, event_type, false);
    }

    fn deliver(&self, header: &SegmentHeader, event_type: EventType, local: bool) {
        let listeners = self.snapshot();
        if listeners.is_empty() {
            return;
        }
        let event = SegmentCacheEvent {
            event_type,
            source: header.clone(),
            local,
        };
        for listener in listeners.iter() {
            listener.handle(&event);
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
