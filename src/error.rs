//! Error types for the aggregation cache

use crate::bitkey::BitKey;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Predicate compilation error
    #[error("Predicate error: {0}")]
    Predicate(#[from] PredicateError),

    /// Segment cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Segment loader failed to produce a body
    #[error("Segment load failed: {0}")]
    Load(String),
}

/// Predicate construction errors
///
/// Unsatisfiable tuple sets are not errors; they are reported through
/// [`crate::compound::PredicateCompilation::Unsatisfiable`]. Only shapes that
/// can never be converted and broken conjunction contracts surface here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredicateError {
    /// A calculated member whose formula cannot be turned into a predicate
    #[error("Calculated member '{name}' cannot be converted to a predicate")]
    UnsupportedCalculatedMember {
        /// Name of the offending member
        name: String,
    },

    /// Two predicates were conjoined in place over different column sets
    #[error("Cannot conjoin predicates over different columns: expected {expected}, got {actual}")]
    BitKeyMismatch {
        /// Columns of the predicate being extended
        expected: BitKey,
        /// Columns of the predicate being conjoined
        actual: BitKey,
    },

    /// Index passed to an in-place conjunction does not name a compound predicate
    #[error("No compound predicate at position {index} (have {len})")]
    NoSuchPredicate {
        /// Requested position
        index: usize,
        /// Number of compound predicates held
        len: usize,
    },
}

/// Segment cache errors
///
/// The [`crate::cache::SegmentCache`] trait never returns these; they are
/// produced by backend constructors and internal helpers and collapsed to
/// "absent"/`false` at the trait boundary.
#[derive(Error, Debug)]
pub enum CacheError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Body could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum stored in the segment file
        expected: u64,
        /// The checksum computed from the payload
        actual: u64,
    },

    /// Segment file header is not recognised
    #[error("Invalid segment file: {0}")]
    InvalidFormat(String),

    /// Path validation failed
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
