//! starcache - aggregation caching core for ROLAP star schemas
//!
//! This library provides:
//! - Compilation of member tuples into compact star predicates
//! - Aggregation keys that identify cached segments by their constraints
//! - A pluggable segment cache SPI with in-memory and on-disk backends
//! - Cache events for cross-process coordination
//!
//! # Quick Start
//!
//! ```rust
//! use starcache::agg::{CellRequest, AggregationKey};
//! use starcache::compound::CompoundPredicateInfo;
//! use starcache::member::{Level, Measure, Member, StaticMeasureGroup};
//! use starcache::star::Star;
//! use std::sync::Arc;
//!
//! let star = Star::builder("sales_fact").column("store", "state").build();
//! let level = Level::new("Store", "State", ["state"]);
//! let group = StaticMeasureGroup::new("Sales", Arc::clone(&star))
//!     .link("Store", "state", "store", "state");
//! let measure = Measure::stored("Unit Sales", Arc::new(group));
//!
//! let tuples = vec![
//!     vec![Member::regular(&level, "CA", ["CA"])],
//!     vec![Member::regular(&level, "OR", ["OR"])],
//! ];
//! let info = CompoundPredicateInfo::new(&tuples, &measure);
//! assert!(info.is_satisfiable());
//!
//! let mut request = CellRequest::new(Arc::clone(&star));
//! assert!(request.add_compound(&info));
//! let key = AggregationKey::from_cell_request(&request);
//! assert_eq!(key.compound_predicates().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitkey;
pub mod error;
pub mod member;
pub mod star;
pub mod value;

/// Predicate trees over star columns
pub mod predicate;

/// Compilation of member tuples into compound predicates
pub mod compound;

/// Aggregation keys, cell requests and segment loading
pub mod agg;

/// Segment headers and bodies
pub mod segment;

/// Segment cache SPI and backends
pub mod cache;

/// Configuration management with TOML support
pub mod config;

/// Tracing subscriber setup
pub mod logging;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Path hardening for the disk cache
pub mod security;

// Re-export main types
pub use agg::{AggregationKey, AggregationKeyBuilder, CellRequest, SegmentCacheManager};
pub use bitkey::BitKey;
pub use cache::{DiskSegmentCache, MemorySegmentCache, SegmentCache, SegmentCacheListener};
pub use compound::{CompoundPredicateInfo, PredicateCompilation};
pub use config::Config;
pub use error::{Error, Result};
pub use predicate::StarPredicate;
pub use segment::{SegmentBody, SegmentHeader};
