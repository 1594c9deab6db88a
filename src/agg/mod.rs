//! Aggregation keys and the path from cell requests to cached segments
//!
//! - [`request`]: cell requests, the input to key derivation
//! - [`key`]: aggregation keys and their staged builder
//! - [`manager`]: look up the segment cache, load and store on a miss

pub mod key;
pub mod manager;
pub mod request;

pub use key::{AggregationKey, AggregationKeyBuilder};
pub use manager::{LoadRequest, SegmentCacheManager, SegmentContext};
pub use request::CellRequest;
