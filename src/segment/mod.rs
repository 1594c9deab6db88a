//! Segment headers and bodies
//!
//! A segment is a slice of pre-aggregated measure values. The header
//! identifies it; the body holds the values. Caches map one to the other.

pub mod body;
pub mod header;

pub use body::{SegmentBody, SegmentData};
pub use header::{ByteString, SegmentColumn, SegmentHeader, SegmentHeaderBuilder};
