//! Segment bodies
//!
//! A body holds the axis values of a segment and one measure value per
//! cell. Cells are addressed by one coordinate per axis; an axis with its
//! null flag set has one extra trailing coordinate for the null value.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cell storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SegmentData {
    /// One slot per cell, row-major over the axes
    #[serde(with = "dense_cells")]
    Dense(Vec<Option<f64>>),
    /// Integer measures, one slot per cell
    DenseInt(Vec<Option<i64>>),
    /// Only non-empty cells, keyed by coordinates
    #[serde(with = "sparse_cells")]
    Sparse(BTreeMap<Vec<u32>, f64>),
}

/// Materialized values of a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentBody {
    /// Sorted values along each axis
    pub axis_values: Vec<Vec<Value>>,
    /// Whether each axis also holds the null value
    pub null_axis_flags: Vec<bool>,
    /// Cell values
    pub data: SegmentData,
}

impl SegmentBody {
    /// Create a body; axes without a null flag default to `false`
    pub fn new(axis_values: Vec<Vec<Value>>, mut null_axis_flags: Vec<bool>, data: SegmentData) -> Self {
        null_axis_flags.resize(axis_values.len(), false);
        Self {
            axis_values,
            null_axis_flags,
            data,
        }
    }

    /// Number of axes
    pub fn axis_count(&self) -> usize {
        self.axis_values.len()
    }

    fn axis_len(&self, axis: usize) -> usize {
        self.axis_values[axis].len() + usize::from(self.null_axis_flags.get(axis).copied().unwrap_or(false))
    }

    /// Number of addressable cells
    pub fn cell_count(&self) -> usize {
        (0..self.axis_count()).map(|a| self.axis_len(a)).product()
    }

    /// Value of the cell at `coords`, if present
    pub fn value_at(&self, coords: &[u32]) -> Option<f64> {
        if coords.len() != self.axis_count() {
            return None;
        }
        match &self.data {
            SegmentData::Sparse(cells) => cells.get(coords).copied(),
            SegmentData::Dense(cells) => self.offset(coords).and_then(|i| cells.get(i).copied().flatten()),
            SegmentData::DenseInt(cells) => self
                .offset(coords)
                .and_then(|i| cells.get(i).copied().flatten())
                .map(|v| v as f64),
        }
    }

    fn offset(&self, coords: &[u32]) -> Option<usize> {
        let mut offset = 0usize;
        for (axis, &c) in coords.iter().enumerate() {
            let len = self.axis_len(axis);
            let c = c as usize;
            if c >= len {
                return None;
            }
            offset = offset * len + c;
        }
        Some(offset)
    }
}

/// A measure value on the wire
///
/// JSON has no literal for NaN or the infinities, so those travel as the
/// tokens `"NaN"`, `"inf"` and `"-inf"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CellRepr {
    Number(f64),
    Token(String),
}

impl From<f64> for CellRepr {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            CellRepr::Number(v)
        } else if v.is_nan() {
            CellRepr::Token("NaN".to_string())
        } else if v > 0.0 {
            CellRepr::Token("inf".to_string())
        } else {
            CellRepr::Token("-inf".to_string())
        }
    }
}

impl CellRepr {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            CellRepr::Number(v) => Ok(v),
            CellRepr::Token(t) => match t.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(E::custom(format!("invalid cell value {:?}", other))),
            },
        }
    }
}

mod dense_cells {
    use super::CellRepr;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(cells: &[Option<f64>], s: S) -> Result<S::Ok, S::Error> {
        let reprs: Vec<Option<CellRepr>> = cells.iter().map(|c| c.map(CellRepr::from)).collect();
        reprs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Option<f64>>, D::Error> {
        let reprs: Vec<Option<CellRepr>> = Vec::deserialize(d)?;
        reprs
            .into_iter()
            .map(|c| c.map(CellRepr::into_f64).transpose())
            .collect()
    }
}

/// JSON maps need string keys, so sparse cells travel as `[coords, value]` pairs
mod sparse_cells {
    use super::CellRepr;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(cells: &BTreeMap<Vec<u32>, f64>, s: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(&Vec<u32>, CellRepr)> = cells.iter().map(|(k, v)| (k, CellRepr::from(*v))).collect();
        pairs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<Vec<u32>, f64>, D::Error> {
        let pairs: Vec<(Vec<u32>, CellRepr)> = Vec::deserialize(d)?;
        pairs
            .into_iter()
            .map(|(k, v)| v.into_f64().map(|v| (k, v)))
            .collect()
    }
}
