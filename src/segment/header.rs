//! Segment headers
//!
//! A header carries every field that identifies a segment and a SHA-256
//! digest over those fields. Caches key entries by that digest only.

use crate::bitkey::BitKey;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque byte string, displayed as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteString(Vec<u8>);

impl ByteString {
    /// Wrap raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A column of a segment and the values it is restricted to
///
/// `values == None` means the column is unconstrained (wildcard).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentColumn {
    /// Column expression, e.g. `store.state`
    pub column_expression: String,
    /// Values the segment covers on this column
    pub values: Option<BTreeSet<Value>>,
}

impl SegmentColumn {
    /// Create a column restricted to `values`
    pub fn new<I: IntoIterator<Item = Value>>(column_expression: impl Into<String>, values: I) -> Self {
        Self {
            column_expression: column_expression.into(),
            values: Some(values.into_iter().collect()),
        }
    }

    /// Create an unconstrained column
    pub fn wildcard(column_expression: impl Into<String>) -> Self {
        Self {
            column_expression: column_expression.into(),
            values: None,
        }
    }
}

/// Identifying description of a segment
#[derive(Debug, Clone)]
pub struct SegmentHeader {
    /// Schema the segment belongs to
    pub schema_name: String,
    /// Checksum of the schema definition
    pub schema_checksum: Option<String>,
    /// Cube name
    pub cube_name: String,
    /// Measure the segment holds
    pub measure_name: String,
    /// Fact table name
    pub fact_table_name: String,
    /// Columns constrained by the segment
    pub constrained_columns: BitKey,
    /// Column expressions and value sets
    pub columns: Vec<SegmentColumn>,
    /// Rendered compound predicates
    pub compound_predicates: Vec<String>,
    unique_id: ByteString,
}

impl SegmentHeader {
    /// Start a header with its required fields
    pub fn builder(
        schema_name: impl Into<String>,
        cube_name: impl Into<String>,
        fact_table_name: impl Into<String>,
        constrained_columns: BitKey,
    ) -> SegmentHeaderBuilder {
        SegmentHeaderBuilder {
            schema_name: schema_name.into(),
            schema_checksum: None,
            cube_name: cube_name.into(),
            measure_name: String::new(),
            fact_table_name: fact_table_name.into(),
            constrained_columns,
            columns: Vec::new(),
            compound_predicates: Vec::new(),
        }
    }

    /// Content digest of the identifying fields
    pub fn unique_id(&self) -> &ByteString {
        &self.unique_id
    }

    /// Every field is length-prefixed, every list is count-prefixed, and
    /// each section opens with its own tag byte.
    fn compute_unique_id(&self) -> ByteString {
        fn field(hasher: &mut Sha256, bytes: &[u8]) {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        fn count(hasher: &mut Sha256, n: usize) {
            hasher.update((n as u64).to_le_bytes());
        }

        let mut hasher = Sha256::new();
        hasher.update([TAG_SCHEMA]);
        field(&mut hasher, self.schema_name.as_bytes());
        match &self.schema_checksum {
            None => hasher.update([TAG_ABSENT]),
            Some(checksum) => {
                hasher.update([TAG_PRESENT]);
                field(&mut hasher, checksum.as_bytes());
            }
        }
        field(&mut hasher, self.cube_name.as_bytes());
        field(&mut hasher, self.measure_name.as_bytes());
        field(&mut hasher, self.fact_table_name.as_bytes());
        field(&mut hasher, self.constrained_columns.to_string().as_bytes());

        hasher.update([TAG_COLUMNS]);
        count(&mut hasher, self.columns.len());
        for column in &self.columns {
            field(&mut hasher, column.column_expression.as_bytes());
            match &column.values {
                None => hasher.update([TAG_ABSENT]),
                Some(values) => {
                    hasher.update([TAG_PRESENT]);
                    count(&mut hasher, values.len());
                    for value in values {
                        field(&mut hasher, format!("{:?}", value).as_bytes());
                    }
                }
            }
        }

        hasher.update([TAG_PREDICATES]);
        count(&mut hasher, self.compound_predicates.len());
        for predicate in &self.compound_predicates {
            field(&mut hasher, predicate.as_bytes());
        }
        ByteString(hasher.finalize().to_vec())
    }
}

const TAG_SCHEMA: u8 = 1;
const TAG_COLUMNS: u8 = 2;
const TAG_PREDICATES: u8 = 3;
const TAG_ABSENT: u8 = 0xF0;
const TAG_PRESENT: u8 = 0xF1;

impl PartialEq for SegmentHeader {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id
    }
}

impl Eq for SegmentHeader {}

impl Hash for SegmentHeader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unique_id.hash(state);
    }
}

impl fmt::Display for SegmentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{} [{}] {}",
            self.schema_name,
            self.cube_name,
            self.measure_name,
            self.fact_table_name,
            self.constrained_columns,
            self.unique_id
        )
    }
}

/// Builder for [`SegmentHeader`]; the digest is computed once in `build`
#[derive(Debug, Clone)]
pub struct SegmentHeaderBuilder {
    schema_name: String,
    schema_checksum: Option<String>,
    cube_name: String,
    measure_name: String,
    fact_table_name: String,
    constrained_columns: BitKey,
    columns: Vec<SegmentColumn>,
    compound_predicates: Vec<String>,
}

impl SegmentHeaderBuilder {
    /// Set the schema checksum
    pub fn schema_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.schema_checksum = Some(checksum.into());
        self
    }

    /// Set the measure name
    pub fn measure_name(mut self, name: impl Into<String>) -> Self {
        self.measure_name = name.into();
        self
    }

    /// Add a column
    pub fn column(mut self, column: SegmentColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Add rendered compound predicates
    pub fn compound_predicates<I, S>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compound_predicates
            .extend(predicates.into_iter().map(Into::into));
        self
    }

    /// Finish the header
    pub fn build(self) -> SegmentHeader {
        let mut header = SegmentHeader {
            schema_name: self.schema_name,
            schema_checksum: self.schema_checksum,
            cube_name: self.cube_name,
            measure_name: self.measure_name,
            fact_table_name: self.fact_table_name,
            constrained_columns: self.constrained_columns,
            columns: self.columns,
            compound_predicates: self.compound_predicates,
            unique_id: ByteString(Vec::new()),
        };
        header.unique_id = header.compute_unique_id();
        header
    }
}
