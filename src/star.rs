//! Star schema descriptors and SQL dialects
//!
//! The full schema model lives outside this crate. What the aggregation
//! cache needs from it is small: a star's identity, its fact table, its
//! columns with their bit positions, and a dialect to render predicates.
//!
//! # Example
//!
//! ```rust
//! use starcache::star::Star;
//!
//! let star = Star::builder("sales_fact")
//!     .column("store", "country")
//!     .column("store", "state")
//!     .column("store", "city")
//!     .build();
//!
//! assert_eq!(star.column_count(), 3);
//! assert_eq!(star.column(2).map(|c| c.name.as_str()), Some("city"));
//! ```

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_STAR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a star
///
/// Two cell requests can share a BitKey but belong to different base stars
/// (virtual cubes), so star identity is part of every aggregation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StarId(pub u64);

impl StarId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        StarId(NEXT_STAR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "star#{}", self.0)
    }
}

/// A column of a star, addressed by its bit position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StarColumn {
    /// Ordinal of the column within its star
    pub bit_position: usize,
    /// Table (or alias) the column belongs to
    pub table: String,
    /// Column name
    pub name: String,
}

impl StarColumn {
    /// Create a column descriptor
    pub fn new(bit_position: usize, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bit_position,
            table: table.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StarColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.name)
    }
}

// ============================================================================
// SQL Dialects
// ============================================================================

/// SQL rendering hooks a predicate tree needs
pub trait SqlDialect: Send + Sync + fmt::Debug {
    /// Quote an identifier
    fn quote_identifier(&self, ident: &str) -> String;

    /// Render a literal value
    fn quote_literal(&self, value: &Value) -> String;

    /// Whether `(a, b) IN ((1, 2), (3, 4))` is supported
    fn supports_multi_value_in(&self) -> bool {
        false
    }

    /// Render a column reference
    fn column_expression(&self, column: &StarColumn) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(&column.table),
            self.quote_identifier(&column.name)
        )
    }
}

/// Plain ANSI SQL rendering
#[derive(Debug, Clone, Default)]
pub struct AnsiDialect {
    multi_value_in: bool,
}

impl AnsiDialect {
    /// ANSI dialect without multi-value IN lists
    pub fn new() -> Self {
        Self::default()
    }

    /// ANSI dialect that renders multi-value IN lists
    pub fn with_multi_value_in() -> Self {
        Self {
            multi_value_in: true,
        }
    }
}

impl SqlDialect for AnsiDialect {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Decimal(d) => d.clone(),
            Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn supports_multi_value_in(&self) -> bool {
        self.multi_value_in
    }
}

// ============================================================================
// Star
// ============================================================================

/// A fact table plus the dimension columns joined to it
#[derive(Debug)]
pub struct Star {
    id: StarId,
    fact_table: String,
    columns: Vec<StarColumn>,
    dialect: Arc<dyn SqlDialect>,
}

impl Star {
    /// Start describing a star over `fact_table`
    pub fn builder(fact_table: impl Into<String>) -> StarBuilder {
        StarBuilder {
            fact_table: fact_table.into(),
            columns: Vec::new(),
            dialect: None,
        }
    }

    /// Identity of this star
    pub fn id(&self) -> StarId {
        self.id
    }

    /// Fact table name
    pub fn fact_table(&self) -> &str {
        &self.fact_table
    }

    /// Total number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column at a bit position
    pub fn column(&self, bit_position: usize) -> Option<&StarColumn> {
        self.columns.get(bit_position)
    }

    /// Look a column up by table and name
    pub fn find_column(&self, table: &str, name: &str) -> Option<&StarColumn> {
        self.columns
            .iter()
            .find(|c| c.table == table && c.name == name)
    }

    /// All columns in bit position order
    pub fn columns(&self) -> &[StarColumn] {
        &self.columns
    }

    /// Dialect used to render predicates against this star
    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }
}

impl PartialEq for Star {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Star {}

/// Builder for [`Star`]; bit positions follow declaration order
pub struct StarBuilder {
    fact_table: String,
    columns: Vec<StarColumn>,
    dialect: Option<Arc<dyn SqlDialect>>,
}

impl StarBuilder {
    /// Declare the next column
    pub fn column(mut self, table: impl Into<String>, name: impl Into<String>) -> Self {
        let pos = self.columns.len();
        self.columns.push(StarColumn::new(pos, table, name));
        self
    }

    /// Use a specific SQL dialect (defaults to [`AnsiDialect`])
    pub fn dialect(mut self, dialect: Arc<dyn SqlDialect>) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Finish the star with a fresh identity
    pub fn build(self) -> Arc<Star> {
        Arc::new(Star {
            id: StarId::next(),
            fact_table: self.fact_table,
            columns: self.columns,
            dialect: self
                .dialect
                .unwrap_or_else(|| Arc::new(AnsiDialect::new())),
        })
    }
}
