//! Members, tuples and measures as seen by the aggregation cache
//!
//! Members arrive from the evaluator already resolved. The cache only needs
//! each member's level (to find its key columns), its key values, and the
//! measure group that maps dimension key columns onto star columns.
//!
//! # Member Kinds
//!
//! - **Regular**: a stored member of a level, with one key value per key column
//! - **Visual total**: wraps a real member; unwrapped before predicate construction
//! - **Calculated**: defined by a formula; only some formulas can become predicates

use crate::star::{Star, StarColumn};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Levels and Members
// ============================================================================

/// A hierarchy level and the key columns that identify its members
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Level {
    /// Owning dimension
    pub dimension: String,
    /// Level name
    pub name: String,
    /// Key columns in key order; empty for an "All" level
    pub key_columns: Vec<String>,
}

impl Level {
    /// Create a level keyed by the given columns
    pub fn new<I, S>(dimension: impl Into<String>, name: impl Into<String>, key_columns: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            dimension: dimension.into(),
            name: name.into(),
            key_columns: key_columns.into_iter().map(Into::into).collect(),
        })
    }

    /// Create the "All" level of a dimension, which constrains nothing
    pub fn all(dimension: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            dimension: dimension.into(),
            name: "(All)".to_string(),
            key_columns: Vec::new(),
        })
    }

    /// Whether this is an "All" level
    pub fn is_all(&self) -> bool {
        self.key_columns.is_empty()
    }
}

/// A stored member of a level
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegularMember {
    /// Level the member belongs to
    pub level: Arc<Level>,
    /// Member caption
    pub name: String,
    /// Key values, parallel to `level.key_columns`
    pub key: Vec<Value>,
}

impl RegularMember {
    /// Pair each key column with its key value
    pub fn key_bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.level
            .key_columns
            .iter()
            .map(String::as_str)
            .zip(self.key.iter())
    }

    /// Dimension of the member's level
    pub fn dimension(&self) -> &str {
        &self.level.dimension
    }
}

/// Formula of a calculated member
#[derive(Debug, Clone)]
pub enum CalcFormula {
    /// Aggregate over a list of members, e.g. `Aggregate({[CA], [OR]})`
    Members(Vec<Member>),
    /// Aggregate over an evaluated set of tuples
    Set(Vec<Vec<Member>>),
    /// Any other expression; never convertible to a predicate
    Expression(String),
}

/// A member defined by a formula
#[derive(Debug, Clone)]
pub struct CalculatedMember {
    /// Member name
    pub name: String,
    /// Dimension the member is defined on
    pub dimension: String,
    /// Defining formula
    pub formula: CalcFormula,
}

/// A member appearing in a tuple
#[derive(Debug, Clone)]
pub enum Member {
    /// A stored member
    Regular(Arc<RegularMember>),
    /// A visual-total member wrapping a real member
    VisualTotal {
        /// Caption of the visual total
        name: String,
        /// The wrapped member
        underlying: Box<Member>,
    },
    /// A calculated member
    Calculated(Arc<CalculatedMember>),
}

impl Member {
    /// Create a stored member
    pub fn regular<I, V>(level: &Arc<Level>, name: impl Into<String>, key: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Member::Regular(Arc::new(RegularMember {
            level: Arc::clone(level),
            name: name.into(),
            key: key.into_iter().map(Into::into).collect(),
        }))
    }

    /// Create the "All" member of a level
    pub fn all(level: &Arc<Level>) -> Self {
        Member::Regular(Arc::new(RegularMember {
            level: Arc::clone(level),
            name: format!("All {}", level.dimension),
            key: Vec::new(),
        }))
    }

    /// Wrap a member in a visual total
    pub fn visual_total(name: impl Into<String>, underlying: Member) -> Self {
        Member::VisualTotal {
            name: name.into(),
            underlying: Box::new(underlying),
        }
    }

    /// Create a calculated member
    pub fn calculated(name: impl Into<String>, dimension: impl Into<String>, formula: CalcFormula) -> Self {
        Member::Calculated(Arc::new(CalculatedMember {
            name: name.into(),
            dimension: dimension.into(),
            formula,
        }))
    }

    /// Strip any visual-total wrappers
    pub fn unwrap_visual_total(&self) -> &Member {
        let mut member = self;
        while let Member::VisualTotal { underlying, .. } = member {
            member = underlying;
        }
        member
    }

    /// The stored member behind this one, if there is one
    pub fn as_regular(&self) -> Option<&Arc<RegularMember>> {
        match self.unwrap_visual_total() {
            Member::Regular(m) => Some(m),
            _ => None,
        }
    }

    /// Member name
    pub fn name(&self) -> &str {
        match self {
            Member::Regular(m) => &m.name,
            Member::VisualTotal { name, .. } => name,
            Member::Calculated(c) => &c.name,
        }
    }

    /// Dimension the member belongs to
    pub fn dimension(&self) -> &str {
        match self {
            Member::Regular(m) => m.dimension(),
            Member::Calculated(c) => &c.dimension,
            Member::VisualTotal { underlying, .. } => underlying.dimension(),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}].[{}]", self.dimension(), self.name())
    }
}

// ============================================================================
// Measures and Measure Groups
// ============================================================================

/// Maps dimension key columns onto the columns of one star
pub trait MeasureGroup: Send + Sync + fmt::Debug {
    /// Measure group name
    fn name(&self) -> &str;

    /// The star the measure group's fact table belongs to
    fn star(&self) -> &Arc<Star>;

    /// Resolve a dimension key column to a star column
    ///
    /// Returns `None` when the dimension is not joined to this measure group.
    fn resolve_column(&self, dimension: &str, key_column: &str) -> Option<StarColumn>;
}

/// A measure group backed by an explicit link table
#[derive(Debug)]
pub struct StaticMeasureGroup {
    name: String,
    star: Arc<Star>,
    links: HashMap<(String, String), usize>,
}

impl StaticMeasureGroup {
    /// Create a measure group with no dimension links
    pub fn new(name: impl Into<String>, star: Arc<Star>) -> Self {
        Self {
            name: name.into(),
            star,
            links: HashMap::new(),
        }
    }

    /// Link a dimension key column to the star column `table.column`
    ///
    /// Unknown star columns are skipped, leaving the key unresolvable.
    pub fn link(
        mut self,
        dimension: impl Into<String>,
        key_column: impl Into<String>,
        table: &str,
        column: &str,
    ) -> Self {
        let dimension = dimension.into();
        let key_column = key_column.into();
        match self.star.find_column(table, column) {
            Some(star_column) => {
                self.links
                    .insert((dimension, key_column), star_column.bit_position);
            }
            None => {
                debug!(
                    measure_group = %self.name,
                    dimension = %dimension,
                    key_column = %key_column,
                    "star has no column {}.{}; link skipped",
                    table,
                    column
                );
            }
        }
        self
    }
}

impl MeasureGroup for StaticMeasureGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn star(&self) -> &Arc<Star> {
        &self.star
    }

    fn resolve_column(&self, dimension: &str, key_column: &str) -> Option<StarColumn> {
        self.links
            .get(&(dimension.to_string(), key_column.to_string()))
            .and_then(|pos| self.star.column(*pos))
            .cloned()
    }
}

/// A measure a cell request asks for
#[derive(Debug, Clone)]
pub enum Measure {
    /// A measure stored in a fact table
    Stored {
        /// Measure name
        name: String,
        /// Measure group owning the measure
        measure_group: Arc<dyn MeasureGroup>,
    },
    /// A calculated measure, which has no base star
    Calculated {
        /// Measure name
        name: String,
    },
}

impl Measure {
    /// Create a stored measure
    pub fn stored(name: impl Into<String>, measure_group: Arc<dyn MeasureGroup>) -> Self {
        Measure::Stored {
            name: name.into(),
            measure_group,
        }
    }

    /// Measure name
    pub fn name(&self) -> &str {
        match self {
            Measure::Stored { name, .. } | Measure::Calculated { name } => name,
        }
    }

    /// Whether the measure is calculated
    pub fn is_calculated(&self) -> bool {
        matches!(self, Measure::Calculated { .. })
    }

    /// Owning measure group of a stored measure
    pub fn measure_group(&self) -> Option<&Arc<dyn MeasureGroup>> {
        match self {
            Measure::Stored { measure_group, .. } => Some(measure_group),
            Measure::Calculated { .. } => None,
        }
    }

    /// Base star of a stored measure
    pub fn star(&self) -> Option<&Arc<Star>> {
        self.measure_group().map(|mg| mg.star())
    }
}
