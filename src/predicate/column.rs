//! Single-column predicates
//!
//! - [`ValueColumnPredicate`]: `column = value`
//! - [`ListColumnPredicate`]: `column IN (v1, v2, ...)`, the folded form used
//!   when a whole compound predicate constrains only one column

use crate::bitkey::BitKey;
use crate::star::{SqlDialect, StarColumn};
use crate::value::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Binds one star column to one literal value
#[derive(Debug, Clone, PartialEq)]
pub struct ValueColumnPredicate {
    column: StarColumn,
    value: Value,
}

impl ValueColumnPredicate {
    /// Create `column = value`
    pub fn new(column: StarColumn, value: Value) -> Self {
        Self { column, value }
    }

    /// Constrained column
    pub fn column(&self) -> &StarColumn {
        &self.column
    }

    /// Bound value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Columns constrained, as a bit key
    pub fn bit_key(&self) -> BitKey {
        BitKey::from_positions(self.column.bit_position + 1, [self.column.bit_position])
    }

    /// Whether a row satisfies the predicate
    pub fn evaluate(&self, row: &HashMap<usize, Value>) -> bool {
        row.get(&self.column.bit_position) == Some(&self.value)
    }

    /// Append SQL text for this predicate
    pub fn to_sql(&self, dialect: &dyn SqlDialect, buf: &mut String) {
        buf.push_str(&dialect.column_expression(&self.column));
        if self.value.is_null() {
            buf.push_str(" IS NULL");
        } else {
            buf.push_str(" = ");
            buf.push_str(&dialect.quote_literal(&self.value));
        }
    }
}

impl fmt::Display for ValueColumnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.column, self.value)
    }
}

/// Binds one star column to a list of values
#[derive(Debug, Clone, PartialEq)]
pub struct ListColumnPredicate {
    column: StarColumn,
    predicates: Vec<ValueColumnPredicate>,
}

impl ListColumnPredicate {
    /// Create `column IN (...)` from value predicates on that column
    pub fn new(column: StarColumn, predicates: Vec<ValueColumnPredicate>) -> Self {
        debug_assert!(predicates
            .iter()
            .all(|p| p.column.bit_position == column.bit_position));
        Self { column, predicates }
    }

    /// Create `column IN (...)` from raw values
    pub fn from_values<I: IntoIterator<Item = Value>>(column: StarColumn, values: I) -> Self {
        let predicates = values
            .into_iter()
            .map(|v| ValueColumnPredicate::new(column.clone(), v))
            .collect();
        Self { column, predicates }
    }

    /// Constrained column
    pub fn column(&self) -> &StarColumn {
        &self.column
    }

    /// Leaf predicates in insertion order
    pub fn predicates(&self) -> &[ValueColumnPredicate] {
        &self.predicates
    }

    /// Distinct values bound by the list
    pub fn value_set(&self) -> BTreeSet<&Value> {
        self.predicates.iter().map(|p| &p.value).collect()
    }

    /// Columns constrained, as a bit key
    pub fn bit_key(&self) -> BitKey {
        BitKey::from_positions(self.column.bit_position + 1, [self.column.bit_position])
    }

    /// Same column and same distinct values, in any order
    pub fn equal_constraint(&self, other: &ListColumnPredicate) -> bool {
        self.column.bit_position == other.column.bit_position && self.value_set() == other.value_set()
    }

    /// Whether a row satisfies the predicate
    pub fn evaluate(&self, row: &HashMap<usize, Value>) -> bool {
        self.predicates.iter().any(|p| p.evaluate(row))
    }

    /// Append SQL text for this predicate
    pub fn to_sql(&self, dialect: &dyn SqlDialect, buf: &mut String) {
        let column = dialect.column_expression(&self.column);
        let values = self.value_set();
        let has_null = values.iter().any(|v| v.is_null());
        let literals: Vec<String> = values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| dialect.quote_literal(v))
            .collect();

        match (literals.len(), has_null) {
            (0, true) => {
                buf.push_str(&column);
                buf.push_str(" IS NULL");
            }
            // An empty list matches nothing
            (0, false) => buf.push_str("1 = 0"),
            (1, false) => {
                buf.push_str(&column);
                buf.push_str(" = ");
                buf.push_str(&literals[0]);
            }
            (_, false) => {
                buf.push_str(&column);
                buf.push_str(" IN (");
                buf.push_str(&literals.join(", "));
                buf.push(')');
            }
            (_, true) => {
                buf.push('(');
                buf.push_str(&column);
                buf.push_str(" IN (");
                buf.push_str(&literals.join(", "));
                buf.push_str(") OR ");
                buf.push_str(&column);
                buf.push_str(" IS NULL)");
            }
        }
    }
}

impl fmt::Display for ListColumnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.predicates.iter().map(|p| p.value.to_string()).collect();
        write!(f, "{} IN {{{}}}", self.column, values.join(", "))
    }
}
