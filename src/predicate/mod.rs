//! Predicate trees over star columns
//!
//! A [`StarPredicate`] describes which fact rows an aggregate segment covers.
//! Leaves bind one column to values; interior nodes are AND/OR of children.
//!
//! ```text
//!                    OR
//!          ┌─────────┴──────────┐
//!         AND                  AND
//!    ┌─────┴─────┐        ┌─────┴─────┐
//! country=USA  state=CA  country=CAN  state=BC
//! ```
//!
//! Trees are immutable once built: [`StarPredicate::and`] and
//! [`StarPredicate::or`] return new nodes. Two trees built independently
//! compare equal through [`StarPredicate::equal_constraint`] when they
//! constrain the same columns to the same values, regardless of child order.
//!
//! # Example
//!
//! ```rust
//! use starcache::predicate::StarPredicate;
//! use starcache::star::{AnsiDialect, StarColumn};
//! use starcache::value::Value;
//!
//! let country = StarColumn::new(0, "store", "country");
//! let state = StarColumn::new(1, "store", "state");
//!
//! let ca = StarPredicate::value(country.clone(), Value::from("USA"))
//!     .and(&StarPredicate::value(state.clone(), Value::from("CA")));
//! let bc = StarPredicate::value(country, Value::from("Canada"))
//!     .and(&StarPredicate::value(state, Value::from("BC")));
//! let both = ca.or(&bc);
//!
//! assert_eq!(both.constrained_column_bit_key().cardinality(), 2);
//! assert!(both.equal_constraint(&bc.or(&ca)));
//!
//! let mut sql = String::new();
//! both.to_sql(&AnsiDialect::new(), &mut sql);
//! assert!(sql.contains(" OR "));
//! ```

pub mod column;
pub mod list;

pub use column::{ListColumnPredicate, ValueColumnPredicate};
pub use list::{AndPredicate, ListPredicate, OrPredicate};

use crate::bitkey::BitKey;
use crate::star::{SqlDialect, StarColumn};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

/// A node of a predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum StarPredicate {
    /// `column = value`
    Value(ValueColumnPredicate),
    /// `column IN (...)`
    List(ListColumnPredicate),
    /// Conjunction
    And(AndPredicate),
    /// Disjunction
    Or(OrPredicate),
}

impl StarPredicate {
    /// Create a `column = value` leaf
    pub fn value(column: StarColumn, value: Value) -> Self {
        StarPredicate::Value(ValueColumnPredicate::new(column, value))
    }

    /// Columns this predicate constrains
    pub fn constrained_column_bit_key(&self) -> BitKey {
        match self {
            StarPredicate::Value(p) => p.bit_key(),
            StarPredicate::List(p) => p.bit_key(),
            StarPredicate::And(p) => p.list().bit_key().clone(),
            StarPredicate::Or(p) => p.list().bit_key().clone(),
        }
    }

    /// Constrained columns in first-seen order
    pub fn constrained_columns(&self) -> Vec<&StarColumn> {
        match self {
            StarPredicate::Value(p) => vec![p.column()],
            StarPredicate::List(p) => vec![p.column()],
            StarPredicate::And(p) => p.list().columns().iter().collect(),
            StarPredicate::Or(p) => p.list().columns().iter().collect(),
        }
    }

    /// Whether two predicates impose the same constraint
    ///
    /// Leaves match on column and value set; a single-column IN list with
    /// one distinct value matches the equivalent `column = value`. AND and
    /// OR nodes match when their children match pairwise in any order.
    pub fn equal_constraint(&self, other: &StarPredicate) -> bool {
        match (self, other) {
            (StarPredicate::And(a), StarPredicate::And(b)) => a.equal_constraint(b),
            (StarPredicate::Or(a), StarPredicate::Or(b)) => a.equal_constraint(b),
            (StarPredicate::And(_) | StarPredicate::Or(_), _)
            | (_, StarPredicate::And(_) | StarPredicate::Or(_)) => false,
            _ => match (self.column_values(), other.column_values()) {
                (Some((c1, v1)), Some((c2, v2))) => c1 == c2 && v1 == v2,
                _ => false,
            },
        }
    }

    /// Column position and distinct values of a single-column leaf
    fn column_values(&self) -> Option<(usize, Vec<&Value>)> {
        match self {
            StarPredicate::Value(p) => Some((p.column().bit_position, vec![p.value()])),
            StarPredicate::List(p) => Some((
                p.column().bit_position,
                p.value_set().into_iter().collect(),
            )),
            _ => None,
        }
    }

    /// Conjoin with another predicate, returning a new tree
    ///
    /// AND operands contribute their children directly.
    pub fn and(&self, other: &StarPredicate) -> StarPredicate {
        let mut children = Vec::new();
        for operand in [self, other] {
            match operand {
                StarPredicate::And(and) => children.extend(and.children().iter().cloned()),
                p => children.push(p.clone()),
            }
        }
        StarPredicate::And(AndPredicate::new(children))
    }

    /// Disjoin with another predicate, returning a new tree
    ///
    /// OR operands contribute their children directly.
    pub fn or(&self, other: &StarPredicate) -> StarPredicate {
        let mut children = Vec::new();
        for operand in [self, other] {
            match operand {
                StarPredicate::Or(or) => children.extend(or.children().iter().cloned()),
                p => children.push(p.clone()),
            }
        }
        StarPredicate::Or(OrPredicate::new(children))
    }

    /// Whether a fact row satisfies the predicate
    ///
    /// `row` maps star bit positions to the row's values; a column missing
    /// from the row never matches.
    pub fn evaluate(&self, row: &HashMap<usize, Value>) -> bool {
        match self {
            StarPredicate::Value(p) => p.evaluate(row),
            StarPredicate::List(p) => p.evaluate(row),
            StarPredicate::And(p) => p.evaluate(row),
            StarPredicate::Or(p) => p.evaluate(row),
        }
    }

    /// Append dialect-specific SQL text
    pub fn to_sql(&self, dialect: &dyn SqlDialect, buf: &mut String) {
        match self {
            StarPredicate::Value(p) => p.to_sql(dialect, buf),
            StarPredicate::List(p) => p.to_sql(dialect, buf),
            StarPredicate::And(p) => p.to_sql(dialect, buf),
            StarPredicate::Or(p) => p.to_sql(dialect, buf),
        }
    }

    /// SQL text as a fresh string
    pub fn sql(&self, dialect: &dyn SqlDialect) -> String {
        let mut buf = String::new();
        self.to_sql(dialect, &mut buf);
        buf
    }

    /// SQL text that is identical for predicates with an equal constraint
    ///
    /// Children of AND and OR nodes are rendered in sorted order and never
    /// collapse into a multi-value IN. Use [`StarPredicate::sql`] for text
    /// that is sent to a database.
    pub fn canonical_sql(&self, dialect: &dyn SqlDialect) -> String {
        match self {
            StarPredicate::Value(_) | StarPredicate::List(_) => self.sql(dialect),
            StarPredicate::And(p) => canonical_join(p.children(), dialect, " AND "),
            StarPredicate::Or(p) => canonical_join(p.children(), dialect, " OR "),
        }
    }

    /// Every `column = value` leaf, depth first
    pub fn value_leaves(&self) -> Vec<&ValueColumnPredicate> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ValueColumnPredicate>) {
        match self {
            StarPredicate::Value(p) => out.push(p),
            StarPredicate::List(p) => out.extend(p.predicates()),
            StarPredicate::And(p) => p.children().iter().for_each(|c| c.collect_leaves(out)),
            StarPredicate::Or(p) => p.children().iter().for_each(|c| c.collect_leaves(out)),
        }
    }
}

impl fmt::Display for StarPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StarPredicate::Value(p) => fmt::Display::fmt(p, f),
            StarPredicate::List(p) => fmt::Display::fmt(p, f),
            StarPredicate::And(p) => fmt::Display::fmt(p, f),
            StarPredicate::Or(p) => fmt::Display::fmt(p, f),
        }
    }
}

fn canonical_join(children: &[StarPredicate], dialect: &dyn SqlDialect, op: &str) -> String {
    let mut parts: Vec<String> = children.iter().map(|c| c.canonical_sql(dialect)).collect();
    parts.sort_unstable();
    format!("({})", parts.join(op))
}

/// OR a list of predicates, keeping each one as its own child
///
/// Returns `None` for an empty list and the predicate itself for a
/// single-element list.
pub fn or_all(predicates: Vec<StarPredicate>) -> Option<StarPredicate> {
    match predicates.len() {
        0 => None,
        1 => predicates.into_iter().next(),
        _ => Some(StarPredicate::Or(OrPredicate::new(predicates))),
    }
}

/// AND a list of predicates
///
/// Returns `None` for an empty list and the predicate itself for a
/// single-element list.
pub fn and_all(predicates: Vec<StarPredicate>) -> Option<StarPredicate> {
    match predicates.len() {
        0 => None,
        1 => predicates.into_iter().next(),
        _ => Some(StarPredicate::And(AndPredicate::new(predicates))),
    }
}

// ============================================================================
// Tests
// ============================================================================
