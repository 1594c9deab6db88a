//! Conjunctions and disjunctions of predicates

use super::StarPredicate;
use crate::bitkey::BitKey;
use crate::star::{SqlDialect, StarColumn};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;

/// Children of an AND/OR node plus the columns they constrain
///
/// Children keep insertion order so SQL text is deterministic; equality of
/// constraints ignores that order.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPredicate {
    children: Vec<StarPredicate>,
    bit_key: BitKey,
    columns: Vec<StarColumn>,
}

impl ListPredicate {
    fn new(children: Vec<StarPredicate>) -> Self {
        let mut bit_key = BitKey::new(0);
        let mut columns: Vec<StarColumn> = Vec::new();
        for child in &children {
            bit_key = bit_key.or(&child.constrained_column_bit_key());
            for column in child.constrained_columns() {
                if !columns.iter().any(|c| c.bit_position == column.bit_position) {
                    columns.push(column.clone());
                }
            }
        }
        Self {
            children,
            bit_key,
            columns,
        }
    }

    /// Child predicates in insertion order
    pub fn children(&self) -> &[StarPredicate] {
        &self.children
    }

    /// Columns constrained by any child
    pub fn bit_key(&self) -> &BitKey {
        &self.bit_key
    }

    /// Constrained columns in first-seen order
    pub fn columns(&self) -> &[StarColumn] {
        &self.columns
    }

    /// Order-insensitive child matching
    fn equal_children(&self, other: &ListPredicate) -> bool {
        if self.bit_key != other.bit_key || self.children.len() != other.children.len() {
            return false;
        }
        let mut used = vec![false; other.children.len()];
        self.children.iter().all(|mine| {
            let found = other
                .children
                .iter()
                .enumerate()
                .find(|(i, theirs)| !used[*i] && mine.equal_constraint(theirs));
            match found {
                Some((i, _)) => {
                    used[i] = true;
                    true
                }
                None => false,
            }
        })
    }

    fn write_sql(&self, dialect: &dyn SqlDialect, buf: &mut String, op: &str) {
        if self.children.len() == 1 {
            self.children[0].to_sql(dialect, buf);
            return;
        }
        buf.push('(');
        for (i, child) in self.children.iter().enumerate() {
            if i > 0 {
                buf.push(' ');
                buf.push_str(op);
                buf.push(' ');
            }
            child.to_sql(dialect, buf);
        }
        buf.push(')');
    }

    fn write_display(&self, f: &mut fmt::Formatter<'_>, op: &str) -> fmt::Result {
        let parts: Vec<String> = self.children.iter().map(|c| c.to_string()).collect();
        write!(f, "({})", parts.join(op))
    }
}

// ============================================================================
// AND
// ============================================================================

/// Conjunction of predicates
#[derive(Debug, Clone, PartialEq)]
pub struct AndPredicate {
    list: ListPredicate,
}

impl AndPredicate {
    /// Create a conjunction over `children` as given
    ///
    /// Nested nodes are kept; [`StarPredicate::and`] is the flattening form.
    pub fn new(children: Vec<StarPredicate>) -> Self {
        Self {
            list: ListPredicate::new(children),
        }
    }

    /// Children and constrained columns
    pub fn list(&self) -> &ListPredicate {
        &self.list
    }

    /// Child predicates
    pub fn children(&self) -> &[StarPredicate] {
        self.list.children()
    }

    /// Whether a row satisfies every child
    pub fn evaluate(&self, row: &HashMap<usize, Value>) -> bool {
        self.list.children.iter().all(|c| c.evaluate(row))
    }

    pub(super) fn equal_constraint(&self, other: &AndPredicate) -> bool {
        self.list.equal_children(&other.list)
    }

    /// Values bound to each column, when every child is a value leaf
    ///
    /// Used to render a multi-value IN list.
    fn value_row(&self) -> Option<Vec<(&StarColumn, &Value)>> {
        self.list
            .children
            .iter()
            .map(|c| match c {
                StarPredicate::Value(v) if !v.value().is_null() => Some((v.column(), v.value())),
                _ => None,
            })
            .collect()
    }

    /// Append SQL text
    pub fn to_sql(&self, dialect: &dyn SqlDialect, buf: &mut String) {
        self.list.write_sql(dialect, buf, "AND");
    }
}

impl fmt::Display for AndPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.list.write_display(f, " AND ")
    }
}

// ============================================================================
// OR
// ============================================================================

/// Disjunction of predicates
#[derive(Debug, Clone, PartialEq)]
pub struct OrPredicate {
    list: ListPredicate,
}

impl OrPredicate {
    /// Create a disjunction over `children` as given
    ///
    /// Nested nodes are kept; [`StarPredicate::or`] is the flattening form.
    pub fn new(children: Vec<StarPredicate>) -> Self {
        Self {
            list: ListPredicate::new(children),
        }
    }

    /// Children and constrained columns
    pub fn list(&self) -> &ListPredicate {
        &self.list
    }

    /// Child predicates
    pub fn children(&self) -> &[StarPredicate] {
        self.list.children()
    }

    /// Whether a row satisfies any child
    pub fn evaluate(&self, row: &HashMap<usize, Value>) -> bool {
        self.list.children.iter().any(|c| c.evaluate(row))
    }

    pub(super) fn equal_constraint(&self, other: &OrPredicate) -> bool {
        self.list.equal_children(&other.list)
    }

    /// Append SQL text
    ///
    /// When the dialect supports it and every child binds the same columns
    /// in the same order, renders `(a, b) IN ((1, 2), (3, 4))`.
    pub fn to_sql(&self, dialect: &dyn SqlDialect, buf: &mut String) {
        if dialect.supports_multi_value_in() && self.list.children.len() > 1 {
            if let Some(sql) = self.multi_value_in(dialect) {
                buf.push_str(&sql);
                return;
            }
        }
        self.list.write_sql(dialect, buf, "OR");
    }

    fn multi_value_in(&self, dialect: &dyn SqlDialect) -> Option<String> {
        let rows: Vec<Vec<(&StarColumn, &Value)>> = self
            .list
            .children
            .iter()
            .map(|c| match c {
                StarPredicate::And(and) => and.value_row(),
                _ => None,
            })
            .collect::<Option<_>>()?;

        let header: Vec<usize> = rows[0].iter().map(|(c, _)| c.bit_position).collect();
        let same_shape = rows.iter().all(|row| {
            row.len() == header.len()
                && row
                    .iter()
                    .zip(header.iter())
                    .all(|((c, _), pos)| c.bit_position == *pos)
        });
        if !same_shape || header.len() < 2 {
            return None;
        }

        let columns: Vec<String> = rows[0]
            .iter()
            .map(|(c, _)| dialect.column_expression(c))
            .collect();
        let tuples: Vec<String> = rows
            .iter()
            .map(|row| {
                let literals: Vec<String> =
                    row.iter().map(|(_, v)| dialect.quote_literal(v)).collect();
                format!("({})", literals.join(", "))
            })
            .collect();
        Some(format!("({}) IN ({})", columns.join(", "), tuples.join(", ")))
    }
}

impl fmt::Display for OrPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.list.write_display(f, " OR ")
    }
}
