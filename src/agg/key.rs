//! Aggregation keys
//!
//! An [`AggregationKey`] identifies a reusable aggregate segment. Two keys
//! are equal when they target the same star, group by the same columns and
//! impose the same constraints, however those constraints were built.
//!
//! # Hashing
//!
//! The hash covers the group-by BitKey, the star identity, the BitKey of each
//! compound predicate, and the non-group-by BitKey. Predicate values are not
//! hashed: keys over the same columns with different values collide, and
//! equality tells them apart. The hash is computed once per key.
//!
//! # Construction
//!
//! Keys are immutable. The one mutation the aggregation layer needs,
//! conjoining another predicate onto a compound predicate, happens on an
//! [`AggregationKeyBuilder`] before `build()` consumes it.
//!
//! ```rust
//! use starcache::agg::{AggregationKey, CellRequest};
//! use starcache::predicate::StarPredicate;
//! use starcache::star::Star;
//! use starcache::value::Value;
//! use std::sync::Arc;
//!
//! let star = Star::builder("sales").column("store", "state").build();
//! let state = star.column(0).unwrap().clone();
//!
//! let mut r1 = CellRequest::new(Arc::clone(&star));
//! r1.add_compound_predicate(
//!     StarPredicate::value(state.clone(), Value::from("CA"))
//!         .or(&StarPredicate::value(state.clone(), Value::from("OR"))),
//! );
//! let mut r2 = CellRequest::new(Arc::clone(&star));
//! r2.add_compound_predicate(
//!     StarPredicate::value(state.clone(), Value::from("OR"))
//!         .or(&StarPredicate::value(state, Value::from("CA"))),
//! );
//!
//! assert_eq!(AggregationKey::from_cell_request(&r1), AggregationKey::from_cell_request(&r2));
//! ```

use super::request::CellRequest;
use crate::bitkey::BitKey;
use crate::error::PredicateError;
use crate::predicate::{ListColumnPredicate, StarPredicate};
use crate::star::{SqlDialect, Star};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Cache identity of an aggregate segment
#[derive(Debug, Clone)]
pub struct AggregationKey {
    star: Arc<Star>,
    constrained_columns: BitKey,
    non_group_by_columns: BitKey,
    compound_predicates: Vec<StarPredicate>,
    volatile_compound_predicates: Vec<StarPredicate>,
    non_group_by_predicates: Vec<ListColumnPredicate>,
    hash: OnceLock<u64>,
}

impl AggregationKey {
    /// Create a key from its parts
    ///
    /// A missing non-group-by BitKey is an empty key; missing predicate lists
    /// are empty.
    pub fn new(
        constrained_columns: BitKey,
        non_group_by_columns: Option<BitKey>,
        star: Arc<Star>,
        compound_predicates: Vec<StarPredicate>,
        volatile_compound_predicates: Option<Vec<StarPredicate>>,
        non_group_by_predicates: Option<Vec<ListColumnPredicate>>,
    ) -> Self {
        Self {
            star,
            constrained_columns,
            non_group_by_columns: non_group_by_columns.unwrap_or_else(|| BitKey::new(0)),
            compound_predicates,
            volatile_compound_predicates: volatile_compound_predicates.unwrap_or_default(),
            non_group_by_predicates: non_group_by_predicates.unwrap_or_default(),
            hash: OnceLock::new(),
        }
    }

    /// Derive the key of a cell request
    pub fn from_cell_request(request: &CellRequest) -> Self {
        AggregationKeyBuilder::from_cell_request(request).build()
    }

    /// Star the key belongs to
    pub fn star(&self) -> &Arc<Star> {
        &self.star
    }

    /// Group-by columns
    pub fn constrained_columns(&self) -> &BitKey {
        &self.constrained_columns
    }

    /// Columns restricted without being grouped by
    pub fn non_group_by_columns(&self) -> &BitKey {
        &self.non_group_by_columns
    }

    /// Compound predicates in BitKey order
    pub fn compound_predicates(&self) -> &[StarPredicate] {
        &self.compound_predicates
    }

    /// Volatile compound predicates; not part of equality
    pub fn volatile_compound_predicates(&self) -> &[StarPredicate] {
        &self.volatile_compound_predicates
    }

    /// Non-group-by predicates in bit position order
    pub fn non_group_by_predicates(&self) -> &[ListColumnPredicate] {
        &self.non_group_by_predicates
    }

    /// Canonical SQL text of each compound predicate
    ///
    /// Equal keys render equal text, so this is what segment headers carry.
    /// [`AggregationKey::where_clause`] keeps the predicates' own order.
    pub fn compound_predicate_sql(&self, dialect: &dyn SqlDialect) -> Vec<String> {
        self.compound_predicates
            .iter()
            .map(|p| p.canonical_sql(dialect))
            .collect()
    }

    /// Conjunction of every restriction, as a SQL `WHERE` fragment
    ///
    /// Returns `None` when the key imposes no restriction.
    pub fn where_clause(&self, dialect: &dyn SqlDialect) -> Option<String> {
        let mut parts: Vec<String> = self
            .compound_predicates
            .iter()
            .chain(self.volatile_compound_predicates.iter())
            .map(|p| p.sql(dialect))
            .collect();
        for p in &self.non_group_by_predicates {
            let mut buf = String::new();
            p.to_sql(dialect, &mut buf);
            parts.push(buf);
        }
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(parts.join(" AND ")),
        }
    }

    /// Memoized hash code
    pub fn hash_code(&self) -> u64 {
        *self.hash.get_or_init(|| self.compute_hash())
    }

    fn compute_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.constrained_columns.hash(&mut hasher);
        self.star.id().hash(&mut hasher);
        self.compound_predicates.len().hash(&mut hasher);
        for p in &self.compound_predicates {
            p.constrained_column_bit_key().hash(&mut hasher);
        }
        self.non_group_by_columns.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for AggregationKey {
    fn eq(&self, other: &Self) -> bool {
        self.constrained_columns == other.constrained_columns
            && self.star.id() == other.star.id()
            && self.non_group_by_columns == other.non_group_by_columns
            && self.compound_predicates.len() == other.compound_predicates.len()
            && self
                .compound_predicates
                .iter()
                .zip(&other.compound_predicates)
                .all(|(a, b)| a.equal_constraint(b))
            && self.non_group_by_predicates.len() == other.non_group_by_predicates.len()
            && self
                .non_group_by_predicates
                .iter()
                .zip(&other.non_group_by_predicates)
                .all(|(a, b)| a.equal_constraint(b))
    }
}

impl Eq for AggregationKey {}

impl Hash for AggregationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Display for AggregationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let compound: Vec<String> = self.compound_predicates.iter().map(|p| p.to_string()).collect();
        let non_group_by: Vec<String> = self
            .non_group_by_predicates
            .iter()
            .map(|p| p.to_string())
            .collect();
        write!(
            f,
            "{} {}\n{{{}}}\n{{{}}}",
            self.star.fact_table(),
            self.constrained_columns,
            compound.join(", "),
            non_group_by.join(", ")
        )
    }
}

/// Mutable staging area for an [`AggregationKey`]
#[derive(Debug, Clone)]
pub struct AggregationKeyBuilder {
    star: Arc<Star>,
    constrained_columns: BitKey,
    non_group_by_columns: Option<BitKey>,
    compound_predicates: Vec<StarPredicate>,
    volatile_compound_predicates: Vec<StarPredicate>,
    non_group_by_predicates: Vec<ListColumnPredicate>,
}

impl AggregationKeyBuilder {
    /// Start a key over `star` grouping by `constrained_columns`
    pub fn new(star: Arc<Star>, constrained_columns: BitKey) -> Self {
        Self {
            star,
            constrained_columns,
            non_group_by_columns: None,
            compound_predicates: Vec::new(),
            volatile_compound_predicates: Vec::new(),
            non_group_by_predicates: Vec::new(),
        }
    }

    /// Start from the parts of a cell request
    pub fn from_cell_request(request: &CellRequest) -> Self {
        Self {
            star: Arc::clone(request.star()),
            constrained_columns: request.constrained_columns().clone(),
            non_group_by_columns: request.non_group_by_columns().cloned(),
            compound_predicates: request.compound_predicates().values().cloned().collect(),
            volatile_compound_predicates: request
                .volatile_compound_predicates()
                .values()
                .cloned()
                .collect(),
            non_group_by_predicates: request.non_group_by_predicates().values().cloned().collect(),
        }
    }

    /// Set the non-group-by columns
    pub fn non_group_by_columns(mut self, columns: BitKey) -> Self {
        self.non_group_by_columns = Some(columns);
        self
    }

    /// Append a compound predicate
    pub fn compound_predicate(mut self, predicate: StarPredicate) -> Self {
        self.compound_predicates.push(predicate);
        self
    }

    /// Append a volatile compound predicate
    pub fn volatile_compound_predicate(mut self, predicate: StarPredicate) -> Self {
        self.volatile_compound_predicates.push(predicate);
        self
    }

    /// Append a non-group-by predicate
    pub fn non_group_by_predicate(mut self, predicate: ListColumnPredicate) -> Self {
        self.non_group_by_predicates.push(predicate);
        self
    }

    /// Conjoin `predicate` onto the compound predicate at `index`
    ///
    /// Both must constrain the same columns.
    pub fn and_in_place(&mut self, index: usize, predicate: &StarPredicate) -> Result<(), PredicateError> {
        let len = self.compound_predicates.len();
        let slot = self
            .compound_predicates
            .get_mut(index)
            .ok_or(PredicateError::NoSuchPredicate { index, len })?;

        let expected = slot.constrained_column_bit_key();
        let actual = predicate.constrained_column_bit_key();
        if expected != actual {
            return Err(PredicateError::BitKeyMismatch { expected, actual });
        }
        *slot = slot.and(predicate);
        Ok(())
    }

    /// Finish the key
    pub fn build(self) -> AggregationKey {
        AggregationKey::new(
            self.constrained_columns,
            self.non_group_by_columns,
            self.star,
            self.compound_predicates,
            Some(self.volatile_compound_predicates),
            Some(self.non_group_by_predicates),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::star::{AnsiDialect, StarColumn};
    use crate::value::Value;
    use std::collections::HashSet;

    fn star() -> Arc<Star> {
        Star::builder("sales_fact")
            .column("store", "country")
            .column("store", "state")
            .column("time", "year")
            .build()
    }

    fn col(star: &Star, pos: usize) -> StarColumn {
        star.column(pos).unwrap().clone()
    }

    fn pair(star: &Star, c: &str, s: &str) -> StarPredicate {
        StarPredicate::value(col(star, 0), c.into()).and(&StarPredicate::value(col(star, 1), s.into()))
    }

    #[test]
    fn test_defaults() {
        let s = star();
        let key = AggregationKey::new(BitKey::from_positions(3, [2]), None, s, vec![], None, None);
        assert!(key.non_group_by_columns().is_empty());
        assert!(key.volatile_compound_predicates().is_empty());
        assert!(key.non_group_by_predicates().is_empty());
        assert_eq!(key.where_clause(&AnsiDialect::new()), None);
    }

    #[test]
    fn test_equal_keys_hash_equal() {
        let s = star();
        let group_by = BitKey::from_positions(3, [2]);
        let a = AggregationKeyBuilder::new(Arc::clone(&s), group_by.clone())
            .compound_predicate(pair(&s, "USA", "CA").or(&pair(&s, "Canada", "BC")))
            .build();
        let b = AggregationKeyBuilder::new(Arc::clone(&s), group_by)
            .compound_predicate(pair(&s, "Canada", "BC").or(&pair(&s, "USA", "CA")))
            .build();
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());

        let set: HashSet<AggregationKey> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_equal_keys_render_equal_predicate_sql() {
        let s = star();
        let a = AggregationKeyBuilder::new(Arc::clone(&s), BitKey::new(3))
            .compound_predicate(pair(&s, "USA", "CA").or(&pair(&s, "Canada", "BC")))
            .build();
        let b = AggregationKeyBuilder::new(Arc::clone(&s), BitKey::new(3))
            .compound_predicate(pair(&s, "Canada", "BC").or(&pair(&s, "USA", "CA")))
            .build();
        let dialect = AnsiDialect::new();

        assert_eq!(a, b);
        assert_eq!(a.compound_predicate_sql(&dialect), b.compound_predicate_sql(&dialect));
        assert_ne!(a.where_clause(&dialect), b.where_clause(&dialect));
    }

    #[test]
    fn test_same_columns_different_values() {
        let s = star();
        let group_by = BitKey::from_positions(3, [2]);
        let a = AggregationKeyBuilder::new(Arc::clone(&s), group_by.clone())
            .compound_predicate(pair(&s, "USA", "CA"))
            .build();
        let b = AggregationKeyBuilder::new(Arc::clone(&s), group_by)
            .compound_predicate(pair(&s, "USA", "OR"))
            .build();
        assert_eq!(a.hash_code(), b.hash_code());
        assert_ne!(a, b);
    }

    #[test]
    fn test_star_identity_matters() {
        let s1 = star();
        let s2 = star();
        let a = AggregationKey::new(BitKey::new(3), None, s1, vec![], None, None);
        let b = AggregationKey::new(BitKey::new(3), None, s2, vec![], None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_volatile_predicates_do_not_affect_equality() {
        let s = star();
        let a = AggregationKeyBuilder::new(Arc::clone(&s), BitKey::new(3))
            .volatile_compound_predicate(pair(&s, "USA", "CA"))
            .build();
        let b = AggregationKeyBuilder::new(Arc::clone(&s), BitKey::new(3)).build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_group_by_predicates_compare_by_values() {
        let s = star();
        let ngb = |values: [&str; 2]| {
            AggregationKeyBuilder::new(Arc::clone(&s), BitKey::new(3))
                .non_group_by_columns(BitKey::from_positions(3, [1]))
                .non_group_by_predicate(ListColumnPredicate::from_values(
                    col(&s, 1),
                    values.map(Value::from),
                ))
                .build()
        };
        assert_eq!(ngb(["CA", "OR"]), ngb(["OR", "CA"]));
        assert_ne!(ngb(["CA", "OR"]), ngb(["CA", "WA"]));
    }

    #[test]
    fn test_and_in_place() {
        let s = star();
        let mut builder = AggregationKeyBuilder::new(Arc::clone(&s), BitKey::new(3))
            .compound_predicate(pair(&s, "USA", "CA"));

        builder.and_in_place(0, &pair(&s, "USA", "OR")).unwrap();

        let year = StarPredicate::value(col(&s, 2), Value::Int(1997));
        assert!(matches!(
            builder.and_in_place(0, &year),
            Err(PredicateError::BitKeyMismatch { .. })
        ));
        assert_eq!(
            builder.and_in_place(3, &year),
            Err(PredicateError::NoSuchPredicate { index: 3, len: 1 })
        );

        let key = builder.build();
        match &key.compound_predicates()[0] {
            StarPredicate::And(and) => assert_eq!(and.children().len(), 4),
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_display_and_sql() {
        let s = star();
        let key = AggregationKeyBuilder::new(Arc::clone(&s), BitKey::from_positions(3, [2]))
            .compound_predicate(pair(&s, "USA", "CA"))
            .non_group_by_predicate(ListColumnPredicate::from_values(col(&s, 2), [Value::Int(1997)]))
            .build();
        let text = key.to_string();
        assert!(text.starts_with("sales_fact 0x0000000000000004\n"));
        assert!(text.contains("store.state=CA"));

        let dialect = AnsiDialect::new();
        assert_eq!(
            key.compound_predicate_sql(&dialect),
            vec![r#"("store"."country" = 'USA' AND "store"."state" = 'CA')"#]
        );
        assert_eq!(
            key.where_clause(&dialect).unwrap(),
            r#"("store"."country" = 'USA' AND "store"."state" = 'CA') AND "time"."year" = 1997"#
        );
    }
}
