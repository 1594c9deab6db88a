//! Cell requests
//!
//! A [`CellRequest`] is the shape the query layer hands to key derivation:
//! the star, the group-by columns, and the predicates that restrict the
//! request. Predicate maps are ordered by BitKey so keys and SQL built from
//! the same request are always identical.

use crate::bitkey::BitKey;
use crate::compound::{CompoundPredicateInfo, PredicateCompilation};
use crate::predicate::{ListColumnPredicate, StarPredicate};
use crate::star::{Star, StarColumn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A request for cells of one measure's star
#[derive(Debug, Clone)]
pub struct CellRequest {
    star: Arc<Star>,
    constrained_columns: BitKey,
    non_group_by_columns: Option<BitKey>,
    compound_predicates: BTreeMap<BitKey, StarPredicate>,
    volatile_compound_predicates: BTreeMap<BitKey, StarPredicate>,
    non_group_by_predicates: BTreeMap<usize, ListColumnPredicate>,
}

impl CellRequest {
    /// Create an unconstrained request against `star`
    pub fn new(star: Arc<Star>) -> Self {
        let constrained_columns = BitKey::new(star.column_count());
        Self {
            star,
            constrained_columns,
            non_group_by_columns: None,
            compound_predicates: BTreeMap::new(),
            volatile_compound_predicates: BTreeMap::new(),
            non_group_by_predicates: BTreeMap::new(),
        }
    }

    /// Group by a column
    pub fn add_constrained_column(&mut self, column: &StarColumn) {
        self.constrained_columns.set(column.bit_position);
    }

    /// Add a compound predicate
    ///
    /// A second predicate over the same columns is conjoined with the first.
    pub fn add_compound_predicate(&mut self, predicate: StarPredicate) {
        insert_conjoined(&mut self.compound_predicates, predicate);
    }

    /// Add a compiled compound predicate
    ///
    /// Returns `false` when the compilation is unsatisfiable; such a request
    /// can never be answered from this star. An unconstrained compilation
    /// adds nothing.
    pub fn add_compound(&mut self, info: &CompoundPredicateInfo) -> bool {
        match info.compilation() {
            PredicateCompilation::Unsatisfiable => false,
            PredicateCompilation::Unconstrained { .. } => true,
            PredicateCompilation::Constrained { predicate, .. } => {
                self.add_compound_predicate(predicate.clone());
                true
            }
        }
    }

    /// Add a predicate that must not be shared across evaluations
    pub fn add_volatile_compound_predicate(&mut self, predicate: StarPredicate) {
        insert_conjoined(&mut self.volatile_compound_predicates, predicate);
    }

    /// Restrict a column that is not grouped by
    pub fn add_non_group_by_predicate(&mut self, predicate: ListColumnPredicate) {
        let pos = predicate.column().bit_position;
        self.non_group_by_columns
            .get_or_insert_with(|| BitKey::new(self.star.column_count()))
            .set(pos);
        self.non_group_by_predicates.insert(pos, predicate);
    }

    /// The star the request targets
    pub fn star(&self) -> &Arc<Star> {
        &self.star
    }

    /// Group-by columns
    pub fn constrained_columns(&self) -> &BitKey {
        &self.constrained_columns
    }

    /// Columns restricted without being grouped by
    pub fn non_group_by_columns(&self) -> Option<&BitKey> {
        self.non_group_by_columns.as_ref()
    }

    /// Compound predicates by BitKey
    pub fn compound_predicates(&self) -> &BTreeMap<BitKey, StarPredicate> {
        &self.compound_predicates
    }

    /// Volatile compound predicates by BitKey
    pub fn volatile_compound_predicates(&self) -> &BTreeMap<BitKey, StarPredicate> {
        &self.volatile_compound_predicates
    }

    /// Non-group-by predicates by bit position
    pub fn non_group_by_predicates(&self) -> &BTreeMap<usize, ListColumnPredicate> {
        &self.non_group_by_predicates
    }
}

fn insert_conjoined(map: &mut BTreeMap<BitKey, StarPredicate>, predicate: StarPredicate) {
    let bit_key = predicate.constrained_column_bit_key();
    let merged = match map.remove(&bit_key) {
        Some(existing) => existing.and(&predicate),
        None => predicate,
    };
    map.insert(bit_key, merged);
}
