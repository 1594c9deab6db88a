//! Compound group builder
//!
//! Turns a list of member tuples into one predicate plus the BitKey of the
//! columns it constrains, for a single measure's star.
//!
//! Tuples are grouped by the columns they touch. Given the members
//!
//! ```text
//! [USA].[CA]
//! [Canada].[BC]
//! [USA].[CA].[San Francisco]
//! [USA].[OR].[Portland]
//! ```
//!
//! the builder forms two groups:
//!
//! ```text
//! {country, state}:        [USA].[CA], [Canada].[BC]
//! {country, state, city}:  [USA].[CA].[San Francisco], [USA].[OR].[Portland]
//! ```
//!
//! Each tuple becomes an AND of its key bindings, each group an OR of its
//! tuples, and the result an OR of the groups. When everything lands on one
//! column the tree is folded into a single `column IN (...)` list.
//!
//! A tuple that cannot be expressed against the star (an unresolvable key
//! column, a calculated member, or no members at all) is skipped. Only when
//! every tuple is skipped is the whole compilation unsatisfiable.

use crate::bitkey::BitKey;
use crate::error::PredicateError;
use crate::member::{CalcFormula, Measure, MeasureGroup, Member, RegularMember};
use crate::metrics;
use crate::predicate::{or_all, ListColumnPredicate, StarPredicate};
use crate::star::StarColumn;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Outcome of compiling a tuple list
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateCompilation {
    /// No tuple could be expressed against the measure's star
    Unsatisfiable,
    /// Some tuple was satisfiable but none constrained any column
    Unconstrained {
        /// Empty key sized for the star
        bit_key: BitKey,
    },
    /// Columns and the predicate over them
    Constrained {
        /// Columns the predicate constrains
        bit_key: BitKey,
        /// The compound predicate
        predicate: StarPredicate,
    },
}

impl PredicateCompilation {
    /// Whether any tuple could be expressed
    pub fn is_satisfiable(&self) -> bool {
        !matches!(self, PredicateCompilation::Unsatisfiable)
    }

    /// Constrained columns, if satisfiable
    pub fn bit_key(&self) -> Option<&BitKey> {
        match self {
            PredicateCompilation::Unsatisfiable => None,
            PredicateCompilation::Unconstrained { bit_key }
            | PredicateCompilation::Constrained { bit_key, .. } => Some(bit_key),
        }
    }

    /// The predicate, if any column is constrained
    pub fn predicate(&self) -> Option<&StarPredicate> {
        match self {
            PredicateCompilation::Constrained { predicate, .. } => Some(predicate),
            _ => None,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            PredicateCompilation::Unsatisfiable => "unsatisfiable",
            PredicateCompilation::Unconstrained { .. } => "unconstrained",
            PredicateCompilation::Constrained { .. } => "constrained",
        }
    }
}

/// Satisfiable tuples that constrain the same columns
#[derive(Debug, Clone)]
pub struct CompoundGroup {
    bit_key: BitKey,
    tuples: Vec<Vec<Arc<RegularMember>>>,
}

impl CompoundGroup {
    /// Columns every tuple in the group constrains
    pub fn bit_key(&self) -> &BitKey {
        &self.bit_key
    }

    /// Tuples with visual totals unwrapped
    pub fn tuples(&self) -> &[Vec<Arc<RegularMember>>] {
        &self.tuples
    }
}

/// Groups keyed by BitKey, in first-seen order
#[derive(Debug, Default)]
struct CompoundGroupMap {
    groups: Vec<CompoundGroup>,
    index: HashMap<BitKey, usize>,
}

impl CompoundGroupMap {
    fn add(&mut self, bit_key: BitKey, tuple: Vec<Arc<RegularMember>>) {
        match self.index.get(&bit_key) {
            Some(&i) => self.groups[i].tuples.push(tuple),
            None => {
                self.index.insert(bit_key.clone(), self.groups.len());
                self.groups.push(CompoundGroup {
                    bit_key,
                    tuples: vec![tuple],
                });
            }
        }
    }
}

/// Compile tuples against a measure's star
///
/// This is the entry point the query layer uses; see
/// [`CompoundPredicateInfo`] for the variant that also keeps the groups and
/// the rendered SQL.
pub fn compile_predicate(tuples: &[Vec<Member>], measure: &Measure) -> PredicateCompilation {
    CompoundPredicateInfo::new(tuples, measure).compilation
}

/// A compiled compound predicate for one measure
#[derive(Debug, Clone)]
pub struct CompoundPredicateInfo {
    measure: Measure,
    compilation: PredicateCompilation,
    predicate_string: Option<String>,
    groups: Vec<CompoundGroup>,
}

impl CompoundPredicateInfo {
    /// Compile `tuples` against the star of `measure`
    ///
    /// A calculated measure has no base star and compiles to unsatisfiable.
    pub fn new(tuples: &[Vec<Member>], measure: &Measure) -> Self {
        let (compilation, groups) = match measure.measure_group() {
            Some(mg) => build(tuples, mg.as_ref()),
            None => {
                debug!(measure = %measure.name(), "calculated measure has no base star");
                metrics::record_compilation("unsatisfiable", 0);
                (PredicateCompilation::Unsatisfiable, Vec::new())
            }
        };
        let mut info = Self {
            measure: measure.clone(),
            compilation,
            predicate_string: None,
            groups,
        };
        info.predicate_string = info.render();
        info
    }

    fn render(&self) -> Option<String> {
        let star = self.measure.star()?;
        self.compilation.predicate().map(|p| p.sql(star.dialect()))
    }

    /// The compiled predicate, if any column is constrained
    pub fn predicate(&self) -> Option<&StarPredicate> {
        self.compilation.predicate()
    }

    /// Constrained columns, if satisfiable
    pub fn bit_key(&self) -> Option<&BitKey> {
        self.compilation.bit_key()
    }

    /// SQL text of the predicate in the star's dialect
    pub fn predicate_string(&self) -> Option<&str> {
        self.predicate_string.as_deref()
    }

    /// Whether any tuple could be expressed
    pub fn is_satisfiable(&self) -> bool {
        self.compilation.is_satisfiable()
    }

    /// Measure the predicate was compiled for
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// Full compilation outcome
    pub fn compilation(&self) -> &PredicateCompilation {
        &self.compilation
    }

    /// Compound groups in first-seen order
    pub fn groups(&self) -> &[CompoundGroup] {
        &self.groups
    }

    /// Conjoin another compound predicate over the same columns
    ///
    /// Both sides must be constrained over equal BitKeys; anything else is a
    /// caller bug reported as [`PredicateError::BitKeyMismatch`].
    pub fn and(mut self, other: &CompoundPredicateInfo) -> Result<Self, PredicateError> {
        let (bit_key, predicate) = match (&self.compilation, &other.compilation) {
            (
                PredicateCompilation::Constrained {
                    bit_key: mine,
                    predicate: p1,
                },
                PredicateCompilation::Constrained {
                    bit_key: theirs,
                    predicate: p2,
                },
            ) if mine == theirs => (mine.clone(), p1.and(p2)),
            _ => {
                return Err(PredicateError::BitKeyMismatch {
                    expected: self.bit_key().cloned().unwrap_or_default(),
                    actual: other.bit_key().cloned().unwrap_or_default(),
                })
            }
        };
        self.compilation = PredicateCompilation::Constrained { bit_key, predicate };
        self.predicate_string = self.render();
        Ok(self)
    }
}

impl fmt::Display for CompoundPredicateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.compilation {
            PredicateCompilation::Unsatisfiable => write!(f, "<unsatisfiable>"),
            PredicateCompilation::Unconstrained { bit_key } => write!(f, "{} <all>", bit_key),
            PredicateCompilation::Constrained { bit_key, predicate } => {
                write!(f, "{} {}", bit_key, predicate)
            }
        }
    }
}

fn build(tuples: &[Vec<Member>], mg: &dyn MeasureGroup) -> (PredicateCompilation, Vec<CompoundGroup>) {
    let column_count = mg.star().column_count();
    let (group_map, unsatisfiable) = make_compound_groups(column_count, mg, tuples);

    if unsatisfiable == tuples.len() {
        debug!(
            measure_group = %mg.name(),
            tuples = tuples.len(),
            "no tuple can be constrained"
        );
        metrics::record_compilation("unsatisfiable", unsatisfiable);
        return (PredicateCompilation::Unsatisfiable, Vec::new());
    }

    let groups = group_map.groups;
    let compilation = match make_compound_predicate(&groups, mg) {
        None => PredicateCompilation::Unconstrained {
            bit_key: BitKey::new(column_count),
        },
        Some(predicate) => {
            let bit_key = groups
                .iter()
                .fold(BitKey::new(column_count), |acc, g| acc.or(&g.bit_key));
            let predicate = if bit_key.cardinality() == 1 {
                fold_single_column(predicate)
            } else {
                predicate
            };
            PredicateCompilation::Constrained { bit_key, predicate }
        }
    };

    debug!(
        measure_group = %mg.name(),
        groups = groups.len(),
        unsatisfiable,
        outcome = compilation.outcome(),
        "compiled compound predicate"
    );
    metrics::record_compilation(compilation.outcome(), unsatisfiable);
    (compilation, groups)
}

/// Group satisfiable tuples by the columns they constrain
///
/// Returns the groups and the number of tuples that were skipped.
fn make_compound_groups(
    column_count: usize,
    mg: &dyn MeasureGroup,
    tuples: &[Vec<Member>],
) -> (CompoundGroupMap, usize) {
    let mut map = CompoundGroupMap::default();
    let mut unsatisfiable = 0;

    for (n, tuple) in tuples.iter().enumerate() {
        match constrain_tuple(column_count, mg, tuple) {
            Some((bit_key, members)) => {
                // "All" members constrain nothing
                if !bit_key.is_empty() {
                    map.add(bit_key, members);
                }
            }
            None => {
                trace!(tuple = n, "tuple is unsatisfiable");
                unsatisfiable += 1;
            }
        }
    }
    (map, unsatisfiable)
}

/// Resolve every key column of a tuple, or `None` if any cannot be
fn constrain_tuple(
    column_count: usize,
    mg: &dyn MeasureGroup,
    tuple: &[Member],
) -> Option<(BitKey, Vec<Arc<RegularMember>>)> {
    if tuple.is_empty() {
        return None;
    }
    let mut bit_key = BitKey::new(column_count);
    let mut members = Vec::with_capacity(tuple.len());
    for member in tuple {
        let Some(regular) = member.as_regular() else {
            debug!(member = %member, "calculated member in tuple");
            return None;
        };
        for (key_column, _) in regular.key_bindings() {
            let column = mg.resolve_column(regular.dimension(), key_column)?;
            bit_key.set(column.bit_position);
        }
        members.push(Arc::clone(regular));
    }
    Some((bit_key, members))
}

/// OR of groups, each an OR of per-tuple ANDs
///
/// The dimension of each tuple position in the first group becomes the
/// router for that position in later groups. A router only applies to
/// members of its own dimension, and only to columns in the group's BitKey.
fn make_compound_predicate(groups: &[CompoundGroup], mg: &dyn MeasureGroup) -> Option<StarPredicate> {
    let mut routers: Vec<&str> = Vec::new();
    let mut group_predicates = Vec::with_capacity(groups.len());

    for (count, group) in groups.iter().enumerate() {
        let mut group_predicate: Option<StarPredicate> = None;
        for tuple in &group.tuples {
            let mut tuple_predicate: Option<StarPredicate> = None;
            for (i, member) in tuple.iter().enumerate() {
                if count == 0 && routers.len() == i {
                    routers.push(member.dimension());
                }
                let router = routers.get(i).copied().unwrap_or(member.dimension());
                tuple_predicate =
                    member_predicate(mg, router, &group.bit_key, member, tuple_predicate);
            }
            if let Some(tp) = tuple_predicate {
                group_predicate = Some(match group_predicate {
                    None => tp,
                    Some(gp) => gp.or(&tp),
                });
            }
        }
        // A group that only holds "All" members constrains nothing
        if let Some(gp) = group_predicate {
            group_predicates.push(gp);
        }
    }
    or_all(group_predicates)
}

/// Conjoin one leaf per key column of `member` onto `acc`
fn member_predicate(
    mg: &dyn MeasureGroup,
    router: &str,
    bit_key: &BitKey,
    member: &RegularMember,
    mut acc: Option<StarPredicate>,
) -> Option<StarPredicate> {
    for (key_column, value) in member.key_bindings() {
        let Some(column) = resolve_routed(mg, router, bit_key, member, key_column) else {
            continue;
        };
        let leaf = StarPredicate::value(column, value.clone());
        acc = Some(match acc {
            None => leaf,
            Some(p) => p.and(&leaf),
        });
    }
    acc
}

/// Column a member's key column binds to
///
/// Role-playing dimensions share key column names, so a router for another
/// dimension would bind the member to the wrong column.
fn resolve_routed(
    mg: &dyn MeasureGroup,
    router: &str,
    bit_key: &BitKey,
    member: &RegularMember,
    key_column: &str,
) -> Option<StarColumn> {
    let own = member.dimension();
    if router == own {
        if let Some(column) = mg
            .resolve_column(router, key_column)
            .filter(|c| bit_key.get(c.bit_position))
        {
            return Some(column);
        }
    }
    mg.resolve_column(own, key_column)
}

/// Collapse a single-column tree into one IN list holding every leaf
fn fold_single_column(predicate: StarPredicate) -> StarPredicate {
    let Some(column) = predicate.constrained_columns().first().map(|c| (*c).clone()) else {
        return predicate;
    };
    let leaves = predicate.value_leaves().into_iter().cloned().collect();
    StarPredicate::List(ListColumnPredicate::new(column, leaves))
}

/// Compile a calculated member whose formula names stored members
///
/// `Aggregate({[CA], [OR]})`-style formulas become the OR of each member's
/// key bindings; set formulas become the OR of each tuple's AND. Any other
/// formula, or a calculated member nested in the formula, is rejected with
/// [`PredicateError::UnsupportedCalculatedMember`]. A member that is not
/// calculated compiles as a one-member tuple.
pub fn calculated_member_predicate(
    member: &Member,
    measure: &Measure,
) -> Result<CompoundPredicateInfo, PredicateError> {
    let calc = match member.unwrap_visual_total() {
        Member::Calculated(calc) => calc,
        other => return Ok(CompoundPredicateInfo::new(&[vec![other.clone()]], measure)),
    };
    let unsupported = || PredicateError::UnsupportedCalculatedMember {
        name: calc.name.clone(),
    };

    let tuples: Vec<Vec<Member>> = match &calc.formula {
        CalcFormula::Members(members) => members.iter().map(|m| vec![m.clone()]).collect(),
        CalcFormula::Set(tuples) => tuples.clone(),
        CalcFormula::Expression(expr) => {
            debug!(member = %calc.name, expression = %expr, "formula is not a member list");
            return Err(unsupported());
        }
    };
    if tuples.iter().flatten().any(|m| m.as_regular().is_none()) {
        return Err(unsupported());
    }
    Ok(CompoundPredicateInfo::new(&tuples, measure))
}

// ============================================================================
// Tests
// ============================================================================
