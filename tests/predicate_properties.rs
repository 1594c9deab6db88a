//! Property tests for compound predicate compilation
//!
//! Random tuple lists over a four-column star are compiled and checked for
//! grouping, satisfiability, single-column folding and row acceptance.

use proptest::prelude::*;
use starcache::bitkey::BitKey;
use starcache::compound::{compile_predicate, CompoundPredicateInfo, PredicateCompilation};
use starcache::member::{Level, Measure, Member, StaticMeasureGroup};
use starcache::predicate::StarPredicate;
use starcache::star::Star;
use starcache::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

const COUNTRIES: [&str; 3] = ["USA", "Canada", "Mexico"];
const STATES: [&str; 3] = ["CA", "OR", "BC"];
const CITIES: [&str; 2] = ["Portland", "Vancouver"];
const GENDERS: [&str; 2] = ["F", "M"];

const COUNTRY: usize = 0;
const STATE: usize = 1;
const CITY: usize = 2;
const GENDER: usize = 3;

// =============================================================================
// Fixture
// =============================================================================

struct Schema {
    measure: Measure,
    country: Arc<Level>,
    state: Arc<Level>,
    city: Arc<Level>,
    gender: Arc<Level>,
    brand: Arc<Level>,
}

fn schema() -> Schema {
    let star = Star::builder("sales_fact")
        .column("store", "country")
        .column("store", "state")
        .column("store", "city")
        .column("customer", "gender")
        .build();
    let mg = StaticMeasureGroup::new("Sales", star)
        .link("Store", "country", "store", "country")
        .link("Store", "state", "store", "state")
        .link("Store", "city", "store", "city")
        .link("Gender", "gender", "customer", "gender");
    Schema {
        measure: Measure::stored("Unit Sales", Arc::new(mg)),
        country: Level::new("Store", "Country", ["country"]),
        state: Level::new("Store", "State", ["country", "state"]),
        city: Level::new("Store", "City", ["country", "state", "city"]),
        gender: Level::new("Gender", "Gender", ["gender"]),
        // Not joined to the sales star
        brand: Level::new("Product", "Brand", ["brand"]),
    }
}

/// Shape of one generated tuple
#[derive(Debug, Clone)]
enum TupleSpec {
    Country(usize),
    State(usize, usize),
    City(usize, usize, usize),
    StateGender(usize, usize, usize),
    GenderState(usize, usize, usize),
    Unlinked,
    Empty,
}

impl TupleSpec {
    fn members(&self, s: &Schema) -> Vec<Member> {
        match *self {
            TupleSpec::Country(c) => vec![Member::regular(&s.country, COUNTRIES[c], [COUNTRIES[c]])],
            TupleSpec::State(c, st) => vec![state(s, c, st)],
            TupleSpec::City(c, st, t) => vec![Member::regular(
                &s.city,
                CITIES[t],
                [COUNTRIES[c], STATES[st], CITIES[t]],
            )],
            TupleSpec::StateGender(c, st, g) => vec![state(s, c, st), gender(s, g)],
            TupleSpec::GenderState(c, st, g) => vec![gender(s, g), state(s, c, st)],
            TupleSpec::Unlinked => vec![Member::regular(&s.brand, "Acme", ["Acme"])],
            TupleSpec::Empty => vec![],
        }
    }

    /// Column bindings, or `None` when the tuple cannot be expressed
    fn bindings(&self) -> Option<Vec<(usize, &'static str)>> {
        match *self {
            TupleSpec::Country(c) => Some(vec![(COUNTRY, COUNTRIES[c])]),
            TupleSpec::State(c, st) => Some(vec![(COUNTRY, COUNTRIES[c]), (STATE, STATES[st])]),
            TupleSpec::City(c, st, t) => Some(vec![
                (COUNTRY, COUNTRIES[c]),
                (STATE, STATES[st]),
                (CITY, CITIES[t]),
            ]),
            TupleSpec::StateGender(c, st, g) | TupleSpec::GenderState(c, st, g) => Some(vec![
                (COUNTRY, COUNTRIES[c]),
                (STATE, STATES[st]),
                (GENDER, GENDERS[g]),
            ]),
            TupleSpec::Unlinked | TupleSpec::Empty => None,
        }
    }

    fn bit_key(&self) -> Option<BitKey> {
        self.bindings()
            .map(|b| BitKey::from_positions(4, b.into_iter().map(|(pos, _)| pos)))
    }

    fn matches(&self, row: &HashMap<usize, Value>) -> bool {
        self.bindings().map_or(false, |b| {
            b.into_iter()
                .all(|(pos, v)| row.get(&pos) == Some(&Value::from(v)))
        })
    }
}

fn state(s: &Schema, c: usize, st: usize) -> Member {
    Member::regular(&s.state, STATES[st], [COUNTRIES[c], STATES[st]])
}

fn gender(s: &Schema, g: usize) -> Member {
    Member::regular(&s.gender, GENDERS[g], [GENDERS[g]])
}

fn tuples(s: &Schema, specs: &[TupleSpec]) -> Vec<Vec<Member>> {
    specs.iter().map(|spec| spec.members(s)).collect()
}

// =============================================================================
// Strategies
// =============================================================================

fn tuple_spec() -> impl Strategy<Value = TupleSpec> {
    prop_oneof![
        3 => (0..3usize).prop_map(TupleSpec::Country),
        3 => (0..3usize, 0..3usize).prop_map(|(c, s)| TupleSpec::State(c, s)),
        2 => (0..3usize, 0..3usize, 0..2usize).prop_map(|(c, s, t)| TupleSpec::City(c, s, t)),
        2 => (0..3usize, 0..3usize, 0..2usize).prop_map(|(c, s, g)| TupleSpec::StateGender(c, s, g)),
        1 => (0..3usize, 0..3usize, 0..2usize).prop_map(|(c, s, g)| TupleSpec::GenderState(c, s, g)),
        1 => Just(TupleSpec::Unlinked),
        1 => Just(TupleSpec::Empty),
    ]
}

fn country_or_unlinked() -> impl Strategy<Value = TupleSpec> {
    prop_oneof![
        4 => (0..3usize).prop_map(TupleSpec::Country),
        1 => Just(TupleSpec::Unlinked),
    ]
}

fn row() -> impl Strategy<Value = HashMap<usize, Value>> {
    (0..3usize, 0..3usize, 0..2usize, 0..2usize).prop_map(|(c, s, t, g)| {
        HashMap::from([
            (COUNTRY, Value::from(COUNTRIES[c])),
            (STATE, Value::from(STATES[s])),
            (CITY, Value::from(CITIES[t])),
            (GENDER, Value::from(GENDERS[g])),
        ])
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_groups_cover_bit_key(specs in prop::collection::vec(tuple_spec(), 0..12)) {
        let s = schema();
        let info = CompoundPredicateInfo::new(&tuples(&s, &specs), &s.measure);

        let satisfiable: Vec<BitKey> = specs.iter().filter_map(TupleSpec::bit_key).collect();
        let grouped: usize = info.groups().iter().map(|g| g.tuples().len()).sum();
        prop_assert_eq!(grouped, satisfiable.len());

        for key in &satisfiable {
            let owners = info.groups().iter().filter(|g| g.bit_key() == key).count();
            prop_assert_eq!(owners, 1);
        }

        if let Some(bit_key) = info.bit_key() {
            let union = info
                .groups()
                .iter()
                .fold(BitKey::new(4), |acc, g| acc.or(g.bit_key()));
            prop_assert_eq!(&union, bit_key);
            if let Some(predicate) = info.predicate() {
                prop_assert_eq!(&predicate.constrained_column_bit_key(), bit_key);
            }
        }
    }

    #[test]
    fn prop_unsatisfiable_iff_no_tuple_resolves(specs in prop::collection::vec(tuple_spec(), 0..8)) {
        let s = schema();
        let compiled = compile_predicate(&tuples(&s, &specs), &s.measure);
        let any_resolves = specs.iter().any(|spec| spec.bindings().is_some());

        prop_assert_eq!(compiled.is_satisfiable(), any_resolves);
        if !any_resolves {
            prop_assert_eq!(compiled, PredicateCompilation::Unsatisfiable);
        } else {
            prop_assert!(compiled.predicate().is_some());
        }
    }

    #[test]
    fn prop_single_column_folds_to_list(specs in prop::collection::vec(country_or_unlinked(), 1..10)) {
        let s = schema();
        let compiled = compile_predicate(&tuples(&s, &specs), &s.measure);
        let countries = specs
            .iter()
            .filter(|spec| matches!(spec, TupleSpec::Country(_)))
            .count();

        if countries == 0 {
            prop_assert!(!compiled.is_satisfiable());
        } else {
            prop_assert_eq!(compiled.bit_key().map(BitKey::cardinality), Some(1));
            match compiled.predicate() {
                Some(StarPredicate::List(list)) => {
                    prop_assert_eq!(list.column().bit_position, COUNTRY);
                    prop_assert_eq!(list.predicates().len(), countries);
                }
                other => prop_assert!(false, "expected IN list, got {:?}", other),
            }
        }
    }

    #[test]
    fn prop_evaluate_agrees_with_tuples(
        specs in prop::collection::vec(tuple_spec(), 1..10),
        rows in prop::collection::vec(row(), 1..16),
    ) {
        let s = schema();
        let compiled = compile_predicate(&tuples(&s, &specs), &s.measure);
        let Some(predicate) = compiled.predicate() else {
            return Ok(());
        };

        for row in &rows {
            let expected = specs.iter().any(|spec| spec.matches(row));
            prop_assert_eq!(predicate.evaluate(row), expected, "row {:?}", row);
        }
    }
}

// =============================================================================
// Fixed cases
// =============================================================================

#[test]
fn test_mixed_member_order_shares_group() {
    let s = schema();
    let specs = [TupleSpec::StateGender(0, 0, 0), TupleSpec::GenderState(1, 2, 1)];
    let info = CompoundPredicateInfo::new(&tuples(&s, &specs), &s.measure);

    assert_eq!(info.groups().len(), 1);
    assert_eq!(info.groups()[0].tuples().len(), 2);
    assert_eq!(info.bit_key(), Some(&BitKey::from_positions(4, [0, 1, 3])));
}

// =============================================================================
// Role-playing dimensions
// =============================================================================

/// Order and ship dates share key column names but not star columns
struct DateSchema {
    measure: Measure,
    order_year: Arc<Level>,
    order_month: Arc<Level>,
    ship_year: Arc<Level>,
    ship_month: Arc<Level>,
}

fn date_schema() -> DateSchema {
    let star = Star::builder("sales_fact")
        .column("order_time", "year")
        .column("order_time", "month")
        .column("ship_time", "year")
        .column("ship_time", "month")
        .build();
    let mg = StaticMeasureGroup::new("Sales", star)
        .link("Order", "year", "order_time", "year")
        .link("Order", "month", "order_time", "month")
        .link("Ship", "year", "ship_time", "year")
        .link("Ship", "month", "ship_time", "month");
    DateSchema {
        measure: Measure::stored("Unit Sales", Arc::new(mg)),
        order_year: Level::new("Order", "Year", ["year"]),
        order_month: Level::new("Order", "Month", ["year", "month"]),
        ship_year: Level::new("Ship", "Year", ["year"]),
        ship_month: Level::new("Ship", "Month", ["year", "month"]),
    }
}

/// One date member: (ship?, year, Some(month) for month level)
type DateSpec = (bool, i64, Option<i64>);

fn date_member(s: &DateSchema, (ship, year, month): DateSpec) -> Member {
    match (ship, month) {
        (false, None) => Member::regular(&s.order_year, year.to_string(), [year]),
        (false, Some(m)) => Member::regular(&s.order_month, format!("{}-{}", year, m), [year, m]),
        (true, None) => Member::regular(&s.ship_year, year.to_string(), [year]),
        (true, Some(m)) => Member::regular(&s.ship_month, format!("{}-{}", year, m), [year, m]),
    }
}

/// Star positions and values a date member binds
fn date_bindings((ship, year, month): DateSpec) -> Vec<(usize, i64)> {
    let base = if ship { 2 } else { 0 };
    let mut out = vec![(base, year)];
    if let Some(m) = month {
        out.push((base + 1, m));
    }
    out
}

fn date_spec() -> impl Strategy<Value = DateSpec> {
    (any::<bool>(), 1997..1999i64, prop::option::of(1..3i64))
}

/// An order member and a ship member, in either order
fn date_tuple() -> impl Strategy<Value = Vec<DateSpec>> {
    (date_spec(), date_spec(), any::<bool>()).prop_map(|(mut a, mut b, swap)| {
        a.0 = false;
        b.0 = true;
        if swap {
            vec![b, a]
        } else {
            vec![a, b]
        }
    })
}

proptest! {
    #[test]
    fn prop_role_playing_predicate_matches_bit_key(
        specs in prop::collection::vec(date_tuple(), 1..8),
        rows in prop::collection::vec((1997..1999i64, 1..3i64, 1997..1999i64, 1..3i64), 1..16),
    ) {
        let s = date_schema();
        let tuples: Vec<Vec<Member>> = specs
            .iter()
            .map(|t| t.iter().map(|m| date_member(&s, *m)).collect())
            .collect();
        let info = CompoundPredicateInfo::new(&tuples, &s.measure);

        let bit_key = info.bit_key().unwrap();
        let predicate = info.predicate().unwrap();
        prop_assert_eq!(&predicate.constrained_column_bit_key(), bit_key);

        for (oy, om, sy, sm) in rows {
            let row: HashMap<usize, Value> = [
                (0, Value::Int(oy)),
                (1, Value::Int(om)),
                (2, Value::Int(sy)),
                (3, Value::Int(sm)),
            ]
            .into();
            let expected = specs.iter().any(|t| {
                t.iter()
                    .flat_map(|m| date_bindings(*m))
                    .all(|(pos, v)| row.get(&pos) == Some(&Value::Int(v)))
            });
            prop_assert_eq!(predicate.evaluate(&row), expected, "row {:?}", row);
        }
    }
}
