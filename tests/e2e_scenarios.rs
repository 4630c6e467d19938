//! End-to-end scenarios run through the public `ScenarioRunner` surface,
//! each checked against a literal input/output pair.

use kigali_sim_engine::number::EngineNumber;
use kigali_sim_engine::operation::{Operation, OperationKind, YearMatcher};
use kigali_sim_engine::program::{ScenarioSpec, Stanza};
use kigali_sim_engine::scenario::ScenarioRunner;
use kigali_sim_engine::state::Channel;
use kigali_sim_engine::stream::Stream;
use rust_decimal_macros::dec;

const APPLICATION: &str = "Domestic Refrigeration";
const SUBSTANCE: &str = "HFC-134a";

fn one_year_scenario(name: &str, operations: Vec<Operation>) -> ScenarioSpec {
    let baseline = Stanza::new("default").with_operations(APPLICATION, SUBSTANCE, operations);
    ScenarioSpec {
        name: name.to_string(),
        baseline_stanza: baseline,
        ordered_policy_stanzas: vec![],
        start_year: 2025,
        end_year: 2025,
        trials: 1,
    }
}

fn initial_charge(kg_per_unit: rust_decimal::Decimal) -> Operation {
    Operation::new(
        0,
        OperationKind::InitialCharge {
            channel: Channel::Domestic,
            intensity: EngineNumber::new(kg_per_unit, "kg/unit"),
        },
    )
}

fn set_domestic(kg: rust_decimal::Decimal) -> Operation {
    Operation::new(
        1,
        OperationKind::Set {
            stream: Stream::Domestic,
            amount: EngineNumber::new(kg, "kg"),
            year_matcher: YearMatcher::All,
        },
    )
}

/// E1: `domestic = 100 kg`, `cap domestic to 50 kg` → `domestic = 50 kg`.
#[test]
fn e1_cap_by_mass_clamps_domestic_to_the_limit() {
    let ops = vec![
        initial_charge(dec!(2)),
        set_domestic(dec!(100)),
        Operation::new(
            2,
            OperationKind::Cap {
                stream: Stream::Domestic,
                limit: EngineNumber::new(dec!(50), "kg"),
                year_matcher: YearMatcher::All,
                displace_target: None,
            },
        ),
    ];
    let spec = one_year_scenario("E1", ops);
    let result = ScenarioRunner::new(&spec, 0).run().unwrap();
    let record = &result.records[0];
    assert_eq!(record.domestic.value, dec!(50));
}

/// E2: a units-form cap on `sales` must compare against new-equipment mass
/// *plus* this year's recharge, not new-equipment mass alone — a 50-unit cap
/// with a 20-unit priorEquipment recharging 10% at 1 kg/unit allows up to
/// `50*2 + 20*0.10*1 = 102 kg`, so a 100 kg baseline is left unchanged.
#[test]
fn e2_cap_by_units_accounts_for_recharge_on_top() {
    let ops = vec![
        initial_charge(dec!(2)),
        Operation::new(
            1,
            OperationKind::Recharge {
                fraction: EngineNumber::new(dec!(10), "%"),
                intensity: EngineNumber::new(dec!(1), "kg/unit"),
                year_matcher: YearMatcher::All,
            },
        ),
        set_domestic(dec!(100)),
    ];
    let mut baseline_ops = ops.clone();
    baseline_ops.push(Operation::new(
        3,
        OperationKind::Cap {
            stream: Stream::Sales,
            limit: EngineNumber::new(dec!(50), "units"),
            year_matcher: YearMatcher::All,
            displace_target: None,
        },
    ));

    // priorEquipment starts at zero in a fresh scenario, so seed it by
    // running one year without the cap, then applying the cap in year two
    // with recharge already in force — isolating the cap's own comparison
    // from the population bootstrap.
    let seed_spec = one_year_scenario("E2-seed", ops);
    let seeded = ScenarioRunner::new(&seed_spec, 0).run().unwrap();
    let seed_record = &seeded.records[0];
    assert_eq!(seed_record.domestic.value, dec!(100));

    let spec = ScenarioSpec {
        name: "E2".to_string(),
        baseline_stanza: Stanza::new("default").with_operations(APPLICATION, SUBSTANCE, baseline_ops),
        ordered_policy_stanzas: vec![],
        start_year: 2025,
        end_year: 2026,
        trials: 1,
    };
    let result = ScenarioRunner::new(&spec, 0).run().unwrap();
    let year_two = result.records.iter().find(|r| r.year == 2026).unwrap();
    // priorEquipment carried from year one's 50 new units; recharge = 50 *
    // 0.10 * 1 = 5 kg, allowance = 50*2 + 5 = 105 kg >= the 100 kg baseline.
    assert_eq!(year_two.domestic.value, dec!(100));
}

/// E4: `change domestic by +10 kg`, `change domestic by -5 kg` → 105 kg.
#[test]
fn e4_additive_change_accumulates_within_the_year() {
    let ops = vec![
        initial_charge(dec!(2)),
        set_domestic(dec!(100)),
        Operation::new(
            2,
            OperationKind::Change {
                stream: Stream::Domestic,
                delta: EngineNumber::new(dec!(10), "kg"),
                year_matcher: YearMatcher::All,
            },
        ),
        Operation::new(
            3,
            OperationKind::Change {
                stream: Stream::Domestic,
                delta: EngineNumber::new(dec!(-5), "kg"),
                year_matcher: YearMatcher::All,
            },
        ),
    ];
    let spec = one_year_scenario("E4", ops);
    let result = ScenarioRunner::new(&spec, 0).run().unwrap();
    assert_eq!(result.records[0].domestic.value, dec!(105));
}

/// E5: `retire 10%` then `retire 5%` in one year must equal a single
/// `retire 15%` — the rates are additive, not last-write-wins.
#[test]
fn e5_retirement_rates_are_additive_within_the_year() {
    fn scenario_with_retire_ops(name: &str, retire_ops: Vec<Operation>) -> ScenarioSpec {
        let year_two_only = YearMatcher::Range { start: Some(2026), end: None };
        let mut ops = vec![initial_charge(dec!(2)), set_domestic(dec!(200))];
        ops.extend(retire_ops);
        // re-specify domestic every year so the retirement effect is visible
        // against a population that keeps regenerating identically in both
        // scenarios being compared.
        ops.push(Operation::new(
            ops.len(),
            OperationKind::Set {
                stream: Stream::Domestic,
                amount: EngineNumber::new(dec!(200), "kg"),
                year_matcher: year_two_only,
            },
        ));
        ScenarioSpec {
            name: name.to_string(),
            baseline_stanza: Stanza::new("default").with_operations(APPLICATION, SUBSTANCE, ops),
            ordered_policy_stanzas: vec![],
            start_year: 2025,
            end_year: 2026,
            trials: 1,
        }
    }

    let split_retire = vec![
        Operation::new(
            10,
            OperationKind::Retire {
                rate: EngineNumber::new(dec!(10), "%"),
                year_matcher: YearMatcher::Range { start: Some(2026), end: None },
            },
        ),
        Operation::new(
            11,
            OperationKind::Retire {
                rate: EngineNumber::new(dec!(5), "%"),
                year_matcher: YearMatcher::Range { start: Some(2026), end: None },
            },
        ),
    ];
    let combined_retire = vec![Operation::new(
        10,
        OperationKind::Retire {
            rate: EngineNumber::new(dec!(15), "%"),
            year_matcher: YearMatcher::Range { start: Some(2026), end: None },
        },
    )];

    let split = ScenarioRunner::new(&scenario_with_retire_ops("E5-split", split_retire), 0)
        .run()
        .unwrap();
    let combined = ScenarioRunner::new(&scenario_with_retire_ops("E5-combined", combined_retire), 0)
        .run()
        .unwrap();

    let split_year_two = split.records.iter().find(|r| r.year == 2026).unwrap();
    let combined_year_two = combined.records.iter().find(|r| r.year == 2026).unwrap();
    assert_eq!(split_year_two.population.value, combined_year_two.population.value);
}

/// Invariant 1: `sales == domestic + import` for every record.
#[test]
fn invariant_sales_equals_domestic_plus_import() {
    let ops = vec![
        initial_charge(dec!(2)),
        set_domestic(dec!(100)),
        Operation::new(
            2,
            OperationKind::Set {
                stream: Stream::Import,
                amount: EngineNumber::new(dec!(40), "kg"),
                year_matcher: YearMatcher::All,
            },
        ),
    ];
    let spec = one_year_scenario("Invariant1", ops);
    let result = ScenarioRunner::new(&spec, 0).run().unwrap();
    for record in &result.records {
        assert_eq!(record.sales.value, record.domestic.value + record.import.value);
    }
}

/// Invariant 2: `priorEquipment(y+1) == equipment(y)`, observed indirectly
/// through population continuity across a two-year flat run.
#[test]
fn invariant_equipment_rolls_over_into_next_years_prior_equipment() {
    let ops = vec![initial_charge(dec!(2)), set_domestic(dec!(200))];
    let spec = ScenarioSpec {
        name: "Rollover".to_string(),
        baseline_stanza: Stanza::new("default").with_operations(APPLICATION, SUBSTANCE, ops),
        ordered_policy_stanzas: vec![],
        start_year: 2025,
        end_year: 2026,
        trials: 1,
    };
    let result = ScenarioRunner::new(&spec, 0).run().unwrap();
    let year_one = result.records.iter().find(|r| r.year == 2025).unwrap();
    let year_two = result.records.iter().find(|r| r.year == 2026).unwrap();
    // Year one: 200kg / 2kg-per-unit = 100 new units, from a zero starting
    // population. Year two adds another 100 new units on top of whatever
    // priorEquipment carried forward; the population only reaches 200 (not
    // 100) if year two's priorEquipment actually picked up year one's 100.
    assert_eq!(year_one.population.value, dec!(100));
    assert_eq!(year_two.population.value, dec!(200));
}
