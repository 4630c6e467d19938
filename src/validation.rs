//! Validation (C10): structural checks run ahead of `ScenarioRunner::run` —
//! duplicate names, recover-stage consistency, and displacement-target
//! legality (§4.2, §7).

use std::collections::HashSet;

use crate::error::{EngineResult, OperationError, ValidationError};
use crate::operation::{Operation, OperationKind, YearMatcher};
use crate::program::{ScenarioSpec, Stanza};
use crate::result::{Diagnostic, DiagnosticKind};

/// Duplicate scenario names would make `ParsedProgram::scenario` ambiguous;
/// call this over a program's full name list before resolving any of them.
pub fn validate_scenario_names(names: &[String]) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ValidationError::Duplicate {
                kind: "scenario",
                name: name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Validates one scenario's year range, stanza names, and every stanza's
/// operations. Returns non-fatal diagnostics (e.g. overlapping `recover`
/// commands) collected along the way; fatal problems (an empty year range,
/// an illegal displacement target) are returned as `Err`.
pub fn validate_scenario(spec: &ScenarioSpec) -> EngineResult<Vec<Diagnostic>> {
    if spec.end_year < spec.start_year {
        return Err(ValidationError::EmptyYearRange(spec.name.clone()).into());
    }

    let mut stanza_names = HashSet::new();
    stanza_names.insert(spec.baseline_stanza.name.clone());
    for stanza in &spec.ordered_policy_stanzas {
        if !stanza_names.insert(stanza.name.clone()) {
            return Err(ValidationError::Duplicate {
                kind: "stanza",
                name: stanza.name.clone(),
            }
            .into());
        }
    }

    let mut diagnostics = Vec::new();
    for stanza in std::iter::once(&spec.baseline_stanza).chain(spec.ordered_policy_stanzas.iter()) {
        validate_stanza(stanza, &spec.name, &mut diagnostics)?;
    }
    Ok(diagnostics)
}

fn validate_stanza(stanza: &Stanza, scenario_name: &str, diagnostics: &mut Vec<Diagnostic>) -> EngineResult<()> {
    for (application, substances) in &stanza.applications {
        for (substance, operations) in substances {
            validate_displacement_targets(operations, application, substance, scenario_name)?;
            validate_recover_stage_overlaps(operations, application, substance, scenario_name, diagnostics);
        }
    }
    Ok(())
}

/// A `cap`/`floor`/`replace` whose target names the source substance itself
/// is rejected the same way `DisplaceExecutor` rejects it at runtime — this
/// check exists so a caller can validate a whole program before running any
/// year of it (see `DESIGN.md`'s note on the symmetric resolution).
fn validate_displacement_targets(
    operations: &[Operation],
    application: &str,
    substance: &str,
    scenario_name: &str,
) -> EngineResult<()> {
    for op in operations {
        let (target_substance, reason): (&str, String) = match &op.kind {
            OperationKind::Cap {
                displace_target: Some(target),
                ..
            }
            | OperationKind::Floor {
                displace_target: Some(target),
                ..
            } => (
                &target.target_substance,
                format!(
                    "displacement target substance '{}' is the same as the source substance",
                    target.target_substance
                ),
            ),
            OperationKind::Replace { target_substance, .. } => (
                target_substance,
                "replace target substance is the same as the source substance".to_string(),
            ),
            _ => continue,
        };
        if target_substance == substance {
            return Err(OperationError::InvalidDisplacement {
                scenario: scenario_name.to_string(),
                year: 0,
                scope: format!("{application}/{substance}"),
                operation_index: op.operation_index,
                reason,
            }
            .into());
        }
    }
    Ok(())
}

/// Two `recover` commands for the same stage with overlapping year ranges
/// resolve additively at runtime (§4.2) rather than erroring; this surfaces
/// that ahead of time as a diagnostic instead of waiting for it to happen
/// mid-run.
fn validate_recover_stage_overlaps(
    operations: &[Operation],
    application: &str,
    substance: &str,
    scenario_name: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let recovers: Vec<&Operation> = operations
        .iter()
        .filter(|op| matches!(op.kind, OperationKind::Recover { .. }))
        .collect();

    for i in 0..recovers.len() {
        for j in (i + 1)..recovers.len() {
            let (OperationKind::Recover { stage: stage_a, year_matcher: years_a, .. }, OperationKind::Recover { stage: stage_b, year_matcher: years_b, .. }) =
                (&recovers[i].kind, &recovers[j].kind)
            else {
                continue;
            };
            if stage_a == stage_b && year_matchers_overlap(years_a, years_b) {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::MultipleRecoverSameStage,
                    scenario: scenario_name.to_string(),
                    year: 0,
                    scope: format!("{application}/{substance}"),
                    message: format!(
                        "operations #{} and #{} both target recovery stage {stage_a:?} in overlapping years; rates will be added and yields averaged",
                        recovers[i].operation_index, recovers[j].operation_index
                    ),
                });
            }
        }
    }
}

fn year_matchers_overlap(a: &YearMatcher, b: &YearMatcher) -> bool {
    match (a, b) {
        (YearMatcher::All, _) | (_, YearMatcher::All) => true,
        (YearMatcher::Range { start: start_a, end: end_a }, YearMatcher::Range { start: start_b, end: end_b }) => {
            let lo = match (start_a, start_b) {
                (Some(x), Some(y)) => *x.max(y),
                (Some(x), None) => *x,
                (None, Some(y)) => *y,
                (None, None) => i32::MIN,
            };
            let hi = match (end_a, end_b) {
                (Some(x), Some(y)) => *x.min(y),
                (Some(x), None) => *x,
                (None, Some(y)) => *y,
                (None, None) => i32::MAX,
            };
            lo <= hi
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::EngineNumber;
    use crate::operation::{DisplaceTarget, DisplacementType};
    use crate::state::RecoveryStage;
    use rust_decimal_macros::dec;

    #[test]
    fn duplicate_scenario_names_are_rejected() {
        let names = vec!["BAU".to_string(), "Policy".to_string(), "BAU".to_string()];
        let err = validate_scenario_names(&names).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::Validation(ValidationError::Duplicate { .. })
        ));
    }

    #[test]
    fn empty_year_range_is_rejected() {
        let spec = ScenarioSpec {
            name: "Backwards".to_string(),
            baseline_stanza: Stanza::new("default"),
            ordered_policy_stanzas: vec![],
            start_year: 2030,
            end_year: 2025,
            trials: 1,
        };
        assert!(validate_scenario(&spec).is_err());
    }

    #[test]
    fn cap_displacing_into_its_own_substance_is_rejected() {
        let baseline = Stanza::new("default").with_operations(
            "Domestic Refrigeration",
            "HFC-134a",
            vec![Operation::new(
                0,
                OperationKind::Cap {
                    stream: crate::stream::Stream::Domestic,
                    limit: EngineNumber::new(dec!(100), "kg"),
                    year_matcher: YearMatcher::All,
                    displace_target: Some(DisplaceTarget {
                        target_application: "Domestic Refrigeration".to_string(),
                        target_substance: "HFC-134a".to_string(),
                        displacement_type: DisplacementType::Equivalent,
                    }),
                },
            )],
        );
        let spec = ScenarioSpec {
            name: "Scenario".to_string(),
            baseline_stanza: baseline,
            ordered_policy_stanzas: vec![],
            start_year: 2025,
            end_year: 2025,
            trials: 1,
        };
        assert!(validate_scenario(&spec).is_err());
    }

    #[test]
    fn overlapping_recover_commands_for_one_stage_surface_as_a_diagnostic_not_an_error() {
        let baseline = Stanza::new("default").with_operations(
            "Domestic Refrigeration",
            "HFC-134a",
            vec![
                Operation::new(
                    0,
                    OperationKind::Recover {
                        fraction: EngineNumber::new(dec!(10), "%"),
                        reuse: EngineNumber::new(dec!(80), "%"),
                        stage: RecoveryStage::Eol,
                        induction: dec!(0),
                        year_matcher: YearMatcher::All,
                    },
                ),
                Operation::new(
                    1,
                    OperationKind::Recover {
                        fraction: EngineNumber::new(dec!(5), "%"),
                        reuse: EngineNumber::new(dec!(90), "%"),
                        stage: RecoveryStage::Eol,
                        induction: dec!(0),
                        year_matcher: YearMatcher::All,
                    },
                ),
            ],
        );
        let spec = ScenarioSpec {
            name: "Scenario".to_string(),
            baseline_stanza: baseline,
            ordered_policy_stanzas: vec![],
            start_year: 2025,
            end_year: 2025,
            trials: 1,
        };
        let diagnostics = validate_scenario(&spec).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::MultipleRecoverSameStage);
    }
}
