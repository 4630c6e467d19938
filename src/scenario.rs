//! `ScenarioRunner` (C7): composes the baseline and ordered policy stanzas,
//! iterates years, executes operations through the executor layer, and
//! snapshots a `ResultRecord` per `(year, application, substance)` (§4.6).

use rust_decimal::Decimal;

use crate::error::EngineResult;
use crate::executor::{ChangeExecutor, DisplaceExecutor, EquipmentChangeUtil, LimitExecutor, PropagationMode, StreamUpdate, StreamUpdateExecutor};
use crate::number::{EngineNumber, UnitConverter};
use crate::operation::{DisplacementType, EqualsKind, Operation, OperationKind, YearMatcher};
use crate::program::{ScenarioSpec, Stanza};
use crate::recalc::{conversion_context_for, RecalcKit, RecalcOperation};
use crate::result::{Diagnostic, DiagnosticKind, ResultRecord, ResultSet, TradeSupplement};
use crate::scope::{Scope, UseKey};
use crate::state::{Channel, RecoverySpec, RecoveryStage, SimulationState};
use crate::stream::Stream;

pub struct ScenarioRunner<'a> {
    spec: &'a ScenarioSpec,
    trial: u32,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(spec: &'a ScenarioSpec, trial: u32) -> Self {
        Self { spec, trial }
    }

    /// Runs every year in `[start_year, end_year]` and returns the
    /// accumulated records and diagnostics (§4.6).
    pub fn run(&self) -> EngineResult<ResultSet> {
        let mut state = SimulationState::new();
        let mut result = ResultSet::new();

        let stanzas: Vec<&Stanza> = std::iter::once(&self.spec.baseline_stanza)
            .chain(self.spec.ordered_policy_stanzas.iter())
            .collect();

        for year in self.spec.start_year..=self.spec.end_year {
            state.roll_over_year();

            for stanza in &stanzas {
                for (application, substances) in &stanza.applications {
                    for (substance, operations) in substances {
                        let scope = Scope::new(stanza.name.clone(), application.clone(), substance.clone());
                        for operation in operations {
                            self.execute_operation(&mut state, &scope, year, operation, &mut result)?;
                        }
                    }
                }
            }

            self.finalize_recycling(&mut state, year)?;
            self.snapshot_year(&state, year, &mut result);
        }

        Ok(result)
    }

    fn execute_operation(
        &self,
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        operation: &Operation,
        result: &mut ResultSet,
    ) -> EngineResult<()> {
        match &operation.kind {
            OperationKind::InitialCharge { channel, intensity } => {
                state.use_state_mut(&scope.use_key()).set_initial_charge(*channel, intensity.clone());
                Ok(())
            }
            OperationKind::Equals { kind, intensity } => {
                let use_state = state.use_state_mut(&scope.use_key());
                match kind {
                    EqualsKind::Gwp => use_state.gwp = Some(intensity.value),
                    EqualsKind::EnergyIntensity => {
                        if intensity.units.ends_with("/unit") {
                            use_state.energy_intensity_per_unit = Some(intensity.value);
                        } else {
                            use_state.energy_intensity_per_kg = Some(intensity.value);
                        }
                    }
                }
                Ok(())
            }
            OperationKind::Enable { stream } => {
                state.use_state_mut(&scope.use_key()).set_enabled(*stream, true);
                Ok(())
            }
            OperationKind::Set { stream, amount, year_matcher } => {
                if !year_matcher.matches(year) {
                    return Ok(());
                }
                let propagation = if amount.kind()?.is_equipment() {
                    PropagationMode::Standard
                } else {
                    PropagationMode::ExplicitRecharge
                };
                StreamUpdateExecutor::apply(state, scope, year, StreamUpdate::new(*stream, amount.clone(), propagation))
            }
            OperationKind::Change { stream, delta, year_matcher } => {
                ChangeExecutor::change(state, scope, year, *stream, delta, *year_matcher)
            }
            OperationKind::Cap { stream, limit, year_matcher, displace_target } => {
                if stream.is_equipment_family() {
                    if year_matcher.matches(year) {
                        EquipmentChangeUtil::cap_equipment(state, scope, year, limit, displace_target.as_ref())?;
                    }
                    Ok(())
                } else {
                    LimitExecutor::cap(state, scope, year, *stream, limit, *year_matcher, displace_target.as_ref())
                }
            }
            OperationKind::Floor { stream, limit, year_matcher, displace_target } => {
                if stream.is_equipment_family() {
                    if year_matcher.matches(year) {
                        EquipmentChangeUtil::floor_equipment(state, scope, year, limit, displace_target.as_ref())?;
                    }
                    Ok(())
                } else {
                    LimitExecutor::floor(state, scope, year, *stream, limit, *year_matcher, displace_target.as_ref())
                }
            }
            OperationKind::Retire { rate, year_matcher } => {
                if !year_matcher.matches(year) {
                    return Ok(());
                }
                let was_clamped = state.use_state_mut(&scope.use_key()).apply_retirement_rate_delta(rate.value);
                if was_clamped {
                    result.diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::ClampedRetirementRate,
                        scenario: self.spec.name.clone(),
                        year,
                        scope: scope.to_string(),
                        message: format!("retirement rate delta {} clamped to [0, 100]", rate.value),
                    });
                }
                let mut op = RecalcOperation::new(RecalcKit::new(state, scope, year));
                op.recalc_retire()?;
                op.recalc_population_change()
            }
            OperationKind::Recharge { fraction, intensity, year_matcher } => {
                if !year_matcher.matches(year) {
                    return Ok(());
                }
                state.use_state_mut(&scope.use_key()).set_recharge_spec(crate::state::RechargeSpec {
                    population_fraction: fraction.value / Decimal::from(100),
                    mass_per_unit: intensity.value,
                });
                Ok(())
            }
            OperationKind::Recover { fraction, reuse, stage, induction, year_matcher } => {
                if !year_matcher.matches(year) {
                    return Ok(());
                }
                let spec = RecoverySpec {
                    recovery_fraction: fraction.value,
                    reuse_yield: reuse.value,
                    induction_rate: *induction,
                    commands_folded: 0,
                };
                let is_repeat = state.use_state_mut(&scope.use_key()).apply_recovery_spec(*stage, spec);
                if is_repeat {
                    result.diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::MultipleRecoverSameStage,
                        scenario: self.spec.name.clone(),
                        year,
                        scope: scope.to_string(),
                        message: format!("multiple recover commands for stage {stage:?} in the same year"),
                    });
                }
                let mut op = RecalcOperation::new(RecalcKit::new(state, scope, year));
                op.recalc_recycling()
            }
            OperationKind::Replace {
                source_substance: _,
                target_substance,
                amount,
            } => {
                let amount_kg = {
                    let ctx = conversion_context_for(state, scope);
                    UnitConverter::new(&ctx).convert(amount, "kg")?.value
                };
                ChangeExecutor::change(
                    state,
                    scope,
                    year,
                    Stream::Sales,
                    &EngineNumber::new(-amount_kg, "kg"),
                    YearMatcher::All,
                )?;
                DisplaceExecutor::displace(
                    state,
                    scope,
                    year,
                    Stream::Domestic,
                    -amount_kg,
                    target_substance,
                    DisplacementType::Equivalent,
                    operation.operation_index,
                )
            }
        }
    }

    /// §4.6 step 3c: any use with an active recovery spec gets a final
    /// retirement + recycling recalc at year end, even in years where no
    /// `recover` operation ran (the spec persists across years once set).
    fn finalize_recycling(&self, state: &mut SimulationState, year: i32) -> EngineResult<()> {
        let keys: Vec<UseKey> = state.use_keys().cloned().collect();
        for key in keys {
            let has_recovery = state
                .use_state(&key)
                .map(|u| {
                    u.recovery_spec(RecoveryStage::Eol).commands_folded > 0
                        || u.recovery_spec(RecoveryStage::Recharge).commands_folded > 0
                })
                .unwrap_or(false);
            if !has_recovery {
                continue;
            }
            let scope = Scope::new("default", key.application.clone(), key.substance.clone());
            let mut op = RecalcOperation::new(RecalcKit::new(state, &scope, year));
            op.recalc_retire()?;
            op.recalc_recycling()?;
        }
        Ok(())
    }

    fn snapshot_year(&self, state: &SimulationState, year: i32, result: &mut ResultSet) {
        for (key, use_state) in state.iter() {
            let domestic_charge = use_state
                .initial_charge(Channel::Domestic)
                .cloned()
                .unwrap_or_else(|| EngineNumber::zero("kg/unit"));
            let import_charge = use_state
                .initial_charge(Channel::Import)
                .cloned()
                .unwrap_or_else(|| EngineNumber::zero("kg/unit"));
            result.records.push(ResultRecord {
                scenario: self.spec.name.clone(),
                trial: self.trial,
                year,
                application: key.application.clone(),
                substance: key.substance.clone(),
                domestic: use_state.get(Stream::Domestic),
                import: use_state.get(Stream::Import),
                export: use_state.get(Stream::Export),
                sales: use_state.get(Stream::Sales),
                recycle: use_state.get(Stream::Recycle),
                population: use_state.get(Stream::Equipment),
                population_new: use_state.get(Stream::PopulationNew),
                consumption: use_state.get(Stream::Consumption),
                consumption_no_recycle: use_state.get(Stream::ConsumptionNoRecycle),
                recycle_consumption: use_state.get(Stream::RecycleConsumption),
                recharge_emissions: use_state.get(Stream::RechargeEmissions),
                eol_emissions: use_state.get(Stream::EolEmissions),
                energy_consumption: use_state.get(Stream::EnergyConsumption),
                trade_supplement: TradeSupplement {
                    import_initial_charge: import_charge,
                    domestic_initial_charge: domestic_charge,
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Operation, OperationKind};
    use crate::program::{ScenarioSpec, Stanza};
    use rust_decimal_macros::dec;

    fn baseline_ops(initial_kg: rust_decimal::Decimal) -> Vec<Operation> {
        vec![
            Operation::new(
                0,
                OperationKind::InitialCharge {
                    channel: Channel::Domestic,
                    intensity: EngineNumber::new(dec!(2), "kg/unit"),
                },
            ),
            Operation::new(
                1,
                OperationKind::Equals {
                    kind: EqualsKind::Gwp,
                    intensity: EngineNumber::new(dec!(1430), "tCO2e/mt"),
                },
            ),
            Operation::new(
                2,
                OperationKind::Set {
                    stream: Stream::Domestic,
                    amount: EngineNumber::new(initial_kg, "kg"),
                    year_matcher: YearMatcher::All,
                },
            ),
        ]
    }

    fn baseline_with_sales(initial_kg: rust_decimal::Decimal) -> Stanza {
        Stanza::new("default").with_operations(
            "Domestic Refrigeration",
            "HFC-134a",
            baseline_ops(initial_kg),
        )
    }

    #[test]
    fn a_flat_set_produces_one_record_per_year() {
        let spec = ScenarioSpec {
            name: "BAU".to_string(),
            baseline_stanza: baseline_with_sales(dec!(1000)),
            ordered_policy_stanzas: vec![],
            start_year: 2025,
            end_year: 2027,
            trials: 1,
        };
        let runner = ScenarioRunner::new(&spec, 0);
        let result = runner.run().unwrap();
        assert_eq!(result.records.len(), 3);
        assert_eq!(result.records[0].year, 2025);
        assert_eq!(result.records[0].domestic.value, dec!(1000));
    }

    #[test]
    fn a_cap_applied_in_a_later_year_limits_domestic_sales() {
        let mut ops = baseline_ops(dec!(1000));
        ops.push(Operation::new(
            3,
            OperationKind::Cap {
                stream: Stream::Domestic,
                limit: EngineNumber::new(dec!(500), "kg"),
                year_matcher: YearMatcher::Range { start: Some(2026), end: None },
                displace_target: None,
            },
        ));
        let baseline = Stanza::new("default").with_operations("Domestic Refrigeration", "HFC-134a", ops);
        let spec = ScenarioSpec {
            name: "Capped".to_string(),
            baseline_stanza: baseline,
            ordered_policy_stanzas: vec![],
            start_year: 2025,
            end_year: 2026,
            trials: 1,
        };
        let runner = ScenarioRunner::new(&spec, 0);
        let result = runner.run().unwrap();
        let year_2026 = result.records.iter().find(|r| r.year == 2026).unwrap();
        assert_eq!(year_2026.domestic.value, dec!(500));
    }
}
