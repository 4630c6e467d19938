//! Recalc pipeline (C5): the dependency-propagation engine. `RecalcKit` is a
//! short-lived borrow built fresh for each `StreamUpdateExecutor` invocation
//! (§9 "Engine-as-implicit-state object" redesign note) rather than a
//! long-lived `Engine` threaded through every executor call.

use rust_decimal::Decimal;
use tracing::warn;

use crate::error::EngineResult;
use crate::number::{ConversionContext, EngineNumber, UnitConverter};
use crate::scope::Scope;
use crate::state::{Channel, RecoveryStage, SimulationState};
use crate::stream::Stream;

/// Whether the sales value a recalc is working from already has recharge
/// mixed into it. Travels with every recalc invocation (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RechargeMode {
    /// The current stream value already includes recharge; subtract it to
    /// find the portion available for new equipment.
    Explicit,
    /// The current stream value is pure new-equipment intent; recharge must
    /// be computed and added on top.
    Implicit,
}

/// A short-lived aggregate of the pieces a recalc needs: the mutable state,
/// the scope it's operating on, and the simulation year (for diagnostics).
/// Built fresh per invocation rather than threaded through as a god-object.
pub struct RecalcKit<'a> {
    pub state: &'a mut SimulationState,
    pub scope: &'a Scope,
    pub year: i32,
}

impl<'a> RecalcKit<'a> {
    pub fn new(state: &'a mut SimulationState, scope: &'a Scope, year: i32) -> Self {
        Self { state, scope, year }
    }
}

/// An immutable builder *value* (§9 redesign note) configuring one recalc
/// invocation: `RecalcOperation::new(kit).with_recharge_mode(mode).run_population_change()`.
pub struct RecalcOperation<'a> {
    kit: RecalcKit<'a>,
    recharge_mode: RechargeMode,
}

impl<'a> RecalcOperation<'a> {
    pub fn new(kit: RecalcKit<'a>) -> Self {
        Self {
            kit,
            recharge_mode: RechargeMode::Implicit,
        }
    }

    pub fn with_recharge_mode(mut self, mode: RechargeMode) -> Self {
        self.recharge_mode = mode;
        self
    }

    fn amortized_unit_volume(&self, distribution: (Decimal, Decimal)) -> Decimal {
        let key = self.kit.scope.use_key();
        let use_state = match self.kit.state.use_state(&key) {
            Some(u) => u,
            None => return Decimal::ZERO,
        };
        let domestic_charge = use_state
            .initial_charge(Channel::Domestic)
            .map(|n| n.value)
            .unwrap_or(Decimal::ZERO);
        let import_charge = use_state
            .initial_charge(Channel::Import)
            .map(|n| n.value)
            .unwrap_or(Decimal::ZERO);
        distribution.0 * domestic_charge + distribution.1 * import_charge
    }

    /// `recalcPopulationChange` (§4.4): given the current virgin supply for
    /// new equipment, the recharge spec and initial charge, compute
    /// `populationNew` and `equipment = priorEquipment - retired + populationNew`.
    pub fn recalc_population_change(&mut self) -> EngineResult<()> {
        let key = self.kit.scope.use_key();
        let use_state = self.kit.state.use_state_mut(&key);
        let distribution = {
            let d = use_state.distribution();
            (d.percent_domestic, d.percent_import)
        };
        let prior_equipment = use_state.get(Stream::PriorEquipment).value;
        let recharge_spec = use_state.recharge_spec;
        let retirement_rate = use_state.retirement_rate;
        let sales_kg = use_state.get(Stream::Domestic).value + use_state.get(Stream::Import).value;

        let recharge_kg = prior_equipment * recharge_spec.population_fraction * recharge_spec.mass_per_unit;

        let new_equipment_virgin_kg = match self.recharge_mode {
            RechargeMode::Explicit => (sales_kg - recharge_kg).max(Decimal::ZERO),
            RechargeMode::Implicit => sales_kg,
        };

        let amortized = self.amortized_unit_volume(distribution);
        let population_new = if amortized.is_zero() {
            Decimal::ZERO
        } else {
            (new_equipment_virgin_kg / amortized).max(Decimal::ZERO)
        };

        let retired = prior_equipment * retirement_rate / Decimal::from(100);
        let equipment = (prior_equipment - retired + population_new).max(Decimal::ZERO);

        let use_state = self.kit.state.use_state_mut(&key);
        use_state.set(Stream::PopulationNew, EngineNumber::new(population_new, "units"));
        use_state.set(Stream::Equipment, EngineNumber::new(equipment, "units"));
        use_state.set(Stream::ImplicitRecharge, EngineNumber::new(recharge_kg, "kg"));
        use_state.set(Stream::Sales, EngineNumber::new(sales_kg, "kg"));
        Ok(())
    }

    /// `recalcSales` (§4.4): given the equipment goal (read from
    /// `populationNew`), recharge needs and initial charge, compute total
    /// virgin sales needed and split by distribution into domestic/import.
    pub fn recalc_sales(&mut self) -> EngineResult<()> {
        let key = self.kit.scope.use_key();
        let use_state = self.kit.state.use_state_mut(&key);
        let distribution = {
            let d = use_state.distribution();
            (d.percent_domestic, d.percent_import)
        };
        let prior_equipment = use_state.get(Stream::PriorEquipment).value;
        let population_new = use_state.get(Stream::PopulationNew).value;
        let recharge_spec = use_state.recharge_spec;

        let recharge_kg = prior_equipment * recharge_spec.population_fraction * recharge_spec.mass_per_unit;
        let amortized = self.amortized_unit_volume(distribution);
        let new_equipment_kg = population_new * amortized;
        let total_kg = new_equipment_kg + recharge_kg;

        let domestic_kg = total_kg * distribution.0;
        let import_kg = total_kg * distribution.1;

        let use_state = self.kit.state.use_state_mut(&key);
        use_state.set(Stream::Domestic, EngineNumber::new(domestic_kg, "kg"));
        use_state.set(Stream::Import, EngineNumber::new(import_kg, "kg"));
        use_state.set(Stream::Sales, EngineNumber::new(total_kg, "kg"));
        use_state.set(Stream::ImplicitRecharge, EngineNumber::new(recharge_kg, "kg"));
        Ok(())
    }

    /// `recalcRetire` (§4.4): given `retirementRate` and `priorEquipment`,
    /// compute retired units and decrement equipment.
    pub fn recalc_retire(&mut self) -> EngineResult<()> {
        let key = self.kit.scope.use_key();
        let use_state = self.kit.state.use_state_mut(&key);
        let prior_equipment = use_state.get(Stream::PriorEquipment).value;
        let retired = prior_equipment * use_state.retirement_rate / Decimal::from(100);
        let equipment = (use_state.get(Stream::Equipment).value - retired).max(Decimal::ZERO);
        use_state.set(Stream::Equipment, EngineNumber::new(equipment, "units"));
        Ok(())
    }

    /// `recalcConsumption` (§4.4): `consumption = virginMass * gwp`, split
    /// into recharge/EOL/new-equipment emission components.
    pub fn recalc_consumption(&mut self) -> EngineResult<()> {
        let key = self.kit.scope.use_key();
        let use_state = self.kit.state.use_state_mut(&key);
        let gwp = match use_state.gwp {
            Some(g) => g,
            None => {
                warn!(scope = %self.kit.scope, "consumption recalc skipped: no GWP recorded");
                return Ok(());
            }
        };

        let domestic_kg = use_state.get(Stream::Domestic).value;
        let import_kg = use_state.get(Stream::Import).value;
        let total_sales_kg = domestic_kg + import_kg;
        let recharge_kg = use_state.get(Stream::ImplicitRecharge).value;
        let recycle_kg = use_state.get(Stream::Recycle).value;

        let consumption_no_recycle = total_sales_kg * gwp;
        let consumption = (total_sales_kg - recycle_kg).max(Decimal::ZERO) * gwp;
        let recharge_emissions = recharge_kg.min(total_sales_kg) * gwp;

        use_state.set(Stream::Consumption, EngineNumber::new(consumption, "tCO2e"));
        use_state.set(
            Stream::ConsumptionNoRecycle,
            EngineNumber::new(consumption_no_recycle, "tCO2e"),
        );
        use_state.set(
            Stream::RechargeEmissions,
            EngineNumber::new(recharge_emissions, "tCO2e"),
        );
        Ok(())
    }

    /// `recalcEnergy` (§4.4): from intensity (per-unit or per-mass) and the
    /// appropriate base.
    pub fn recalc_energy(&mut self) -> EngineResult<()> {
        let key = self.kit.scope.use_key();
        let use_state = self.kit.state.use_state_mut(&key);

        let energy = if let Some(per_unit) = use_state.energy_intensity_per_unit {
            use_state.get(Stream::PopulationNew).value * per_unit
        } else if let Some(per_kg) = use_state.energy_intensity_per_kg {
            let total_kg = use_state.get(Stream::Domestic).value + use_state.get(Stream::Import).value;
            total_kg * per_kg
        } else {
            return Ok(());
        };

        use_state.set(Stream::EnergyConsumption, EngineNumber::new(energy, "kwh"));
        Ok(())
    }

    /// `recalcRecycling` (§4.4): for each stage, recycled material `= base *
    /// recovery * reuse`; then apply induction (§4.5.1, invariant 5):
    /// `virgin -= recycled * (1 - induction)`, `total = virgin + recycled`.
    pub fn recalc_recycling(&mut self) -> EngineResult<()> {
        let key = self.kit.scope.use_key();
        let use_state = self.kit.state.use_state_mut(&key);

        let retired_units = {
            let prior_equipment = use_state.get(Stream::PriorEquipment).value;
            prior_equipment * use_state.retirement_rate / Decimal::from(100)
        };
        let eol_spec = use_state.recovery_spec(RecoveryStage::Eol);
        let recharge_spec_recovery = use_state.recovery_spec(RecoveryStage::Recharge);
        let recharge_kg = use_state.get(Stream::ImplicitRecharge).value;

        let distribution = use_state.distribution();
        let amortized = {
            let domestic_charge = use_state
                .initial_charge(Channel::Domestic)
                .map(|n| n.value)
                .unwrap_or(Decimal::ZERO);
            let import_charge = use_state
                .initial_charge(Channel::Import)
                .map(|n| n.value)
                .unwrap_or(Decimal::ZERO);
            distribution.percent_domestic * domestic_charge + distribution.percent_import * import_charge
        };

        let eol_base_kg = retired_units * amortized;
        let eol_recycled_kg =
            eol_base_kg * eol_spec.recovery_fraction / Decimal::from(100) * eol_spec.reuse_yield / Decimal::from(100);
        let recharge_recycled_kg = recharge_kg * recharge_spec_recovery.recovery_fraction / Decimal::from(100)
            * recharge_spec_recovery.reuse_yield
            / Decimal::from(100);

        let total_recycled_kg = eol_recycled_kg + recharge_recycled_kg;

        let blended_induction = if total_recycled_kg.is_zero() {
            Decimal::ZERO
        } else {
            (eol_recycled_kg * eol_spec.induction_rate + recharge_recycled_kg * recharge_spec_recovery.induction_rate)
                / total_recycled_kg
        };

        let virgin_reduction = total_recycled_kg * (Decimal::ONE - blended_induction);

        let domestic_kg = use_state.get(Stream::Domestic).value;
        let import_kg = use_state.get(Stream::Import).value;
        let total_virgin = domestic_kg + import_kg;
        if virgin_reduction > total_virgin {
            warn!(
                scope = %self.kit.scope,
                "recycling reduction exceeds virgin supply; clamping to zero virgin"
            );
        }
        let reduction_ratio = if total_virgin.is_zero() {
            Decimal::ZERO
        } else {
            (virgin_reduction / total_virgin).min(Decimal::ONE)
        };

        let new_domestic = (domestic_kg * (Decimal::ONE - reduction_ratio)).max(Decimal::ZERO);
        let new_import = (import_kg * (Decimal::ONE - reduction_ratio)).max(Decimal::ZERO);

        let gwp = use_state.gwp.unwrap_or(Decimal::ZERO);
        let recycle_consumption = total_recycled_kg * gwp;
        let eol_emissions = eol_recycled_kg * gwp;

        use_state.set(Stream::Domestic, EngineNumber::new(new_domestic, "kg"));
        use_state.set(Stream::Import, EngineNumber::new(new_import, "kg"));
        use_state.set(Stream::Sales, EngineNumber::new(new_domestic + new_import, "kg"));
        use_state.set(Stream::Recycle, EngineNumber::new(total_recycled_kg, "kg"));
        use_state.set(
            Stream::RecycleConsumption,
            EngineNumber::new(recycle_consumption, "tCO2e"),
        );
        use_state.set(Stream::EolEmissions, EngineNumber::new(eol_emissions, "tCO2e"));
        Ok(())
    }

    pub fn conversion_context(&self) -> ConversionContext {
        conversion_context_for(self.kit.state, self.kit.scope)
    }

    pub fn converter(&self, ctx: &ConversionContext) -> UnitConverter<'_> {
        UnitConverter::new(ctx)
    }
}

/// Builds the `ConversionContext` for a scope's current state: population,
/// amortized initial charge (distribution-weighted across channels), current
/// volume total, last-specified domestic value, GWP, and energy intensities.
/// Free function (rather than a `RecalcOperation` method) so `StreamUpdateExecutor`
/// can build it from an immutable borrow before taking the mutable one it needs
/// to write the converted value.
pub fn conversion_context_for(state: &SimulationState, scope: &Scope) -> ConversionContext {
    let key = scope.use_key();
    let use_state = match state.use_state(&key) {
        Some(u) => u,
        None => return ConversionContext::default(),
    };
    let distribution_probe = use_state.clone().distribution();
    let domestic_charge = use_state.initial_charge(Channel::Domestic).map(|n| n.value);
    let import_charge = use_state.initial_charge(Channel::Import).map(|n| n.value);
    let amortized = match (domestic_charge, import_charge) {
        (Some(d), Some(i)) => {
            Some(distribution_probe.percent_domestic * d + distribution_probe.percent_import * i)
        }
        (Some(d), None) => Some(d),
        (None, Some(i)) => Some(i),
        (None, None) => None,
    };
    ConversionContext {
        population: Some(use_state.get(Stream::Equipment).value),
        amortized_unit_volume: amortized,
        volume_total: Some(use_state.get(Stream::Domestic).value + use_state.get(Stream::Import).value),
        last_specified: use_state.last_specified(Stream::Domestic).cloned(),
        gwp: use_state.gwp,
        energy_intensity_per_unit: use_state.energy_intensity_per_unit,
        energy_intensity_per_kg: use_state.energy_intensity_per_kg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Scope, UseKey};
    use crate::state::{Channel, RechargeSpec, SimulationState};
    use rust_decimal_macros::dec;

    fn scope() -> Scope {
        Scope::new("default", "Domestic Refrigeration", "HFC-134a")
    }

    #[test]
    fn population_change_computes_new_units_from_virgin_mass() {
        let mut state = SimulationState::new();
        let key = UseKey::new("Domestic Refrigeration", "HFC-134a");
        {
            let use_state = state.use_state_mut(&key);
            use_state.set_initial_charge(Channel::Domestic, EngineNumber::new(dec!(2), "kg"));
            use_state.set(Stream::Domestic, EngineNumber::new(dec!(100), "kg"));
            use_state.set(Stream::PriorEquipment, EngineNumber::new(dec!(20), "units"));
            use_state.set_recharge_spec(RechargeSpec {
                population_fraction: dec!(0.10),
                mass_per_unit: dec!(1),
            });
        }
        let scope = scope();
        let mut op = RecalcOperation::new(RecalcKit::new(&mut state, &scope, 1))
            .with_recharge_mode(RechargeMode::Explicit);
        op.recalc_population_change().unwrap();

        let key = scope.use_key();
        let population_new = state.get(&key, Stream::PopulationNew).value;
        // recharge = 20 * 0.10 * 1 = 2kg; virgin-for-new = 100 - 2 = 98kg; / 2kg/unit = 49 units
        assert_eq!(population_new, dec!(49));
    }

    #[test]
    fn retire_decrements_equipment_by_rate() {
        let mut state = SimulationState::new();
        let key = UseKey::new("App", "Sub");
        {
            let use_state = state.use_state_mut(&key);
            use_state.set(Stream::PriorEquipment, EngineNumber::new(dec!(100), "units"));
            use_state.set(Stream::Equipment, EngineNumber::new(dec!(100), "units"));
            use_state.apply_retirement_rate_delta(dec!(15));
        }
        let scope = Scope::new("default", "App", "Sub");
        let mut op = RecalcOperation::new(RecalcKit::new(&mut state, &scope, 1));
        op.recalc_retire().unwrap();
        assert_eq!(state.get(&key, Stream::Equipment).value, dec!(85));
    }
}
