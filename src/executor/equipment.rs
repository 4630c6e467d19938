//! `EquipmentChangeUtil` (§4.5.2): equipment is never written directly;
//! writes are translated into sales increases or retirement-rate adjustments.

use rust_decimal::Decimal;

use crate::error::EngineResult;
use crate::executor::displace::DisplaceExecutor;
use crate::executor::propagation::PropagationMode;
use crate::executor::stream_update::{StreamUpdate, StreamUpdateExecutor};
use crate::number::{EngineNumber, UnitConverter};
use crate::operation::DisplaceTarget;
use crate::recalc::conversion_context_for;
use crate::scope::Scope;
use crate::state::SimulationState;
use crate::stream::Stream;

pub struct EquipmentChangeUtil;

impl EquipmentChangeUtil {
    /// `set equipment to X`: positive delta becomes a sales increase
    /// (triggering recharge handling via §4.4.1 on the next recalc); negative
    /// delta retires from `priorEquipment` by raising the retirement rate.
    pub fn set_equipment(state: &mut SimulationState, scope: &Scope, year: i32, target: &EngineNumber) -> EngineResult<()> {
        let key = scope.use_key();
        let current = state.get(&key, Stream::Equipment).value;
        let target_units = {
            let ctx = conversion_context_for(state, scope);
            UnitConverter::new(&ctx).convert(target, "units")?.value
        };
        let delta = target_units - current;
        Self::apply_delta(state, scope, year, delta)
    }

    /// `change equipment by Δ%`: derives the absolute delta from the current
    /// value, then dispatches the same way as `set_equipment`.
    pub fn change_equipment_percent(state: &mut SimulationState, scope: &Scope, year: i32, percent: Decimal) -> EngineResult<()> {
        let key = scope.use_key();
        let current = state.get(&key, Stream::Equipment).value;
        let delta = current * percent / Decimal::from(100);
        Self::apply_delta(state, scope, year, delta)
    }

    /// `cap equipment to X`: if current exceeds `X`, retires the excess and
    /// handles displacement of the freed capacity's equivalent mass.
    pub fn cap_equipment(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        limit: &EngineNumber,
        displace_target: Option<&DisplaceTarget>,
    ) -> EngineResult<()> {
        let key = scope.use_key();
        let current = state.get(&key, Stream::Equipment).value;
        let limit_units = {
            let ctx = conversion_context_for(state, scope);
            UnitConverter::new(&ctx).convert(limit, "units")?.value
        };
        if current <= limit_units {
            return Ok(());
        }
        let excess = current - limit_units;
        let delta_mass_kg = Self::retire_excess(state, scope, year, excess)?;
        if let Some(target) = displace_target {
            DisplaceExecutor::displace(
                state,
                scope,
                year,
                Stream::Domestic,
                delta_mass_kg,
                &target.target_substance,
                target.displacement_type,
                0,
            )?;
        }
        Ok(())
    }

    /// `floor equipment to X`: if current is below `X`, increases sales to
    /// cover the deficit and handles displacement.
    pub fn floor_equipment(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        limit: &EngineNumber,
        displace_target: Option<&DisplaceTarget>,
    ) -> EngineResult<()> {
        let key = scope.use_key();
        let current = state.get(&key, Stream::Equipment).value;
        let limit_units = {
            let ctx = conversion_context_for(state, scope);
            UnitConverter::new(&ctx).convert(limit, "units")?.value
        };
        if current >= limit_units {
            return Ok(());
        }
        let deficit = limit_units - current;
        let delta_mass_kg = Self::increase_via_sales(state, scope, year, deficit)?;
        if let Some(target) = displace_target {
            DisplaceExecutor::displace(
                state,
                scope,
                year,
                Stream::Domestic,
                -delta_mass_kg,
                &target.target_substance,
                target.displacement_type,
                0,
            )?;
        }
        Ok(())
    }

    fn apply_delta(state: &mut SimulationState, scope: &Scope, year: i32, delta: Decimal) -> EngineResult<()> {
        if delta > Decimal::ZERO {
            Self::increase_via_sales(state, scope, year, delta)?;
        } else if delta < Decimal::ZERO {
            Self::retire_excess(state, scope, year, -delta)?;
        }
        Ok(())
    }

    fn increase_via_sales(state: &mut SimulationState, scope: &Scope, year: i32, units_delta: Decimal) -> EngineResult<Decimal> {
        let ctx = conversion_context_for(state, scope);
        let amortized = ctx.amortized_unit_volume.unwrap_or(Decimal::ZERO);
        let mass_delta_kg = units_delta * amortized;

        let key = scope.use_key();
        let current_domestic = state.get(&key, Stream::Domestic).value;
        StreamUpdateExecutor::apply(
            state,
            scope,
            year,
            StreamUpdate::new(
                Stream::Domestic,
                EngineNumber::new(current_domestic + mass_delta_kg, "kg"),
                PropagationMode::Standard,
            ),
        )?;
        Ok(mass_delta_kg)
    }

    fn retire_excess(state: &mut SimulationState, scope: &Scope, year: i32, units_excess: Decimal) -> EngineResult<Decimal> {
        let key = scope.use_key();
        let prior_equipment = state.get(&key, Stream::PriorEquipment).value;
        let ctx = conversion_context_for(state, scope);
        let amortized = ctx.amortized_unit_volume.unwrap_or(Decimal::ZERO);

        if !prior_equipment.is_zero() {
            let rate_delta = units_excess / prior_equipment * Decimal::from(100);
            state.use_state_mut(&key).apply_retirement_rate_delta(rate_delta);
        }

        use crate::recalc::{RecalcKit, RecalcOperation};
        let mut op = RecalcOperation::new(RecalcKit::new(state, scope, year));
        op.recalc_retire()?;
        op.recalc_population_change()?;

        Ok(units_excess * amortized)
    }
}
