//! `LimitExecutor` (§4.5.1): cap and floor, including the percentage-form
//! cap's `lastSpecified` compounding and displacement wiring.

use rust_decimal::Decimal;
use tracing::instrument;

use crate::error::EngineResult;
use crate::executor::displace::DisplaceExecutor;
use crate::executor::propagation::PropagationMode;
use crate::executor::stream_update::{StreamUpdate, StreamUpdateExecutor};
use crate::number::{EngineNumber, UnitConverter};
use crate::operation::{DisplaceTarget, YearMatcher};
use crate::recalc::conversion_context_for;
use crate::scope::Scope;
use crate::state::SimulationState;
use crate::stream::Stream;

pub struct LimitExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitKind {
    Cap,
    Floor,
}

impl LimitExecutor {
    #[instrument(skip(state, limit, year_matcher, displace_target), fields(stream = %stream, scope = %scope))]
    pub fn cap(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        stream: Stream,
        limit: &EngineNumber,
        year_matcher: YearMatcher,
        displace_target: Option<&DisplaceTarget>,
    ) -> EngineResult<()> {
        Self::apply_limit(state, scope, year, stream, limit, year_matcher, displace_target, LimitKind::Cap)
    }

    #[instrument(skip(state, limit, year_matcher, displace_target), fields(stream = %stream, scope = %scope))]
    pub fn floor(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        stream: Stream,
        limit: &EngineNumber,
        year_matcher: YearMatcher,
        displace_target: Option<&DisplaceTarget>,
    ) -> EngineResult<()> {
        Self::apply_limit(state, scope, year, stream, limit, year_matcher, displace_target, LimitKind::Floor)
    }

    fn apply_limit(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        stream: Stream,
        limit: &EngineNumber,
        year_matcher: YearMatcher,
        displace_target: Option<&DisplaceTarget>,
        kind: LimitKind,
    ) -> EngineResult<()> {
        if !year_matcher.matches(year) {
            return Ok(());
        }

        let key = scope.use_key();
        let current = state.get(&key, stream);

        let limit_kind = limit.kind()?;
        let limit_absolute_kg = if limit_kind.is_percent() {
            Self::percentage_form_limit(state, scope, stream, limit)?
        } else {
            let ctx = conversion_context_for(state, scope);
            let converted = UnitConverter::new(&ctx).convert(limit, "kg")?.value;
            // A unit-form cap/floor on a sales-family stream names a target
            // count of *new equipment*; the stream itself also carries
            // recharge mass on top, so the equivalent mass limit is the
            // unit target's mass plus this year's recharge (§4.5.1 example).
            if limit_kind.is_equipment() && stream.is_sales_family() {
                converted + Self::recharge_kg(state, scope)
            } else {
                converted
            }
        };

        let current_kg = {
            let ctx = conversion_context_for(state, scope);
            UnitConverter::new(&ctx).convert(&current, "kg")?.value
        };

        let exceeds = match kind {
            LimitKind::Cap => current_kg > limit_absolute_kg,
            LimitKind::Floor => current_kg < limit_absolute_kg,
        };
        if !exceeds {
            return Ok(());
        }

        let delta_kg = limit_absolute_kg - current_kg;

        StreamUpdateExecutor::apply(
            state,
            scope,
            year,
            StreamUpdate::new(stream, EngineNumber::new(limit_absolute_kg, "kg"), PropagationMode::ExplicitRecharge)
                .with_force_last_specified(true),
        )?;

        if stream == Stream::Sales {
            let key = scope.use_key();
            let written = state.get(&key, Stream::Sales);
            state.use_state_mut(&key).set_last_specified(Stream::Domestic, written.clone());
            state.use_state_mut(&key).set_last_specified(Stream::Import, written);
        }

        if let Some(target) = displace_target {
            DisplaceExecutor::displace(
                state,
                scope,
                year,
                stream,
                delta_kg,
                &target.target_substance,
                target.displacement_type,
                0,
            )?;
        }

        Ok(())
    }

    /// This year's recharge mass for the scope's use, `priorEquipment *
    /// populationFraction * massPerUnit` — the same quantity
    /// `recalc_population_change` adds on top of new-equipment sales.
    fn recharge_kg(state: &SimulationState, scope: &Scope) -> Decimal {
        let key = scope.use_key();
        match state.use_state(&key) {
            Some(u) => {
                let prior_equipment = u.get(Stream::PriorEquipment).value;
                prior_equipment * u.recharge_spec.population_fraction * u.recharge_spec.mass_per_unit
            }
            None => Decimal::ZERO,
        }
    }

    /// Percentage-form cap/floor: `limit = lastSpecified * p / 100`. If no
    /// prior value exists, the percentage is treated as a mass in kg (§4.5.1).
    /// Reads the capped stream's own `lastSpecifiedValue` directly rather than
    /// through the shared `ConversionContext` (which carries only the
    /// domestic channel's carry-over, the common case for sales-family
    /// percent conversions — see `DESIGN.md`).
    fn percentage_form_limit(
        state: &SimulationState,
        scope: &Scope,
        stream: Stream,
        limit: &EngineNumber,
    ) -> EngineResult<Decimal> {
        let key = scope.use_key();
        let last_specified = state.use_state(&key).and_then(|u| u.last_specified(stream).cloned());
        match last_specified {
            Some(last) => {
                let ctx = conversion_context_for(state, scope);
                let last_kg = UnitConverter::new(&ctx).convert(&last, "kg")?.value;
                Ok(last_kg * limit.value / Decimal::from(100))
            }
            None => Ok(limit.value),
        }
    }
}
