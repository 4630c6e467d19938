//! `ChangeExecutor` (§4.5.4): routes `change` commands by stream family and
//! by the unit family of the delta.

use rust_decimal::Decimal;

use crate::error::EngineResult;
use crate::executor::propagation::PropagationMode;
use crate::executor::stream_update::{StreamUpdate, StreamUpdateExecutor};
use crate::number::{EngineNumber, UnitConverter};
use crate::operation::YearMatcher;
use crate::recalc::conversion_context_for;
use crate::scope::Scope;
use crate::state::SimulationState;
use crate::stream::Stream;

pub struct ChangeExecutor;

impl ChangeExecutor {
    pub fn change(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        stream: Stream,
        delta: &EngineNumber,
        year_matcher: YearMatcher,
    ) -> EngineResult<()> {
        if !year_matcher.matches(year) {
            return Ok(());
        }
        match stream {
            Stream::Domestic | Stream::Import | Stream::Export => {
                Self::change_component(state, scope, year, stream, delta)
            }
            Stream::Sales => Self::change_sales(state, scope, year, delta),
            _ => Self::change_derived(state, scope, year, stream, delta),
        }
    }

    /// Component streams (`domestic`, `import`, `export`): dispatch by the
    /// unit family of `delta`.
    fn change_component(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        stream: Stream,
        delta: &EngineNumber,
    ) -> EngineResult<()> {
        let delta_kind = delta.kind()?;
        let is_units = delta_kind.is_equipment();

        let absolute_delta_kg = {
            let ctx = conversion_context_for(state, scope);
            UnitConverter::new(&ctx).convert(delta, "kg")?.value
        };

        let key = scope.use_key();
        let current_kg = state.get(&key, stream).value;
        let new_value_kg = (current_kg + absolute_delta_kg).max(Decimal::ZERO);

        let propagation = if is_units {
            PropagationMode::Standard
        } else {
            PropagationMode::ExplicitRecharge
        };

        StreamUpdateExecutor::apply(
            state,
            scope,
            year,
            StreamUpdate::new(stream, EngineNumber::new(new_value_kg, "kg"), propagation),
        )
    }

    /// `sales`: a percentage delta is applied identically to both component
    /// streams; a unit/mass delta is split by the current distribution ratio.
    fn change_sales(state: &mut SimulationState, scope: &Scope, year: i32, delta: &EngineNumber) -> EngineResult<()> {
        let delta_kind = delta.kind()?;
        if delta_kind.is_percent() {
            Self::change_component(state, scope, year, Stream::Domestic, delta)?;
            Self::change_component(state, scope, year, Stream::Import, delta)?;
            return Ok(());
        }

        let key = scope.use_key();
        let distribution = state.use_state_mut(&key).distribution();
        let absolute_delta_kg = {
            let ctx = conversion_context_for(state, scope);
            UnitConverter::new(&ctx).convert(delta, "kg")?.value
        };
        let domestic_delta = absolute_delta_kg * distribution.percent_domestic;
        let import_delta = absolute_delta_kg * distribution.percent_import;

        for (stream, component_delta) in [(Stream::Domestic, domestic_delta), (Stream::Import, import_delta)] {
            let current_kg = state.get(&key, stream).value;
            let new_value_kg = (current_kg + component_delta).max(Decimal::ZERO);
            StreamUpdateExecutor::apply(
                state,
                scope,
                year,
                StreamUpdate::new(stream, EngineNumber::new(new_value_kg, "kg"), PropagationMode::Standard),
            )?;
        }
        Ok(())
    }

    /// Derived streams: a direct delta on the current value, clamped
    /// non-negative, with no recalc chain triggered (there is nothing
    /// downstream of a derived stream to propagate into).
    fn change_derived(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        stream: Stream,
        delta: &EngineNumber,
    ) -> EngineResult<()> {
        let key = scope.use_key();
        let current = state.get(&key, stream);
        let absolute_delta = {
            let ctx = conversion_context_for(state, scope);
            UnitConverter::new(&ctx).convert(delta, &current.units)?
        };
        let new_value = (current.value + absolute_delta.value).max(Decimal::ZERO);
        StreamUpdateExecutor::apply(
            state,
            scope,
            year,
            StreamUpdate::new(stream, EngineNumber::new(new_value, current.units.clone()), PropagationMode::Skip),
        )
    }
}
