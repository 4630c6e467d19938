//! `StreamUpdateExecutor` (§4.5.5): the central mutator every other executor
//! routes through. Takes a `StreamUpdate` record, writes it through
//! `SimulationState`, then triggers the recalc chain §4.4 assigns to that
//! stream.

use tracing::instrument;

use crate::error::EngineResult;
use crate::executor::propagation::PropagationMode;
use crate::number::EngineNumber;
use crate::operation::YearMatcher;
use crate::recalc::{conversion_context_for, RecalcKit, RecalcOperation, RechargeMode};
use crate::scope::Scope;
use crate::state::SimulationState;
use crate::stream::Stream;

/// One stream mutation plus the metadata the recalc pipeline needs to react
/// to it correctly (§4.5.5).
#[derive(Debug, Clone)]
pub struct StreamUpdate {
    pub stream: Stream,
    pub value: EngineNumber,
    pub year_matcher: YearMatcher,
    pub propagation: PropagationMode,
    /// Whether recycled material should be subtracted from the written
    /// virgin value before it lands in the stream (cap/floor writes that
    /// already account for recycling set this explicitly; most writes infer
    /// it from the source value's units).
    pub subtract_recycling: bool,
    /// Forces `lastSpecifiedValue` to be recorded even under
    /// `PropagationMode::Skip`, where it would otherwise be skipped — needed
    /// by `DisplaceExecutor` for the target's sales channels (§4.5.3).
    pub force_last_specified: bool,
}

impl StreamUpdate {
    pub fn new(stream: Stream, value: EngineNumber, propagation: PropagationMode) -> Self {
        Self {
            stream,
            value,
            year_matcher: YearMatcher::All,
            propagation,
            subtract_recycling: false,
            force_last_specified: false,
        }
    }

    pub fn with_year_matcher(mut self, year_matcher: YearMatcher) -> Self {
        self.year_matcher = year_matcher;
        self
    }

    pub fn with_force_last_specified(mut self, force: bool) -> Self {
        self.force_last_specified = force;
        self
    }
}

pub struct StreamUpdateExecutor;

impl StreamUpdateExecutor {
    #[instrument(skip(state, update), fields(stream = %update.stream, scope = %scope))]
    pub fn apply(
        state: &mut SimulationState,
        scope: &Scope,
        year: i32,
        update: StreamUpdate,
    ) -> EngineResult<()> {
        if !update.year_matcher.matches(year) {
            return Ok(());
        }

        let ctx = conversion_context_for(state, scope);
        let converter = crate::number::UnitConverter::new(&ctx);
        let canonical_units = canonical_units_for(update.stream);
        let mut converted = converter.convert(&update.value, canonical_units)?;
        if update.subtract_recycling {
            let key = scope.use_key();
            let recycle = state.get(&key, Stream::Recycle).value;
            converted.value = (converted.value - recycle).max(rust_decimal::Decimal::ZERO);
        }

        let key = scope.use_key();
        state.set(&key, update.stream, converted.clone());

        if update.propagation != PropagationMode::Skip || update.force_last_specified {
            state
                .use_state_mut(&key)
                .set_last_specified(update.stream, converted);
        }

        if update.propagation == PropagationMode::Skip {
            return Ok(());
        }

        let recharge_mode = match update.propagation {
            PropagationMode::ExplicitRecharge => RechargeMode::Explicit,
            _ => RechargeMode::Implicit,
        };
        let mut op = RecalcOperation::new(RecalcKit::new(state, scope, year)).with_recharge_mode(recharge_mode);

        match update.stream {
            Stream::Domestic | Stream::Import | Stream::Export | Stream::Sales => {
                op.recalc_population_change()?;
                if recharge_mode == RechargeMode::Implicit {
                    op.recalc_consumption()?;
                }
            }
            Stream::Consumption => {
                op.recalc_sales()?;
                op.recalc_population_change()?;
            }
            Stream::Equipment => {
                op.recalc_sales()?;
                op.recalc_consumption()?;
            }
            Stream::PriorEquipment => {
                op.recalc_retire()?;
            }
            _ => {}
        }
        op.recalc_energy()?;
        Ok(())
    }
}

fn canonical_units_for(stream: Stream) -> &'static str {
    match stream {
        Stream::Equipment | Stream::PriorEquipment | Stream::PopulationNew => "units",
        Stream::Consumption
        | Stream::ConsumptionNoRecycle
        | Stream::RecycleConsumption
        | Stream::RechargeEmissions
        | Stream::EolEmissions => "tCO2e",
        Stream::EnergyConsumption => "kwh",
        _ => "kg",
    }
}
