//! `DisplaceExecutor` (§4.5.3): reallocates a reduced (or increased) flow in
//! one substance to another. Uses an explicit target `Scope` rather than
//! mutating a shared `engine.scope` and restoring it afterward (§9 redesign
//! note) — there is nothing to restore because the source `Scope` value the
//! caller holds is never touched.

use rust_decimal::Decimal;
use tracing::instrument;

use crate::error::{EngineResult, OperationError};
use crate::executor::propagation::PropagationMode;
use crate::executor::stream_update::{StreamUpdate, StreamUpdateExecutor};
use crate::number::EngineNumber;
use crate::operation::DisplacementType;
use crate::recalc::{conversion_context_for, RecalcKit, RecalcOperation};
use crate::scope::Scope;
use crate::state::SimulationState;
use crate::stream::Stream;

pub struct DisplaceExecutor;

impl DisplaceExecutor {
    /// `source_stream` is the channel (`Domestic` or `Import`) that was
    /// reduced or increased by `delta_kg` (signed: positive = more virgin
    /// mass needed at the source, i.e. mass displaced *out of* source is
    /// negative here). `target_substance` must be a different substance
    /// within the same application; rejected symmetrically for domestic and
    /// import channels when it names the same substance as the source scope
    /// (see `DESIGN.md`'s resolution of the source's asymmetric check).
    #[instrument(skip(state), fields(source = %source_scope, target_substance))]
    pub fn displace(
        state: &mut SimulationState,
        source_scope: &Scope,
        year: i32,
        source_stream: Stream,
        delta_kg: Decimal,
        target_substance: &str,
        displacement_type: DisplacementType,
        operation_index: usize,
    ) -> EngineResult<()> {
        if target_substance == source_scope.substance {
            return Err(OperationError::InvalidDisplacement {
                scenario: String::new(),
                year,
                scope: source_scope.to_string(),
                operation_index,
                reason: format!(
                    "displacement target substance '{target_substance}' is the same as the source substance"
                ),
            }
            .into());
        }

        let target_scope = source_scope.with_substance(target_substance);
        let target_delta_kg = Self::target_amount(state, source_scope, &target_scope, delta_kg, displacement_type);

        let target_stream = match source_stream {
            Stream::Import => Stream::Import,
            _ => Stream::Domestic,
        };

        let target_key = target_scope.use_key();
        let target_current_kg = state.get(&target_key, target_stream).value;
        let target_new_kg = (target_current_kg + target_delta_kg).max(Decimal::ZERO);

        StreamUpdateExecutor::apply(
            state,
            &target_scope,
            year,
            StreamUpdate::new(target_stream, EngineNumber::new(target_new_kg, "kg"), PropagationMode::Skip)
                .with_force_last_specified(true),
        )?;

        // Targeted recalc in the destination scope so the displaced mass
        // propagates into the destination's own consumption, without
        // re-triggering a second implicit-recharge pass (the write above
        // already recorded the absolute target value).
        let mut op = RecalcOperation::new(RecalcKit::new(state, &target_scope, year))
            .with_recharge_mode(crate::recalc::RechargeMode::Explicit);
        op.recalc_population_change()?;
        op.recalc_consumption()?;

        Ok(())
    }

    fn target_amount(
        state: &SimulationState,
        source_scope: &Scope,
        target_scope: &Scope,
        delta_kg: Decimal,
        displacement_type: DisplacementType,
    ) -> Decimal {
        let delta_magnitude = delta_kg.abs();
        match displacement_type {
            DisplacementType::Equivalent | DisplacementType::ByVolume => delta_magnitude,
            DisplacementType::ByUnits => {
                let source_ctx = conversion_context_for(state, source_scope);
                let source_charge = source_ctx.amortized_unit_volume.unwrap_or(Decimal::ONE);
                let units = if source_charge.is_zero() {
                    Decimal::ZERO
                } else {
                    delta_magnitude / source_charge
                };
                let target_ctx = conversion_context_for(state, target_scope);
                let target_charge = target_ctx.amortized_unit_volume.unwrap_or(source_charge);
                units * target_charge
            }
        }
    }
}
