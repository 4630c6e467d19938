//! `SimulationState` (C2): per-`(scope, stream)` storage for one scenario run.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::error::{EngineResult, ScopeError};
use crate::number::EngineNumber;
use crate::scope::UseKey;
use crate::stream::Stream;

/// Which end-of-life stage a recovery spec applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryStage {
    Eol,
    Recharge,
}

/// `(population_fraction, mass_per_unit)`: the servicing rate and intensity
/// for a use's recharge.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RechargeSpec {
    pub population_fraction: Decimal,
    pub mass_per_unit: Decimal,
}

/// Additive recovery parameters for one `RecoveryStage`: recovered fraction,
/// yield on reuse, and what fraction of the recovered material induces
/// additional demand rather than displacing virgin supply.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecoverySpec {
    pub recovery_fraction: Decimal,
    pub reuse_yield: Decimal,
    pub induction_rate: Decimal,
    /// Number of `recover` commands folded into this spec this scenario-year;
    /// `> 1` means rates were added and yields averaged (§4.2 validation note).
    pub commands_folded: u32,
}

/// `(percentDomestic, percentImport)`, `d + i == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distribution {
    pub percent_domestic: Decimal,
    pub percent_import: Decimal,
}

impl Default for Distribution {
    fn default() -> Self {
        Self {
            percent_domestic: Decimal::ONE,
            percent_import: Decimal::ZERO,
        }
    }
}

/// Which sales channel an initial charge (or energy intensity) is recorded
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Domestic,
    Import,
}

/// Everything `SimulationState` tracks for a single `UseKey`: current stream
/// values, the last value the user explicitly specified for each stream,
/// retirement/recharge/recovery parameters, and the declarative properties
/// (initial charges, GWP, energy intensity) needed to convert between unit
/// families for this use.
#[derive(Debug, Clone, Default)]
pub struct PerUseState {
    values: HashMap<Stream, EngineNumber>,
    last_specified: HashMap<Stream, EngineNumber>,
    enabled: HashMap<Stream, bool>,
    pub retirement_rate: Decimal,
    pub recharge_spec: RechargeSpec,
    recovery_specs: HashMap<RecoveryStage, RecoverySpec>,
    initial_charges: HashMap<Channel, EngineNumber>,
    pub gwp: Option<Decimal>,
    pub energy_intensity_per_kg: Option<Decimal>,
    pub energy_intensity_per_unit: Option<Decimal>,
    last_distribution: Option<Distribution>,
}

impl PerUseState {
    pub fn get(&self, stream: Stream) -> EngineNumber {
        self.values
            .get(&stream)
            .cloned()
            .unwrap_or_else(|| EngineNumber::zero(default_units(stream)))
    }

    pub fn set(&mut self, stream: Stream, value: EngineNumber) {
        self.values.insert(stream, value);
    }

    pub fn last_specified(&self, stream: Stream) -> Option<&EngineNumber> {
        self.last_specified.get(&stream)
    }

    pub fn set_last_specified(&mut self, stream: Stream, value: EngineNumber) {
        self.last_specified.insert(stream, value);
    }

    pub fn is_enabled(&self, stream: Stream) -> bool {
        *self.enabled.get(&stream).unwrap_or(&true)
    }

    pub fn set_enabled(&mut self, stream: Stream, enabled: bool) {
        self.enabled.insert(stream, enabled);
    }

    /// Cumulative retirement rate. Additive; net rate clamped to `[0, 100]`.
    /// Returns whether the raw (pre-clamp) sum fell outside the range, so
    /// callers can push a diagnostic.
    pub fn apply_retirement_rate_delta(&mut self, delta: Decimal) -> bool {
        let raw = self.retirement_rate + delta;
        let clamped = raw.clamp(Decimal::ZERO, Decimal::from(100));
        let was_clamped = raw != clamped;
        self.retirement_rate = clamped;
        was_clamped
    }

    pub fn set_recharge_spec(&mut self, spec: RechargeSpec) {
        self.recharge_spec = spec;
    }

    pub fn recovery_spec(&self, stage: RecoveryStage) -> RecoverySpec {
        self.recovery_specs.get(&stage).copied().unwrap_or_default()
    }

    /// Folds a new recovery command into the stage's spec: rates/induction
    /// add, yield is re-averaged over the number of folded commands. Returns
    /// `true` if this is the 2nd+ command folded in this call (i.e. a
    /// `MultipleRecoverSameStage` diagnostic should be raised by the caller).
    pub fn apply_recovery_spec(&mut self, stage: RecoveryStage, spec: RecoverySpec) -> bool {
        let existing = self.recovery_specs.entry(stage).or_default();
        let prior_count = existing.commands_folded;
        let total_count = prior_count + 1;
        let averaged_yield = if prior_count == 0 {
            spec.reuse_yield
        } else {
            (existing.reuse_yield * Decimal::from(prior_count) + spec.reuse_yield)
                / Decimal::from(total_count)
        };
        existing.recovery_fraction += spec.recovery_fraction;
        existing.induction_rate += spec.induction_rate;
        existing.reuse_yield = averaged_yield;
        existing.commands_folded = total_count;
        prior_count > 0
    }

    pub fn set_initial_charge(&mut self, channel: Channel, value: EngineNumber) {
        self.initial_charges.insert(channel, value);
    }

    pub fn initial_charge(&self, channel: Channel) -> Option<&EngineNumber> {
        self.initial_charges.get(&channel)
    }

    /// `(percentDomestic, percentImport)` computed from current
    /// domestic/import magnitudes. If both are zero, falls back to the last
    /// known ratio, else `(1, 0)` — preserved verbatim per the spec's open
    /// question on this fallback (see `DESIGN.md`).
    pub fn distribution(&mut self) -> Distribution {
        let domestic = self.get(Stream::Domestic).value;
        let import = self.get(Stream::Import).value;
        let total = domestic + import;

        let dist = if total.is_zero() {
            self.last_distribution.unwrap_or_default()
        } else {
            Distribution {
                percent_domestic: domestic / total,
                percent_import: import / total,
            }
        };
        self.last_distribution = Some(dist);
        dist
    }
}

fn default_units(stream: Stream) -> &'static str {
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

/// Per-scope storage for one scenario run. Created empty, mutated in place
/// across years, dropped at scenario end.
#[derive(Debug, Clone)]
pub struct SimulationState {
    uses: crate::sorted_vec_map::SortedVecMap<UseKey, PerUseState>,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            uses: crate::sorted_vec_map::SortedVecMap::new(),
        }
    }
}

impl SimulationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_state(&self, key: &UseKey) -> Option<&PerUseState> {
        self.uses.get(key)
    }

    pub fn use_state_mut(&mut self, key: &UseKey) -> &mut PerUseState {
        self.uses.entry(key.clone()).or_default()
    }

    pub fn try_use_state(&self, key: &UseKey) -> EngineResult<&PerUseState> {
        self.uses.get(key).ok_or_else(|| {
            ScopeError::UnknownUseKey {
                application: key.application.clone(),
                substance: key.substance.clone(),
            }
            .into()
        })
    }

    pub fn get(&self, key: &UseKey, stream: Stream) -> EngineNumber {
        self.uses
            .get(key)
            .map(|u| u.get(stream))
            .unwrap_or_else(|| EngineNumber::zero(default_units(stream)))
    }

    pub fn set(&mut self, key: &UseKey, stream: Stream, value: EngineNumber) {
        self.use_state_mut(key).set(stream, value);
    }

    /// Every `UseKey` with recorded state, in deterministic sorted order.
    pub fn use_keys(&self) -> impl Iterator<Item = &UseKey> {
        self.uses.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UseKey, &PerUseState)> {
        self.uses.iter()
    }

    /// Rolls equipment over at year boundary: `priorEquipment <- equipment`,
    /// and zeroes the "new this year" counters (§4.6 step 3a).
    pub fn roll_over_year(&mut self) {
        for (_, use_state) in self.uses.iter_mut() {
            let equipment = use_state.get(Stream::Equipment);
            use_state.set(Stream::PriorEquipment, equipment);
            use_state.set(Stream::PopulationNew, EngineNumber::zero("units"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unseen_use_key_reads_as_zero() {
        let state = SimulationState::new();
        let key = UseKey::new("App", "Sub");
        assert_eq!(state.get(&key, Stream::Domestic).value, Decimal::ZERO);
    }

    #[test]
    fn distribution_falls_back_to_one_zero_when_never_set() {
        let mut state = SimulationState::new();
        let key = UseKey::new("App", "Sub");
        let dist = state.use_state_mut(&key).distribution();
        assert_eq!(dist.percent_domestic, Decimal::ONE);
        assert_eq!(dist.percent_import, Decimal::ZERO);
    }

    #[test]
    fn distribution_falls_back_to_last_known_ratio_when_both_zero_again() {
        let mut state = SimulationState::new();
        let key = UseKey::new("App", "Sub");
        let use_state = state.use_state_mut(&key);
        use_state.set(Stream::Domestic, EngineNumber::new(dec!(30), "kg"));
        use_state.set(Stream::Import, EngineNumber::new(dec!(70), "kg"));
        let first = use_state.distribution();
        use_state.set(Stream::Domestic, EngineNumber::zero("kg"));
        use_state.set(Stream::Import, EngineNumber::zero("kg"));
        let second = use_state.distribution();
        assert_eq!(second, first);
    }

    #[test]
    fn roll_over_year_moves_equipment_to_prior_and_zeroes_new() {
        let mut state = SimulationState::new();
        let key = UseKey::new("App", "Sub");
        state.set(&key, Stream::Equipment, EngineNumber::new(dec!(85), "units"));
        state.set(&key, Stream::PopulationNew, EngineNumber::new(dec!(12), "units"));
        state.roll_over_year();
        assert_eq!(state.get(&key, Stream::PriorEquipment).value, dec!(85));
        assert_eq!(state.get(&key, Stream::PopulationNew).value, Decimal::ZERO);
    }

    #[test]
    fn retirement_rate_clamps_to_0_100_and_reports_clamping() {
        let mut state = SimulationState::new();
        let key = UseKey::new("App", "Sub");
        let use_state = state.use_state_mut(&key);
        assert!(!use_state.apply_retirement_rate_delta(dec!(60)));
        assert!(use_state.apply_retirement_rate_delta(dec!(60)));
        assert_eq!(use_state.retirement_rate, Decimal::from(100));
    }

    #[test]
    fn multiple_recover_commands_add_rates_and_average_yield() {
        let mut state = SimulationState::new();
        let key = UseKey::new("App", "Sub");
        let use_state = state.use_state_mut(&key);
        let first_is_repeat = use_state.apply_recovery_spec(
            RecoveryStage::Eol,
            RecoverySpec {
                recovery_fraction: dec!(10),
                reuse_yield: dec!(80),
                induction_rate: dec!(0),
                commands_folded: 0,
            },
        );
        let second_is_repeat = use_state.apply_recovery_spec(
            RecoveryStage::Eol,
            RecoverySpec {
                recovery_fraction: dec!(5),
                reuse_yield: dec!(90),
                induction_rate: dec!(0),
                commands_folded: 0,
            },
        );
        assert!(!first_is_repeat);
        assert!(second_is_repeat);
        let combined = use_state.recovery_spec(RecoveryStage::Eol);
        assert_eq!(combined.recovery_fraction, dec!(15));
        assert_eq!(combined.reuse_yield, dec!(85));
    }
}
