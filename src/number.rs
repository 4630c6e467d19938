//! `EngineNumber` and `UnitConverter` (C1): a decimal value tagged with a unit
//! string, and the conversions between the recognized unit families.

use rust_decimal::Decimal;
use std::fmt;

use crate::error::{EngineResult, UnitError};

/// A numeric value tagged with a canonical unit string, as produced by the
/// QubecTalk parser or computed by the engine. `original_string` preserves
/// whatever literal text the user wrote (when known) for diagnostics; it plays
/// no role in arithmetic.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineNumber {
    pub value: Decimal,
    pub units: String,
    pub original_string: Option<String>,
}

impl EngineNumber {
    pub fn new(value: Decimal, units: impl Into<String>) -> Self {
        Self {
            value,
            units: canonicalize_unit_string(&units.into()),
            original_string: None,
        }
    }

    pub fn with_original(value: Decimal, units: impl Into<String>, original: impl Into<String>) -> Self {
        let mut n = Self::new(value, units);
        n.original_string = Some(original.into());
        n
    }

    pub fn zero(units: impl Into<String>) -> Self {
        Self::new(Decimal::ZERO, units)
    }

    pub fn kind(&self) -> EngineResult<Unit> {
        Unit::parse(&self.units)
    }

    pub fn is_negative(&self) -> bool {
        self.value.is_sign_negative() && !self.value.is_zero()
    }

    /// Returns a copy of this value with the value clamped to `>= 0`.
    pub fn clamped_non_negative(&self) -> Self {
        let mut n = self.clone();
        if n.value.is_sign_negative() {
            n.value = Decimal::ZERO;
        }
        n
    }
}

impl fmt::Display for EngineNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.units)
    }
}

/// Strips whitespace from a unit string; whitespace is insignificant per the
/// unit grammar (`"kg / unit"` and `"kg/unit"` are the same unit).
pub fn canonicalize_unit_string(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MassScale {
    Kilogram,
    MetricTon,
}

impl MassScale {
    /// Factor to multiply a value in this scale by to reach kilograms.
    fn to_kg_factor(self) -> Decimal {
        match self {
            MassScale::Kilogram => Decimal::ONE,
            MassScale::MetricTon => Decimal::from(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmissionsScale {
    TonnesCo2e,
    KilogramsCo2e,
}

impl EmissionsScale {
    fn to_tonnes_factor(self) -> Decimal {
        match self {
            EmissionsScale::TonnesCo2e => Decimal::ONE,
            EmissionsScale::KilogramsCo2e => Decimal::from(1000),
        }
    }
}

/// Which value a percentage is taken relative to. `Nominal` (bare `%`) and
/// `PriorYear` share conversion arithmetic (both resolve against the scope's
/// `lastSpecifiedValue`) but are kept as distinct variants: they must remain
/// semantically distinct through conversion even when numerically equal, since
/// downstream carry-over bookkeeping branches on which one was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PercentBasis {
    Nominal,
    Current,
    PriorYear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Mass(MassScale),
    Equipment,
    Percent(PercentBasis),
    MassPerUnit,
    EnergyPerUnit,
    EnergyPerMass,
    EmissionsPerMass(EmissionsScale),
    Energy,
    Emissions(EmissionsScale),
}

/// A parsed unit string: a `UnitKind` plus whether it carries the `/year`
/// time-scaled modifier. Every stream value in this engine is already an
/// annual figure, so `/year` is accepted and round-tripped but does not change
/// conversion arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unit {
    pub kind: UnitKind,
    pub per_year: bool,
}

impl Unit {
    pub fn parse(raw: &str) -> EngineResult<Self> {
        let canon = canonicalize_unit_string(raw);
        let lower = canon.to_ascii_lowercase();
        let (body, per_year) = match lower.strip_suffix("/year") {
            Some(rest) => (rest.to_string(), true),
            None => (lower, false),
        };

        let kind = match body.as_str() {
            "kg" => UnitKind::Mass(MassScale::Kilogram),
            "mt" => UnitKind::Mass(MassScale::MetricTon),
            "units" | "unit" => UnitKind::Equipment,
            "%" => UnitKind::Percent(PercentBasis::Nominal),
            "%current" => UnitKind::Percent(PercentBasis::Current),
            "%prioryear" => UnitKind::Percent(PercentBasis::PriorYear),
            "kg/unit" => UnitKind::MassPerUnit,
            "kwh/unit" => UnitKind::EnergyPerUnit,
            "kwh/kg" => UnitKind::EnergyPerMass,
            "tco2e/kg" => UnitKind::EmissionsPerMass(EmissionsScale::TonnesCo2e),
            "kgco2e/kg" => UnitKind::EmissionsPerMass(EmissionsScale::KilogramsCo2e),
            "kwh" => UnitKind::Energy,
            "tco2e" => UnitKind::Emissions(EmissionsScale::TonnesCo2e),
            "kgco2e" => UnitKind::Emissions(EmissionsScale::KilogramsCo2e),
            _ => return Err(UnitError::UnknownUnit(raw.to_string()).into()),
        };

        Ok(Self { kind, per_year })
    }

    pub fn is_percent(&self) -> bool {
        matches!(self.kind, UnitKind::Percent(_))
    }

    pub fn is_mass(&self) -> bool {
        matches!(self.kind, UnitKind::Mass(_))
    }

    pub fn is_equipment(&self) -> bool {
        matches!(self.kind, UnitKind::Equipment)
    }
}

/// The mutable context `UnitConverter::convert` draws missing pieces of
/// information from: the current population, the amortized per-unit volume
/// (initial charge), the current total volume of the stream being converted,
/// the last user-specified value for that stream, the scope's GWP, and its
/// energy intensity. Every field is optional; `convert` fails with a specific
/// `UnitError` when a conversion needs a field that is absent.
#[derive(Debug, Clone, Default)]
pub struct ConversionContext {
    pub population: Option<Decimal>,
    pub amortized_unit_volume: Option<Decimal>,
    pub volume_total: Option<Decimal>,
    pub last_specified: Option<EngineNumber>,
    pub gwp: Option<Decimal>,
    pub energy_intensity_per_unit: Option<Decimal>,
    pub energy_intensity_per_kg: Option<Decimal>,
}

pub struct UnitConverter<'a> {
    ctx: &'a ConversionContext,
}

impl<'a> UnitConverter<'a> {
    pub fn new(ctx: &'a ConversionContext) -> Self {
        Self { ctx }
    }

    /// Converts `value` to `target_units`, using `self.ctx` to resolve any
    /// information the source or target unit family needs beyond the raw
    /// decimal value.
    pub fn convert(&self, value: &EngineNumber, target_units: &str) -> EngineResult<EngineNumber> {
        let target_canon = canonicalize_unit_string(target_units);
        let from = value.kind()?;
        let to = Unit::parse(&target_canon)?;

        if from.kind == to.kind {
            return Ok(EngineNumber::new(value.value, target_canon));
        }

        if let UnitKind::Percent(basis) = from.kind {
            let absolute = self.percent_to_absolute(value.value, basis, to)?;
            if absolute.kind()?.kind == to.kind {
                return Ok(EngineNumber::new(absolute.value, target_canon));
            }
            return self.convert(&absolute, &target_canon);
        }

        let out_value = match (from.kind, to.kind) {
            (UnitKind::Mass(a), UnitKind::Mass(b)) => {
                self.scale(value.value, a.to_kg_factor(), b.to_kg_factor())?
            }
            (UnitKind::Equipment, UnitKind::Mass(b)) => {
                let charge = self.require_amortized_volume()?;
                let kg = self.checked_mul(value.value, charge)?;
                self.scale(kg, MassScale::Kilogram.to_kg_factor(), b.to_kg_factor())?
            }
            (UnitKind::Mass(a), UnitKind::Equipment) => {
                let charge = self.require_amortized_volume()?;
                if charge.is_zero() {
                    return Err(UnitError::Mismatch {
                        from: value.units.clone(),
                        to: target_canon,
                    }
                    .into());
                }
                let kg = self.scale(value.value, a.to_kg_factor(), MassScale::Kilogram.to_kg_factor())?;
                self.checked_div(kg, charge)?
            }
            (UnitKind::Mass(a), UnitKind::Emissions(b)) => {
                let gwp = self.require_gwp()?;
                let kg = self.scale(value.value, a.to_kg_factor(), MassScale::Kilogram.to_kg_factor())?;
                let tonnes = self.checked_mul(kg, gwp)?;
                self.scale(tonnes, EmissionsScale::TonnesCo2e.to_tonnes_factor(), b.to_tonnes_factor())?
            }
            (UnitKind::Emissions(a), UnitKind::Mass(b)) => {
                let gwp = self.require_gwp()?;
                if gwp.is_zero() {
                    return Err(UnitError::Mismatch {
                        from: value.units.clone(),
                        to: target_canon,
                    }
                    .into());
                }
                let tonnes = self.scale(value.value, a.to_tonnes_factor(), EmissionsScale::TonnesCo2e.to_tonnes_factor())?;
                let kg = self.checked_div(tonnes, gwp)?;
                self.scale(kg, MassScale::Kilogram.to_kg_factor(), b.to_kg_factor())?
            }
            (UnitKind::Mass(a), UnitKind::Energy) => {
                let intensity = self.require_energy_per_kg()?;
                let kg = self.scale(value.value, a.to_kg_factor(), MassScale::Kilogram.to_kg_factor())?;
                self.checked_mul(kg, intensity)?
            }
            (UnitKind::Equipment, UnitKind::Energy) => {
                let intensity = self.require_energy_per_unit()?;
                self.checked_mul(value.value, intensity)?
            }
            (UnitKind::Emissions(a), UnitKind::Emissions(b)) => {
                self.scale(value.value, a.to_tonnes_factor(), b.to_tonnes_factor())?
            }
            _ => {
                return Err(UnitError::Mismatch {
                    from: value.units.clone(),
                    to: target_canon,
                }
                .into());
            }
        };

        Ok(EngineNumber::new(out_value, target_canon))
    }

    fn percent_to_absolute(
        &self,
        percent_value: Decimal,
        basis: PercentBasis,
        target: Unit,
    ) -> EngineResult<EngineNumber> {
        let fraction = self.checked_div(percent_value, Decimal::from(100))?;
        match basis {
            PercentBasis::Current => {
                if target.is_mass() {
                    let total = self.require_volume_total()?;
                    Ok(EngineNumber::new(self.checked_mul(total, fraction)?, "kg"))
                } else if target.is_equipment() {
                    let population = self.require_population()?;
                    Ok(EngineNumber::new(self.checked_mul(population, fraction)?, "units"))
                } else {
                    Err(UnitError::Mismatch {
                        from: "%current".to_string(),
                        to: format!("{target:?}"),
                    }
                    .into())
                }
            }
            PercentBasis::Nominal | PercentBasis::PriorYear => {
                let last = self
                    .ctx
                    .last_specified
                    .clone()
                    .ok_or(UnitError::MissingLastSpecified)?;
                Ok(EngineNumber::new(
                    self.checked_mul(last.value, fraction)?,
                    last.units,
                ))
            }
        }
    }

    fn scale(&self, value: Decimal, from_factor: Decimal, to_factor: Decimal) -> EngineResult<Decimal> {
        let in_base = self.checked_mul(value, from_factor)?;
        self.checked_div(in_base, to_factor)
    }

    fn checked_mul(&self, a: Decimal, b: Decimal) -> EngineResult<Decimal> {
        a.checked_mul(b)
            .ok_or_else(|| UnitError::NumericOverflow(format!("{a} * {b}")).into())
    }

    fn checked_div(&self, a: Decimal, b: Decimal) -> EngineResult<Decimal> {
        a.checked_div(b)
            .ok_or_else(|| UnitError::NumericOverflow(format!("{a} / {b}")).into())
    }

    fn require_amortized_volume(&self) -> EngineResult<Decimal> {
        self.ctx
            .amortized_unit_volume
            .ok_or(UnitError::MissingAmortizedVolume.into())
    }

    fn require_gwp(&self) -> EngineResult<Decimal> {
        self.ctx.gwp.ok_or(UnitError::MissingGwp.into())
    }

    fn require_energy_per_kg(&self) -> EngineResult<Decimal> {
        self.ctx
            .energy_intensity_per_kg
            .ok_or(UnitError::MissingEnergyIntensity.into())
    }

    fn require_energy_per_unit(&self) -> EngineResult<Decimal> {
        self.ctx
            .energy_intensity_per_unit
            .ok_or(UnitError::MissingEnergyIntensity.into())
    }

    fn require_volume_total(&self) -> EngineResult<Decimal> {
        self.ctx.volume_total.ok_or(UnitError::MissingVolumeTotal.into())
    }

    fn require_population(&self) -> EngineResult<Decimal> {
        self.ctx.population.ok_or(UnitError::MissingPopulation.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use rust_decimal_macros::dec;

    fn ctx() -> ConversionContext {
        ConversionContext {
            population: Some(dec!(20)),
            amortized_unit_volume: Some(dec!(2)),
            volume_total: Some(dec!(100)),
            last_specified: Some(EngineNumber::new(dec!(80), "kg")),
            gwp: Some(dec!(1430)),
            energy_intensity_per_unit: Some(dec!(150)),
            energy_intensity_per_kg: Some(dec!(2)),
        }
    }

    #[test]
    fn mass_to_mass_scales_by_thousand() {
        let c = ctx();
        let conv = UnitConverter::new(&c);
        let out = conv
            .convert(&EngineNumber::new(dec!(2), "mt"), "kg")
            .unwrap();
        assert_eq!(out.value, dec!(2000));
    }

    #[test]
    fn units_to_mass_uses_amortized_volume() {
        let c = ctx();
        let conv = UnitConverter::new(&c);
        let out = conv
            .convert(&EngineNumber::new(dec!(10), "units"), "kg")
            .unwrap();
        assert_eq!(out.value, dec!(20));
    }

    #[test]
    fn percent_current_uses_volume_total() {
        let c = ctx();
        let conv = UnitConverter::new(&c);
        let out = conv
            .convert(&EngineNumber::new(dec!(50), "% current"), "kg")
            .unwrap();
        assert_eq!(out.value, dec!(50));
    }

    #[test]
    fn percent_prior_year_uses_last_specified() {
        let c = ctx();
        let conv = UnitConverter::new(&c);
        let out = conv
            .convert(&EngineNumber::new(dec!(50), "% prior year"), "kg")
            .unwrap();
        assert_eq!(out.value, dec!(40));
    }

    #[test]
    fn bare_percent_and_prior_year_agree_numerically_but_are_distinct_units() {
        let c = ctx();
        let conv = UnitConverter::new(&c);
        let a = conv.convert(&EngineNumber::new(dec!(50), "%"), "kg").unwrap();
        let b = conv
            .convert(&EngineNumber::new(dec!(50), "% prior year"), "kg")
            .unwrap();
        assert_eq!(a.value, b.value);
        assert_ne!(
            Unit::parse("%").unwrap().kind,
            Unit::parse("% prior year").unwrap().kind
        );
    }

    #[test]
    fn missing_context_is_a_unit_error_not_a_panic() {
        let c = ConversionContext::default();
        let conv = UnitConverter::new(&c);
        let err = conv
            .convert(&EngineNumber::new(dec!(10), "units"), "kg")
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Unit(UnitError::MissingAmortizedVolume)
        ));
    }

    #[test]
    fn whitespace_is_insignificant_in_unit_strings() {
        assert_eq!(
            Unit::parse("kg / unit").unwrap().kind,
            Unit::parse("kg/unit").unwrap().kind
        );
    }

    #[test]
    fn mass_to_emissions_uses_gwp() {
        let c = ctx();
        let conv = UnitConverter::new(&c);
        let out = conv
            .convert(&EngineNumber::new(dec!(10), "kg"), "tCO2e")
            .unwrap();
        assert_eq!(out.value, dec!(14300));
    }
}
