//! Result record (C8): a flattened per-year per-scope record of every
//! reportable stream, plus the trade-attribution supplement, and its exact
//! §6.2 CSV serialization.

use std::io::Write;

use crate::error::EngineResult;
use crate::number::EngineNumber;

/// The two per-channel initial charges in effect at year end — the only
/// per-channel declarative properties the flattened stream list doesn't
/// already carry (see `SPEC_FULL.md` §3).
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSupplement {
    pub import_initial_charge: EngineNumber,
    pub domestic_initial_charge: EngineNumber,
}

/// One `(year, application, substance)` snapshot (§4.7). `ghgConsumption`
/// from the distilled spec's field list is folded into `consumption` — both
/// name the same tCO2e quantity, and only one survives into the §6.2 CSV
/// column set (`consumption_tCO2e`); see `DESIGN.md`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub scenario: String,
    pub trial: u32,
    pub year: i32,
    pub application: String,
    pub substance: String,
    pub domestic: EngineNumber,
    pub import: EngineNumber,
    pub export: EngineNumber,
    pub sales: EngineNumber,
    pub recycle: EngineNumber,
    pub population: EngineNumber,
    pub population_new: EngineNumber,
    pub consumption: EngineNumber,
    pub consumption_no_recycle: EngineNumber,
    pub recycle_consumption: EngineNumber,
    pub recharge_emissions: EngineNumber,
    pub eol_emissions: EngineNumber,
    pub energy_consumption: EngineNumber,
    pub trade_supplement: TradeSupplement,
}

/// A non-fatal event worth surfacing without failing the scenario (§7):
/// multiple `recover` commands for one stage, or a clamped value.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub scenario: String,
    pub year: i32,
    pub scope: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    MultipleRecoverSameStage,
    ClampedRetirementRate,
    ClampedNegativeVirgin,
}

/// All the records and diagnostics produced by running one or more scenarios.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub records: Vec<ResultRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: ResultSet) {
        self.records.extend(other.records);
        self.diagnostics.extend(other.diagnostics);
    }
}

const CSV_HEADER: [&str; 18] = [
    "scenario",
    "trial",
    "year",
    "application",
    "substance",
    "domestic_kg",
    "import_kg",
    "export_kg",
    "sales_kg",
    "recycle_kg",
    "population_units",
    "populationNew_units",
    "consumption_tCO2e",
    "consumptionNoRecycle_tCO2e",
    "recycleConsumption_tCO2e",
    "rechargeEmissions_tCO2e",
    "eolEmissions_tCO2e",
    "energyConsumption_kwh",
];

/// Serializes `records` to `writer` using the exact §6.2 column set, in the
/// exact column order. Each cell is the value's decimal with full precision;
/// no locale separators (comma is the column delimiter only).
pub fn write_csv<W: Write>(records: &[ResultRecord], writer: W) -> EngineResult<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer
        .write_record(CSV_HEADER)
        .map_err(crate::error::IoError::Csv)?;

    for record in records {
        csv_writer
            .write_record([
                record.scenario.clone(),
                record.trial.to_string(),
                record.year.to_string(),
                record.application.clone(),
                record.substance.clone(),
                record.domestic.value.to_string(),
                record.import.value.to_string(),
                record.export.value.to_string(),
                record.sales.value.to_string(),
                record.recycle.value.to_string(),
                record.population.value.to_string(),
                record.population_new.value.to_string(),
                record.consumption.value.to_string(),
                record.consumption_no_recycle.value.to_string(),
                record.recycle_consumption.value.to_string(),
                record.recharge_emissions.value.to_string(),
                record.eol_emissions.value.to_string(),
                record.energy_consumption.value.to_string(),
            ])
            .map_err(crate::error::IoError::Csv)?;
    }
    csv_writer.flush().map_err(crate::error::IoError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_record() -> ResultRecord {
        ResultRecord {
            scenario: "BAU".to_string(),
            trial: 0,
            year: 2025,
            application: "Domestic Refrigeration".to_string(),
            substance: "HFC-134a".to_string(),
            domestic: EngineNumber::new(dec!(50), "kg"),
            import: EngineNumber::new(dec!(50), "kg"),
            export: EngineNumber::zero("kg"),
            sales: EngineNumber::new(dec!(100), "kg"),
            recycle: EngineNumber::zero("kg"),
            population: EngineNumber::new(dec!(85), "units"),
            population_new: EngineNumber::new(dec!(10), "units"),
            consumption: EngineNumber::new(dec!(143), "tCO2e"),
            consumption_no_recycle: EngineNumber::new(dec!(143), "tCO2e"),
            recycle_consumption: EngineNumber::zero("tCO2e"),
            recharge_emissions: EngineNumber::zero("tCO2e"),
            eol_emissions: EngineNumber::zero("tCO2e"),
            energy_consumption: EngineNumber::zero("kwh"),
            trade_supplement: TradeSupplement {
                import_initial_charge: EngineNumber::new(dec!(2), "kg/unit"),
                domestic_initial_charge: EngineNumber::new(dec!(2), "kg/unit"),
            },
        }
    }

    #[test]
    fn csv_header_matches_the_documented_column_set_exactly() {
        let mut buf = Vec::new();
        write_csv(&[], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.trim_end(), CSV_HEADER.join(","));
    }

    #[test]
    fn csv_row_carries_full_decimal_precision() {
        let mut buf = Vec::new();
        write_csv(&[sample_record()], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let data_line = text.lines().nth(1).unwrap();
        assert!(data_line.contains("100"));
        assert!(data_line.contains("HFC-134a"));
    }
}
