//! Facade (§6.3/§6.4): the three documented host-application entry points,
//! plus the CLI exit-code mapping. Parsing QubecTalk source text into a
//! `ParsedProgram` is out of scope (§1) — these functions take an
//! already-parsed `ParsedProgram` where the source spec's `execute(code)`
//! would have taken raw source text; see `DESIGN.md`.

use crate::config::EngineConfig;
use crate::error::{EngineError, ScopeError};
use crate::parallel::ParallelSimulationExecutor;
use crate::program::ParsedProgram;
use crate::result::{write_csv, ResultRecord};
use crate::scenario::ScenarioRunner;
use crate::validation::validate_scenario;

/// `version() → string` (§6.3).
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// `execute(code) → "OK\n\n" + csv` or `"Error: " + message + "\n\n"` (§6.3),
/// run across every scenario `program` names. `progress` is invoked after
/// each scenario finishes, with the fraction of the batch completed so far;
/// a no-op closure is a valid callback.
pub fn execute(program: &dyn ParsedProgram, mut progress: impl FnMut(f64)) -> String {
    let names = program.scenario_names();
    let total = names.len().max(1);
    let mut all_records = Vec::new();

    for (index, name) in names.iter().enumerate() {
        match run_one(program, name) {
            Ok(mut records) => all_records.append(&mut records),
            Err(err) => return format_error(&err),
        }
        progress((index + 1) as f64 / total as f64);
    }

    format_ok(&all_records)
}

/// `executeScenario(code, name) → same shape, single scenario only` (§6.3).
pub fn execute_scenario(program: &dyn ParsedProgram, name: &str, mut progress: impl FnMut(f64)) -> String {
    let result = run_one(program, name);
    progress(1.0);
    match result {
        Ok(records) => format_ok(&records),
        Err(err) => format_error(&err),
    }
}

fn run_one(program: &dyn ParsedProgram, name: &str) -> Result<Vec<ResultRecord>, EngineError> {
    let spec = program
        .scenario(name)
        .ok_or_else(|| EngineError::from(ScopeError::UnknownScenario(name.to_string())))?;
    validate_scenario(&spec)?;

    if spec.trials <= 1 {
        let runner = ScenarioRunner::new(&spec, 0);
        Ok(runner.run()?.records)
    } else {
        let executor = ParallelSimulationExecutor::new(EngineConfig::default());
        Ok(executor.run_all(&[spec], |_| {})?.records)
    }
}

fn format_ok(records: &[ResultRecord]) -> String {
    let mut buf = Vec::new();
    match write_csv(records, &mut buf) {
        Ok(()) => format!("OK\n\n{}", String::from_utf8_lossy(&buf)),
        Err(err) => format_error(&err),
    }
}

fn format_error(err: &EngineError) -> String {
    format!("Error: {err}\n\n")
}

/// `0` success; `1` parse error; `2` simulation error; `3` I/O error (§6.4).
/// Parsing is out of scope for this crate (§1): `1` is reserved for a host
/// application's own upstream parser result and is never produced here.
pub fn exit_code<T>(result: &Result<T, EngineError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(EngineError::Io(_)) => 3,
        Err(_) => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::EngineNumber;
    use crate::operation::{Operation, OperationKind, YearMatcher};
    use crate::program::{LiteralProgram, ScenarioSpec, Stanza};
    use crate::state::Channel;
    use crate::stream::Stream;
    use rust_decimal_macros::dec;

    fn sample_program() -> LiteralProgram {
        let baseline = Stanza::new("default").with_operations(
            "Domestic Refrigeration",
            "HFC-134a",
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
                    OperationKind::Set {
                        stream: Stream::Domestic,
                        amount: EngineNumber::new(dec!(100), "kg"),
                        year_matcher: YearMatcher::All,
                    },
                ),
            ],
        );
        LiteralProgram::new().with_scenario(ScenarioSpec {
            name: "BAU".to_string(),
            baseline_stanza: baseline,
            ordered_policy_stanzas: vec![],
            start_year: 2025,
            end_year: 2025,
            trials: 1,
        })
    }

    #[test]
    fn execute_scenario_reports_ok_and_a_csv_body_on_success() {
        let program = sample_program();
        let output = execute_scenario(&program, "BAU", |_| {});
        assert!(output.starts_with("OK\n\n"));
        assert!(output.contains("domestic_kg"));
    }

    #[test]
    fn execute_scenario_reports_an_error_for_an_unknown_name() {
        let program = sample_program();
        let output = execute_scenario(&program, "missing", |_| {});
        assert!(output.starts_with("Error: "));
    }

    #[test]
    fn exit_code_maps_success_and_non_io_failure() {
        let ok: Result<(), EngineError> = Ok(());
        assert_eq!(exit_code(&ok), 0);
        let err: Result<(), EngineError> = Err(ScopeError::UnknownScenario("x".to_string()).into());
        assert_eq!(exit_code(&err), 2);
    }
}
