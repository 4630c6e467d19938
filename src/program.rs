//! The `ParsedProgram` trait boundary (§6.1): the engine depends on this
//! interface and does not implement the QubecTalk parser behind it. Test code
//! implements it directly with in-memory literal data.

use std::collections::BTreeMap;

use crate::operation::Operation;

/// `applications -> { substances -> orderedOperations }`, in deterministic
/// (sorted) iteration order.
#[derive(Debug, Clone, Default)]
pub struct Stanza {
    pub name: String,
    pub applications: BTreeMap<String, BTreeMap<String, Vec<Operation>>>,
}

impl Stanza {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applications: BTreeMap::new(),
        }
    }

    pub fn with_operations(
        mut self,
        application: impl Into<String>,
        substance: impl Into<String>,
        operations: Vec<Operation>,
    ) -> Self {
        self.applications
            .entry(application.into())
            .or_default()
            .insert(substance.into(), operations);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    pub baseline_stanza: Stanza,
    pub ordered_policy_stanzas: Vec<Stanza>,
    pub start_year: i32,
    pub end_year: i32,
    pub trials: u32,
}

/// The interface the simulation engine consumes; produced externally by the
/// QubecTalk parser (out of scope here, per §1).
pub trait ParsedProgram {
    fn scenario_names(&self) -> Vec<String>;
    fn scenario(&self, name: &str) -> Option<ScenarioSpec>;
}

/// A `ParsedProgram` built from literal in-memory data, for tests and for
/// embedding callers that already have a parsed structure from elsewhere.
#[derive(Debug, Clone, Default)]
pub struct LiteralProgram {
    scenarios: BTreeMap<String, ScenarioSpec>,
}

impl LiteralProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scenario(mut self, scenario: ScenarioSpec) -> Self {
        self.scenarios.insert(scenario.name.clone(), scenario);
        self
    }
}

impl ParsedProgram for LiteralProgram {
    fn scenario_names(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    fn scenario(&self, name: &str) -> Option<ScenarioSpec> {
        self.scenarios.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_program_round_trips_scenario_names() {
        let program = LiteralProgram::new().with_scenario(ScenarioSpec {
            name: "BAU".to_string(),
            baseline_stanza: Stanza::new("default"),
            ordered_policy_stanzas: vec![],
            start_year: 2025,
            end_year: 2030,
            trials: 1,
        });
        assert_eq!(program.scenario_names(), vec!["BAU".to_string()]);
        assert!(program.scenario("BAU").is_some());
        assert!(program.scenario("missing").is_none());
    }
}
