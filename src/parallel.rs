//! `ParallelSimulationExecutor` (C9): producer/consumer pool that runs
//! multiple scenarios (and their trials) concurrently and merges their
//! results (§5). A `rayon::ThreadPoolBuilder` pool of `worker_count` threads
//! dispatches one task per `(scenario, trial)` via `rayon::Scope::spawn`;
//! results funnel through a bounded `crossbeam_channel` the calling thread
//! drains with `recv_timeout` against the configured hard wait bound.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, IoError};
use crate::program::ScenarioSpec;
use crate::result::ResultSet;
use crate::scenario::ScenarioRunner;

struct WorkerOutcome {
    scenario_name: String,
    outcome: EngineResult<ResultSet>,
}

/// Runs a batch of scenarios across a bounded worker pool (§5: "no
/// suspension points inside a scenario run" rules out an async runtime —
/// each scenario runs to completion synchronously on its worker thread).
pub struct ParallelSimulationExecutor {
    config: EngineConfig,
}

impl ParallelSimulationExecutor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Runs every scenario across all of its configured trials and merges
    /// the results. Cancellation on the first scenario failure is a shared
    /// `AtomicBool` checked between scenario dispatches (not mid-scenario,
    /// since a scenario run never suspends); the first error encountered is
    /// returned once every already-dispatched worker has reported in.
    /// `progress` is invoked on the calling thread after each scenario
    /// completes, with the fraction of the batch finished so far (§5); a
    /// no-op closure is a valid callback.
    pub fn run_all(&self, scenarios: &[ScenarioSpec], mut progress: impl FnMut(f64)) -> EngineResult<ResultSet> {
        let jobs: Vec<(&ScenarioSpec, u32)> = scenarios
            .iter()
            .flat_map(|spec| (0..spec.trials.max(1)).map(move |trial| (spec, trial)))
            .collect();

        if jobs.is_empty() {
            return Ok(ResultSet::new());
        }

        let worker_count = self.config.worker_count.max(1);
        let (sender, receiver) = crossbeam_channel::bounded::<WorkerOutcome>(worker_count);
        let cancelled = Arc::new(AtomicBool::new(false));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .build()
            .map_err(|e| {
                EngineError::from(IoError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
            })?;

        pool.scope(|scope| {
            for (spec, trial) in &jobs {
                let sender = sender.clone();
                let cancelled = Arc::clone(&cancelled);
                scope.spawn(move |_| {
                    if cancelled.load(Ordering::Relaxed) {
                        return;
                    }
                    let runner = ScenarioRunner::new(spec, *trial);
                    let outcome = runner.run();
                    if outcome.is_err() {
                        cancelled.store(true, Ordering::Relaxed);
                    }
                    let _ = sender.send(WorkerOutcome {
                        scenario_name: spec.name.clone(),
                        outcome,
                    });
                });
            }
        });
        drop(sender);

        let mut merged = ResultSet::new();
        let mut first_error = None;
        let mut received = 0usize;

        while received < jobs.len() {
            match receiver.recv_timeout(self.config.pool_timeout) {
                Ok(WorkerOutcome { scenario_name, outcome }) => {
                    received += 1;
                    match outcome {
                        Ok(result) => merged.merge(result),
                        Err(err) => {
                            if first_error.is_none() {
                                warn!(scenario = %scenario_name, error = %err, "scenario failed; cancelling remaining scenarios");
                                first_error = Some(err);
                            }
                        }
                    }
                    progress(received as f64 / jobs.len() as f64);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    cancelled.store(true, Ordering::Relaxed);
                    return Err(IoError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "parallel scenario pool exceeded its hard wait bound",
                    ))
                    .into());
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(merged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::EngineNumber;
    use crate::operation::{Operation, OperationKind, YearMatcher};
    use crate::program::Stanza;
    use crate::state::Channel;
    use crate::stream::Stream;
    use rust_decimal_macros::dec;

    fn flat_scenario(name: &str) -> ScenarioSpec {
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
        ScenarioSpec {
            name: name.to_string(),
            baseline_stanza: baseline,
            ordered_policy_stanzas: vec![],
            start_year: 2025,
            end_year: 2026,
            trials: 1,
        }
    }

    #[test]
    fn runs_every_scenario_and_merges_all_records() {
        let scenarios = vec![flat_scenario("BAU"), flat_scenario("Policy")];
        let executor = ParallelSimulationExecutor::new(EngineConfig::default());
        let mut ticks = 0;
        let result = executor.run_all(&scenarios, |_| ticks += 1).unwrap();
        assert_eq!(result.records.len(), 4);
        assert_eq!(ticks, 2);
    }

    #[test]
    fn empty_batch_returns_an_empty_result_set() {
        let executor = ParallelSimulationExecutor::new(EngineConfig::default());
        let result = executor.run_all(&[], |_| {}).unwrap();
        assert!(result.records.is_empty());
    }
}
