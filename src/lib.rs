// === Public Modules (The Canonical Paths) ===
pub mod error;
pub mod executor;
pub mod facade;
pub mod number;
pub mod operation;
pub mod parallel;
pub mod program;
pub mod recalc;
pub mod result;
pub mod scenario;
pub mod scope;
pub mod state;
pub mod stream;
pub mod validation;

// === Private Implementation Details ===
mod config;

// === Convenience ===
pub mod sorted_vec_map;

pub use crate::config::{init_tracing, EngineConfig};
pub use crate::error::{EngineError, EngineResult};
pub use crate::number::{EngineNumber, UnitConverter};
pub use crate::scenario::ScenarioRunner;
pub use crate::scope::{Scope, UseKey};
pub use crate::state::SimulationState;
pub use crate::stream::Stream;
