//! `PropagationMode` (§9 redesign note): replaces the source's
//! `propagateChanges: bool` flag with an explicit three-variant sum type so
//! call sites read as intent rather than a bare boolean.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMode {
    /// Write the stream value only; do not trigger any recalc chain. Used by
    /// `DisplaceExecutor` when it performs its own targeted recalc afterward.
    Skip,
    /// Write the stream, treating the value as new-equipment intent with
    /// recharge to be added on top (implicit recharge, §4.4.1).
    Standard,
    /// Write the stream, treating the value as already inclusive of recharge
    /// (explicit recharge, mass-mode writes per §4.4).
    ExplicitRecharge,
}
