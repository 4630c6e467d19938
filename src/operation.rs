//! Operation model (C4): the closed set of QubecTalk operation variants, plus
//! `YearMatcher`, the explicit sum type replacing a nullable year range.

use crate::number::EngineNumber;
use crate::state::{Channel, RecoveryStage};
use crate::stream::Stream;

/// `(startYear?, endYear?)` with absent = unbounded, as an explicit sum type
/// rather than two nullable fields (§9 redesign note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearMatcher {
    All,
    Range { start: Option<i32>, end: Option<i32> },
}

impl YearMatcher {
    pub fn matches(&self, year: i32) -> bool {
        match self {
            YearMatcher::All => true,
            YearMatcher::Range { start, end } => {
                start.map(|s| year >= s).unwrap_or(true) && end.map(|e| year <= e).unwrap_or(true)
            }
        }
    }
}

/// How a displaced delta is translated from the source stream's units into
/// the target stream's units (§4.5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplacementType {
    /// Add the same mass to the target. Default.
    Equivalent,
    /// Same as `Equivalent`.
    ByVolume,
    /// Convert the delta to source-units via the source's initial charge,
    /// then to target mass via the target's initial charge.
    ByUnits,
}

/// A policy action targeting a displacement when a cap/floor actually moved
/// the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaceTarget {
    pub target_application: String,
    pub target_substance: String,
    pub displacement_type: DisplacementType,
}

/// One operation within a stanza, applied to a `(application, substance)`
/// scope on years its `YearMatcher` selects. Carries `operation_index`, its
/// position within the stanza, purely for error attribution (§7).
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operation_index: usize,
    pub kind: OperationKind,
}

impl Operation {
    pub fn new(operation_index: usize, kind: OperationKind) -> Self {
        Self { operation_index, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    InitialCharge {
        channel: Channel,
        intensity: EngineNumber,
    },
    Equals {
        kind: EqualsKind,
        intensity: EngineNumber,
    },
    Enable {
        stream: Stream,
    },
    Set {
        stream: Stream,
        amount: EngineNumber,
        year_matcher: YearMatcher,
    },
    Change {
        stream: Stream,
        delta: EngineNumber,
        year_matcher: YearMatcher,
    },
    Cap {
        stream: Stream,
        limit: EngineNumber,
        year_matcher: YearMatcher,
        displace_target: Option<DisplaceTarget>,
    },
    Floor {
        stream: Stream,
        limit: EngineNumber,
        year_matcher: YearMatcher,
        displace_target: Option<DisplaceTarget>,
    },
    Retire {
        rate: EngineNumber,
        year_matcher: YearMatcher,
    },
    Recharge {
        fraction: EngineNumber,
        intensity: EngineNumber,
        year_matcher: YearMatcher,
    },
    Recover {
        fraction: EngineNumber,
        reuse: EngineNumber,
        stage: RecoveryStage,
        induction: rust_decimal::Decimal,
        year_matcher: YearMatcher,
    },
    Replace {
        source_substance: String,
        target_substance: String,
        amount: EngineNumber,
    },
}

/// The declarative property an `Equals` operation assigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualsKind {
    Gwp,
    EnergyIntensity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_matcher_all_matches_everything() {
        assert!(YearMatcher::All.matches(1));
        assert!(YearMatcher::All.matches(2100));
    }

    #[test]
    fn year_matcher_range_is_inclusive_on_both_ends() {
        let m = YearMatcher::Range { start: Some(2025), end: Some(2027) };
        assert!(!m.matches(2024));
        assert!(m.matches(2025));
        assert!(m.matches(2027));
        assert!(!m.matches(2028));
    }

    #[test]
    fn year_matcher_range_with_open_end_is_unbounded_above() {
        let m = YearMatcher::Range { start: Some(2025), end: None };
        assert!(m.matches(3000));
        assert!(!m.matches(2024));
    }
}
