use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Errors raised by `EngineNumber` unit conversion.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    #[error("no conversion path from '{from}' to '{to}' in the current context")]
    Mismatch { from: String, to: String },

    #[error("unrecognized unit string: '{0}'")]
    UnknownUnit(String),

    #[error("conversion from units to mass requires an amortized unit volume")]
    MissingAmortizedVolume,

    #[error("conversion requires a GWP value")]
    MissingGwp,

    #[error("conversion requires an energy intensity")]
    MissingEnergyIntensity,

    #[error("conversion requires a last-specified value to resolve '% prior year'")]
    MissingLastSpecified,

    #[error("conversion from '% current' to a mass unit requires the stream's current volume total")]
    MissingVolumeTotal,

    #[error("conversion from '% current' to an equipment unit requires the current population")]
    MissingPopulation,

    #[error("numeric overflow while converting '{0}'")]
    NumericOverflow(String),
}

/// Errors raised while addressing or resolving a `Scope`/`UseKey`, or an
/// unrecognized stream name.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScopeError {
    #[error("unknown stream: '{0}'")]
    UnknownStream(String),

    #[error("no state recorded for application '{application}', substance '{substance}'")]
    UnknownUseKey { application: String, substance: String },

    #[error("unknown scenario: '{0}'")]
    UnknownScenario(String),
}

/// Errors raised while executing an `Operation`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OperationError {
    #[error(
        "invalid displacement in scenario '{scenario}' year {year} scope {scope} op #{operation_index}: {reason}"
    )]
    InvalidDisplacement {
        scenario: String,
        year: i32,
        scope: String,
        operation_index: usize,
        reason: String,
    },

    #[error(
        "operation failed in scenario '{scenario}' year {year} scope {scope} op #{operation_index}: {message}"
    )]
    Failed {
        scenario: String,
        year: i32,
        scope: String,
        operation_index: usize,
        message: String,
    },
}

/// Errors raised during scenario/stanza validation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("duplicate {kind} name: '{name}'")]
    Duplicate { kind: &'static str, name: String },

    #[error("scenario '{0}' declares an empty year range")]
    EmptyYearRange(String),
}

/// Errors raised by the facade and CSV output boundary.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("io operation failed: {0}")]
    Io(#[from] std::io::Error),
}
