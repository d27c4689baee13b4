//! Error taxonomy of the load flow engine.
//!
//! Numerical failures (non convergence, singular Jacobian, unrealistic voltages)
//! are reported as statuses inside the load flow results. The types below cover
//! everything that must abort a solve: malformed input networks, outer loops that
//! cannot make progress, configuration problems and contract violations.
use thiserror::Error;

/// Input network contract violations, reported before any iteration starts.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("network has no bus")]
    EmptyNetwork,
    #[error("network has {0} connected components, split it before solving")]
    MultipleComponents(usize),
    #[error("unknown bus '{0}'")]
    UnknownBus(String),
    #[error("bus number {0} is out of range")]
    BusOutOfRange(usize),
    #[error("duplicate element id '{0}'")]
    DuplicateId(String),
    #[error("bus '{bus}' has conflicting voltage targets {existing} and {requested} pu")]
    ConflictingVoltageTargets {
        bus: String,
        existing: f64,
        requested: f64,
    },
    #[error("zero impedance branch '{0}' connects two voltage controlled buses")]
    ConflictingVoltageControl(String),
    #[error("branch '{0}' has zero impedance and cannot be used in flow equations")]
    ZeroImpedance(String),
    #[error("no slack bus could be selected")]
    NoSlackBus,
}

/// Failures of the Jacobian assembly or of a linear solver backend.
#[derive(Debug, Error)]
pub enum LinearSolveError {
    #[error("matrix is not square ({rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },
    #[error("singular matrix")]
    Singular,
    #[error("matrix has not been factorized")]
    NotFactorized,
    #[error("right hand side has length {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("linear solver backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum LoadFlowError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    LinearSolve(#[from] LinearSolveError),
    #[error("no more generator participating to slack distribution, {remaining_mw:.3} MW left")]
    NoMoreParticipatingGenerator { remaining_mw: f64 },
    #[error("variable {variable} is not referenced by term {term}")]
    UnknownVariable { term: usize, variable: String },
    #[error("linear solver backend '{0}' is not enabled in this build")]
    BackendUnavailable(&'static str),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
