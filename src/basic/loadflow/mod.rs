//! AC and DC load flow drivers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

mod ac;
mod dc;
mod parallel;
mod parameters;

pub use ac::*;
pub use dc::*;
pub use parallel::*;
pub use parameters::*;

use super::{
    error::ModelError,
    network::{LfBus, LfNetwork},
    newtonpf::NewtonRaphsonStatus,
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadFlowStatus {
    #[display("CONVERGED")]
    Converged,
    #[display("MAX_ITERATION_REACHED")]
    MaxIterationReached,
    #[display("MAX_OUTER_ITERATION_REACHED")]
    MaxOuterIterationReached,
    #[display("SOLVER_FAILED")]
    SolverFailed,
    #[display("UNREALISTIC_STATE")]
    UnrealisticState,
    #[display("NO_CALCULATION")]
    NoCalculation,
}

impl From<NewtonRaphsonStatus> for LoadFlowStatus {
    fn from(status: NewtonRaphsonStatus) -> Self {
        match status {
            NewtonRaphsonStatus::Converged => LoadFlowStatus::Converged,
            NewtonRaphsonStatus::MaxIterationReached => LoadFlowStatus::MaxIterationReached,
            NewtonRaphsonStatus::SolverFailed => LoadFlowStatus::SolverFailed,
            NewtonRaphsonStatus::UnrealisticState => LoadFlowStatus::UnrealisticState,
            NewtonRaphsonStatus::NoCalculation => LoadFlowStatus::NoCalculation,
        }
    }
}

/// Engines solve one connected component at a time.
fn check_solvable(network: &LfNetwork) -> Result<(), ModelError> {
    if network.is_empty() {
        return Err(ModelError::EmptyNetwork);
    }
    let components = network.connected_components().len();
    if components > 1 {
        return Err(ModelError::MultipleComponents(components));
    }
    network.buses().iter().try_for_each(LfBus::check_voltage_targets)
}
