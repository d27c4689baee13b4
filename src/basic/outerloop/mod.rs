//! Discrete corrections wrapped around repeated Newton-Raphson solves.

use derive_more::Display;

mod distributed_slack;
mod distribution;
mod reactive_limits;

pub use distributed_slack::*;
pub use distribution::*;
pub use reactive_limits::*;

use super::{
    equations::EquationSystem, error::LoadFlowError, network::LfNetwork, newtonpf::NewtonRaphsonResult,
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum OuterLoopStatus {
    #[display("STABLE")]
    Stable,
    #[display("UNSTABLE")]
    Unstable,
}

/// Mutable view handed to an outer loop between two Newton-Raphson runs.
pub struct OuterLoopContext<'a> {
    pub network: &'a mut LfNetwork,
    pub system: &'a mut EquationSystem,
    pub last_result: NewtonRaphsonResult,
    pub outer_iteration: usize,
}

pub trait OuterLoop: Send {
    fn name(&self) -> &'static str;

    /// Called once before the first Newton-Raphson run.
    fn initialize(&mut self, _ctx: &mut OuterLoopContext) -> Result<(), LoadFlowError> {
        Ok(())
    }

    /// Inspects the converged state and adjusts it. `Unstable` asks for another solve.
    fn check(&mut self, ctx: &mut OuterLoopContext) -> Result<OuterLoopStatus, LoadFlowError>;
}
