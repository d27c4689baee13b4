//! Newton-Raphson iteration over an [`EquationSystem`].

use derive_more::Display;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

mod scaling;
mod stopping_criteria;

pub use scaling::*;
pub use stopping_criteria::*;

use super::{
    equations::{EquationKey, EquationSystem, EquationType, VariableType},
    jacobian::JacobianMatrix,
    network::LfNetwork,
    observer::LoadFlowObserver,
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewtonRaphsonStatus {
    #[display("NO_CALCULATION")]
    NoCalculation,
    #[display("CONVERGED")]
    Converged,
    #[display("MAX_ITERATION_REACHED")]
    MaxIterationReached,
    #[display("SOLVER_FAILED")]
    SolverFailed,
    #[display("UNREALISTIC_STATE")]
    UnrealisticState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonRaphsonParameters {
    pub max_iterations: usize,
    pub stopping_criteria: StoppingCriteria,
    pub state_vector_scaling: StateVectorScalingMode,
    pub min_realistic_voltage: f64,
    pub max_realistic_voltage: f64,
    /// Check the realistic band every `n` iterations. `None` checks at convergence only.
    pub realistic_check_period: Option<usize>,
}

impl Default for NewtonRaphsonParameters {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            stopping_criteria: StoppingCriteria::default(),
            state_vector_scaling: StateVectorScalingMode::default(),
            min_realistic_voltage: 0.5,
            max_realistic_voltage: 1.5,
            realistic_check_period: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonRaphsonResult {
    pub status: NewtonRaphsonStatus,
    pub iterations: usize,
    /// Calculated minus target active power at the slack bus, in pu.
    pub slack_bus_active_power_mismatch: f64,
}

impl NewtonRaphsonResult {
    pub fn not_started() -> Self {
        Self {
            status: NewtonRaphsonStatus::NoCalculation,
            iterations: 0,
            slack_bus_active_power_mismatch: 0.0,
        }
    }
}

pub struct NewtonRaphson {
    parameters: NewtonRaphsonParameters,
    stopping_criteria: Box<dyn NewtonRaphsonStoppingCriteria>,
    scaling: Box<dyn StateVectorScaling>,
}

impl NewtonRaphson {
    pub fn new(parameters: NewtonRaphsonParameters) -> Self {
        let stopping_criteria = parameters.stopping_criteria.build();
        let scaling = parameters.state_vector_scaling.build();
        Self {
            parameters,
            stopping_criteria,
            scaling,
        }
    }

    pub fn with_stopping_criteria(mut self, criteria: Box<dyn NewtonRaphsonStoppingCriteria>) -> Self {
        self.stopping_criteria = criteria;
        self
    }

    pub fn with_scaling(mut self, scaling: Box<dyn StateVectorScaling>) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn parameters(&self) -> &NewtonRaphsonParameters {
        &self.parameters
    }

    /// Iterates from the state currently stored in `system`.
    ///
    /// Singular Jacobians and non square systems end the run with
    /// [`NewtonRaphsonStatus::SolverFailed`], never with an error.
    pub fn run(
        &mut self,
        network: &LfNetwork,
        system: &mut EquationSystem,
        jacobian: &mut JacobianMatrix,
        observer: &mut dyn LoadFlowObserver,
    ) -> NewtonRaphsonResult {
        let mut x = system.state_vector();
        system.update_equations(&x);
        let mut iterations = 0;
        let status = loop {
            observer.begin_iteration(iterations);
            let mismatch = system.mismatch(network);
            observer.after_equation_vector_update(system, &mismatch, iterations);
            let test = self.stopping_criteria.test(&mismatch, system.rows());
            trace!(network = network.num, iteration = iterations, norm = test.norm, "newton-raphson mismatch");
            if test.converged {
                break if self.is_state_realistic(network, system) {
                    NewtonRaphsonStatus::Converged
                } else {
                    NewtonRaphsonStatus::UnrealisticState
                };
            }
            if iterations >= self.parameters.max_iterations {
                break NewtonRaphsonStatus::MaxIterationReached;
            }

            observer.before_jacobian_build(iterations);
            let built = jacobian.update(system);
            observer.after_jacobian_build(iterations);
            if let Err(e) = built {
                warn!(network = network.num, error = %e, "jacobian assembly failed");
                break NewtonRaphsonStatus::SolverFailed;
            }

            observer.before_lu_decomposition(iterations);
            let decomposed = jacobian.decompose();
            observer.after_lu_decomposition(iterations);
            if let Err(e) = decomposed {
                warn!(network = network.num, iteration = iterations, error = %e, "lu decomposition failed");
                break NewtonRaphsonStatus::SolverFailed;
            }

            let mut dx = mismatch;
            observer.before_lu_solve(iterations);
            let solved = jacobian.solve(&mut dx);
            observer.after_lu_solve(iterations);
            if let Err(e) = solved {
                warn!(network = network.num, iteration = iterations, error = %e, "lu solve failed");
                break NewtonRaphsonStatus::SolverFailed;
            }

            let columns = system.columns().to_vec();
            let ctx = StepContext {
                variables: &columns,
                mismatch_norm: test.norm,
            };
            self.scaling.scale(&mut dx, &ctx, &mut |step: &DVector<f64>| {
                system.update_equations(&(&x + step));
                system.mismatch(network).norm()
            });

            x += &dx;
            system.update_equations(&x);
            iterations += 1;
            observer.end_iteration(iterations);

            let check_due = self
                .parameters
                .realistic_check_period
                .is_some_and(|period| period > 0 && iterations % period == 0);
            if check_due && !self.is_state_realistic(network, system) {
                break NewtonRaphsonStatus::UnrealisticState;
            }
        };
        let slack_bus_active_power_mismatch = slack_bus_active_power_mismatch(network, system);
        debug!(
            network = network.num,
            %status,
            iterations,
            slack_mismatch = slack_bus_active_power_mismatch,
            "newton-raphson done"
        );
        NewtonRaphsonResult {
            status,
            iterations,
            slack_bus_active_power_mismatch,
        }
    }

    fn is_state_realistic(&self, network: &LfNetwork, system: &EquationSystem) -> bool {
        let (min, max) = (
            self.parameters.min_realistic_voltage,
            self.parameters.max_realistic_voltage,
        );
        let mut realistic = true;
        for var in system.columns().iter().filter(|v| v.kind == VariableType::BusV) {
            let v = system.variable_value(var).unwrap_or(f64::NAN);
            if !(min..=max).contains(&v) {
                debug!(bus = %network.bus(var.element).id, v, "unrealistic voltage");
                realistic = false;
            }
        }
        realistic
    }
}

/// Calculated minus target active injection at the slack bus, in pu.
pub fn slack_bus_active_power_mismatch(network: &LfNetwork, system: &EquationSystem) -> f64 {
    network
        .slack_bus()
        .map(|bus| {
            let key = EquationKey::new(bus.num(), EquationType::BusTargetP);
            system.equation_value(&key) - bus.target_p()
        })
        .unwrap_or(0.0)
}
