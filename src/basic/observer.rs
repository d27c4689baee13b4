//! Diagnostics sink threaded through a solve.
//!
//! Observers only watch: nothing they do can change the numerical results.

use std::{collections::HashMap, time::Instant};

use nalgebra::DVector;
use tracing::debug;

use super::{equations::EquationSystem, outerloop::OuterLoopStatus};

/// Hooks around every phase of a load flow. All methods default to no-ops.
#[allow(unused_variables)]
pub trait LoadFlowObserver {
    fn before_equation_system_creation(&mut self) {}
    fn after_equation_system_creation(&mut self, system: &EquationSystem) {}
    fn before_voltage_initializer_preparation(&mut self, initializer: &str) {}
    fn after_voltage_initializer_preparation(&mut self) {}
    fn begin_iteration(&mut self, iteration: usize) {}
    fn after_equation_vector_update(&mut self, system: &EquationSystem, mismatch: &DVector<f64>, iteration: usize) {}
    fn before_jacobian_build(&mut self, iteration: usize) {}
    fn after_jacobian_build(&mut self, iteration: usize) {}
    fn before_lu_decomposition(&mut self, iteration: usize) {}
    fn after_lu_decomposition(&mut self, iteration: usize) {}
    fn before_lu_solve(&mut self, iteration: usize) {}
    fn after_lu_solve(&mut self, iteration: usize) {}
    fn end_iteration(&mut self, iteration: usize) {}
    fn before_outer_loop_status_check(&mut self, name: &str, outer_iteration: usize) {}
    fn after_outer_loop_status_check(&mut self, name: &str, status: OuterLoopStatus) {}
    fn before_outer_loop_body(&mut self, name: &str) {}
    fn after_outer_loop_body(&mut self, name: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

impl LoadFlowObserver for NoOpObserver {}

/// Reports phase timings and the largest mismatch of each iteration through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver {
    /// Start time of every phase still running; outer loop bodies enclose solver phases.
    started: HashMap<&'static str, Instant>,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn start(&mut self, phase: &'static str) {
        self.started.insert(phase, Instant::now());
    }

    fn stop(&mut self, phase: &'static str, iteration: Option<usize>) {
        if let Some(t) = self.started.remove(phase) {
            debug!(phase, ?iteration, elapsed_us = t.elapsed().as_micros() as u64, "phase done");
        }
    }
}

impl LoadFlowObserver for TracingObserver {
    fn before_equation_system_creation(&mut self) {
        self.start("equation_system_creation");
    }

    fn after_equation_system_creation(&mut self, system: &EquationSystem) {
        self.stop("equation_system_creation", None);
        debug!(
            rows = system.row_count(),
            columns = system.column_count(),
            terms = system.terms().len(),
            "equation system"
        );
    }

    fn before_voltage_initializer_preparation(&mut self, initializer: &str) {
        debug!(initializer, "preparing voltage initializer");
        self.start("voltage_initializer");
    }

    fn after_voltage_initializer_preparation(&mut self) {
        self.stop("voltage_initializer", None);
    }

    fn after_equation_vector_update(&mut self, system: &EquationSystem, mismatch: &DVector<f64>, iteration: usize) {
        if mismatch.is_empty() {
            return;
        }
        let row = mismatch.iamax();
        let value = mismatch[row];
        if let Some(key) = system.rows().get(row) {
            debug!(iteration, equation = %key, mismatch = value, "largest mismatch");
        }
    }

    fn before_jacobian_build(&mut self, _iteration: usize) {
        self.start("jacobian_build");
    }

    fn after_jacobian_build(&mut self, iteration: usize) {
        self.stop("jacobian_build", Some(iteration));
    }

    fn before_lu_decomposition(&mut self, _iteration: usize) {
        self.start("lu_decomposition");
    }

    fn after_lu_decomposition(&mut self, iteration: usize) {
        self.stop("lu_decomposition", Some(iteration));
    }

    fn before_lu_solve(&mut self, _iteration: usize) {
        self.start("lu_solve");
    }

    fn after_lu_solve(&mut self, iteration: usize) {
        self.stop("lu_solve", Some(iteration));
    }

    fn before_outer_loop_status_check(&mut self, name: &str, outer_iteration: usize) {
        debug!(outer_loop = name, outer_iteration, "checking outer loop");
    }

    fn after_outer_loop_status_check(&mut self, name: &str, status: OuterLoopStatus) {
        debug!(outer_loop = name, %status, "outer loop checked");
    }

    fn before_outer_loop_body(&mut self, _name: &str) {
        self.start("outer_loop_body");
    }

    fn after_outer_loop_body(&mut self, _name: &str) {
        self.stop("outer_loop_body", None);
    }
}
