use derive_more::Display;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{DcLoadFlowParameters, check_solvable};
use crate::basic::{
    equations::{DcEquationSystemCreationParameters, EquationSystem, create_dc_equation_system},
    error::{LinearSolveError, LoadFlowError},
    initializer::UniformValueVoltageInitializer,
    jacobian::JacobianMatrix,
    network::{LfNetwork, SB, SlackBusSelector},
    newtonpf::slack_bus_active_power_mismatch,
    observer::LoadFlowObserver,
    outerloop::{ActivePowerDistribution, P_RESIDUE_EPS},
    solver::{Solve, new_solver},
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcLoadFlowStatus {
    #[display("CONVERGED")]
    Converged,
    #[display("SOLVER_FAILED")]
    SolverFailed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcLoadFlowResult {
    pub status: DcLoadFlowStatus,
    /// MW, NaN when the solve failed.
    pub slack_bus_active_power_mismatch: f64,
}

/// Linearized load flow: angles only, a single LU solve.
pub struct DcLoadFlowEngine {
    parameters: DcLoadFlowParameters,
    slack_bus_selector: Option<Box<dyn SlackBusSelector>>,
    solver: Option<Box<dyn Solve>>,
}

impl DcLoadFlowEngine {
    pub fn new(parameters: DcLoadFlowParameters) -> Self {
        Self {
            parameters,
            slack_bus_selector: None,
            solver: None,
        }
    }

    pub fn with_slack_bus_selector(mut self, selector: Box<dyn SlackBusSelector>) -> Self {
        self.slack_bus_selector = Some(selector);
        self
    }

    pub fn with_solver(mut self, solver: Box<dyn Solve>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn parameters(&self) -> &DcLoadFlowParameters {
        &self.parameters
    }

    /// Solves `network` in place. Voltage magnitudes are left untouched and
    /// reactive flows are undefined.
    pub fn run(
        &mut self,
        network: &mut LfNetwork,
        observer: &mut dyn LoadFlowObserver,
    ) -> Result<DcLoadFlowResult, LoadFlowError> {
        check_solvable(network)?;
        match self.slack_bus_selector.as_deref() {
            Some(selector) => network.select_slack_bus(selector)?,
            None => network.select_slack_bus(self.parameters.slack_bus_selection.selector().as_ref())?,
        };

        if self.parameters.distributed_slack {
            // lossless model: the whole imbalance has to be picked up by generators
            let imbalance = -network.buses().iter().map(|b| b.target_p()).sum::<f64>();
            let result = ActivePowerDistribution::new(self.parameters.balance_type).run(network, imbalance);
            if result.remaining.abs() > P_RESIDUE_EPS {
                warn!(
                    network = network.num,
                    remaining_mw = result.remaining * SB,
                    "imbalance not fully distributed, remainder left on slack bus"
                );
            }
            debug!(network = network.num, distributed_mw = result.distributed * SB, "dc imbalance distributed");
        }

        observer.before_equation_system_creation();
        let mut system = create_dc_equation_system(
            network,
            &DcEquationSystemCreationParameters {
                low_impedance_threshold: self.parameters.low_impedance_threshold,
                use_transformer_ratio: self.parameters.use_transformer_ratio,
            },
        )?;
        observer.after_equation_system_creation(&system);

        // from zero angles the mismatch holds the constant part of every term
        let mut x = system.create_state_vector(network, &UniformValueVoltageInitializer);

        let custom_solver = self.solver.is_some();
        let solver = match self.solver.take() {
            Some(solver) => solver,
            None => new_solver(self.parameters.linear_solver)?,
        };
        let mut jacobian = JacobianMatrix::new(solver);

        observer.begin_iteration(0);
        let mut dx = system.mismatch(network);
        observer.after_equation_vector_update(&system, &dx, 0);
        let solved = solve_once(&mut jacobian, &system, &mut dx, observer);
        observer.end_iteration(1);
        if custom_solver {
            self.solver = Some(jacobian.into_solver());
        }

        let result = match solved {
            Ok(()) => {
                x += &dx;
                system.update_equations(&x);
                system.update_network(network);
                DcLoadFlowResult {
                    status: DcLoadFlowStatus::Converged,
                    slack_bus_active_power_mismatch: slack_bus_active_power_mismatch(network, &system) * SB,
                }
            }
            Err(e) => {
                warn!(network = network.num, error = %e, "dc load flow failed");
                DcLoadFlowResult {
                    status: DcLoadFlowStatus::SolverFailed,
                    slack_bus_active_power_mismatch: f64::NAN,
                }
            }
        };
        info!(network = network.num, status = %result.status, "dc load flow done");
        Ok(result)
    }
}

fn solve_once(
    jacobian: &mut JacobianMatrix,
    system: &EquationSystem,
    rhs: &mut DVector<f64>,
    observer: &mut dyn LoadFlowObserver,
) -> Result<(), LinearSolveError> {
    observer.before_jacobian_build(0);
    let built = jacobian.update(system);
    observer.after_jacobian_build(0);
    built?;
    observer.before_lu_decomposition(0);
    let decomposed = jacobian.decompose();
    observer.after_lu_decomposition(0);
    decomposed?;
    observer.before_lu_solve(0);
    let solved = jacobian.solve(rhs);
    observer.after_lu_solve(0);
    solved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        basic::{
            network::{LfBus, LfNetwork, PiModel},
            observer::NoOpObserver,
            outerloop::BalanceType,
        },
        testcases::*,
    };

    fn flows(net: &LfNetwork) -> Vec<f64> {
        net.branches().iter().flat_map(|b| [b.p1, b.p2]).collect()
    }

    #[test]
    fn two_bus_dc_splits_load_over_parallel_lines() {
        let mut net = two_bus_tutorial().unwrap();
        let result = DcLoadFlowEngine::new(DcLoadFlowParameters::default())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        assert_eq!(result.status, DcLoadFlowStatus::Converged);
        // lossless: the slack produces exactly the load, 7 MW less than its target
        assert!(
            (result.slack_bus_active_power_mismatch + 7.0).abs() < 1e-9,
            "Slack mismatch {}",
            result.slack_bus_active_power_mismatch
        );
        let nhv2 = net.bus_by_id("NHV2").unwrap();
        assert!((nhv2.angle + 0.0685595567867036).abs() < 1e-12, "Angle {}", nhv2.angle);
        assert_eq!(nhv2.v, 1.0);
        for line in net.branches() {
            assert!((line.p1 - 300.0).abs() < 1e-9, "p1 {}", line.p1);
            assert!((line.p2 + 300.0).abs() < 1e-9, "p2 {}", line.p2);
            assert!(line.q1.is_nan() && line.q2.is_nan());
        }
    }

    #[test]
    fn open_end_carries_nothing() {
        let mut net = two_bus_open_line().unwrap();
        DcLoadFlowEngine::new(DcLoadFlowParameters::default())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        let l1 = net.branch_by_id("NHV1_NHV2_1").unwrap();
        let l2 = net.branch_by_id("NHV1_NHV2_2").unwrap();
        assert!((l1.p1 - 600.0).abs() < 1e-9, "p1 {}", l1.p1);
        assert_eq!(l2.p1, 0.0);
        assert!(l2.p2.is_nan());
    }

    #[test]
    fn dc_is_linear_in_injections() {
        let mut base = eurostag_tutorial().unwrap();
        let mut doubled = eurostag_tutorial().unwrap();
        for bus in doubled.buses_mut() {
            bus.load_target_p *= 2.0;
            for g in bus.generators.iter_mut() {
                g.target_p *= 2.0;
            }
        }
        let mut engine = DcLoadFlowEngine::new(DcLoadFlowParameters::default());
        engine.run(&mut base, &mut NoOpObserver).unwrap();
        engine.run(&mut doubled, &mut NoOpObserver).unwrap();
        for (a, b) in flows(&base).iter().zip(flows(&doubled)) {
            assert!((2.0 * a - b).abs() < 1e-9, "Flow {} doubled to {}", a, b);
        }

        // a second run from the solved state gives the same answer
        let before = flows(&base);
        engine.run(&mut base, &mut NoOpObserver).unwrap();
        assert_eq!(before, flows(&base));
    }

    #[test]
    fn phase_shift_drives_flow_without_injections() {
        let mut net = LfNetwork::new();
        net.add_bus(LfBus::new("A", 225.0).with_slack()).unwrap();
        net.add_bus(LfBus::new("B", 225.0)).unwrap();
        net.connect("PST", "A", "B", PiModel::series(0.0, 0.1).with_phase_shift1(0.01))
            .unwrap();
        net.connect("L", "A", "B", PiModel::series(0.0, 0.1)).unwrap();
        DcLoadFlowEngine::new(DcLoadFlowParameters::default())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        // loop flow: 0.01 rad over 0.2 pu of reactance
        let pst = net.branch_by_id("PST").unwrap();
        let line = net.branch_by_id("L").unwrap();
        assert!((pst.p1 - 5.0).abs() < 1e-9, "PST p1 {}", pst.p1);
        assert!((line.p1 + 5.0).abs() < 1e-9, "L p1 {}", line.p1);
    }

    #[test]
    fn distributed_slack_covers_the_lossless_imbalance() {
        let mut net = four_bus_distributed_slack().unwrap();
        let parameters = DcLoadFlowParameters {
            distributed_slack: true,
            balance_type: BalanceType::ProportionalToGenerationPMax,
            ..Default::default()
        };
        let result = DcLoadFlowEngine::new(parameters).run(&mut net, &mut NoOpObserver).unwrap();
        assert!(result.slack_bus_active_power_mismatch.abs() < 1e-6);
        let total: f64 = net
            .buses()
            .iter()
            .flat_map(|b| b.generators.iter().map(|g| g.target_p_mw()))
            .sum();
        assert!((total - 500.0).abs() < 1e-6, "Generation {}", total);
    }

    #[test]
    fn zero_impedance_branch_ties_angles() {
        let mut net = two_bus_tutorial().unwrap();
        net.branch_by_id_mut("NHV1_NHV2_1").unwrap().pi = PiModel::series(0.0, 0.0);
        let result = DcLoadFlowEngine::new(DcLoadFlowParameters::default())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        // a zero impedance branch ties both angles together
        assert_eq!(result.status, DcLoadFlowStatus::Converged);
        let (a, b) = (net.bus_by_id("NHV1").unwrap().angle, net.bus_by_id("NHV2").unwrap().angle);
        assert!((a - b).abs() < 1e-12);
        let l2 = net.branch_by_id("NHV1_NHV2_2").unwrap();
        assert!(l2.p1.abs() < 1e-9);
        let l1 = net.branch_by_id("NHV1_NHV2_1").unwrap();
        assert!((l1.p1 - 600.0).abs() < 1e-9, "p1 {}", l1.p1);
        assert!((l1.p2 + 600.0).abs() < 1e-9, "p2 {}", l1.p2);
    }
}
