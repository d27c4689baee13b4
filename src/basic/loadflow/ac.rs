use tracing::{info, warn};

use super::{AcLoadFlowParameters, LoadFlowStatus, check_solvable};
use crate::basic::{
    equations::{AcEquationSystemCreationParameters, EquationSystem, create_ac_equation_system},
    error::LoadFlowError,
    initializer::VoltageInitializer,
    jacobian::JacobianMatrix,
    network::{LfNetwork, SB, SlackBusSelector},
    newtonpf::{NewtonRaphson, NewtonRaphsonResult, NewtonRaphsonStatus},
    observer::LoadFlowObserver,
    outerloop::{
        DistributedSlackOuterLoop, OuterLoop, OuterLoopContext, OuterLoopStatus, ReactiveLimitsOuterLoop,
    },
    solver::{Solve, new_solver},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcLoadFlowResult {
    pub status: LoadFlowStatus,
    pub solver_status: NewtonRaphsonStatus,
    pub outer_iterations: usize,
    pub newton_raphson_iterations: usize,
    /// MW
    pub slack_bus_active_power_mismatch: f64,
}

impl AcLoadFlowResult {
    pub fn is_ok(&self) -> bool {
        self.status == LoadFlowStatus::Converged
    }
}

/// Full AC load flow: Newton-Raphson wrapped in outer loops.
pub struct AcLoadFlowEngine {
    parameters: AcLoadFlowParameters,
    voltage_initializer: Option<Box<dyn VoltageInitializer>>,
    slack_bus_selector: Option<Box<dyn SlackBusSelector>>,
    outer_loops: Option<Vec<Box<dyn OuterLoop>>>,
    solver: Option<Box<dyn Solve>>,
}

struct OuterLoopsOutcome {
    status: LoadFlowStatus,
    last: NewtonRaphsonResult,
    outer_iterations: usize,
    newton_raphson_iterations: usize,
}

impl AcLoadFlowEngine {
    pub fn new(parameters: AcLoadFlowParameters) -> Self {
        Self {
            parameters,
            voltage_initializer: None,
            slack_bus_selector: None,
            outer_loops: None,
            solver: None,
        }
    }

    pub fn with_voltage_initializer(mut self, initializer: Box<dyn VoltageInitializer>) -> Self {
        self.voltage_initializer = Some(initializer);
        self
    }

    pub fn with_slack_bus_selector(mut self, selector: Box<dyn SlackBusSelector>) -> Self {
        self.slack_bus_selector = Some(selector);
        self
    }

    /// Replaces the outer loops derived from the parameters. Order matters,
    /// the first unstable loop triggers the next solve.
    pub fn with_outer_loops(mut self, outer_loops: Vec<Box<dyn OuterLoop>>) -> Self {
        self.outer_loops = Some(outer_loops);
        self
    }

    pub fn with_solver(mut self, solver: Box<dyn Solve>) -> Self {
        self.solver = Some(solver);
        self
    }

    pub fn parameters(&self) -> &AcLoadFlowParameters {
        &self.parameters
    }

    fn default_outer_loops(parameters: &AcLoadFlowParameters) -> Vec<Box<dyn OuterLoop>> {
        let mut loops: Vec<Box<dyn OuterLoop>> = Vec::new();
        if parameters.distributed_slack {
            loops.push(Box::new(DistributedSlackOuterLoop::new(
                parameters.balance_type,
                parameters.slack_bus_p_max_mismatch,
                parameters.slack_distribution_failure_behavior,
            )));
        }
        if parameters.use_reactive_limits {
            loops.push(Box::new(ReactiveLimitsOuterLoop::new(parameters.max_pq_pv_switch)));
        }
        loops
    }

    /// Solves `network` in place.
    ///
    /// Numerical failures are reported through the result status and the
    /// network always receives the last computed state. Errors are model
    /// problems or an outer loop that cannot make progress.
    pub fn run(
        &mut self,
        network: &mut LfNetwork,
        observer: &mut dyn LoadFlowObserver,
    ) -> Result<AcLoadFlowResult, LoadFlowError> {
        check_solvable(network)?;
        let parameters = self.parameters.clone();

        match self.slack_bus_selector.as_deref() {
            Some(selector) => network.select_slack_bus(selector)?,
            None => network.select_slack_bus(parameters.slack_bus_selection.selector().as_ref())?,
        };

        observer.before_equation_system_creation();
        let mut system = create_ac_equation_system(
            network,
            &AcEquationSystemCreationParameters {
                low_impedance_threshold: parameters.low_impedance_threshold,
            },
        )?;
        observer.after_equation_system_creation(&system);

        let mut default_initializer;
        let initializer: &mut dyn VoltageInitializer = match self.voltage_initializer.as_deref_mut() {
            Some(initializer) => initializer,
            None => {
                default_initializer = parameters
                    .voltage_init_mode
                    .initializer(&parameters.dc_initialization());
                default_initializer.as_mut()
            }
        };
        observer.before_voltage_initializer_preparation(initializer.name());
        initializer.prepare(network)?;
        observer.after_voltage_initializer_preparation();
        system.create_state_vector(network, &*initializer);

        let custom_solver = self.solver.is_some();
        let solver = match self.solver.take() {
            Some(solver) => solver,
            None => new_solver(parameters.linear_solver)?,
        };
        let mut jacobian = JacobianMatrix::new(solver);
        let mut newton_raphson = NewtonRaphson::new(parameters.newton_raphson.clone());

        let mut default_loops;
        let outer_loops: &mut Vec<Box<dyn OuterLoop>> = match self.outer_loops.as_mut() {
            Some(loops) => loops,
            None => {
                default_loops = Self::default_outer_loops(&parameters);
                &mut default_loops
            }
        };

        let outcome = run_outer_loops(
            network,
            &mut system,
            &mut jacobian,
            &mut newton_raphson,
            outer_loops,
            parameters.max_outer_iterations,
            observer,
        );

        system.update_network(network);
        network.update_state();
        if custom_solver {
            self.solver = Some(jacobian.into_solver());
        }

        let outcome = outcome?;
        let result = AcLoadFlowResult {
            status: outcome.status,
            solver_status: outcome.last.status,
            outer_iterations: outcome.outer_iterations,
            newton_raphson_iterations: outcome.newton_raphson_iterations,
            slack_bus_active_power_mismatch: outcome.last.slack_bus_active_power_mismatch * SB,
        };
        info!(
            network = network.num,
            status = %result.status,
            outer_iterations = result.outer_iterations,
            newton_raphson_iterations = result.newton_raphson_iterations,
            slack_mismatch_mw = result.slack_bus_active_power_mismatch,
            "ac load flow done"
        );
        Ok(result)
    }
}

/// Initial solve, then outer loops until one full pass is stable.
fn run_outer_loops(
    network: &mut LfNetwork,
    system: &mut EquationSystem,
    jacobian: &mut JacobianMatrix,
    newton_raphson: &mut NewtonRaphson,
    outer_loops: &mut [Box<dyn OuterLoop>],
    max_outer_iterations: usize,
    observer: &mut dyn LoadFlowObserver,
) -> Result<OuterLoopsOutcome, LoadFlowError> {
    for outer_loop in outer_loops.iter_mut() {
        outer_loop.initialize(&mut OuterLoopContext {
            network: &mut *network,
            system: &mut *system,
            last_result: NewtonRaphsonResult::not_started(),
            outer_iteration: 0,
        })?;
    }

    let mut last = newton_raphson.run(network, system, jacobian, observer);
    let mut newton_raphson_iterations = last.iterations;
    let mut outer_iterations = 0;
    let mut status = LoadFlowStatus::from(last.status);

    while last.status == NewtonRaphsonStatus::Converged {
        let mut unstable = None;
        for outer_loop in outer_loops.iter_mut() {
            let name = outer_loop.name();
            observer.before_outer_loop_status_check(name, outer_iterations);
            let loop_status = outer_loop.check(&mut OuterLoopContext {
                network: &mut *network,
                system: &mut *system,
                last_result: last,
                outer_iteration: outer_iterations,
            })?;
            observer.after_outer_loop_status_check(name, loop_status);
            if loop_status == OuterLoopStatus::Unstable {
                unstable = Some(name);
                break;
            }
        }
        let Some(name) = unstable else {
            break;
        };
        let capped = outer_iterations >= max_outer_iterations;
        if !capped {
            outer_iterations += 1;
        }

        // the check already changed the network, so even a capped pass solves
        // once more to keep the returned state consistent with it
        observer.before_outer_loop_body(name);
        last = newton_raphson.run(network, system, jacobian, observer);
        observer.after_outer_loop_body(name);
        newton_raphson_iterations += last.iterations;
        status = LoadFlowStatus::from(last.status);
        if capped {
            warn!(network = network.num, outer_loop = name, "max outer iterations reached");
            if last.status == NewtonRaphsonStatus::Converged {
                status = LoadFlowStatus::MaxOuterIterationReached;
            }
            break;
        }
    }

    Ok(OuterLoopsOutcome {
        status,
        last,
        outer_iterations,
        newton_raphson_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        basic::{
            equations::{EquationKey, EquationType},
            initializer::{DcValueVoltageInitializer, VoltageInitMode},
            error::ModelError,
            network::{LfGenerator, NameSlackBusSelector, Side},
            newtonpf::StoppingCriteria,
            observer::{NoOpObserver, TracingObserver},
            outerloop::SlackDistributionFailureBehavior,
            solver::DenseSolver,
        },
        testcases::*,
    };

    fn no_outer_loops() -> AcLoadFlowParameters {
        AcLoadFlowParameters {
            distributed_slack: false,
            use_reactive_limits: false,
            ..Default::default()
        }
    }

    fn assert_close(actual: f64, expected: f64, tol: f64, what: &str) {
        assert!(
            (actual - expected).abs() < tol,
            "{}: expected {}, got {}",
            what,
            expected,
            actual
        );
    }

    #[test]
    fn two_bus_tutorial_reference_values() {
        let mut net = two_bus_tutorial().unwrap();
        let result = AcLoadFlowEngine::new(no_outer_loops())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        assert_eq!(result.status, LoadFlowStatus::Converged);
        assert_eq!(result.newton_raphson_iterations, 3);
        assert_eq!(result.outer_iterations, 0);
        assert_close(result.slack_bus_active_power_mismatch, -3.3135, 1e-3, "slack mismatch");

        let nhv2 = net.bus_by_id("NHV2").unwrap();
        assert_close(nhv2.v_kv(), 393.061521, 1e-3, "NHV2 v");
        assert_close(nhv2.angle_deg(), -3.515668, 1e-4, "NHV2 angle");
        for id in ["NHV1_NHV2_1", "NHV1_NHV2_2"] {
            let line = net.branch_by_id(id).unwrap();
            assert_close(line.p1, 301.8432, 1e-3, "p1");
            assert_close(line.q1, 59.2681, 1e-3, "q1");
            assert_close(line.p2, -300.0, 1e-3, "p2");
            assert_close(line.q2, -100.0, 1e-3, "q2");
        }
    }

    #[test]
    fn opening_one_end_moves_flow_onto_the_other_line() {
        let mut net = two_bus_open_line().unwrap();
        let result = AcLoadFlowEngine::new(no_outer_loops())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        assert!(result.is_ok());
        let nhv2 = net.bus_by_id("NHV2").unwrap();
        assert_close(nhv2.v_kv(), 379.019074, 1e-3, "NHV2 v");
        assert_close(nhv2.angle_deg(), -7.270768, 1e-4, "NHV2 angle");
        let l1 = net.branch_by_id("NHV1_NHV2_1").unwrap();
        assert_close(l1.p1, 608.1378, 1e-3, "line 1 p1");
        assert_close(l1.q1, 230.6004, 1e-3, "line 1 q1");
        assert_close(l1.p2, -600.0, 1e-3, "line 1 p2");
        let l2 = net.branch_by_id("NHV1_NHV2_2").unwrap();
        assert_close(l2.p1, 0.0183, 1e-3, "line 2 p1");
        assert_close(l2.q1, -62.5791, 1e-3, "line 2 q1");
        assert!(l2.p2.is_nan() && l2.q2.is_nan());
    }

    #[test]
    fn reconnecting_restores_the_base_case() {
        let mut base = two_bus_tutorial().unwrap();
        let mut engine = AcLoadFlowEngine::new(no_outer_loops());
        engine.run(&mut base, &mut NoOpObserver).unwrap();

        let mut net = two_bus_tutorial().unwrap();
        let line = net.branch_by_id_mut("NHV1_NHV2_2").unwrap();
        line.set_connected(Side::One, false);
        line.set_connected(Side::Two, false);
        engine.run(&mut net, &mut NoOpObserver).unwrap();
        assert_close(net.branch_by_id("NHV1_NHV2_1").unwrap().p2, -600.0, 1e-3, "single line p2");

        let line = net.branch_by_id_mut("NHV1_NHV2_2").unwrap();
        line.set_connected(Side::One, true);
        line.set_connected(Side::Two, true);
        for bus in net.buses_mut() {
            bus.v = 1.0;
            bus.angle = 0.0;
        }
        engine.run(&mut net, &mut NoOpObserver).unwrap();
        for (a, b) in base.buses().iter().zip(net.buses()) {
            assert_close(b.v, a.v, 1e-9, "v");
            assert_close(b.angle, a.angle, 1e-9, "angle");
        }
    }

    #[test]
    fn eurostag_tutorial_with_transformers() {
        let mut net = eurostag_tutorial().unwrap();
        let result = AcLoadFlowEngine::new(AcLoadFlowParameters::default())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(result.outer_iterations, 0);
        assert!(net.bus_by_id("NHV1").unwrap().is_slack());
        assert_close(result.slack_bus_active_power_mismatch, -0.8493, 1e-3, "slack mismatch");

        let nhv1 = net.bus_by_id("NHV1").unwrap();
        let ngen = net.bus_by_id("NGEN").unwrap();
        let nhv2 = net.bus_by_id("NHV2").unwrap();
        let nload = net.bus_by_id("NLOAD").unwrap();
        assert_close(nhv1.v_kv(), 398.203396, 1e-3, "NHV1 v");
        assert_close(nhv2.v_kv(), 385.715728, 1e-3, "NHV2 v");
        assert_close(nload.v_kv(), 153.262661, 1e-3, "NLOAD v");
        let relative = |b: &crate::basic::network::LfBus| b.angle_deg() - ngen.angle_deg();
        assert_close(relative(nhv1), -3.683598, 1e-4, "NHV1 angle");
        assert_close(relative(nhv2), -7.264252, 1e-4, "NHV2 angle");
        assert_close(relative(nload), -13.526502, 1e-4, "NLOAD angle");
        assert_close(ngen.generators[0].q_mvar(), 247.9808, 1e-3, "NGEN q");
    }

    #[test]
    fn reactive_limit_pins_bus_at_max_q() {
        let mut net = three_bus_pv().unwrap();
        let b = net.bus_by_id_mut("B").unwrap();
        b.generators[0] = b.generators[0].clone().with_q_limits(-30.0, 30.0);
        let parameters = AcLoadFlowParameters {
            distributed_slack: false,
            ..Default::default()
        };
        let result = AcLoadFlowEngine::new(parameters).run(&mut net, &mut NoOpObserver).unwrap();
        assert!(result.is_ok(), "{:?}", result);
        assert!(result.outer_iterations >= 1);
        let b = net.bus_by_id("B").unwrap();
        assert!(!b.is_voltage_controlled());
        assert_close(b.generators[0].q_mvar(), 30.0, 1e-6, "B q");
        assert_close(b.v, 0.91889825, 1e-5, "B v");
        assert!((b.v - 1.03).abs() > 1e-3);
        assert_close(net.bus_by_id("C").unwrap().v, 0.82065058, 1e-5, "C v");
    }

    #[test]
    fn unlimited_pv_bus_holds_its_voltage() {
        let mut net = three_bus_pv().unwrap();
        let result = AcLoadFlowEngine::new(no_outer_loops())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        assert!(result.is_ok());
        let b = net.bus_by_id("B").unwrap();
        assert_close(b.v, 1.03, 1e-9, "B v");
        assert_close(b.generators[0].q_mvar(), 200.1536, 1e-3, "B q");
        assert_close(net.bus_by_id("C").unwrap().v, 0.88909259, 1e-5, "C v");
    }

    #[test]
    fn pq_pv_oscillation_is_bounded() {
        let mut net = eurostag_tutorial().unwrap();
        let ngen = net.bus_by_id_mut("NGEN").unwrap();
        ngen.generators[0] = ngen.generators[0].clone().with_q_limits(-9999.0, 200.0);
        let parameters = AcLoadFlowParameters {
            distributed_slack: false,
            ..Default::default()
        };
        let result = AcLoadFlowEngine::new(parameters).run(&mut net, &mut NoOpObserver).unwrap();
        // three round trips PV -> PQ -> PV, then the bus stays pinned
        assert_eq!(result.status, LoadFlowStatus::Converged);
        assert_eq!(result.outer_iterations, 7);
        let ngen = net.bus_by_id("NGEN").unwrap();
        assert!(!ngen.is_voltage_controlled());
        assert_close(ngen.generators[0].q_mvar(), 200.0, 1e-6, "NGEN q");
        assert_close(ngen.v_kv(), 26.204650, 1e-3, "NGEN v");
    }

    #[test]
    fn outer_iteration_cap_is_a_distinct_status() {
        let mut net = eurostag_tutorial().unwrap();
        let ngen = net.bus_by_id_mut("NGEN").unwrap();
        ngen.generators[0] = ngen.generators[0].clone().with_q_limits(-9999.0, 200.0);
        let parameters = AcLoadFlowParameters {
            max_outer_iterations: 2,
            distributed_slack: false,
            ..Default::default()
        };
        let result = AcLoadFlowEngine::new(parameters).run(&mut net, &mut NoOpObserver).unwrap();
        assert_eq!(result.status, LoadFlowStatus::MaxOuterIterationReached);
        assert_eq!(result.solver_status, NewtonRaphsonStatus::Converged);
        assert_eq!(result.outer_iterations, 2);
        // the capped pass switched NGEN back to PQ; the returned state follows
        let ngen = net.bus_by_id("NGEN").unwrap();
        assert!(!ngen.is_voltage_controlled());
        assert_close(ngen.generators[0].q_mvar(), 200.0, 1e-6, "NGEN q");
        assert!((ngen.v_kv() - 24.5).abs() > 1e-3, "NGEN v {}", ngen.v_kv());
    }

    #[test]
    fn distributed_slack_balances_generators() {
        let mut net = four_bus_distributed_slack().unwrap();
        let before: f64 = net
            .buses()
            .iter()
            .flat_map(|b| b.generators.iter().map(|g| g.target_p_mw()))
            .sum();
        let parameters = AcLoadFlowParameters {
            use_reactive_limits: false,
            ..Default::default()
        };
        let result = AcLoadFlowEngine::new(parameters).run(&mut net, &mut NoOpObserver).unwrap();
        assert!(result.is_ok(), "{:?}", result);
        assert!(result.outer_iterations >= 1);
        assert!(result.slack_bus_active_power_mismatch.abs() <= 1.0);

        let g2 = &net.bus_by_id("B2").unwrap().generators[0];
        assert_close(g2.target_p_mw(), 120.0, 0.5, "G2 at its limit");
        let after: f64 = net
            .buses()
            .iter()
            .flat_map(|b| b.generators.iter().map(|g| g.target_p_mw()))
            .sum();
        assert_close(after - before, 205.1, 1.0, "distributed");
        // what the slack bus produces differs from its target by the reported residue only
        let slack = net.slack_bus().unwrap();
        let slack_output = slack.p_mw() + slack.load_target_p * SB;
        let slack_target = slack.generation_target_p() * SB;
        assert_close(
            slack_output - slack_target,
            result.slack_bus_active_power_mismatch,
            1e-6,
            "slack residue",
        );
    }

    #[test]
    fn rerun_distributes_from_the_given_targets() {
        let mut net = four_bus_distributed_slack().unwrap();
        let parameters = AcLoadFlowParameters {
            use_reactive_limits: false,
            ..Default::default()
        };
        let mut engine = AcLoadFlowEngine::new(parameters);
        let first = engine.run(&mut net, &mut NoOpObserver).unwrap();
        let targets = |net: &LfNetwork| -> Vec<f64> {
            net.buses()
                .iter()
                .flat_map(|b| b.generators.iter().map(|g| g.target_p_mw()))
                .collect()
        };
        let distributed = targets(&net);
        let second = engine.run(&mut net, &mut NoOpObserver).unwrap();
        assert_eq!(second.outer_iterations, first.outer_iterations);
        assert_eq!(second.newton_raphson_iterations, first.newton_raphson_iterations);
        for (a, b) in distributed.iter().zip(targets(&net)) {
            assert_close(b, *a, 1e-9, "target after rerun");
        }
        let g1 = &net.bus_by_id("B1").unwrap().generators[0];
        assert_close(g1.initial_target_p * SB, 100.0, 1e-9, "G1 initial target");
    }

    #[test]
    fn per_equation_type_criteria_drive_a_full_solve() {
        let mut net = eurostag_tutorial().unwrap();
        let mut parameters = no_outer_loops();
        parameters.newton_raphson.stopping_criteria = StoppingCriteria::per_equation_type();
        let result = AcLoadFlowEngine::new(parameters).run(&mut net, &mut NoOpObserver).unwrap();
        assert!(result.is_ok(), "{:?}", result);
        assert!(result.newton_raphson_iterations >= 1);
        for bus in net.buses().iter().filter(|b| !b.is_slack()) {
            let residue = bus.p_mw() - bus.target_p() * SB;
            assert!(residue.abs() <= 1e-2, "{} P residue {} MW", bus.id, residue);
        }
        assert_close(net.bus_by_id("NLOAD").unwrap().v_kv(), 153.262661, 5e-2, "NLOAD v");
    }

    #[test]
    fn conflicting_voltage_targets_abort_the_solve() {
        let mut net = three_bus_pv().unwrap();
        net.bus_by_id_mut("B")
            .unwrap()
            .generators
            .push(LfGenerator::new("GB2", 0.0).with_voltage_regulation(1.05));
        let err = AcLoadFlowEngine::new(no_outer_loops())
            .run(&mut net, &mut NoOpObserver)
            .unwrap_err();
        assert!(
            matches!(&err, LoadFlowError::Model(ModelError::ConflictingVoltageTargets { bus, .. }) if bus == "B"),
            "{}",
            err
        );
    }

    #[test]
    fn shared_bus_dispatch_keeps_fixed_reactive_target() {
        let mut net = three_bus_pv().unwrap();
        net.bus_by_id_mut("B")
            .unwrap()
            .add_generator(LfGenerator::new("GPQ", 0.0).with_target_q(20.0))
            .unwrap();
        let result = AcLoadFlowEngine::new(no_outer_loops())
            .run(&mut net, &mut NoOpObserver)
            .unwrap();
        assert!(result.is_ok());
        let b = net.bus_by_id("B").unwrap();
        assert_close(b.v, 1.03, 1e-9, "B v");
        assert_close(b.generators[1].q_mvar(), 20.0, 1e-9, "GPQ q");
        assert_close(b.generators[0].q_mvar(), 180.1536, 1e-3, "GB q");
    }

    #[test]
    fn slack_exhaustion_aborts_the_solve() {
        let mut net = four_bus_distributed_slack().unwrap();
        net.bus_by_id_mut("B4").unwrap().load_target_p = 9.0;
        let parameters = AcLoadFlowParameters {
            use_reactive_limits: false,
            slack_distribution_failure_behavior: SlackDistributionFailureBehavior::Fail,
            ..Default::default()
        };
        let err = AcLoadFlowEngine::new(parameters)
            .run(&mut net, &mut NoOpObserver)
            .unwrap_err();
        assert!(matches!(err, LoadFlowError::NoMoreParticipatingGenerator { .. }), "{}", err);
    }

    #[test]
    fn observer_has_no_effect_on_results() {
        let mut quiet = eurostag_tutorial().unwrap();
        let mut traced = eurostag_tutorial().unwrap();
        let mut engine = AcLoadFlowEngine::new(AcLoadFlowParameters::default());
        let a = engine.run(&mut quiet, &mut NoOpObserver).unwrap();
        let b = engine.run(&mut traced, &mut TracingObserver::new()).unwrap();
        assert_eq!(a, b);
        for (x, y) in quiet.buses().iter().zip(traced.buses()) {
            assert_eq!(x.v, y.v);
            assert_eq!(x.angle, y.angle);
        }
    }

    #[derive(Default)]
    struct Counter {
        iterations: usize,
        lu: usize,
        checks: usize,
        created: bool,
    }

    impl LoadFlowObserver for Counter {
        fn after_equation_system_creation(&mut self, _system: &EquationSystem) {
            self.created = true;
        }
        fn begin_iteration(&mut self, _iteration: usize) {
            self.iterations += 1;
        }
        fn after_lu_decomposition(&mut self, _iteration: usize) {
            self.lu += 1;
        }
        fn after_outer_loop_status_check(&mut self, _name: &str, _status: OuterLoopStatus) {
            self.checks += 1;
        }
    }

    #[test]
    fn observer_sees_every_phase() {
        let mut net = two_bus_tutorial().unwrap();
        let mut counter = Counter::default();
        let parameters = AcLoadFlowParameters {
            distributed_slack: false,
            ..Default::default()
        };
        let result = AcLoadFlowEngine::new(parameters).run(&mut net, &mut counter).unwrap();
        assert!(counter.created);
        // one mismatch evaluation per iteration plus the converged one
        assert_eq!(counter.iterations, result.newton_raphson_iterations + 1);
        assert_eq!(counter.lu, result.newton_raphson_iterations);
        assert_eq!(counter.checks, 1);
    }

    #[test]
    fn custom_policies_are_used() {
        let mut net = two_bus_tutorial().unwrap();
        net.bus_by_id_mut("NHV1").unwrap().set_slack(false);
        let mut engine = AcLoadFlowEngine::new(no_outer_loops())
            .with_slack_bus_selector(Box::new(NameSlackBusSelector { id: "NHV1".into() }))
            .with_voltage_initializer(Box::new(DcValueVoltageInitializer::default()))
            .with_solver(Box::new(DenseSolver::default()))
            .with_outer_loops(Vec::new());
        let result = engine.run(&mut net, &mut NoOpObserver).unwrap();
        assert!(result.is_ok());
        assert!(net.bus_by_id("NHV1").unwrap().is_slack());
        assert_close(net.bus_by_id("NHV2").unwrap().v_kv(), 393.061521, 1e-3, "NHV2 v");
        // the engine keeps the solver for the next run
        assert!(engine.run(&mut net, &mut NoOpObserver).unwrap().is_ok());
    }

    #[test]
    fn every_initializer_reaches_the_same_state() {
        for mode in [
            VoltageInitMode::UniformValues,
            VoltageInitMode::PreviousValues,
            VoltageInitMode::DcValues,
        ] {
            let mut net = eurostag_tutorial().unwrap();
            let parameters = AcLoadFlowParameters {
                voltage_init_mode: mode,
                ..no_outer_loops()
            };
            let result = AcLoadFlowEngine::new(parameters).run(&mut net, &mut NoOpObserver).unwrap();
            assert!(result.is_ok(), "{:?}: {:?}", mode, result);
            assert_close(net.bus_by_id("NLOAD").unwrap().v_kv(), 153.262661, 1e-3, "NLOAD v");
        }
    }

    #[test]
    fn model_errors_are_reported() {
        let mut empty = LfNetwork::new();
        let err = AcLoadFlowEngine::new(AcLoadFlowParameters::default())
            .run(&mut empty, &mut NoOpObserver)
            .unwrap_err();
        assert!(matches!(err, LoadFlowError::Model(crate::basic::error::ModelError::EmptyNetwork)));

        let mut net = two_bus_tutorial().unwrap();
        net.add_bus(crate::basic::network::LfBus::new("ISLAND", 380.0)).unwrap();
        let err = AcLoadFlowEngine::new(AcLoadFlowParameters::default())
            .run(&mut net, &mut NoOpObserver)
            .unwrap_err();
        assert!(matches!(
            err,
            LoadFlowError::Model(crate::basic::error::ModelError::MultipleComponents(2))
        ));
    }

    #[test]
    fn converged_state_balances_every_bus() {
        let mut net = eurostag_tutorial().unwrap();
        let mut engine = AcLoadFlowEngine::new(no_outer_loops());
        engine.run(&mut net, &mut NoOpObserver).unwrap();
        let mut sys = create_ac_equation_system(&net, &AcEquationSystemCreationParameters::default()).unwrap();
        sys.create_state_vector(&net, &crate::basic::initializer::PreviousValueVoltageInitializer);
        for bus in net.buses().iter().filter(|b| !b.is_slack()) {
            let p = sys.equation_value(&EquationKey::new(bus.num(), EquationType::BusTargetP));
            assert_close(p, bus.target_p(), 1e-3, &format!("{} P balance", bus.id));
        }
    }
}
