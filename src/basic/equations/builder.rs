//! Assembly of the AC and DC equation systems from a network.

use tracing::debug;

use super::{
    EquationSystem, FlowHandle,
    equation::{EquationKey, EquationType},
    term::EquationTerm,
    variable::Variable,
};
use crate::basic::{
    error::ModelError,
    network::{LfBranch, LfNetwork, Side},
};

#[derive(Debug, Clone)]
pub struct AcEquationSystemCreationParameters {
    /// Branches with |z| below this value are modelled with zero impedance equations.
    pub low_impedance_threshold: f64,
}

impl Default for AcEquationSystemCreationParameters {
    fn default() -> Self {
        Self {
            low_impedance_threshold: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DcEquationSystemCreationParameters {
    /// Branches with |x| below this value are modelled with zero impedance equations.
    pub low_impedance_threshold: f64,
    pub use_transformer_ratio: bool,
}

impl Default for DcEquationSystemCreationParameters {
    fn default() -> Self {
        Self {
            low_impedance_threshold: 1e-8,
            use_transformer_ratio: true,
        }
    }
}

/// AC system: P/Q balance at every bus, V at regulated buses, Phi at the slack.
///
/// Equations are created for every bus; P at the slack bus and Q at voltage
/// controlled buses start inactive so the outer loops can toggle them.
pub fn create_ac_equation_system(
    network: &LfNetwork,
    params: &AcEquationSystemCreationParameters,
) -> Result<EquationSystem, ModelError> {
    let mut sys = EquationSystem::new(false);

    for bus in network.buses() {
        let num = bus.num();
        let p = sys.create_equation(num, EquationType::BusTargetP);
        let q = sys.create_equation(num, EquationType::BusTargetQ);
        if bus.shunt_g != 0.0 {
            sys.add_term(p, EquationTerm::shunt_active(num, bus.shunt_g));
        }
        if bus.shunt_b != 0.0 {
            sys.add_term(q, EquationTerm::shunt_reactive(num, bus.shunt_b));
        }
        if bus.has_voltage_regulator() {
            let v = sys.create_equation(num, EquationType::BusTargetV);
            sys.add_term(v, EquationTerm::variable(num, Variable::bus_v(num)));
            let controlled = bus.is_voltage_controlled();
            sys.set_active(v, controlled);
            sys.set_active(q, !controlled);
        }
        if bus.is_slack() {
            sys.set_active(p, false);
            let phi = sys.create_equation(num, EquationType::BusTargetPhi);
            sys.add_term(phi, EquationTerm::variable(num, Variable::bus_phi(num)));
        }
    }

    for branch in network.branches() {
        match (
            branch.connected_bus(Side::One),
            branch.connected_bus(Side::Two),
        ) {
            (Some(b1), Some(b2)) => {
                if branch.is_zero_impedance(params.low_impedance_threshold, false) {
                    add_zero_impedance_equations(&mut sys, network, branch, b1, b2, false)?;
                } else if branch.pi.z() == 0.0 {
                    return Err(ModelError::ZeroImpedance(branch.id.clone()));
                } else {
                    add_closed_branch_ac(&mut sys, branch, b1, b2);
                }
            }
            (Some(b1), None) => add_open_branch_ac(&mut sys, branch, Side::One, b1),
            (None, Some(b2)) => add_open_branch_ac(&mut sys, branch, Side::Two, b2),
            (None, None) => {}
        }
    }

    debug!(
        network = network.num,
        rows = sys.row_count(),
        columns = sys.column_count(),
        "AC equation system created"
    );
    Ok(sys)
}

/// DC system: P balance at every non slack bus, Phi at the slack.
pub fn create_dc_equation_system(
    network: &LfNetwork,
    params: &DcEquationSystemCreationParameters,
) -> Result<EquationSystem, ModelError> {
    let mut sys = EquationSystem::new(true);

    for bus in network.buses() {
        let num = bus.num();
        let p = sys.create_equation(num, EquationType::BusTargetP);
        if bus.is_slack() {
            sys.set_active(p, false);
            let phi = sys.create_equation(num, EquationType::BusTargetPhi);
            sys.add_term(phi, EquationTerm::variable(num, Variable::bus_phi(num)));
        }
    }

    for branch in network.branches() {
        let num = branch.num();
        match (
            branch.connected_bus(Side::One),
            branch.connected_bus(Side::Two),
        ) {
            (Some(b1), Some(b2)) => {
                if branch.is_zero_impedance(params.low_impedance_threshold, true) {
                    add_zero_impedance_equations(&mut sys, network, branch, b1, b2, true)?;
                } else if branch.pi.x == 0.0 {
                    return Err(ModelError::ZeroImpedance(branch.id.clone()));
                } else {
                    for (side, bus) in [(Side::One, b1), (Side::Two, b2)] {
                        let term = EquationTerm::dc_closed_branch(
                            branch,
                            side,
                            b1,
                            b2,
                            params.use_transformer_ratio,
                        );
                        let id = sys.add_term(EquationKey::new(bus, EquationType::BusTargetP), term);
                        sys.set_branch_flow(num, side, true, FlowHandle::Term(id));
                    }
                }
            }
            // no active flow through a branch with an open end in the lossless model
            (Some(_), None) => sys.set_branch_flow(num, Side::One, true, FlowHandle::Constant(0.0)),
            (None, Some(_)) => sys.set_branch_flow(num, Side::Two, true, FlowHandle::Constant(0.0)),
            (None, None) => {}
        }
    }

    debug!(
        network = network.num,
        rows = sys.row_count(),
        columns = sys.column_count(),
        "DC equation system created"
    );
    Ok(sys)
}

fn add_closed_branch_ac(sys: &mut EquationSystem, branch: &LfBranch, b1: usize, b2: usize) {
    let num = branch.num();
    for (side, bus) in [(Side::One, b1), (Side::Two, b2)] {
        let p = EquationTerm::closed_branch_active(branch, side, b1, b2);
        let q = EquationTerm::closed_branch_reactive(branch, side, b1, b2);
        let p_id = sys.add_term(EquationKey::new(bus, EquationType::BusTargetP), p);
        let q_id = sys.add_term(EquationKey::new(bus, EquationType::BusTargetQ), q);
        sys.set_branch_flow(num, side, true, FlowHandle::Term(p_id));
        sys.set_branch_flow(num, side, false, FlowHandle::Term(q_id));
    }
}

fn add_open_branch_ac(sys: &mut EquationSystem, branch: &LfBranch, side: Side, bus: usize) {
    let num = branch.num();
    let p = EquationTerm::open_branch_active(branch, side, bus);
    let q = EquationTerm::open_branch_reactive(branch, side, bus);
    let p_id = sys.add_term(EquationKey::new(bus, EquationType::BusTargetP), p);
    let q_id = sys.add_term(EquationKey::new(bus, EquationType::BusTargetQ), q);
    sys.set_branch_flow(num, side, true, FlowHandle::Term(p_id));
    sys.set_branch_flow(num, side, false, FlowHandle::Term(q_id));
}

/// Replaces the flow terms of a zero impedance branch by equality constraints
/// across it and dummy flow variables injected at both ends.
fn add_zero_impedance_equations(
    sys: &mut EquationSystem,
    network: &LfNetwork,
    branch: &LfBranch,
    b1: usize,
    b2: usize,
    dc: bool,
) -> Result<(), ModelError> {
    let num = branch.num();
    let pi = &branch.pi;

    let phi = sys.create_equation(num, EquationType::ZeroPhi);
    sys.add_term(
        phi,
        EquationTerm::linear(
            num,
            vec![Variable::bus_phi(b1), Variable::bus_phi(b2)],
            vec![1.0, -1.0],
        ),
    );
    let dummy_p = Variable::dummy_p(num);
    sys.add_term(
        EquationKey::new(b1, EquationType::BusTargetP),
        EquationTerm::variable(num, dummy_p),
    );
    sys.add_term(
        EquationKey::new(b2, EquationType::BusTargetP),
        EquationTerm::linear(num, vec![dummy_p], vec![-1.0]),
    );
    sys.set_branch_flow(num, Side::One, true, FlowHandle::Variable { variable: dummy_p, sign: 1.0 });
    sys.set_branch_flow(num, Side::Two, true, FlowHandle::Variable { variable: dummy_p, sign: -1.0 });
    if dc {
        return Ok(());
    }

    if network.bus(b1).is_voltage_controlled() && network.bus(b2).is_voltage_controlled() {
        return Err(ModelError::ConflictingVoltageControl(branch.id.clone()));
    }
    let v = sys.create_equation(num, EquationType::ZeroV);
    sys.add_term(
        v,
        EquationTerm::linear(
            num,
            vec![Variable::bus_v(b1), Variable::bus_v(b2)],
            vec![pi.r1, -pi.r2],
        ),
    );
    let dummy_q = Variable::dummy_q(num);
    sys.add_term(
        EquationKey::new(b1, EquationType::BusTargetQ),
        EquationTerm::variable(num, dummy_q),
    );
    sys.add_term(
        EquationKey::new(b2, EquationType::BusTargetQ),
        EquationTerm::linear(num, vec![dummy_q], vec![-1.0]),
    );
    sys.set_branch_flow(num, Side::One, false, FlowHandle::Variable { variable: dummy_q, sign: 1.0 });
    sys.set_branch_flow(num, Side::Two, false, FlowHandle::Variable { variable: dummy_q, sign: -1.0 });
    Ok(())
}
