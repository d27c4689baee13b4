use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::basic::network::LfNetwork;

/// Kind of scalar constraint. Declaration order is the row order.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EquationType {
    #[display("BUS_TARGET_P")]
    BusTargetP,
    #[display("BUS_TARGET_Q")]
    BusTargetQ,
    #[display("BUS_TARGET_V")]
    BusTargetV,
    #[display("BUS_TARGET_PHI")]
    BusTargetPhi,
    /// Voltage magnitude equality across a zero impedance branch.
    #[display("ZERO_V")]
    ZeroV,
    /// Voltage angle equality across a zero impedance branch.
    #[display("ZERO_PHI")]
    ZeroPhi,
}

/// Equation slot, identified by kind then element number.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[display("{kind}({element})")]
pub struct EquationKey {
    pub kind: EquationType,
    pub element: usize,
}

impl EquationKey {
    pub fn new(element: usize, kind: EquationType) -> Self {
        Self { kind, element }
    }
}

/// Ordered list of the terms summed by an equation.
#[derive(Debug, Clone, Default)]
pub struct Equation {
    pub(crate) terms: Vec<usize>,
}

impl Equation {
    pub fn terms(&self) -> &[usize] {
        &self.terms
    }
}

/// Right hand side of an equation for the current network state.
pub fn target(key: &EquationKey, network: &LfNetwork) -> f64 {
    match key.kind {
        EquationType::BusTargetP => network.bus(key.element).target_p(),
        EquationType::BusTargetQ => network.bus(key.element).target_q(),
        EquationType::BusTargetV => network.bus(key.element).target_v().unwrap_or(1.0),
        EquationType::BusTargetPhi => 0.0,
        EquationType::ZeroV => 0.0,
        EquationType::ZeroPhi => {
            let pi = &network.branch(key.element).pi;
            pi.a2 - pi.a1
        }
    }
}
