use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Kind of state variable. Declaration order is the column order.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VariableType {
    #[display("BUS_V")]
    BusV,
    #[display("BUS_PHI")]
    BusPhi,
    /// Active flow through a zero impedance branch.
    #[display("DUMMY_P")]
    DummyP,
    /// Reactive flow through a zero impedance branch.
    #[display("DUMMY_Q")]
    DummyQ,
}

/// A scalar unknown, identified by kind then element number.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[display("{kind}({element})")]
pub struct Variable {
    pub kind: VariableType,
    pub element: usize,
}

impl Variable {
    pub fn new(element: usize, kind: VariableType) -> Self {
        Self { kind, element }
    }

    pub fn bus_v(bus: usize) -> Self {
        Self::new(bus, VariableType::BusV)
    }

    pub fn bus_phi(bus: usize) -> Self {
        Self::new(bus, VariableType::BusPhi)
    }

    pub fn dummy_p(branch: usize) -> Self {
        Self::new(branch, VariableType::DummyP)
    }

    pub fn dummy_q(branch: usize) -> Self {
        Self::new(branch, VariableType::DummyQ)
    }
}
