//! Serializable load flow configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::basic::{
    error::LoadFlowError,
    initializer::VoltageInitMode,
    network::SlackBusSelection,
    newtonpf::NewtonRaphsonParameters,
    outerloop::{BalanceType, SlackDistributionFailureBehavior},
    solver::LinearSolverKind,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadFlowParameters {
    pub ac: AcLoadFlowParameters,
    pub dc: DcLoadFlowParameters,
}

impl LoadFlowParameters {
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self, LoadFlowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LoadFlowError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcLoadFlowParameters {
    pub newton_raphson: NewtonRaphsonParameters,
    pub voltage_init_mode: VoltageInitMode,
    pub slack_bus_selection: SlackBusSelection,
    pub distributed_slack: bool,
    pub balance_type: BalanceType,
    /// MW
    pub slack_bus_p_max_mismatch: f64,
    pub slack_distribution_failure_behavior: SlackDistributionFailureBehavior,
    pub use_reactive_limits: bool,
    pub max_pq_pv_switch: usize,
    pub max_outer_iterations: usize,
    pub linear_solver: LinearSolverKind,
    /// pu
    pub low_impedance_threshold: f64,
    /// Used by the DC run behind [`VoltageInitMode::DcValues`].
    pub dc_use_transformer_ratio: bool,
}

impl Default for AcLoadFlowParameters {
    fn default() -> Self {
        Self {
            newton_raphson: NewtonRaphsonParameters::default(),
            voltage_init_mode: VoltageInitMode::default(),
            slack_bus_selection: SlackBusSelection::default(),
            distributed_slack: true,
            balance_type: BalanceType::default(),
            slack_bus_p_max_mismatch: 1.0,
            slack_distribution_failure_behavior: SlackDistributionFailureBehavior::default(),
            use_reactive_limits: true,
            max_pq_pv_switch: 3,
            max_outer_iterations: 20,
            linear_solver: LinearSolverKind::default(),
            low_impedance_threshold: 1e-8,
            dc_use_transformer_ratio: true,
        }
    }
}

impl AcLoadFlowParameters {
    /// Parameters of the DC run used for angle initialization.
    pub fn dc_initialization(&self) -> DcLoadFlowParameters {
        DcLoadFlowParameters {
            use_transformer_ratio: self.dc_use_transformer_ratio,
            distributed_slack: false,
            balance_type: self.balance_type,
            linear_solver: self.linear_solver,
            slack_bus_selection: self.slack_bus_selection.clone(),
            low_impedance_threshold: self.low_impedance_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcLoadFlowParameters {
    pub use_transformer_ratio: bool,
    pub distributed_slack: bool,
    pub balance_type: BalanceType,
    pub linear_solver: LinearSolverKind,
    pub slack_bus_selection: SlackBusSelection,
    pub low_impedance_threshold: f64,
}

impl Default for DcLoadFlowParameters {
    fn default() -> Self {
        Self {
            use_transformer_ratio: true,
            distributed_slack: false,
            balance_type: BalanceType::default(),
            linear_solver: LinearSolverKind::default(),
            slack_bus_selection: SlackBusSelection::default(),
            low_impedance_threshold: 1e-8,
        }
    }
}
