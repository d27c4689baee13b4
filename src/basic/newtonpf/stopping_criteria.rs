use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::basic::{equations::{EquationKey, EquationType}, network::SB};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoppingTest {
    pub converged: bool,
    /// Euclidean norm of the mismatch vector.
    pub norm: f64,
}

pub trait NewtonRaphsonStoppingCriteria: Send {
    fn test(&self, mismatch: &DVector<f64>, rows: &[EquationKey]) -> StoppingTest;
}

/// Single epsilon per equation: converged when `|m| < sqrt(n eps^2)`.
#[derive(Debug, Clone, Copy)]
pub struct UniformValueStoppingCriteria {
    pub conv_eps_per_eq: f64,
}

impl NewtonRaphsonStoppingCriteria for UniformValueStoppingCriteria {
    fn test(&self, mismatch: &DVector<f64>, _rows: &[EquationKey]) -> StoppingTest {
        let norm = mismatch.norm();
        let n = mismatch.len() as f64;
        StoppingTest {
            converged: mismatch.is_empty() || norm < (n * self.conv_eps_per_eq * self.conv_eps_per_eq).sqrt(),
            norm,
        }
    }
}

/// One threshold per equation kind. Power thresholds are in MW and MVar.
#[derive(Debug, Clone, Copy)]
pub struct PerEquationTypeStoppingCriteria {
    pub max_active_power_mismatch: f64,
    pub max_reactive_power_mismatch: f64,
    pub max_voltage_mismatch: f64,
    pub max_angle_mismatch: f64,
}

impl PerEquationTypeStoppingCriteria {
    fn threshold(&self, kind: EquationType) -> f64 {
        match kind {
            EquationType::BusTargetP => self.max_active_power_mismatch / SB,
            EquationType::BusTargetQ => self.max_reactive_power_mismatch / SB,
            EquationType::BusTargetV | EquationType::ZeroV => self.max_voltage_mismatch,
            EquationType::BusTargetPhi | EquationType::ZeroPhi => self.max_angle_mismatch,
        }
    }
}

impl NewtonRaphsonStoppingCriteria for PerEquationTypeStoppingCriteria {
    fn test(&self, mismatch: &DVector<f64>, rows: &[EquationKey]) -> StoppingTest {
        let converged = mismatch
            .iter()
            .zip(rows)
            .all(|(m, key)| m.abs() <= self.threshold(key.kind));
        StoppingTest {
            converged,
            norm: mismatch.norm(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoppingCriteria {
    Uniform {
        conv_eps_per_eq: f64,
    },
    PerEquationType {
        max_active_power_mismatch: f64,
        max_reactive_power_mismatch: f64,
        max_voltage_mismatch: f64,
        max_angle_mismatch: f64,
    },
}

impl Default for StoppingCriteria {
    fn default() -> Self {
        StoppingCriteria::Uniform { conv_eps_per_eq: 1e-4 }
    }
}

impl StoppingCriteria {
    pub fn per_equation_type() -> Self {
        StoppingCriteria::PerEquationType {
            max_active_power_mismatch: 1e-2,
            max_reactive_power_mismatch: 1e-2,
            max_voltage_mismatch: 1e-4,
            max_angle_mismatch: 1e-5,
        }
    }

    pub fn build(&self) -> Box<dyn NewtonRaphsonStoppingCriteria> {
        match *self {
            StoppingCriteria::Uniform { conv_eps_per_eq } => {
                Box::new(UniformValueStoppingCriteria { conv_eps_per_eq })
            }
            StoppingCriteria::PerEquationType {
                max_active_power_mismatch,
                max_reactive_power_mismatch,
                max_voltage_mismatch,
                max_angle_mismatch,
            } => Box::new(PerEquationTypeStoppingCriteria {
                max_active_power_mismatch,
                max_reactive_power_mismatch,
                max_voltage_mismatch,
                max_angle_mismatch,
            }),
        }
    }
}
