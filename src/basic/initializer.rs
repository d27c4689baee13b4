//! Starting points for the Newton-Raphson state vector.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    error::LoadFlowError,
    loadflow::{DcLoadFlowEngine, DcLoadFlowParameters, DcLoadFlowStatus},
    network::{LfBus, LfNetwork},
    observer::NoOpObserver,
};

/// Gives the initial voltage magnitude (pu) and angle (rad) of every bus.
pub trait VoltageInitializer: Send {
    fn name(&self) -> &'static str;

    /// Called once per solve, before any value is requested.
    fn prepare(&mut self, _network: &LfNetwork) -> Result<(), LoadFlowError> {
        Ok(())
    }

    fn magnitude(&self, bus: &LfBus) -> f64;

    fn angle(&self, bus: &LfBus) -> f64;
}

/// Flat start: 1 pu, 0 rad.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformValueVoltageInitializer;

impl VoltageInitializer for UniformValueVoltageInitializer {
    fn name(&self) -> &'static str {
        "uniform"
    }

    fn magnitude(&self, _bus: &LfBus) -> f64 {
        1.0
    }

    fn angle(&self, _bus: &LfBus) -> f64 {
        0.0
    }
}

/// Warm start from whatever state the buses currently hold.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreviousValueVoltageInitializer;

impl VoltageInitializer for PreviousValueVoltageInitializer {
    fn name(&self) -> &'static str {
        "previous"
    }

    fn magnitude(&self, bus: &LfBus) -> f64 {
        bus.v
    }

    fn angle(&self, bus: &LfBus) -> f64 {
        bus.angle
    }
}

/// Angles from a DC load flow run on a copy of the network, magnitudes at 1 pu.
#[derive(Debug, Default, Clone)]
pub struct DcValueVoltageInitializer {
    parameters: DcLoadFlowParameters,
    angles: Vec<f64>,
}

impl DcValueVoltageInitializer {
    pub fn new(parameters: DcLoadFlowParameters) -> Self {
        Self {
            parameters,
            angles: Vec::new(),
        }
    }
}

impl VoltageInitializer for DcValueVoltageInitializer {
    fn name(&self) -> &'static str {
        "dc"
    }

    fn prepare(&mut self, network: &LfNetwork) -> Result<(), LoadFlowError> {
        let mut copy = network.clone();
        let outcome = DcLoadFlowEngine::new(self.parameters.clone()).run(&mut copy, &mut NoOpObserver);
        self.angles = match outcome {
            Ok(result) if result.status == DcLoadFlowStatus::Converged => {
                debug!(network = network.num, "dc angles computed");
                copy.buses().iter().map(|b| b.angle).collect()
            }
            Ok(result) => {
                warn!(network = network.num, status = %result.status, "dc initialization failed, using zero angles");
                vec![0.0; network.buses().len()]
            }
            Err(e) => {
                warn!(network = network.num, error = %e, "dc initialization failed, using zero angles");
                vec![0.0; network.buses().len()]
            }
        };
        Ok(())
    }

    fn magnitude(&self, _bus: &LfBus) -> f64 {
        1.0
    }

    fn angle(&self, bus: &LfBus) -> f64 {
        self.angles.get(bus.num()).copied().unwrap_or(0.0)
    }
}

/// Serializable choice of initializer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoltageInitMode {
    #[default]
    UniformValues,
    PreviousValues,
    DcValues,
}

impl VoltageInitMode {
    pub fn initializer(self, dc: &DcLoadFlowParameters) -> Box<dyn VoltageInitializer> {
        match self {
            VoltageInitMode::UniformValues => Box::new(UniformValueVoltageInitializer),
            VoltageInitMode::PreviousValues => Box::new(PreviousValueVoltageInitializer),
            VoltageInitMode::DcValues => Box::new(DcValueVoltageInitializer::new(dc.clone())),
        }
    }
}
