//! Independent networks solved side by side.
//!
//! Each worker owns its engine, equation system and Jacobian; networks are
//! never shared between workers. Results come back in input order so a
//! single consumer can write them out sequentially.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::{AcLoadFlowEngine, AcLoadFlowParameters, AcLoadFlowResult, DcLoadFlowEngine, DcLoadFlowParameters, DcLoadFlowResult};
use crate::basic::{error::LoadFlowError, network::LfNetwork, observer::NoOpObserver};

fn run_ac(network: &mut LfNetwork, parameters: &AcLoadFlowParameters) -> Result<AcLoadFlowResult, LoadFlowError> {
    AcLoadFlowEngine::new(parameters.clone()).run(network, &mut NoOpObserver)
}

fn run_dc(network: &mut LfNetwork, parameters: &DcLoadFlowParameters) -> Result<DcLoadFlowResult, LoadFlowError> {
    DcLoadFlowEngine::new(parameters.clone()).run(network, &mut NoOpObserver)
}

#[cfg(feature = "parallel")]
pub fn run_ac_parallel(
    networks: &mut [LfNetwork],
    parameters: &AcLoadFlowParameters,
) -> Vec<Result<AcLoadFlowResult, LoadFlowError>> {
    networks.par_iter_mut().map(|n| run_ac(n, parameters)).collect()
}

#[cfg(not(feature = "parallel"))]
pub fn run_ac_parallel(
    networks: &mut [LfNetwork],
    parameters: &AcLoadFlowParameters,
) -> Vec<Result<AcLoadFlowResult, LoadFlowError>> {
    networks.iter_mut().map(|n| run_ac(n, parameters)).collect()
}

#[cfg(feature = "parallel")]
pub fn run_dc_parallel(
    networks: &mut [LfNetwork],
    parameters: &DcLoadFlowParameters,
) -> Vec<Result<DcLoadFlowResult, LoadFlowError>> {
    networks.par_iter_mut().map(|n| run_dc(n, parameters)).collect()
}

#[cfg(not(feature = "parallel"))]
pub fn run_dc_parallel(
    networks: &mut [LfNetwork],
    parameters: &DcLoadFlowParameters,
) -> Vec<Result<DcLoadFlowResult, LoadFlowError>> {
    networks.iter_mut().map(|n| run_dc(n, parameters)).collect()
}
