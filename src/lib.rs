mod basic;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use basic::*;

    pub use basic::error::{LinearSolveError, LoadFlowError, ModelError};
    pub use basic::loadflow::{
        AcLoadFlowEngine, AcLoadFlowParameters, AcLoadFlowResult, DcLoadFlowEngine, DcLoadFlowParameters,
        DcLoadFlowResult, LoadFlowParameters, LoadFlowStatus, run_ac_parallel, run_dc_parallel,
    };
    pub use basic::network::{LfBranch, LfBus, LfGenerator, LfNetwork, PiModel, Side};
    pub use basic::observer::{LoadFlowObserver, NoOpObserver, TracingObserver};
    pub use basic::post_processing::print_results;
}
