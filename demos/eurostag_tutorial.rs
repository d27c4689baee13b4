//! Solves the four bus tutorial network and prints the results.
//!
//! `RUST_LOG=rustflow=debug cargo run --example eurostag_tutorial` shows the
//! iteration timings.

use rustflow::prelude::*;
use rustflow::testcases::eurostag_tutorial;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), LoadFlowError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();

    let parameters = match std::env::args().nth(1) {
        Some(path) => LoadFlowParameters::from_json_file(path)?,
        None => LoadFlowParameters::default(),
    };

    let mut network = eurostag_tutorial()?;
    let mut observer = TracingObserver::new();
    let result = AcLoadFlowEngine::new(parameters.ac.clone()).run(&mut network, &mut observer)?;
    println!(
        "AC: {} after {} Newton-Raphson iterations, {} outer iterations, slack mismatch {:.4} MW",
        result.status, result.newton_raphson_iterations, result.outer_iterations, result.slack_bus_active_power_mismatch
    );
    print_results(&network);

    let mut network = eurostag_tutorial()?;
    let result = DcLoadFlowEngine::new(parameters.dc).run(&mut network, &mut observer)?;
    println!("DC: {}, slack mismatch {:.4} MW", result.status, result.slack_bus_active_power_mismatch);
    print_results(&network);
    Ok(())
}
