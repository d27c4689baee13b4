//! Small reference networks used by tests, benches and demos.

use crate::basic::{
    error::ModelError,
    network::{LfBus, LfGenerator, LfNetwork, PiModel, Side},
};

fn hv_line() -> PiModel {
    PiModel::from_line_ohms(3.0, 33.0, 0.0, 386e-6, 380.0)
}

/// One generator bus feeding a 600 MW load over two parallel 380 kV lines.
pub fn two_bus_tutorial() -> Result<LfNetwork, ModelError> {
    let mut net = LfNetwork::new();
    net.add_bus(
        LfBus::new("NHV1", 380.0)
            .with_slack()
            .with_generator(LfGenerator::new("GEN", 607.0).with_voltage_regulation(402.0 / 380.0))?,
    )?;
    net.add_bus(LfBus::new("NHV2", 380.0).with_load(600.0, 200.0))?;
    net.connect("NHV1_NHV2_1", "NHV1", "NHV2", hv_line())?;
    net.connect("NHV1_NHV2_2", "NHV1", "NHV2", hv_line())?;
    Ok(net)
}

/// [`two_bus_tutorial`] with the second line open at the load end.
pub fn two_bus_open_line() -> Result<LfNetwork, ModelError> {
    let mut net = two_bus_tutorial()?;
    if let Some(line) = net.branch_by_id_mut("NHV1_NHV2_2") {
        line.set_connected(Side::Two, false);
    }
    Ok(net)
}

/// Generator, step-up transformer, two lines and a step-down transformer to a
/// 150 kV load. No bus is preset as slack.
pub fn eurostag_tutorial() -> Result<LfNetwork, ModelError> {
    let mut net = LfNetwork::new();
    net.add_bus(
        LfBus::new("NGEN", 24.0)
            .with_generator(LfGenerator::new("GEN", 607.0).with_voltage_regulation(24.5 / 24.0))?,
    )?;
    net.add_bus(LfBus::new("NHV1", 380.0))?;
    net.add_bus(LfBus::new("NHV2", 380.0))?;
    net.add_bus(LfBus::new("NLOAD", 150.0).with_load(600.0, 200.0))?;
    net.connect(
        "NGEN_NHV1",
        "NGEN",
        "NHV1",
        PiModel::series(0.0002, 0.012).with_ratio1(400.0 / 380.0),
    )?;
    net.connect("NHV1_NHV2_1", "NHV1", "NHV2", hv_line())?;
    net.connect("NHV1_NHV2_2", "NHV1", "NHV2", hv_line())?;
    net.connect(
        "NHV2_NLOAD",
        "NHV2",
        "NLOAD",
        PiModel::series(0.0003, 0.018).with_ratio2(150.0 / 158.0),
    )?;
    Ok(net)
}

/// Slack A and voltage controlled B feeding load C, 225 kV.
pub fn three_bus_pv() -> Result<LfNetwork, ModelError> {
    let mut net = LfNetwork::new();
    net.add_bus(
        LfBus::new("A", 225.0)
            .with_slack()
            .with_generator(LfGenerator::new("GA", 0.0).with_voltage_regulation(1.0))?,
    )?;
    net.add_bus(
        LfBus::new("B", 225.0).with_generator(LfGenerator::new("GB", 200.0).with_voltage_regulation(1.03))?,
    )?;
    net.add_bus(LfBus::new("C", 225.0).with_load(400.0, 200.0))?;
    net.connect("A_C", "A", "C", PiModel::line(0.01, 0.08, 0.0, 0.02))?;
    net.connect("B_C", "B", "C", PiModel::line(0.01, 0.08, 0.0, 0.02))?;
    net.connect("A_B", "A", "B", PiModel::line(0.01, 0.1, 0.0, 0.02))?;
    Ok(net)
}

/// Three limited generators around a 500 MW load bus.
pub fn four_bus_distributed_slack() -> Result<LfNetwork, ModelError> {
    let mut net = LfNetwork::new();
    let units = [("B1", "G1", 300.0), ("B2", "G2", 120.0), ("B3", "G3", 400.0)];
    for (k, (bus, generator, p_max)) in units.into_iter().enumerate() {
        let mut b = LfBus::new(bus, 225.0).with_generator(
            LfGenerator::new(generator, 100.0)
                .with_p_limits(0.0, p_max)
                .with_voltage_regulation(1.0),
        )?;
        if k == 0 {
            b = b.with_slack();
        }
        net.add_bus(b)?;
    }
    net.add_bus(LfBus::new("B4", 225.0).with_load(500.0, 50.0))?;
    for (id, b1, b2) in [("B1_B4", "B1", "B4"), ("B2_B4", "B2", "B4"), ("B3_B4", "B3", "B4"), ("B1_B2", "B1", "B2")] {
        net.connect(id, b1, b2, PiModel::line(0.005, 0.05, 0.0, 0.01))?;
    }
    Ok(net)
}
