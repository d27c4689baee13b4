//! Tabular reports of solved networks.

mod res_display;

use tabled::{Table, settings::Style};

use self::res_display::{BranchResTable, BusResTable, FloatWrapper};
use crate::basic::network::LfNetwork;

const PRECISION: usize = 4;

/// Markdown table of bus voltages and injections.
pub fn bus_results_table(network: &LfNetwork) -> String {
    let rows = network.buses().iter().map(|bus| BusResTable {
        id: bus.id.clone(),
        v_kv: FloatWrapper::new(bus.v_kv(), PRECISION),
        angle_deg: FloatWrapper::new(bus.angle_deg(), PRECISION),
        p_mw: FloatWrapper::new(bus.p_mw(), PRECISION),
        q_mvar: FloatWrapper::new(bus.q_mvar(), PRECISION),
    });
    Table::new(rows).with(Style::markdown()).to_string()
}

/// Markdown table of branch flows at both ends.
pub fn branch_results_table(network: &LfNetwork) -> String {
    let rows = network.branches().iter().map(|br| BranchResTable {
        id: br.id.clone(),
        p1_mw: FloatWrapper::new(br.p1, PRECISION),
        q1_mvar: FloatWrapper::new(br.q1, PRECISION),
        p2_mw: FloatWrapper::new(br.p2, PRECISION),
        q2_mvar: FloatWrapper::new(br.q2, PRECISION),
    });
    Table::new(rows).with(Style::markdown()).to_string()
}

pub fn print_results(network: &LfNetwork) {
    println!("{}", bus_results_table(network));
    println!("{}", branch_results_table(network));
}
