use std::collections::BTreeMap;

use derive_more::Display;
use tracing::{debug, info};

use super::{OuterLoop, OuterLoopContext, OuterLoopStatus};
use crate::basic::{
    equations::{EquationKey, EquationSystem, EquationType, Variable},
    error::LoadFlowError,
    network::{LfBus, SB},
};

/// pu
const Q_EPS: f64 = 1e-5;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ReactiveLimitDirection {
    #[display("MIN_Q")]
    Min,
    #[display("MAX_Q")]
    Max,
}

#[derive(Debug, Clone, Copy)]
struct PinnedBus {
    direction: ReactiveLimitDirection,
    /// Generation Q of the non regulating units before the switch.
    fixed_q: f64,
    pq_to_pv_switches: usize,
    pinned: bool,
}

/// PV/PQ switching on reactive capability limits.
#[derive(Debug, Clone)]
pub struct ReactiveLimitsOuterLoop {
    max_pq_pv_switch: usize,
    pinned: BTreeMap<usize, PinnedBus>,
}

enum Switch {
    PvToPq {
        bus: usize,
        direction: ReactiveLimitDirection,
        limit: f64,
    },
    PqToPv {
        bus: usize,
    },
}

impl ReactiveLimitsOuterLoop {
    pub fn new(max_pq_pv_switch: usize) -> Self {
        Self {
            max_pq_pv_switch,
            pinned: BTreeMap::new(),
        }
    }

    fn generation_q(bus: &LfBus, system: &EquationSystem) -> f64 {
        system.equation_value(&EquationKey::new(bus.num(), EquationType::BusTargetQ)) + bus.load_target_q
    }

    fn check_pv_bus(bus: &LfBus, system: &EquationSystem) -> Option<Switch> {
        let q = Self::generation_q(bus, system) - bus.generation_target_q;
        let limits = bus.reactive_limits();
        if q > limits.max + Q_EPS {
            Some(Switch::PvToPq {
                bus: bus.num(),
                direction: ReactiveLimitDirection::Max,
                limit: limits.max,
            })
        } else if q < limits.min - Q_EPS {
            Some(Switch::PvToPq {
                bus: bus.num(),
                direction: ReactiveLimitDirection::Min,
                limit: limits.min,
            })
        } else {
            None
        }
    }

    fn check_pq_bus(&self, bus: &LfBus, system: &EquationSystem) -> Option<Switch> {
        let state = self.pinned.get(&bus.num()).filter(|p| p.pinned)?;
        if state.pq_to_pv_switches >= self.max_pq_pv_switch {
            return None;
        }
        let target_v = bus.target_v()?;
        let v = system.variable_value(&Variable::bus_v(bus.num()))?;
        let recoverable = match state.direction {
            ReactiveLimitDirection::Max => v > target_v,
            ReactiveLimitDirection::Min => v < target_v,
        };
        recoverable.then_some(Switch::PqToPv { bus: bus.num() })
    }
}

impl OuterLoop for ReactiveLimitsOuterLoop {
    fn name(&self) -> &'static str {
        "ReactiveLimits"
    }

    fn initialize(&mut self, _ctx: &mut OuterLoopContext) -> Result<(), LoadFlowError> {
        self.pinned.clear();
        Ok(())
    }

    fn check(&mut self, ctx: &mut OuterLoopContext) -> Result<OuterLoopStatus, LoadFlowError> {
        let mut switches = Vec::new();
        for bus in ctx.network.buses().iter().filter(|b| !b.is_slack()) {
            let switch = if bus.is_voltage_controlled() {
                Self::check_pv_bus(bus, ctx.system)
            } else if bus.has_voltage_regulator() {
                self.check_pq_bus(bus, ctx.system)
            } else {
                None
            };
            switches.extend(switch);
        }
        if switches.is_empty() {
            return Ok(OuterLoopStatus::Stable);
        }

        let (mut pv_to_pq, mut pq_to_pv) = (0, 0);
        for switch in switches {
            match switch {
                Switch::PvToPq { bus, direction, limit } => {
                    let b = ctx.network.bus_mut(bus);
                    let state = self.pinned.entry(bus).or_insert(PinnedBus {
                        direction,
                        fixed_q: b.generation_target_q,
                        pq_to_pv_switches: 0,
                        pinned: true,
                    });
                    state.direction = direction;
                    state.pinned = true;
                    b.set_voltage_control_enabled(false);
                    b.generation_target_q = state.fixed_q + limit;
                    debug!(bus = %b.id, %direction, q_mvar = limit * SB, "PV -> PQ");
                    ctx.system.set_active(EquationKey::new(bus, EquationType::BusTargetV), false);
                    ctx.system.set_active(EquationKey::new(bus, EquationType::BusTargetQ), true);
                    pv_to_pq += 1;
                }
                Switch::PqToPv { bus } => {
                    let b = ctx.network.bus_mut(bus);
                    if let Some(state) = self.pinned.get_mut(&bus) {
                        b.generation_target_q = state.fixed_q;
                        state.pinned = false;
                        state.pq_to_pv_switches += 1;
                    }
                    b.set_voltage_control_enabled(true);
                    debug!(bus = %b.id, "PQ -> PV");
                    ctx.system.set_active(EquationKey::new(bus, EquationType::BusTargetQ), false);
                    ctx.system.set_active(EquationKey::new(bus, EquationType::BusTargetV), true);
                    pq_to_pv += 1;
                }
            }
        }
        info!(
            network = ctx.network.num,
            outer_iteration = ctx.outer_iteration,
            pv_to_pq,
            pq_to_pv,
            "buses switched on reactive limits"
        );
        Ok(OuterLoopStatus::Unstable)
    }
}
