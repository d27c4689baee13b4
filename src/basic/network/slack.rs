use serde::{Deserialize, Serialize};

use super::LfNetwork;
use crate::basic::error::ModelError;

/// Policy choosing the slack bus of a network without a preset one.
pub trait SlackBusSelector: Send + Sync {
    fn name(&self) -> &'static str;
    fn select(&self, network: &LfNetwork) -> Result<usize, ModelError>;
}

/// Picks the first bus.
#[derive(Debug, Default, Clone)]
pub struct FirstSlackBusSelector;

impl SlackBusSelector for FirstSlackBusSelector {
    fn name(&self) -> &'static str {
        "First"
    }

    fn select(&self, network: &LfNetwork) -> Result<usize, ModelError> {
        network
            .buses()
            .first()
            .map(|b| b.num())
            .ok_or(ModelError::NoSlackBus)
    }
}

/// Among the buses of the highest nominal voltage, picks the one with the most
/// connected branches. Ties go to the lowest bus number.
#[derive(Debug, Default, Clone)]
pub struct MostMeshedSlackBusSelector;

impl SlackBusSelector for MostMeshedSlackBusSelector {
    fn name(&self) -> &'static str {
        "MostMeshed"
    }

    fn select(&self, network: &LfNetwork) -> Result<usize, ModelError> {
        let max_kv = network
            .buses()
            .iter()
            .map(|b| b.nominal_kv)
            .fold(f64::MIN, f64::max);
        let counts = network.connected_branch_counts();
        network
            .buses()
            .iter()
            .filter(|b| (b.nominal_kv - max_kv).abs() < 1e-9)
            .map(|b| (b.num(), counts[b.num()]))
            // max_by_key keeps the last maximum, reverse to favour the lowest num
            .rev()
            .max_by_key(|&(_, count)| count)
            .map(|(num, _)| num)
            .ok_or(ModelError::NoSlackBus)
    }
}

/// Picks the bus with the largest total generator capability.
#[derive(Debug, Default, Clone)]
pub struct LargestGeneratorSlackBusSelector;

impl SlackBusSelector for LargestGeneratorSlackBusSelector {
    fn name(&self) -> &'static str {
        "LargestGenerator"
    }

    fn select(&self, network: &LfNetwork) -> Result<usize, ModelError> {
        let mut best: Option<(usize, f64)> = None;
        for bus in network.buses().iter().filter(|b| !b.generators.is_empty()) {
            let capacity: f64 = bus.generators.iter().map(|g| g.p_limits.max).sum();
            if best.is_none_or(|(_, c)| capacity > c) {
                best = Some((bus.num(), capacity));
            }
        }
        match best {
            Some((num, _)) => Ok(num),
            None => FirstSlackBusSelector.select(network),
        }
    }
}

/// Picks a bus by id.
#[derive(Debug, Clone)]
pub struct NameSlackBusSelector {
    pub id: String,
}

impl SlackBusSelector for NameSlackBusSelector {
    fn name(&self) -> &'static str {
        "Name"
    }

    fn select(&self, network: &LfNetwork) -> Result<usize, ModelError> {
        network
            .bus_num(&self.id)
            .ok_or_else(|| ModelError::UnknownBus(self.id.clone()))
    }
}

/// Serializable choice of slack bus selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SlackBusSelection {
    First,
    #[default]
    MostMeshed,
    LargestGenerator,
    Name {
        id: String,
    },
}

impl SlackBusSelection {
    pub fn selector(&self) -> Box<dyn SlackBusSelector> {
        match self {
            SlackBusSelection::First => Box::new(FirstSlackBusSelector),
            SlackBusSelection::MostMeshed => Box::new(MostMeshedSlackBusSelector),
            SlackBusSelection::LargestGenerator => Box::new(LargestGeneratorSlackBusSelector),
            SlackBusSelection::Name { id } => Box::new(NameSlackBusSelector { id: id.clone() }),
        }
    }
}
