//! Per-unit network graph consumed by the equation system.
//!
//! The network is plain data: ordered buses and branches with O(1) lookup by
//! number and by id, connectivity queries and the projection of solved values
//! onto consumer-facing quantities.

pub mod branch;
pub mod bus;
pub mod slack;
pub mod units;

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;
use tracing::debug;

pub use branch::*;
pub use bus::*;
pub use slack::*;
pub use units::*;

use crate::basic::error::ModelError;

#[derive(Debug, Clone, Default)]
pub struct LfNetwork {
    /// Index of this network among the components it was split from.
    pub num: usize,
    buses: Vec<LfBus>,
    branches: Vec<LfBranch>,
    bus_index: HashMap<String, usize>,
    branch_index: HashMap<String, usize>,
}

impl LfNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bus and returns its number.
    pub fn add_bus(&mut self, mut bus: LfBus) -> Result<usize, ModelError> {
        if self.bus_index.contains_key(&bus.id) {
            return Err(ModelError::DuplicateId(bus.id));
        }
        let num = self.buses.len();
        bus.num = num;
        self.bus_index.insert(bus.id.clone(), num);
        self.buses.push(bus);
        Ok(num)
    }

    /// Adds a branch and returns its number.
    pub fn add_branch(&mut self, mut branch: LfBranch) -> Result<usize, ModelError> {
        if self.branch_index.contains_key(&branch.id) {
            return Err(ModelError::DuplicateId(branch.id));
        }
        for bus in [branch.bus1, branch.bus2].into_iter().flatten() {
            if bus >= self.buses.len() {
                return Err(ModelError::BusOutOfRange(bus));
            }
        }
        let num = self.branches.len();
        branch.num = num;
        self.branch_index.insert(branch.id.clone(), num);
        self.branches.push(branch);
        Ok(num)
    }

    /// Adds a branch between two buses given by id.
    pub fn connect(&mut self, id: &str, bus1: &str, bus2: &str, pi: PiModel) -> Result<usize, ModelError> {
        let b1 = self
            .bus_num(bus1)
            .ok_or_else(|| ModelError::UnknownBus(bus1.to_string()))?;
        let b2 = self
            .bus_num(bus2)
            .ok_or_else(|| ModelError::UnknownBus(bus2.to_string()))?;
        self.add_branch(LfBranch::new(id, Some(b1), Some(b2), pi))
    }

    pub fn buses(&self) -> &[LfBus] {
        &self.buses
    }

    pub fn buses_mut(&mut self) -> &mut [LfBus] {
        &mut self.buses
    }

    pub fn branches(&self) -> &[LfBranch] {
        &self.branches
    }

    pub fn branches_mut(&mut self) -> &mut [LfBranch] {
        &mut self.branches
    }

    pub fn bus(&self, num: usize) -> &LfBus {
        &self.buses[num]
    }

    pub fn bus_mut(&mut self, num: usize) -> &mut LfBus {
        &mut self.buses[num]
    }

    pub fn branch(&self, num: usize) -> &LfBranch {
        &self.branches[num]
    }

    pub fn branch_mut(&mut self, num: usize) -> &mut LfBranch {
        &mut self.branches[num]
    }

    pub fn bus_num(&self, id: &str) -> Option<usize> {
        self.bus_index.get(id).copied()
    }

    pub fn bus_by_id(&self, id: &str) -> Option<&LfBus> {
        self.bus_num(id).map(|n| &self.buses[n])
    }

    pub fn bus_by_id_mut(&mut self, id: &str) -> Option<&mut LfBus> {
        self.bus_num(id).map(|n| &mut self.buses[n])
    }

    pub fn branch_by_id(&self, id: &str) -> Option<&LfBranch> {
        self.branch_index.get(id).map(|&n| &self.branches[n])
    }

    pub fn branch_by_id_mut(&mut self, id: &str) -> Option<&mut LfBranch> {
        self.branch_index.get(id).map(|&n| &mut self.branches[n])
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn slack_bus(&self) -> Option<&LfBus> {
        self.buses.iter().find(|b| b.slack)
    }

    /// Keeps a preset slack bus, otherwise asks `selector` for one.
    pub fn select_slack_bus(&mut self, selector: &dyn SlackBusSelector) -> Result<usize, ModelError> {
        if let Some(num) = self.slack_bus().map(LfBus::num) {
            for bus in self.buses.iter_mut().filter(|b| b.num != num) {
                bus.slack = false;
            }
            return Ok(num);
        }
        let num = selector.select(self)?;
        self.buses[num].slack = true;
        debug!(
            network = self.num,
            selector = selector.name(),
            bus = %self.buses[num].id,
            "slack bus selected"
        );
        Ok(num)
    }

    /// Number of closed branches at each bus.
    pub fn connected_branch_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.buses.len()];
        for br in self.branches.iter().filter(|b| b.is_closed()) {
            for side in [Side::One, Side::Two] {
                if let Some(bus) = br.bus(side) {
                    counts[bus] += 1;
                }
            }
        }
        counts
    }

    /// Bus numbers of each connected component, through closed branches only.
    ///
    /// Components are ordered by their lowest bus number and buses keep their order.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut uf = UnionFind::<usize>::new(self.buses.len());
        for br in self.branches.iter().filter(|b| b.is_closed()) {
            if let (Some(b1), Some(b2)) = (br.bus1, br.bus2) {
                uf.union(b1, b2);
            }
        }
        let mut label_to_component: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<usize>> = Vec::new();
        for bus in 0..self.buses.len() {
            let root = uf.find(bus);
            let idx = *label_to_component.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[idx].push(bus);
        }
        components
    }

    /// Splits the network into one network per connected component.
    ///
    /// Buses and branches are renumbered inside each part, ids are kept.
    /// A branch goes with the component of its first referenced bus; references
    /// to buses of another component are dropped.
    pub fn split_components(&self) -> Vec<LfNetwork> {
        let components = self.connected_components();
        let mut owner = vec![0usize; self.buses.len()];
        let mut local = vec![0usize; self.buses.len()];
        let mut parts: Vec<LfNetwork> = components
            .iter()
            .enumerate()
            .map(|(c, buses)| {
                let mut part = LfNetwork {
                    num: c,
                    ..Default::default()
                };
                for (k, &bus) in buses.iter().enumerate() {
                    owner[bus] = c;
                    local[bus] = k;
                    let mut copy = self.buses[bus].clone();
                    copy.num = k;
                    part.bus_index.insert(copy.id.clone(), k);
                    part.buses.push(copy);
                }
                part
            })
            .collect();
        for br in &self.branches {
            let Some(anchor) = br.bus1.or(br.bus2) else {
                continue;
            };
            let c = owner[anchor];
            let mut copy = br.clone();
            copy.bus1 = br.bus1.filter(|&b| owner[b] == c).map(|b| local[b]);
            copy.bus2 = br.bus2.filter(|&b| owner[b] == c).map(|b| local[b]);
            copy.connected1 &= copy.bus1.is_some();
            copy.connected2 &= copy.bus2.is_some();
            let part = &mut parts[c];
            copy.num = part.branches.len();
            part.branch_index.insert(copy.id.clone(), copy.num);
            part.branches.push(copy);
        }
        parts
    }

    /// Projects solved values onto generator level quantities.
    pub fn update_state(&mut self) {
        for bus in self.buses.iter_mut() {
            bus.dispatch_reactive_power();
        }
    }
}
