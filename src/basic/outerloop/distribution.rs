use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::basic::network::{LfGenerator, LfNetwork};

/// Below this (pu) an active power amount counts as fully distributed.
pub const P_RESIDUE_EPS: f64 = 1e-8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceType {
    #[default]
    ProportionalToGenerationPMax,
    ProportionalToGenerationP,
    ProportionalToGenerationRemainingMargin,
    ProportionalToParticipationFactor,
}

/// Outcome of a distribution, in pu.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionResult {
    pub iterations: usize,
    pub distributed: f64,
    pub remaining: f64,
}

/// Spreads an active power amount over participating generators.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivePowerDistribution {
    balance_type: BalanceType,
}

impl ActivePowerDistribution {
    pub fn new(balance_type: BalanceType) -> Self {
        Self { balance_type }
    }

    pub fn balance_type(&self) -> BalanceType {
        self.balance_type
    }

    fn factor(&self, g: &LfGenerator, amount: f64) -> f64 {
        let f = match self.balance_type {
            BalanceType::ProportionalToGenerationPMax => g.p_limits.max,
            BalanceType::ProportionalToGenerationP => g.target_p.abs(),
            BalanceType::ProportionalToGenerationRemainingMargin => {
                if amount > 0.0 {
                    g.p_limits.max - g.target_p
                } else {
                    g.target_p - g.p_limits.min
                }
            }
            BalanceType::ProportionalToParticipationFactor => g.participation_factor,
        };
        f.max(0.0)
    }

    /// Adds `amount` (pu) to the generator targets. Generators reaching a limit
    /// leave the participating set and the factors of the others are
    /// renormalised on the next pass.
    pub fn run(&self, network: &mut LfNetwork, amount: f64) -> DistributionResult {
        let mut participating: Vec<(usize, usize)> = network
            .buses()
            .iter()
            .flat_map(|bus| {
                bus.generators
                    .iter()
                    .enumerate()
                    .filter(|(_, g)| g.participating)
                    .map(move |(k, _)| (bus.num(), k))
            })
            .collect();
        let mut remaining = amount;
        let mut iterations = 0;
        while !participating.is_empty() && remaining.abs() > P_RESIDUE_EPS {
            let factors: Vec<f64> = participating
                .iter()
                .map(|&(b, k)| self.factor(&network.bus(b).generators[k], remaining))
                .collect();
            let total: f64 = factors.iter().sum();
            if total <= 0.0 {
                break;
            }
            let mut done = 0.0;
            let mut next = Vec::with_capacity(participating.len());
            for (&(b, k), f) in participating.iter().zip(&factors) {
                let g = &mut network.bus_mut(b).generators[k];
                let wanted = g.target_p + remaining * f / total;
                let new = g.p_limits.clamp(wanted);
                done += new - g.target_p;
                g.target_p = new;
                let free = if remaining > 0.0 {
                    new < g.p_limits.max
                } else {
                    new > g.p_limits.min
                };
                if free && *f > 0.0 {
                    next.push((b, k));
                }
            }
            remaining -= done;
            participating = next;
            iterations += 1;
            trace!(iterations, remaining, participants = participating.len(), "distribution pass");
        }
        DistributionResult {
            iterations,
            distributed: amount - remaining,
            remaining,
        }
    }
}
