use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ActivePowerDistribution, BalanceType, OuterLoop, OuterLoopContext, OuterLoopStatus, P_RESIDUE_EPS};
use crate::basic::{error::LoadFlowError, network::SB};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlackDistributionFailureBehavior {
    #[default]
    Fail,
    LeaveOnSlackBus,
}

/// Moves the slack bus active power mismatch onto participating generators.
#[derive(Debug, Clone)]
pub struct DistributedSlackOuterLoop {
    distribution: ActivePowerDistribution,
    /// MW
    slack_bus_p_max_mismatch: f64,
    failure_behavior: SlackDistributionFailureBehavior,
}

impl DistributedSlackOuterLoop {
    pub fn new(
        balance_type: BalanceType,
        slack_bus_p_max_mismatch: f64,
        failure_behavior: SlackDistributionFailureBehavior,
    ) -> Self {
        Self {
            distribution: ActivePowerDistribution::new(balance_type),
            slack_bus_p_max_mismatch,
            failure_behavior,
        }
    }
}

impl OuterLoop for DistributedSlackOuterLoop {
    fn name(&self) -> &'static str {
        "DistributedSlack"
    }

    /// Restores the given targets, so a network solved before is distributed again from scratch.
    fn initialize(&mut self, ctx: &mut OuterLoopContext) -> Result<(), LoadFlowError> {
        for g in ctx.network.buses_mut().iter_mut().flat_map(|b| b.generators.iter_mut()) {
            g.target_p = g.initial_target_p;
        }
        Ok(())
    }

    fn check(&mut self, ctx: &mut OuterLoopContext) -> Result<OuterLoopStatus, LoadFlowError> {
        let mismatch = ctx.last_result.slack_bus_active_power_mismatch;
        if (mismatch * SB).abs() <= self.slack_bus_p_max_mismatch {
            return Ok(OuterLoopStatus::Stable);
        }
        let result = self.distribution.run(ctx.network, mismatch);
        if result.remaining.abs() > P_RESIDUE_EPS {
            let remaining_mw = result.remaining * SB;
            match self.failure_behavior {
                SlackDistributionFailureBehavior::Fail => {
                    return Err(LoadFlowError::NoMoreParticipatingGenerator { remaining_mw });
                }
                SlackDistributionFailureBehavior::LeaveOnSlackBus => {
                    warn!(
                        network = ctx.network.num,
                        remaining_mw, "slack distribution incomplete, remainder left on slack bus"
                    );
                    if result.distributed.abs() <= P_RESIDUE_EPS {
                        return Ok(OuterLoopStatus::Stable);
                    }
                }
            }
        }
        info!(
            network = ctx.network.num,
            mismatch_mw = mismatch * SB,
            distributed_mw = result.distributed * SB,
            passes = result.iterations,
            "slack bus active power distributed"
        );
        Ok(OuterLoopStatus::Unstable)
    }
}
