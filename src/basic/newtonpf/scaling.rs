use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::basic::equations::{Variable, VariableType};

/// What a scaling policy may look at when shrinking a Newton step.
pub struct StepContext<'a> {
    /// Variables in column order, aligned with the step.
    pub variables: &'a [Variable],
    /// Mismatch norm at the current state, before the step.
    pub mismatch_norm: f64,
}

pub trait StateVectorScaling: Send {
    fn name(&self) -> &'static str;

    /// Shrinks `step` in place. `evaluate` returns the mismatch norm at `x + trial`.
    fn scale(
        &mut self,
        step: &mut DVector<f64>,
        ctx: &StepContext,
        evaluate: &mut dyn FnMut(&DVector<f64>) -> f64,
    );
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoStateVectorScaling;

impl StateVectorScaling for NoStateVectorScaling {
    fn name(&self) -> &'static str {
        "none"
    }

    fn scale(&mut self, _step: &mut DVector<f64>, _ctx: &StepContext, _evaluate: &mut dyn FnMut(&DVector<f64>) -> f64) {}
}

/// Folds the step back by `step_fold` while the mismatch norm grows.
#[derive(Debug, Clone, Copy)]
pub struct LineSearchStateVectorScaling {
    pub max_iterations: usize,
    pub step_fold: f64,
}

impl StateVectorScaling for LineSearchStateVectorScaling {
    fn name(&self) -> &'static str {
        "line_search"
    }

    fn scale(
        &mut self,
        step: &mut DVector<f64>,
        ctx: &StepContext,
        evaluate: &mut dyn FnMut(&DVector<f64>) -> f64,
    ) {
        let full = step.clone();
        let mut mu = 1.0;
        let mut norm = evaluate(&full);
        let mut k = 0;
        while norm > ctx.mismatch_norm && k < self.max_iterations {
            mu /= self.step_fold;
            norm = evaluate(&(&full * mu));
            k += 1;
        }
        if k > 0 {
            debug!(mu, norm, fold_backs = k, "step folded back");
            *step = full * mu;
        }
    }
}

/// Uniformly shrinks the step so no voltage moves more than `max_dv` pu and
/// no angle more than `max_dphi` rad.
#[derive(Debug, Clone, Copy)]
pub struct MaxVoltageChangeStateVectorScaling {
    pub max_dv: f64,
    pub max_dphi: f64,
}

impl StateVectorScaling for MaxVoltageChangeStateVectorScaling {
    fn name(&self) -> &'static str {
        "max_voltage_change"
    }

    fn scale(
        &mut self,
        step: &mut DVector<f64>,
        ctx: &StepContext,
        _evaluate: &mut dyn FnMut(&DVector<f64>) -> f64,
    ) {
        let mut factor: f64 = 1.0;
        for (dx, var) in step.iter().zip(ctx.variables) {
            let limit = match var.kind {
                VariableType::BusV => self.max_dv,
                VariableType::BusPhi => self.max_dphi,
                _ => continue,
            };
            if dx.abs() > limit {
                factor = factor.min(limit / dx.abs());
            }
        }
        if factor < 1.0 {
            debug!(factor, "step limited by max voltage change");
            *step *= factor;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StateVectorScalingMode {
    #[default]
    None,
    LineSearch {
        max_iterations: usize,
        step_fold: f64,
    },
    MaxVoltageChange {
        max_dv: f64,
        max_dphi: f64,
    },
}

impl StateVectorScalingMode {
    pub fn line_search() -> Self {
        StateVectorScalingMode::LineSearch {
            max_iterations: 10,
            step_fold: 4.0 / 3.0,
        }
    }

    pub fn max_voltage_change() -> Self {
        StateVectorScalingMode::MaxVoltageChange {
            max_dv: 0.1,
            max_dphi: 10f64.to_radians(),
        }
    }

    pub fn build(&self) -> Box<dyn StateVectorScaling> {
        match *self {
            StateVectorScalingMode::None => Box::new(NoStateVectorScaling),
            StateVectorScalingMode::LineSearch {
                max_iterations,
                step_fold,
            } => Box::new(LineSearchStateVectorScaling {
                max_iterations,
                step_fold,
            }),
            StateVectorScalingMode::MaxVoltageChange { max_dv, max_dphi } => {
                Box::new(MaxVoltageChangeStateVectorScaling { max_dv, max_dphi })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_voltage_change_shrinks_whole_step() {
        let vars = [Variable::bus_v(0), Variable::bus_phi(0), Variable::dummy_p(0)];
        let ctx = StepContext {
            variables: &vars,
            mismatch_norm: 1.0,
        };
        let mut step = DVector::from_vec(vec![0.4, 0.05, 3.0]);
        let mut s = StateVectorScalingMode::max_voltage_change().build();
        s.scale(&mut step, &ctx, &mut |_| 0.0);
        // dv limited to 0.1 so everything shrinks by 4, dummy flows included
        assert!((step[0] - 0.1).abs() < 1e-12, "dv = {}", step[0]);
        assert!((step[1] - 0.0125).abs() < 1e-12);
        assert!((step[2] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn line_search_folds_until_norm_decreases() {
        let vars = [Variable::bus_v(0)];
        let ctx = StepContext {
            variables: &vars,
            mismatch_norm: 1.0,
        };
        // norm grows with the step beyond 0.5
        let mut evaluate = |trial: &DVector<f64>| trial[0] * 2.0;
        let mut step = DVector::from_vec(vec![1.0]);
        let mut s = LineSearchStateVectorScaling {
            max_iterations: 10,
            step_fold: 2.0,
        };
        s.scale(&mut step, &ctx, &mut evaluate);
        assert!((step[0] - 0.5).abs() < 1e-12, "step = {}", step[0]);

        let mut capped = LineSearchStateVectorScaling {
            max_iterations: 1,
            step_fold: 10.0 / 9.0,
        };
        let mut step = DVector::from_vec(vec![1.0]);
        capped.scale(&mut step, &ctx, &mut evaluate);
        assert!((step[0] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn no_scaling_keeps_the_step() {
        let mut step = DVector::from_vec(vec![5.0]);
        let ctx = StepContext {
            variables: &[],
            mismatch_norm: 0.0,
        };
        NoStateVectorScaling.scale(&mut step, &ctx, &mut |_| 1.0);
        assert_eq!(step[0], 5.0);
    }
}
