//! Buses and the generators attached to them.
//!
//! Every quantity stored here is per-unit on [`SB`]; constructors and result
//! getters take and return engineering units (MW, MVar, kV, degrees).

use serde::{Deserialize, Serialize};

use super::units::{Limit, SB, from_pu, to_pu};
use crate::basic::error::ModelError;

/// Default active/reactive capability of a generator without explicit limits, in MW/MVar.
pub const DEFAULT_MAX_POWER: f64 = 9999.0;

/// One point of a reactive capability diagram (per-unit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReactiveCurvePoint {
    pub p: f64,
    pub min_q: f64,
    pub max_q: f64,
}

/// Reactive capability of a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReactiveLimits {
    /// Fixed range, independent of the active power output.
    MinMax(Limit<f64>),
    /// Capability diagram sorted by active power, interpolated linearly and
    /// clamped at its end points.
    Curve(Vec<ReactiveCurvePoint>),
}

impl Default for ReactiveLimits {
    fn default() -> Self {
        ReactiveLimits::MinMax(Limit::new(
            -to_pu(DEFAULT_MAX_POWER),
            to_pu(DEFAULT_MAX_POWER),
        ))
    }
}

impl ReactiveLimits {
    /// Reactive range available at active power `p` (per-unit).
    pub fn at(&self, p: f64) -> Limit<f64> {
        match self {
            ReactiveLimits::MinMax(lim) => *lim,
            ReactiveLimits::Curve(points) => interpolate_curve(points, p),
        }
    }
}

fn interpolate_curve(points: &[ReactiveCurvePoint], p: f64) -> Limit<f64> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return ReactiveLimits::default().at(p);
    };
    if p <= first.p {
        return Limit::new(first.min_q, first.max_q);
    }
    for w in points.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if p <= b.p {
            let dp = b.p - a.p;
            if dp <= 0.0 {
                return Limit::new(a.min_q, a.max_q);
            }
            let t = (p - a.p) / dp;
            return Limit::new(
                a.min_q + t * (b.min_q - a.min_q),
                a.max_q + t * (b.max_q - a.max_q),
            );
        }
    }
    Limit::new(last.min_q, last.max_q)
}

/// A generating unit connected to a bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LfGenerator {
    pub id: String,
    /// Active power target, redistributed by the slack distribution.
    pub target_p: f64,
    /// Active power target as given before any distribution.
    pub initial_target_p: f64,
    /// Reactive power target, used when the unit does not regulate voltage.
    pub target_q: f64,
    pub p_limits: Limit<f64>,
    pub voltage_regulator_on: bool,
    pub target_v: f64,
    pub reactive_limits: ReactiveLimits,
    /// Whether the unit takes part in active power distribution.
    pub participating: bool,
    pub participation_factor: f64,
    /// Reactive power dispatched to this unit after the solve.
    pub calculated_q: f64,
}

impl LfGenerator {
    pub fn new(id: impl Into<String>, target_p_mw: f64) -> Self {
        let target_p = to_pu(target_p_mw);
        Self {
            id: id.into(),
            target_p,
            initial_target_p: target_p,
            target_q: 0.0,
            p_limits: Limit::new(0.0, to_pu(DEFAULT_MAX_POWER)),
            voltage_regulator_on: false,
            target_v: 1.0,
            reactive_limits: ReactiveLimits::default(),
            participating: true,
            participation_factor: 1.0,
            calculated_q: f64::NAN,
        }
    }

    pub fn with_voltage_regulation(mut self, target_v: f64) -> Self {
        self.voltage_regulator_on = true;
        self.target_v = target_v;
        self
    }

    pub fn with_target_q(mut self, target_q_mvar: f64) -> Self {
        self.target_q = to_pu(target_q_mvar);
        self
    }

    pub fn with_p_limits(mut self, min_mw: f64, max_mw: f64) -> Self {
        self.p_limits = Limit::new(to_pu(min_mw), to_pu(max_mw));
        self
    }

    pub fn with_q_limits(mut self, min_mvar: f64, max_mvar: f64) -> Self {
        self.reactive_limits = ReactiveLimits::MinMax(Limit::new(to_pu(min_mvar), to_pu(max_mvar)));
        self
    }

    /// Reactive capability diagram given as `(p_mw, min_q_mvar, max_q_mvar)` points.
    pub fn with_reactive_curve(mut self, points: &[(f64, f64, f64)]) -> Self {
        let mut curve: Vec<ReactiveCurvePoint> = points
            .iter()
            .map(|&(p, min_q, max_q)| ReactiveCurvePoint {
                p: to_pu(p),
                min_q: to_pu(min_q),
                max_q: to_pu(max_q),
            })
            .collect();
        curve.sort_by(|a, b| a.p.total_cmp(&b.p));
        self.reactive_limits = ReactiveLimits::Curve(curve);
        self
    }

    pub fn with_participation(mut self, participating: bool, factor: f64) -> Self {
        self.participating = participating;
        self.participation_factor = factor;
        self
    }

    /// Reactive range at the current active power target.
    pub fn q_range(&self) -> Limit<f64> {
        self.reactive_limits.at(self.target_p)
    }

    pub fn target_p_mw(&self) -> f64 {
        from_pu(self.target_p)
    }

    pub fn q_mvar(&self) -> f64 {
        from_pu(self.calculated_q)
    }
}

/// A network node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LfBus {
    pub(crate) num: usize,
    pub id: String,
    pub nominal_kv: f64,
    /// Voltage magnitude (pu).
    pub v: f64,
    /// Voltage angle (rad).
    pub angle: f64,
    pub load_target_p: f64,
    pub load_target_q: f64,
    /// Shunt conductance and susceptance (pu, at 1 pu voltage).
    pub shunt_g: f64,
    pub shunt_b: f64,
    pub generators: Vec<LfGenerator>,
    voltage_control_enabled: bool,
    pub(crate) slack: bool,
    /// Reactive generation target used while the bus is not voltage controlled.
    pub generation_target_q: f64,
    /// Active/reactive injection from the bus into the network (pu).
    pub calculated_p: f64,
    pub calculated_q: f64,
}

impl LfBus {
    pub fn new(id: impl Into<String>, nominal_kv: f64) -> Self {
        Self {
            num: 0,
            id: id.into(),
            nominal_kv,
            v: 1.0,
            angle: 0.0,
            load_target_p: 0.0,
            load_target_q: 0.0,
            shunt_g: 0.0,
            shunt_b: 0.0,
            generators: Vec::new(),
            voltage_control_enabled: false,
            slack: false,
            generation_target_q: 0.0,
            calculated_p: f64::NAN,
            calculated_q: f64::NAN,
        }
    }

    pub fn with_load(mut self, p_mw: f64, q_mvar: f64) -> Self {
        self.load_target_p += to_pu(p_mw);
        self.load_target_q += to_pu(q_mvar);
        self
    }

    pub fn with_shunt(mut self, g: f64, b: f64) -> Self {
        self.shunt_g += g;
        self.shunt_b += b;
        self
    }

    pub fn with_slack(mut self) -> Self {
        self.slack = true;
        self
    }

    pub fn with_generator(mut self, generator: LfGenerator) -> Result<Self, ModelError> {
        self.add_generator(generator)?;
        Ok(self)
    }

    /// Attaches a generator, rejecting a second voltage target on the same bus.
    pub fn add_generator(&mut self, generator: LfGenerator) -> Result<(), ModelError> {
        if generator.voltage_regulator_on {
            if let Some(existing) = self.target_v() {
                if (existing - generator.target_v).abs() > 1e-9 {
                    return Err(ModelError::ConflictingVoltageTargets {
                        bus: self.id.clone(),
                        existing,
                        requested: generator.target_v,
                    });
                }
            }
            self.voltage_control_enabled = true;
        } else {
            self.generation_target_q += generator.target_q;
        }
        self.generators.push(generator);
        Ok(())
    }

    /// Catches regulating generators pushed without [`LfBus::add_generator`].
    pub fn check_voltage_targets(&self) -> Result<(), ModelError> {
        let mut regulating = self.generators.iter().filter(|g| g.voltage_regulator_on);
        let Some(first) = regulating.next() else {
            return Ok(());
        };
        match regulating.find(|g| (g.target_v - first.target_v).abs() > 1e-9) {
            Some(other) => Err(ModelError::ConflictingVoltageTargets {
                bus: self.id.clone(),
                existing: first.target_v,
                requested: other.target_v,
            }),
            None => Ok(()),
        }
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn is_slack(&self) -> bool {
        self.slack
    }

    pub fn set_slack(&mut self, slack: bool) {
        self.slack = slack;
    }

    pub fn has_voltage_regulator(&self) -> bool {
        self.generators.iter().any(|g| g.voltage_regulator_on)
    }

    /// PV bus: voltage regulated by at least one generator and not switched to PQ.
    pub fn is_voltage_controlled(&self) -> bool {
        self.voltage_control_enabled && self.has_voltage_regulator()
    }

    pub fn set_voltage_control_enabled(&mut self, enabled: bool) {
        self.voltage_control_enabled = enabled;
    }

    pub fn target_v(&self) -> Option<f64> {
        self.generators
            .iter()
            .find(|g| g.voltage_regulator_on)
            .map(|g| g.target_v)
    }

    pub fn generation_target_p(&self) -> f64 {
        self.generators.iter().map(|g| g.target_p).sum()
    }

    pub fn target_p(&self) -> f64 {
        self.generation_target_p() - self.load_target_p
    }

    pub fn target_q(&self) -> f64 {
        self.generation_target_q - self.load_target_q
    }

    /// Sum of the reactive ranges of the voltage regulating generators, each
    /// evaluated at its own active power target.
    pub fn reactive_limits(&self) -> Limit<f64> {
        self.generators
            .iter()
            .filter(|g| g.voltage_regulator_on)
            .map(LfGenerator::q_range)
            .fold(Limit::new(0.0, 0.0), |acc, l| {
                Limit::new(acc.min + l.min, acc.max + l.max)
            })
    }

    pub fn min_q(&self) -> f64 {
        self.reactive_limits().min
    }

    pub fn max_q(&self) -> f64 {
        self.reactive_limits().max
    }

    /// Splits the reactive generation of the bus over its generators.
    ///
    /// Units without voltage regulation keep their fixed reactive target. The
    /// remainder goes to the regulating units proportionally to their
    /// participation factor, equally when every factor is zero. Without any
    /// regulating unit the remainder is split equally over all units.
    pub fn dispatch_reactive_power(&mut self) {
        if self.generators.is_empty() || !self.calculated_q.is_finite() {
            return;
        }
        let q_generation = self.calculated_q + self.load_target_q;
        let fixed: f64 = self
            .generators
            .iter()
            .filter(|g| !g.voltage_regulator_on)
            .map(|g| g.target_q)
            .sum();
        let remainder = q_generation - fixed;
        let regulating = self.generators.iter().filter(|g| g.voltage_regulator_on).count();
        if regulating == 0 {
            let share = remainder / self.generators.len() as f64;
            for g in self.generators.iter_mut() {
                g.calculated_q = g.target_q + share;
            }
            return;
        }
        let total: f64 = self
            .generators
            .iter()
            .filter(|g| g.voltage_regulator_on)
            .map(|g| g.participation_factor.max(0.0))
            .sum();
        for g in self.generators.iter_mut() {
            g.calculated_q = if !g.voltage_regulator_on {
                g.target_q
            } else if total > 0.0 {
                remainder * g.participation_factor.max(0.0) / total
            } else {
                remainder / regulating as f64
            };
        }
    }

    pub fn v_kv(&self) -> f64 {
        self.v * self.nominal_kv
    }

    pub fn angle_deg(&self) -> f64 {
        self.angle.to_degrees()
    }

    pub fn p_mw(&self) -> f64 {
        self.calculated_p * SB
    }

    pub fn q_mvar(&self) -> f64 {
        self.calculated_q * SB
    }
}
