use serde::{Deserialize, Serialize};

/// System base power in MVA.
pub const SB: f64 = 100.0;

/// Converts MW (or MVar) to per-unit on the system base.
#[inline(always)]
pub fn to_pu(value: f64) -> f64 {
    value / SB
}

/// Converts a per-unit power back to MW (or MVar).
#[inline(always)]
pub fn from_pu(value: f64) -> f64 {
    value * SB
}

/// Base impedance in ohms of a voltage level given in kV.
#[inline(always)]
pub fn base_impedance(nominal_kv: f64) -> f64 {
    nominal_kv * nominal_kv / SB
}

/// Min/max range of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limit<T> {
    /// Minimum value.
    pub min: T,
    /// Maximum value.
    pub max: T,
}

impl Limit<f64> {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            min: self.min * factor,
            max: self.max * factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_unit_conversions() {
        assert_eq!(to_pu(600.0), 6.0);
        assert_eq!(from_pu(-2.0), -200.0);
        assert!((base_impedance(380.0) - 1444.0).abs() < 1e-12);
    }

    #[test]
    fn limit_clamps_and_contains() {
        let lim = Limit::new(-1.0, 2.0);
        assert!(lim.contains(0.5));
        assert!(!lim.contains(2.5));
        assert_eq!(lim.clamp(3.0), 2.0);
        assert_eq!(lim.clamp(-4.0), -1.0);
        assert_eq!(lim.range(), 3.0);
        assert_eq!(lim.scaled(0.5), Limit::new(-0.5, 1.0));
    }
}
