use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::units::{base_impedance, from_pu};

/// Branch end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
}

/// π-equivalent of a line or transformer, per-unit.
///
/// `r1`/`a1` and `r2`/`a2` are the ratio and phase shift (rad) applied at each end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiModel {
    pub r: f64,
    pub x: f64,
    pub g1: f64,
    pub b1: f64,
    pub g2: f64,
    pub b2: f64,
    pub r1: f64,
    pub a1: f64,
    pub r2: f64,
    pub a2: f64,
}

impl Default for PiModel {
    fn default() -> Self {
        Self {
            r: 0.0,
            x: 0.0,
            g1: 0.0,
            b1: 0.0,
            g2: 0.0,
            b2: 0.0,
            r1: 1.0,
            a1: 0.0,
            r2: 1.0,
            a2: 0.0,
        }
    }
}

impl PiModel {
    /// Series impedance only.
    pub fn series(r: f64, x: f64) -> Self {
        Self {
            r,
            x,
            ..Default::default()
        }
    }

    /// Line with shunt admittances split equally between both ends.
    pub fn line(r: f64, x: f64, g: f64, b: f64) -> Self {
        Self {
            r,
            x,
            g1: g / 2.0,
            b1: b / 2.0,
            g2: g / 2.0,
            b2: b / 2.0,
            ..Default::default()
        }
    }

    /// Line from ohms and total shunt siemens on a voltage level in kV.
    pub fn from_line_ohms(r_ohm: f64, x_ohm: f64, g_s: f64, b_s: f64, nominal_kv: f64) -> Self {
        let zb = base_impedance(nominal_kv);
        Self::line(r_ohm / zb, x_ohm / zb, g_s * zb, b_s * zb)
    }

    pub fn with_ratio1(mut self, r1: f64) -> Self {
        self.r1 = r1;
        self
    }

    pub fn with_ratio2(mut self, r2: f64) -> Self {
        self.r2 = r2;
        self
    }

    pub fn with_phase_shift1(mut self, a1: f64) -> Self {
        self.a1 = a1;
        self
    }

    pub fn z(&self) -> f64 {
        self.r.hypot(self.x)
    }

    pub fn y(&self) -> f64 {
        1.0 / self.z()
    }

    pub fn ksi(&self) -> f64 {
        self.r.atan2(self.x)
    }

    pub fn ratio(&self, side: Side) -> f64 {
        match side {
            Side::One => self.r1,
            Side::Two => self.r2,
        }
    }

    /// Admittance seen from `side` when the other end is open.
    pub fn open_admittance(&self, side: Side) -> Complex64 {
        let (own, far) = match side {
            Side::One => (
                Complex64::new(self.g1, self.b1),
                Complex64::new(self.g2, self.b2),
            ),
            Side::Two => (
                Complex64::new(self.g2, self.b2),
                Complex64::new(self.g1, self.b1),
            ),
        };
        if self.z() == 0.0 {
            return own + far;
        }
        let y = Complex64::new(self.r, self.x).inv();
        let denom = y + far;
        if denom.norm() == 0.0 {
            own
        } else {
            own + y * far / denom
        }
    }
}

/// An edge of the network. Either end may be unset or disconnected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LfBranch {
    pub(crate) num: usize,
    pub id: String,
    pub(crate) bus1: Option<usize>,
    pub(crate) bus2: Option<usize>,
    pub connected1: bool,
    pub connected2: bool,
    pub pi: PiModel,
    /// Flows leaving each end in MW/MVar, NaN when undefined.
    pub p1: f64,
    pub q1: f64,
    pub p2: f64,
    pub q2: f64,
}

impl LfBranch {
    pub fn new(id: impl Into<String>, bus1: Option<usize>, bus2: Option<usize>, pi: PiModel) -> Self {
        Self {
            num: 0,
            id: id.into(),
            connected1: bus1.is_some(),
            connected2: bus2.is_some(),
            bus1,
            bus2,
            pi,
            p1: f64::NAN,
            q1: f64::NAN,
            p2: f64::NAN,
            q2: f64::NAN,
        }
    }

    pub fn num(&self) -> usize {
        self.num
    }

    /// Bus referenced at `side`, connected or not.
    pub fn bus(&self, side: Side) -> Option<usize> {
        match side {
            Side::One => self.bus1,
            Side::Two => self.bus2,
        }
    }

    pub fn is_connected(&self, side: Side) -> bool {
        match side {
            Side::One => self.connected1 && self.bus1.is_some(),
            Side::Two => self.connected2 && self.bus2.is_some(),
        }
    }

    /// Bus at `side` if that end is connected.
    pub fn connected_bus(&self, side: Side) -> Option<usize> {
        self.is_connected(side).then(|| self.bus(side)).flatten()
    }

    pub fn set_connected(&mut self, side: Side, connected: bool) {
        match side {
            Side::One => self.connected1 = connected,
            Side::Two => self.connected2 = connected,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.is_connected(Side::One) && self.is_connected(Side::Two)
    }

    /// AC models compare |z| with the threshold, DC models only |x|.
    pub fn is_zero_impedance(&self, threshold: f64, dc: bool) -> bool {
        if dc {
            self.pi.x.abs() < threshold
        } else {
            self.pi.z() < threshold
        }
    }

    pub(crate) fn set_flows_pu(&mut self, p1: f64, q1: f64, p2: f64, q2: f64) {
        self.p1 = from_pu(p1);
        self.q1 = from_pu(q1);
        self.p2 = from_pu(p2);
        self.q2 = from_pu(q2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_from_ohms_splits_charging() {
        let pi = PiModel::from_line_ohms(3.0, 33.0, 0.0, 386e-6, 380.0);
        assert!((pi.r - 3.0 / 1444.0).abs() < 1e-15);
        assert!((pi.x - 33.0 / 1444.0).abs() < 1e-15);
        assert!((pi.b1 - 386e-6 * 1444.0 / 2.0).abs() < 1e-12);
        assert_eq!(pi.b1, pi.b2);
    }

    #[test]
    fn open_admittance_of_lossless_series_is_shunt_sum() {
        let pi = PiModel::line(0.0, 0.1, 0.0, 0.02);
        let y = pi.open_admittance(Side::One);
        // b1 + (1/jx) * jb2 / (1/jx + jb2)
        let series = Complex64::new(0.0, 0.1).inv();
        let expected = Complex64::new(0.0, 0.01)
            + series * Complex64::new(0.0, 0.01) / (series + Complex64::new(0.0, 0.01));
        assert!((y - expected).norm() < 1e-12);
    }

    #[test]
    fn connection_flags() {
        let mut br = LfBranch::new("L", Some(0), Some(1), PiModel::series(0.01, 0.1));
        assert!(br.is_closed());
        br.set_connected(Side::Two, false);
        assert!(!br.is_closed());
        assert_eq!(br.connected_bus(Side::Two), None);
        assert_eq!(br.bus(Side::Two), Some(1));
        assert!(!br.is_zero_impedance(1e-8, false));
        assert!(LfBranch::new("Z", Some(0), Some(1), PiModel::series(0.01, 0.0)).is_zero_impedance(1e-8, true));
    }
}
