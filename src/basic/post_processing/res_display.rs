use std::fmt;

use tabled::Tabled;

/// A float printed with a fixed number of decimal places.
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub(crate) struct FloatWrapper {
    pub(crate) value: f64,
    pub(crate) precision: usize,
}

impl FloatWrapper {
    pub fn new(value: f64, precision: usize) -> Self {
        FloatWrapper { value, precision }
    }
}

impl Default for FloatWrapper {
    fn default() -> Self {
        Self {
            value: Default::default(),
            precision: 3,
        }
    }
}

impl fmt::Display for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_nan() {
            return write!(f, "-");
        }
        write!(f, "{:.1$}", self.value, self.precision)
    }
}

impl fmt::Debug for FloatWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Table row for bus results.
#[derive(Debug, Tabled)]
pub(crate) struct BusResTable {
    #[tabled(rename = "bus")]
    pub(crate) id: String,
    pub(crate) v_kv: FloatWrapper,
    pub(crate) angle_deg: FloatWrapper,
    pub(crate) p_mw: FloatWrapper,
    pub(crate) q_mvar: FloatWrapper,
}

/// Table row for branch flows, NaN ends print as `-`.
#[derive(Debug, Tabled)]
pub(crate) struct BranchResTable {
    #[tabled(rename = "branch")]
    pub(crate) id: String,
    pub(crate) p1_mw: FloatWrapper,
    pub(crate) q1_mvar: FloatWrapper,
    pub(crate) p2_mw: FloatWrapper,
    pub(crate) q2_mvar: FloatWrapper,
}
