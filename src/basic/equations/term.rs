//! Equation terms and the closed table of functions evaluating them.
//!
//! A term is an additive contribution to one equation. Its value and its
//! partial derivatives are pure functions of the values of the variables it
//! references, evaluated once per state update and cached.

use crate::basic::network::{LfBranch, PiModel, Side};

use super::variable::Variable;

#[derive(Debug, Clone, PartialEq)]
pub enum TermKind {
    /// Active flow leaving `side` of a closed branch.
    ClosedBranchActive { side: Side, pi: PiModel },
    /// Reactive flow leaving `side` of a closed branch.
    ClosedBranchReactive { side: Side, pi: PiModel },
    /// Active flow into a branch whose other end is open, `g` already includes the ratio.
    OpenBranchActive { side: Side, g: f64 },
    OpenBranchReactive { side: Side, b: f64 },
    ShuntActive { g: f64 },
    ShuntReactive { b: f64 },
    /// Linearised active flow leaving `side`, `a` is the phase shift `a1 - a2`.
    DcClosedBranch { side: Side, b: f64, a: f64 },
    /// Weighted sum of variables.
    Linear { coefficients: Vec<f64> },
}

impl TermKind {
    pub fn name(&self) -> &'static str {
        match self {
            TermKind::ClosedBranchActive { .. } => "ClosedBranchActive",
            TermKind::ClosedBranchReactive { .. } => "ClosedBranchReactive",
            TermKind::OpenBranchActive { .. } => "OpenBranchActive",
            TermKind::OpenBranchReactive { .. } => "OpenBranchReactive",
            TermKind::ShuntActive { .. } => "ShuntActive",
            TermKind::ShuntReactive { .. } => "ShuntReactive",
            TermKind::DcClosedBranch { .. } => "DcClosedBranch",
            TermKind::Linear { .. } => "Linear",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EquationTerm {
    kind: TermKind,
    element: usize,
    variables: Vec<Variable>,
    value: f64,
    derivatives: Vec<f64>,
}

impl EquationTerm {
    fn new(kind: TermKind, element: usize, variables: Vec<Variable>) -> Self {
        let n = variables.len();
        Self {
            kind,
            element,
            variables,
            value: 0.0,
            derivatives: vec![0.0; n],
        }
    }

    fn branch_variables(bus1: usize, bus2: usize) -> Vec<Variable> {
        vec![
            Variable::bus_v(bus1),
            Variable::bus_v(bus2),
            Variable::bus_phi(bus1),
            Variable::bus_phi(bus2),
        ]
    }

    pub fn closed_branch_active(branch: &LfBranch, side: Side, bus1: usize, bus2: usize) -> Self {
        let kind = TermKind::ClosedBranchActive { side, pi: branch.pi };
        Self::new(kind, branch.num(), Self::branch_variables(bus1, bus2))
    }

    pub fn closed_branch_reactive(branch: &LfBranch, side: Side, bus1: usize, bus2: usize) -> Self {
        let kind = TermKind::ClosedBranchReactive { side, pi: branch.pi };
        Self::new(kind, branch.num(), Self::branch_variables(bus1, bus2))
    }

    pub fn open_branch_active(branch: &LfBranch, side: Side, bus: usize) -> Self {
        let rho = branch.pi.ratio(side);
        let g = rho * rho * branch.pi.open_admittance(side).re;
        Self::new(TermKind::OpenBranchActive { side, g }, branch.num(), vec![Variable::bus_v(bus)])
    }

    pub fn open_branch_reactive(branch: &LfBranch, side: Side, bus: usize) -> Self {
        let rho = branch.pi.ratio(side);
        let b = rho * rho * branch.pi.open_admittance(side).im;
        Self::new(TermKind::OpenBranchReactive { side, b }, branch.num(), vec![Variable::bus_v(bus)])
    }

    pub fn shunt_active(bus: usize, g: f64) -> Self {
        Self::new(TermKind::ShuntActive { g }, bus, vec![Variable::bus_v(bus)])
    }

    pub fn shunt_reactive(bus: usize, b: f64) -> Self {
        Self::new(TermKind::ShuntReactive { b }, bus, vec![Variable::bus_v(bus)])
    }

    /// `b = 1/x`, scaled by both ratios when `use_ratio` is set.
    pub fn dc_closed_branch(branch: &LfBranch, side: Side, bus1: usize, bus2: usize, use_ratio: bool) -> Self {
        let pi = &branch.pi;
        let mut b = 1.0 / pi.x;
        if use_ratio {
            b *= pi.r1 * pi.r2;
        }
        let kind = TermKind::DcClosedBranch {
            side,
            b,
            a: pi.a1 - pi.a2,
        };
        Self::new(
            kind,
            branch.num(),
            vec![Variable::bus_phi(bus1), Variable::bus_phi(bus2)],
        )
    }

    pub fn linear(element: usize, variables: Vec<Variable>, coefficients: Vec<f64>) -> Self {
        debug_assert_eq!(variables.len(), coefficients.len());
        Self::new(TermKind::Linear { coefficients }, element, variables)
    }

    /// Single variable with coefficient one.
    pub fn variable(element: usize, variable: Variable) -> Self {
        Self::linear(element, vec![variable], vec![1.0])
    }

    pub fn kind(&self) -> &TermKind {
        &self.kind
    }

    pub fn element(&self) -> usize {
        self.element
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Cached value from the last update.
    pub fn eval(&self) -> f64 {
        self.value
    }

    /// Cached partial derivative, `None` when the variable is not referenced.
    pub fn der(&self, variable: &Variable) -> Option<f64> {
        self.variables
            .iter()
            .position(|v| v == variable)
            .map(|i| self.derivatives[i])
    }

    pub(crate) fn derivatives(&self) -> &[f64] {
        &self.derivatives
    }

    /// Recomputes the cache; `values` is aligned with [`Self::variables`].
    pub fn update(&mut self, values: &[f64]) {
        self.value = evaluate(&self.kind, values, &mut self.derivatives);
    }
}

/// Value of a term and its derivatives with respect to its variables.
pub fn evaluate(kind: &TermKind, x: &[f64], der: &mut [f64]) -> f64 {
    match kind {
        TermKind::ClosedBranchActive { side, pi } => closed_branch(pi, *side, true, x, der),
        TermKind::ClosedBranchReactive { side, pi } => closed_branch(pi, *side, false, x, der),
        TermKind::OpenBranchActive { g, .. } | TermKind::ShuntActive { g } => {
            der[0] = 2.0 * g * x[0];
            g * x[0] * x[0]
        }
        TermKind::OpenBranchReactive { b, .. } | TermKind::ShuntReactive { b } => {
            der[0] = -2.0 * b * x[0];
            -b * x[0] * x[0]
        }
        TermKind::DcClosedBranch { side, b, a } => {
            let p1 = b * (x[0] - x[1] + a);
            match side {
                Side::One => {
                    der[0] = *b;
                    der[1] = -b;
                    p1
                }
                Side::Two => {
                    der[0] = -b;
                    der[1] = *b;
                    -p1
                }
            }
        }
        TermKind::Linear { coefficients } => {
            der.copy_from_slice(coefficients);
            coefficients.iter().zip(x).map(|(c, v)| c * v).sum()
        }
    }
}

/// π-model flow leaving one end. `x` is `[v1, v2, phi1, phi2]`.
fn closed_branch(pi: &PiModel, side: Side, active: bool, x: &[f64], der: &mut [f64]) -> f64 {
    let (v1, v2, ph1, ph2) = (x[0], x[1], x[2], x[3]);
    let y = pi.y();
    let ksi = pi.ksi();
    let (sin_ksi, cos_ksi) = ksi.sin_cos();
    let (r1, r2) = (pi.r1, pi.r2);
    let yr = y * r1 * r2;
    match side {
        Side::One => {
            let (s, c) = (ksi - pi.a1 + pi.a2 - ph1 + ph2).sin_cos();
            if active {
                der[0] = r1 * (2.0 * pi.g1 * r1 * v1 + 2.0 * y * r1 * v1 * sin_ksi - y * r2 * v2 * s);
                der[1] = -yr * v1 * s;
                der[2] = yr * v1 * v2 * c;
                der[3] = -yr * v1 * v2 * c;
                r1 * v1 * (pi.g1 * r1 * v1 + y * r1 * v1 * sin_ksi - y * r2 * v2 * s)
            } else {
                der[0] = r1 * (-2.0 * pi.b1 * r1 * v1 + 2.0 * y * r1 * v1 * cos_ksi - y * r2 * v2 * c);
                der[1] = -yr * v1 * c;
                der[2] = -yr * v1 * v2 * s;
                der[3] = yr * v1 * v2 * s;
                r1 * v1 * (-pi.b1 * r1 * v1 + y * r1 * v1 * cos_ksi - y * r2 * v2 * c)
            }
        }
        Side::Two => {
            let (s, c) = (ksi + pi.a1 - pi.a2 + ph1 - ph2).sin_cos();
            if active {
                der[0] = -yr * v2 * s;
                der[1] = r2 * (2.0 * pi.g2 * r2 * v2 + 2.0 * y * r2 * v2 * sin_ksi - y * r1 * v1 * s);
                der[2] = -yr * v1 * v2 * c;
                der[3] = yr * v1 * v2 * c;
                r2 * v2 * (pi.g2 * r2 * v2 + y * r2 * v2 * sin_ksi - y * r1 * v1 * s)
            } else {
                der[0] = -yr * v2 * c;
                der[1] = r2 * (-2.0 * pi.b2 * r2 * v2 + 2.0 * y * r2 * v2 * cos_ksi - y * r1 * v1 * c);
                der[2] = yr * v1 * v2 * s;
                der[3] = -yr * v1 * v2 * s;
                r2 * v2 * (-pi.b2 * r2 * v2 + y * r2 * v2 * cos_ksi - y * r1 * v1 * c)
            }
        }
    }
}
