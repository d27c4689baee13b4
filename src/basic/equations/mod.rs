//! Sparse system of nonlinear equations built over a [`LfNetwork`].
//!
//! Equations live in slots keyed by `(kind, element)`. Which slots produce a
//! row is decided by an explicit active set, so row numbers are a pure
//! function of that set; column numbers are a pure function of the variables
//! referenced by active equations. Both follow the `(kind, element)` order.

pub mod builder;
pub mod equation;
pub mod term;
pub mod variable;

use std::{
    cell::OnceCell,
    collections::{BTreeMap, BTreeSet, HashMap},
};

use nalgebra::DVector;

pub use builder::*;
pub use equation::*;
pub use term::*;
pub use variable::*;

use crate::basic::{
    error::LoadFlowError,
    initializer::VoltageInitializer,
    network::{LfNetwork, Side},
};

/// Structural change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum EquationEvent {
    Created(EquationKey),
    Activated(EquationKey),
    Deactivated(EquationKey),
    TermAdded { equation: EquationKey, term: usize },
}

pub trait EquationSystemListener {
    fn on_event(&mut self, event: &EquationEvent);
}

/// Where the flow at one branch end is read from after a solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowHandle {
    Term(usize),
    Variable { variable: Variable, sign: f64 },
    Constant(f64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BranchFlows {
    pub p1: Option<FlowHandle>,
    pub q1: Option<FlowHandle>,
    pub p2: Option<FlowHandle>,
    pub q2: Option<FlowHandle>,
}

/// Row and column numbering of the active equations.
#[derive(Debug, Default)]
struct Index {
    rows: Vec<EquationKey>,
    row_index: HashMap<EquationKey, usize>,
    columns: Vec<Variable>,
    column_index: HashMap<Variable, usize>,
}

impl Index {
    fn build(active: &BTreeSet<EquationKey>, equations: &BTreeMap<EquationKey, Equation>, terms: &[EquationTerm]) -> Self {
        let rows: Vec<EquationKey> = active.iter().copied().collect();
        let row_index = rows.iter().enumerate().map(|(r, k)| (*k, r)).collect();
        let referenced: BTreeSet<Variable> = rows
            .iter()
            .filter_map(|k| equations.get(k))
            .flat_map(|eq| eq.terms.iter())
            .flat_map(|&t| terms[t].variables().iter().copied())
            .collect();
        let columns: Vec<Variable> = referenced.into_iter().collect();
        let column_index = columns.iter().enumerate().map(|(c, v)| (*v, c)).collect();
        Self {
            rows,
            row_index,
            columns,
            column_index,
        }
    }
}

#[derive(Default)]
pub struct EquationSystem {
    dc: bool,
    equations: BTreeMap<EquationKey, Equation>,
    active: BTreeSet<EquationKey>,
    terms: Vec<EquationTerm>,
    values: BTreeMap<Variable, f64>,
    /// Built on first read after a structural change.
    index: OnceCell<Index>,
    structure_version: u64,
    listeners: Vec<Box<dyn EquationSystemListener>>,
    branch_flows: BTreeMap<usize, BranchFlows>,
    scratch: Vec<f64>,
}

impl std::fmt::Debug for EquationSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EquationSystem")
            .field("dc", &self.dc)
            .field("rows", &self.row_count())
            .field("columns", &self.column_count())
            .field("terms", &self.terms.len())
            .field("structure_version", &self.structure_version)
            .finish()
    }
}

impl EquationSystem {
    pub fn new(dc: bool) -> Self {
        Self {
            dc,
            ..Default::default()
        }
    }

    pub fn is_dc(&self) -> bool {
        self.dc
    }

    pub fn add_listener(&mut self, listener: Box<dyn EquationSystemListener>) {
        self.listeners.push(listener);
    }

    fn fire(&mut self, event: EquationEvent) {
        for l in self.listeners.iter_mut() {
            l.on_event(&event);
        }
    }

    /// Returns the existing slot or creates an active one.
    pub fn create_equation(&mut self, element: usize, kind: EquationType) -> EquationKey {
        let key = EquationKey::new(element, kind);
        if self.equations.contains_key(&key) {
            return key;
        }
        self.equations.insert(key, Equation::default());
        self.active.insert(key);
        self.invalidate();
        self.fire(EquationEvent::Created(key));
        key
    }

    pub fn equation(&self, key: &EquationKey) -> Option<&Equation> {
        self.equations.get(key)
    }

    pub fn has_equation(&self, element: usize, kind: EquationType) -> bool {
        self.equations.contains_key(&EquationKey::new(element, kind))
    }

    pub fn is_active(&self, key: &EquationKey) -> bool {
        self.active.contains(key)
    }

    /// Toggles an equation and renumbers rows. Returns whether anything changed.
    pub fn set_active(&mut self, key: EquationKey, active: bool) -> bool {
        if !self.equations.contains_key(&key) {
            return false;
        }
        let changed = if active {
            self.active.insert(key)
        } else {
            self.active.remove(&key)
        };
        if changed {
            self.invalidate();
            self.fire(if active {
                EquationEvent::Activated(key)
            } else {
                EquationEvent::Deactivated(key)
            });
        }
        changed
    }

    /// Appends a term to an equation, creating the equation if needed.
    pub fn add_term(&mut self, key: EquationKey, term: EquationTerm) -> usize {
        let key = self.create_equation(key.element, key.kind);
        for v in term.variables() {
            self.values.entry(*v).or_insert(0.0);
        }
        let id = self.terms.len();
        self.terms.push(term);
        if let Some(eq) = self.equations.get_mut(&key) {
            eq.terms.push(id);
        }
        self.invalidate();
        self.fire(EquationEvent::TermAdded { equation: key, term: id });
        id
    }

    fn invalidate(&mut self) {
        self.structure_version += 1;
        self.index.take();
    }

    fn index(&self) -> &Index {
        self.index
            .get_or_init(|| Index::build(&self.active, &self.equations, &self.terms))
    }

    /// Active equations in row order.
    pub fn rows(&self) -> &[EquationKey] {
        &self.index().rows
    }

    /// Referenced variables in column order.
    pub fn columns(&self) -> &[Variable] {
        &self.index().columns
    }

    pub fn row(&self, key: &EquationKey) -> Option<usize> {
        self.index().row_index.get(key).copied()
    }

    pub fn column(&self, variable: &Variable) -> Option<usize> {
        self.index().column_index.get(variable).copied()
    }

    pub fn row_count(&self) -> usize {
        self.index().rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.index().columns.len()
    }

    pub fn structure_version(&self) -> u64 {
        self.structure_version
    }

    pub fn terms(&self) -> &[EquationTerm] {
        &self.terms
    }

    pub fn term(&self, id: usize) -> Option<&EquationTerm> {
        self.terms.get(id)
    }

    /// Cached derivative of a term. Asking for a variable the term does not
    /// reference is a contract violation.
    pub fn derivative(&self, term: usize, variable: &Variable) -> Result<f64, LoadFlowError> {
        self.terms
            .get(term)
            .and_then(|t| t.der(variable))
            .ok_or_else(|| LoadFlowError::UnknownVariable {
                term,
                variable: variable.to_string(),
            })
    }

    pub fn variable_value(&self, variable: &Variable) -> Option<f64> {
        self.values.get(variable).copied()
    }

    /// Seeds every known variable from `initializer` and returns the state vector.
    pub fn create_state_vector(
        &mut self,
        network: &LfNetwork,
        initializer: &dyn VoltageInitializer,
    ) -> DVector<f64> {
        for (var, value) in self.values.iter_mut() {
            *value = match var.kind {
                VariableType::BusV => initializer.magnitude(network.bus(var.element)),
                VariableType::BusPhi => initializer.angle(network.bus(var.element)),
                VariableType::DummyP | VariableType::DummyQ => 0.0,
            };
        }
        self.update_terms();
        self.state_vector()
    }

    /// Column ordered projection of the variable store.
    pub fn state_vector(&self) -> DVector<f64> {
        let columns = self.columns();
        DVector::from_iterator(
            columns.len(),
            columns
                .iter()
                .map(|v| self.values.get(v).copied().unwrap_or(0.0)),
        )
    }

    pub fn set_state_vector(&mut self, x: &DVector<f64>) {
        let index = self
            .index
            .get_or_init(|| Index::build(&self.active, &self.equations, &self.terms));
        for (col, var) in index.columns.iter().enumerate() {
            self.values.insert(*var, x[col]);
        }
    }

    /// Stores `x` and refreshes every term cache.
    pub fn update_equations(&mut self, x: &DVector<f64>) {
        self.set_state_vector(x);
        self.update_terms();
    }

    /// Refreshes every term cache from the variable store, active or not.
    pub fn update_terms(&mut self) {
        let EquationSystem {
            terms,
            values,
            scratch,
            ..
        } = self;
        for term in terms.iter_mut() {
            scratch.clear();
            scratch.extend(
                term.variables()
                    .iter()
                    .map(|v| values.get(v).copied().unwrap_or(0.0)),
            );
            term.update(scratch.as_slice());
        }
    }

    /// Sum of the cached term values of an equation, active or not.
    pub fn equation_value(&self, key: &EquationKey) -> f64 {
        self.equations
            .get(key)
            .map(|eq| eq.terms.iter().map(|&t| self.terms[t].eval()).sum())
            .unwrap_or(0.0)
    }

    /// `target - value` for every active row.
    pub fn mismatch(&self, network: &LfNetwork) -> DVector<f64> {
        let rows = self.rows();
        DVector::from_iterator(
            rows.len(),
            rows.iter()
                .map(|k| target(k, network) - self.equation_value(k)),
        )
    }

    /// `(row, column, value)` entries of the Jacobian, duplicates not merged.
    pub fn jacobian_triplets(&self) -> Vec<(usize, usize, f64)> {
        let index = self.index();
        let mut entries = Vec::new();
        for (row, key) in index.rows.iter().enumerate() {
            let Some(eq) = self.equations.get(key) else {
                continue;
            };
            for &t in &eq.terms {
                let term = &self.terms[t];
                for (var, der) in term.variables().iter().zip(term.derivatives()) {
                    if let Some(&col) = index.column_index.get(var) {
                        entries.push((row, col, *der));
                    }
                }
            }
        }
        entries
    }

    pub(crate) fn set_branch_flow(&mut self, branch: usize, side: Side, active: bool, handle: FlowHandle) {
        let flows = self.branch_flows.entry(branch).or_default();
        let slot = match (side, active) {
            (Side::One, true) => &mut flows.p1,
            (Side::One, false) => &mut flows.q1,
            (Side::Two, true) => &mut flows.p2,
            (Side::Two, false) => &mut flows.q2,
        };
        *slot = Some(handle);
    }

    pub fn branch_flows(&self, branch: usize) -> Option<&BranchFlows> {
        self.branch_flows.get(&branch)
    }

    fn flow_value(&self, handle: Option<FlowHandle>) -> f64 {
        match handle {
            Some(FlowHandle::Term(t)) => self.terms[t].eval(),
            Some(FlowHandle::Variable { variable, sign }) => {
                sign * self.values.get(&variable).copied().unwrap_or(f64::NAN)
            }
            Some(FlowHandle::Constant(c)) => c,
            None => f64::NAN,
        }
    }

    /// Writes the solved state back onto buses and branches.
    pub fn update_network(&self, network: &mut LfNetwork) {
        for bus in network.buses_mut() {
            let num = bus.num();
            if let Some(v) = self.variable_value(&Variable::bus_v(num)) {
                bus.v = v;
            }
            if let Some(phi) = self.variable_value(&Variable::bus_phi(num)) {
                bus.angle = phi;
            }
            bus.calculated_p = if self.has_equation(num, EquationType::BusTargetP) {
                self.equation_value(&EquationKey::new(num, EquationType::BusTargetP))
            } else {
                f64::NAN
            };
            bus.calculated_q = if self.has_equation(num, EquationType::BusTargetQ) {
                self.equation_value(&EquationKey::new(num, EquationType::BusTargetQ))
            } else {
                f64::NAN
            };
        }
        for branch in network.branches_mut() {
            let flows = self.branch_flows.get(&branch.num()).copied().unwrap_or_default();
            branch.set_flows_pu(
                self.flow_value(flows.p1),
                self.flow_value(flows.q1),
                self.flow_value(flows.p2),
                self.flow_value(flows.q2),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Recorder(Arc<Mutex<Vec<EquationEvent>>>);

    impl EquationSystemListener for Recorder {
        fn on_event(&mut self, event: &EquationEvent) {
            if let Ok(mut events) = self.0.lock() {
                events.push(event.clone());
            }
        }
    }

    fn small_system() -> EquationSystem {
        let mut sys = EquationSystem::new(false);
        let p1 = sys.create_equation(1, EquationType::BusTargetP);
        sys.add_term(p1, EquationTerm::variable(1, Variable::bus_phi(1)));
        let q1 = sys.create_equation(1, EquationType::BusTargetQ);
        sys.add_term(
            q1,
            EquationTerm::linear(1, vec![Variable::bus_v(1), Variable::bus_v(0)], vec![2.0, -1.0]),
        );
        let v0 = sys.create_equation(0, EquationType::BusTargetV);
        sys.add_term(v0, EquationTerm::variable(0, Variable::bus_v(0)));
        let p0 = sys.create_equation(0, EquationType::BusTargetP);
        sys.add_term(p0, EquationTerm::variable(0, Variable::bus_phi(0)));
        sys
    }

    #[test]
    fn rows_and_columns_follow_kind_then_element() {
        let sys = small_system();
        assert_eq!(
            sys.rows(),
            &[
                EquationKey::new(0, EquationType::BusTargetP),
                EquationKey::new(1, EquationType::BusTargetP),
                EquationKey::new(1, EquationType::BusTargetQ),
                EquationKey::new(0, EquationType::BusTargetV),
            ]
        );
        assert_eq!(
            sys.columns(),
            &[
                Variable::bus_v(0),
                Variable::bus_v(1),
                Variable::bus_phi(0),
                Variable::bus_phi(1)
            ]
        );
    }

    #[test]
    fn deactivation_renumbers_rows_and_drops_columns() {
        let mut sys = small_system();
        let before = sys.structure_version();
        let p0 = EquationKey::new(0, EquationType::BusTargetP);
        assert!(sys.set_active(p0, false));
        assert!(!sys.set_active(p0, false));
        assert!(sys.structure_version() > before);
        assert_eq!(sys.row(&EquationKey::new(1, EquationType::BusTargetP)), Some(0));
        assert_eq!(sys.row(&p0), None);
        assert_eq!(sys.column(&Variable::bus_phi(0)), None);
        assert_eq!(sys.column_count(), 3);

        assert!(sys.set_active(p0, true));
        assert_eq!(sys.row(&p0), Some(0));
        assert_eq!(sys.column(&Variable::bus_phi(0)), Some(2));
    }

    #[test]
    fn numbering_is_built_once_after_bulk_construction() {
        let mut sys = EquationSystem::new(false);
        for bus in (0..200).rev() {
            let p = sys.create_equation(bus, EquationType::BusTargetP);
            sys.add_term(p, EquationTerm::variable(bus, Variable::bus_phi(bus)));
            let v = sys.create_equation(bus, EquationType::BusTargetV);
            sys.add_term(v, EquationTerm::variable(bus, Variable::bus_v(bus)));
        }
        assert!(sys.index.get().is_none());
        assert_eq!(sys.structure_version(), 800);
        assert_eq!(sys.row_count(), 400);
        assert!(sys.index.get().is_some());
        assert_eq!(sys.row(&EquationKey::new(199, EquationType::BusTargetP)), Some(199));
        assert_eq!(sys.row(&EquationKey::new(0, EquationType::BusTargetV)), Some(200));
        assert_eq!(sys.column(&Variable::bus_v(7)), Some(7));
        assert_eq!(sys.column(&Variable::bus_phi(0)), Some(200));

        sys.set_active(EquationKey::new(0, EquationType::BusTargetP), false);
        assert!(sys.index.get().is_none());
        assert_eq!(sys.row(&EquationKey::new(1, EquationType::BusTargetP)), Some(0));
        assert_eq!(sys.column_count(), 399);
    }

    #[test]
    fn create_equation_is_idempotent() {
        let mut sys = small_system();
        let version = sys.structure_version();
        let key = sys.create_equation(1, EquationType::BusTargetQ);
        assert_eq!(key, EquationKey::new(1, EquationType::BusTargetQ));
        assert_eq!(sys.structure_version(), version);
        assert_eq!(sys.equation(&key).unwrap().terms().len(), 1);
    }

    #[test]
    fn listeners_see_structural_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut sys = EquationSystem::new(false);
        sys.add_listener(Box::new(Recorder(events.clone())));
        let key = sys.create_equation(0, EquationType::BusTargetV);
        let term = sys.add_term(key, EquationTerm::variable(0, Variable::bus_v(0)));
        sys.set_active(key, false);
        sys.set_active(key, true);
        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                EquationEvent::Created(key),
                EquationEvent::TermAdded { equation: key, term },
                EquationEvent::Deactivated(key),
                EquationEvent::Activated(key),
            ]
        );
    }

    #[test]
    fn state_vector_survives_renumbering() {
        let mut sys = small_system();
        let x = DVector::from_vec(vec![1.1, 0.9, 0.2, -0.1]);
        sys.update_equations(&x);
        sys.set_active(EquationKey::new(0, EquationType::BusTargetP), false);
        assert_eq!(sys.state_vector(), DVector::from_vec(vec![1.1, 0.9, -0.1]));
        sys.set_active(EquationKey::new(0, EquationType::BusTargetP), true);
        assert_eq!(sys.state_vector(), x);
    }

    #[test]
    fn jacobian_triplets_and_derivative_contract() {
        let mut sys = small_system();
        sys.update_equations(&DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0]));
        let triplets = sys.jacobian_triplets();
        // Q(1) = 2 v1 - v0 sits on row 2
        assert!(triplets.contains(&(2, 1, 2.0)));
        assert!(triplets.contains(&(2, 0, -1.0)));
        assert_eq!(triplets.len(), 5);

        let q_term = sys.equation(&EquationKey::new(1, EquationType::BusTargetQ)).unwrap().terms()[0];
        assert_eq!(sys.derivative(q_term, &Variable::bus_v(0)).unwrap(), -1.0);
        let err = sys.derivative(q_term, &Variable::bus_phi(0)).unwrap_err();
        assert!(matches!(err, LoadFlowError::UnknownVariable { .. }));
        assert!((sys.equation_value(&EquationKey::new(1, EquationType::BusTargetQ)) - 1.0).abs() < 1e-15);
    }
}
