//! Sparse Jacobian of an [`EquationSystem`] bound to a linear solver backend.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use tracing::trace;

use super::{equations::EquationSystem, error::LinearSolveError, solver::Solve};

pub struct JacobianMatrix {
    solver: Box<dyn Solve>,
    matrix: Option<CscMatrix<f64>>,
    /// Value slot of each triplet of the current structure.
    positions: Vec<usize>,
    structure_version: Option<u64>,
    factorized: bool,
}

/// Finds where each triplet lands in the compressed matrix.
fn locate(matrix: &CscMatrix<f64>, triplets: &[(usize, usize, f64)]) -> Vec<usize> {
    let (offsets, rows) = (matrix.col_offsets(), matrix.row_indices());
    triplets
        .iter()
        .filter_map(|&(r, c, _)| {
            let start = offsets[c];
            rows[start..offsets[c + 1]].binary_search(&r).ok().map(|k| start + k)
        })
        .collect()
}

impl JacobianMatrix {
    pub fn new(solver: Box<dyn Solve>) -> Self {
        Self {
            solver,
            matrix: None,
            positions: Vec::new(),
            structure_version: None,
            factorized: false,
        }
    }

    /// Refreshes the matrix from the current term derivatives.
    ///
    /// While the equation system structure is unchanged only the values are
    /// overwritten and the solver keeps its symbolic analysis. Otherwise the
    /// pattern is rebuilt and the solver reset.
    pub fn update(&mut self, system: &EquationSystem) -> Result<(), LinearSolveError> {
        let (rows, cols) = (system.row_count(), system.column_count());
        if rows != cols {
            return Err(LinearSolveError::NotSquare { rows, cols });
        }
        let triplets = system.jacobian_triplets();
        let version = system.structure_version();
        let reusable = self.structure_version == Some(version) && self.positions.len() == triplets.len();
        let refreshed = match self.matrix.as_mut() {
            Some(matrix) if reusable => {
                let values = matrix.values_mut();
                values.fill(0.0);
                for (&k, &(_, _, v)) in self.positions.iter().zip(&triplets) {
                    values[k] += v;
                }
                true
            }
            _ => false,
        };
        if !refreshed {
            trace!(version, rows, "jacobian structure changed");
            self.solver.reset();
            let mut coo = CooMatrix::new(rows, cols);
            for &(r, c, v) in &triplets {
                coo.push(r, c, v);
            }
            let matrix = CscMatrix::from(&coo);
            self.positions = locate(&matrix, &triplets);
            self.matrix = Some(matrix);
            self.structure_version = Some(version);
        }
        self.factorized = false;
        Ok(())
    }

    /// Gives the backend back, dropping the matrix and its factorization.
    pub fn into_solver(mut self) -> Box<dyn Solve> {
        self.solver.reset();
        self.solver
    }

    pub fn matrix(&self) -> Option<&CscMatrix<f64>> {
        self.matrix.as_ref()
    }

    /// LU factorization of the current matrix, done at most once per update.
    pub fn decompose(&mut self) -> Result<(), LinearSolveError> {
        if self.factorized {
            return Ok(());
        }
        let m = self.matrix.as_ref().ok_or(LinearSolveError::NotFactorized)?;
        let n = m.nrows();
        if n > 0 {
            let (ap, ai, ax) = m.csc_data();
            self.solver.factorize(ap, ai, ax, n)?;
        }
        self.factorized = true;
        Ok(())
    }

    /// Solves `J x = b` in place.
    pub fn solve(&mut self, b: &mut DVector<f64>) -> Result<(), LinearSolveError> {
        self.decompose()?;
        if b.is_empty() {
            return Ok(());
        }
        self.solver.solve(b.as_mut_slice())
    }

    /// Solves `J^T x = b` in place, without rebuilding the matrix.
    pub fn solve_transposed(&mut self, b: &mut DVector<f64>) -> Result<(), LinearSolveError> {
        self.decompose()?;
        if b.is_empty() {
            return Ok(());
        }
        self.solver.solve_transposed(b.as_mut_slice())
    }
}
