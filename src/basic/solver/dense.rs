use nalgebra::{DMatrix, DVector, Dyn, linalg::LU};

use super::{Solve, check_finite, check_len};
use crate::basic::error::LinearSolveError;

/// Dense LU backend, for small systems and tests.
#[derive(Default)]
pub struct DenseSolver {
    n: usize,
    matrix: Option<DMatrix<f64>>,
    lu: Option<LU<f64, Dyn, Dyn>>,
    lu_transposed: Option<LU<f64, Dyn, Dyn>>,
}

fn lu_solve(lu: &LU<f64, Dyn, Dyn>, n: usize, b: &mut [f64]) -> Result<(), LinearSolveError> {
    check_len(n, b)?;
    let mut x = DVector::from_column_slice(b);
    if !lu.solve_mut(&mut x) {
        return Err(LinearSolveError::Singular);
    }
    check_finite(x.as_slice())?;
    b.copy_from_slice(x.as_slice());
    Ok(())
}

#[allow(non_snake_case)]
impl Solve for DenseSolver {
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize) -> Result<(), LinearSolveError> {
        let mut m = DMatrix::<f64>::zeros(n, n);
        for col in 0..n {
            for idx in Ap[col]..Ap[col + 1] {
                m[(Ai[idx], col)] += Ax[idx];
            }
        }
        let lu = m.clone().lu();
        self.n = n;
        self.lu_transposed = None;
        if !lu.is_invertible() {
            self.lu = None;
            return Err(LinearSolveError::Singular);
        }
        self.lu = Some(lu);
        self.matrix = Some(m);
        Ok(())
    }

    fn solve(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        let lu = self.lu.as_ref().ok_or(LinearSolveError::NotFactorized)?;
        lu_solve(lu, self.n, b)
    }

    fn solve_transposed(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        if self.lu_transposed.is_none() {
            let m = self.matrix.as_ref().ok_or(LinearSolveError::NotFactorized)?;
            self.lu_transposed = Some(m.transpose().lu());
        }
        let lu = self.lu_transposed.as_ref().ok_or(LinearSolveError::NotFactorized)?;
        lu_solve(lu, self.n, b)
    }

    fn reset(&mut self) {
        self.matrix = None;
        self.lu = None;
        self.lu_transposed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{check_backend, singular};
    use super::*;

    #[test]
    fn solves_plain_and_transposed() {
        check_backend(&mut DenseSolver::default());
    }

    #[test]
    fn singular_matrix_is_reported() {
        let (ap, ai, ax) = singular();
        let mut solver = DenseSolver::default();
        assert!(matches!(
            solver.factorize(&ap, &ai, &ax, 2),
            Err(LinearSolveError::Singular)
        ));
        assert!(matches!(
            solver.solve(&mut [1.0, 1.0]),
            Err(LinearSolveError::NotFactorized)
        ));
    }
}
