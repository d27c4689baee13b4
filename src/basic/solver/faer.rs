use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::{Solve as PoSolve, check_finite, check_len};
use crate::basic::error::LinearSolveError;

/// Sparse LU backend built on `faer`. Transposed solves reuse the same factors.
#[derive(Default)]
pub struct FaerSolver {
    n: usize,
    lu: Option<Lu<usize, f64>>,
    symbolic: Option<SymbolicLu<usize>>,
}

#[allow(non_snake_case)]
impl PoSolve for FaerSolver {
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize) -> Result<(), LinearSolveError> {
        // row indices are sorted inside each column by the CSC assembly
        let s = unsafe { SymbolicSparseColMatRef::new_unchecked(n, n, Ap, None, Ai) };
        let mat = SparseColMatRef::new(s, Ax);
        if self.symbolic.is_none() || self.n != n {
            self.symbolic = Some(
                SymbolicLu::try_new(s)
                    .map_err(|e| LinearSolveError::Backend(format!("faer symbolic error: {e:?}")))?,
            );
        }
        self.n = n;
        let symbolic = self.symbolic.clone().ok_or(LinearSolveError::NotFactorized)?;
        self.lu = None;
        self.lu = Some(Lu::try_new_with_symbolic(symbolic, mat).map_err(|_| LinearSolveError::Singular)?);
        Ok(())
    }

    fn solve(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        check_len(self.n, b)?;
        let lu = self.lu.as_ref().ok_or(LinearSolveError::NotFactorized)?;
        let mat_ref = MatMut::from_column_major_slice_mut(b, self.n, 1);
        lu.solve_in_place(mat_ref);
        check_finite(b)
    }

    fn solve_transposed(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        check_len(self.n, b)?;
        let lu = self.lu.as_ref().ok_or(LinearSolveError::NotFactorized)?;
        let mat_ref = MatMut::from_column_major_slice_mut(b, self.n, 1);
        lu.solve_transpose_in_place(mat_ref);
        check_finite(b)
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.lu = None;
    }
}
