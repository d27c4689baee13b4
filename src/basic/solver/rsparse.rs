use rsparse::{
    self,
    data::{self, Nmrc, Numeric, Symb},
    lsolve, lu, sqr, transpose, usolve,
};

use super::{Solve, check_finite, check_len};
use crate::basic::error::LinearSolveError;

/// Factorization of one orientation of the matrix.
struct Factors {
    symbolic: Symb,
    numeric: Nmrc<f64>,
}

/// Sparse LU backend built on `rsparse`.
///
/// The symbolic analysis is reused across factorizations until [`Solve::reset`];
/// the transposed factorization is computed on the first transposed solve.
#[derive(Default)]
pub struct RSparseSolver {
    n: usize,
    symbolic: Option<Symb>,
    numeric: Option<Nmrc<f64>>,
    matrix: Option<data::Sprs<f64>>,
    transposed: Option<Factors>,
    work: Vec<f64>,
}

#[allow(non_snake_case)]
fn to_sprs(Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize) -> data::Sprs<f64> {
    data::Sprs {
        m: n,
        n,
        i: Ai.to_vec(),
        p: Ap.iter().map(|&v| v as isize).collect(),
        x: Ax.to_vec(),
        nzmax: Ax.len(),
    }
}

fn lu_solve(symbolic: &Symb, numeric: &Nmrc<f64>, work: &mut [f64], b: &mut [f64]) -> Result<(), LinearSolveError> {
    ipvec(&numeric.pinv, b, work); // x = P*b
    lsolve(&numeric.l, work); // x = L\x
    usolve(&numeric.u, work); // x = U\x
    ipvec(&symbolic.q, work, b); // b = Q*x
    check_finite(b)
}

#[allow(non_snake_case)]
impl Solve for RSparseSolver {
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize) -> Result<(), LinearSolveError> {
        let a = to_sprs(Ap, Ai, Ax, n);
        if self.n != n {
            self.symbolic = None;
        }
        let symbolic = self.symbolic.get_or_insert_with(|| sqr(&a, 1, false));
        self.transposed = None;
        self.numeric = None;
        self.n = n;
        self.work.resize(n, 0.0);
        let numeric = lu(&a, symbolic, 1e-6).map_err(|_| LinearSolveError::Singular)?; // numeric LU factorization
        self.numeric = Some(numeric);
        self.matrix = Some(a);
        Ok(())
    }

    fn solve(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        check_len(self.n, b)?;
        let (Some(symbolic), Some(numeric)) = (self.symbolic.as_ref(), self.numeric.as_ref()) else {
            return Err(LinearSolveError::NotFactorized);
        };
        lu_solve(symbolic, numeric, &mut self.work, b)
    }

    fn solve_transposed(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError> {
        check_len(self.n, b)?;
        if self.transposed.is_none() {
            let a = self.matrix.as_ref().ok_or(LinearSolveError::NotFactorized)?;
            let at = transpose(a);
            let mut symbolic = sqr(&at, 1, false);
            let numeric = lu(&at, &mut symbolic, 1e-6).map_err(|_| LinearSolveError::Singular)?;
            self.transposed = Some(Factors { symbolic, numeric });
        }
        let f = self.transposed.as_ref().ok_or(LinearSolveError::NotFactorized)?;
        lu_solve(&f.symbolic, &f.numeric, &mut self.work, b)
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.numeric = None;
        self.matrix = None;
        self.transposed = None;
    }
}

fn ipvec_identity<T: Numeric<T>>(b: &[T], x: &mut [T]) {
    x.copy_from_slice(b);
}

fn ipvec_perm<T: Numeric<T>>(p: &[isize], b: &[T], x: &mut [T]) {
    for k in 0..b.len() {
        x[p[k] as usize] = b[k];
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(pvec) => ipvec_perm(pvec, b, x),
        None => ipvec_identity(b, x),
    }
}
