use serde::{Deserialize, Serialize};

use super::error::{LinearSolveError, LoadFlowError};

mod dense;
pub use dense::*;

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[allow(non_snake_case)]
/// A trait for factorizing and solving square sparse linear systems given in
/// compressed sparse column form.
pub trait Solve: Send {
    /// Factorizes the matrix. The symbolic analysis is kept until [`Solve::reset`].
    ///
    /// # Parameters
    ///
    /// * `Ap` - Column pointers of the matrix.
    /// * `Ai` - Row indices of the matrix.
    /// * `Ax` - Non-zero values of the matrix.
    /// * `n` - Dimension of the system.
    fn factorize(&mut self, Ap: &[usize], Ai: &[usize], Ax: &[f64], n: usize) -> Result<(), LinearSolveError>;

    /// Solves `A x = b` in place with the last factorization.
    fn solve(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError>;

    /// Solves `A^T x = b` in place with the last factorization.
    fn solve_transposed(&mut self, b: &mut [f64]) -> Result<(), LinearSolveError>;

    /// Drops the symbolic analysis, needed whenever the sparsity pattern changes.
    fn reset(&mut self);
}

/// Serializable backend choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverKind {
    Dense,
    Sparse,
    Faer,
}

impl Default for LinearSolverKind {
    fn default() -> Self {
        if cfg!(feature = "rsparse") {
            LinearSolverKind::Sparse
        } else if cfg!(feature = "faer") {
            LinearSolverKind::Faer
        } else {
            LinearSolverKind::Dense
        }
    }
}

/// Instantiates a backend, failing when its feature is not compiled in.
pub fn new_solver(kind: LinearSolverKind) -> Result<Box<dyn Solve>, LoadFlowError> {
    match kind {
        LinearSolverKind::Dense => Ok(Box::new(DenseSolver::default())),
        #[cfg(feature = "rsparse")]
        LinearSolverKind::Sparse => Ok(Box::new(RSparseSolver::default())),
        #[cfg(not(feature = "rsparse"))]
        LinearSolverKind::Sparse => Err(LoadFlowError::BackendUnavailable("rsparse")),
        #[cfg(feature = "faer")]
        LinearSolverKind::Faer => Ok(Box::new(FaerSolver::default())),
        #[cfg(not(feature = "faer"))]
        LinearSolverKind::Faer => Err(LoadFlowError::BackendUnavailable("faer")),
    }
}

/// Solutions with NaN or infinite entries come from a numerically singular matrix.
pub(crate) fn check_finite(x: &[f64]) -> Result<(), LinearSolveError> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(LinearSolveError::Singular)
    }
}

pub(crate) fn check_len(expected: usize, b: &[f64]) -> Result<(), LinearSolveError> {
    if b.len() == expected {
        Ok(())
    } else {
        Err(LinearSolveError::DimensionMismatch {
            expected,
            got: b.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// [[4, 1, 0], [2, 5, 1], [0, 3, 6]] in CSC form.
    pub(crate) fn sample() -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        (
            vec![0, 2, 5, 7],
            vec![0, 1, 0, 1, 2, 1, 2],
            vec![4.0, 2.0, 1.0, 5.0, 3.0, 1.0, 6.0],
        )
    }

    pub(crate) fn dense_mul(ap: &[usize], ai: &[usize], ax: &[f64], x: &[f64], transposed: bool) -> Vec<f64> {
        let n = x.len();
        let mut y = vec![0.0; n];
        for col in 0..n {
            for idx in ap[col]..ap[col + 1] {
                if transposed {
                    y[col] += ax[idx] * x[ai[idx]];
                } else {
                    y[ai[idx]] += ax[idx] * x[col];
                }
            }
        }
        y
    }

    /// Checks a backend against the sample system, plain and transposed.
    pub(crate) fn check_backend(solver: &mut dyn Solve) {
        let (ap, ai, ax) = sample();
        solver.factorize(&ap, &ai, &ax, 3).unwrap();
        let expected = [1.0, -2.0, 0.5];
        let mut b = dense_mul(&ap, &ai, &ax, &expected, false);
        solver.solve(&mut b).unwrap();
        let mut bt = dense_mul(&ap, &ai, &ax, &expected, true);
        solver.solve_transposed(&mut bt).unwrap();
        for k in 0..3 {
            assert!((b[k] - expected[k]).abs() < 1e-12, "Mismatch at {}: {} vs {}", k, b[k], expected[k]);
            assert!((bt[k] - expected[k]).abs() < 1e-12, "Transposed mismatch at {}: {} vs {}", k, bt[k], expected[k]);
        }
    }

    /// Second row twice the first: [[1, 2], [2, 4]].
    pub(crate) fn singular() -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        (vec![0, 2, 4], vec![0, 1, 0, 1], vec![1.0, 2.0, 2.0, 4.0])
    }

    #[test]
    fn unavailable_backends_are_reported() {
        assert!(new_solver(LinearSolverKind::Dense).is_ok());
        #[cfg(not(feature = "faer"))]
        assert!(matches!(
            new_solver(LinearSolverKind::Faer),
            Err(LoadFlowError::BackendUnavailable("faer"))
        ));
    }

    #[test]
    fn non_finite_solutions_are_singular() {
        assert!(check_finite(&[1.0, 2.0]).is_ok());
        assert!(matches!(check_finite(&[1.0, f64::NAN]), Err(LinearSolveError::Singular)));
        assert!(matches!(
            check_len(3, &[0.0]),
            Err(LinearSolveError::DimensionMismatch { expected: 3, got: 1 })
        ));
    }
}
