pub mod lu;

use crate::error::MriResult;
use crate::matrix::Matrix;

/// The pluggable linear solver consumed by the default Newton nonlinear
/// solver inside each implicit (DIRK) stage, left external so a host can
/// supply its own but given one default dense implementation ([`lu::LU`])
/// here so the crate is runnable standalone.
pub trait LinearSolver<M: Matrix>: Default {
    /// Factorize (or otherwise prepare) the given matrix for repeated
    /// solves.
    fn set_problem(&mut self, matrix: &M);

    /// Whether [`LinearSolver::set_problem`] has been called.
    fn is_problem_set(&self) -> bool;

    /// Drop any cached factorization.
    fn clear_problem(&mut self);

    /// `b <- A^-1 b`, in place.
    fn solve_in_place(&mut self, b: &mut M::V) -> MriResult<()>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::vector::Vector;
    use num_traits::NumCast;

    fn t<T: NumCast>(x: f64) -> T {
        NumCast::from(x).unwrap()
    }

    pub fn test_linear_solver<M: Matrix, S: LinearSolver<M>>(mut solver: S) {
        let jac = M::from_diagonal(&M::V::from_vec(vec![t(2.0), t(2.0)]));
        solver.set_problem(&jac);
        let mut b = M::V::from_vec(vec![t(2.0), t(4.0)]);
        solver.solve_in_place(&mut b).unwrap();
        let expect = M::V::from_vec(vec![t(1.0), t(2.0)]);
        b.assert_eq(&expect, t(1e-10));
    }

    #[test]
    fn test_lu() {
        type M = nalgebra::DMatrix<f64>;
        type S = super::lu::LU<f64>;
        test_linear_solver::<M, S>(S::default());
    }
}
