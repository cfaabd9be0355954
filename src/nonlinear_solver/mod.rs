pub mod newton;

use crate::error::MriResult;
use crate::op::NonLinearOp;

/// The pluggable nonlinear solver consumed by each implicit (DIRK) stage,
/// named as an external collaborator (`mriStep_Nls`)
/// but given one default implementation
/// ([`newton::NewtonNonlinearSolver`]) so the crate is runnable standalone.
pub trait NonlinearSolver<F: NonLinearOp> {
    /// Solve `F(x) = 0` in place, starting from `x` as the initial guess.
    /// `ewt` is the driver's current error-weight vector (`MriDriver::
    /// error_weights`), used to weight the convergence norm so the test
    /// tracks the tolerances installed via `sstolerances`/`svtolerances`/
    /// `wftolerances` rather than the raw correction magnitude.
    fn solve_in_place(&mut self, op: &F, x: &mut F::V, t: F::T, ewt: &F::V) -> MriResult<()>;

    fn set_max_iter(&mut self, max_iter: usize);
    fn max_iter(&self) -> usize;
    fn niter(&self) -> usize;

    /// Install the `nlscoef` convergence-test safety factor and the `rdiv`
    /// divergence-ratio ceiling. Default no-op so a solver that does not use
    /// these may ignore them.
    fn set_conv_params(&mut self, _nlscoef: F::T, _rdiv: F::T) {}
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use crate::op::Op;
    use crate::vector::Vector;
    use num_traits::{One, Zero};
    use std::cell::RefCell;

    /// `F(x) = J x - b`, a trivial square linear system used to exercise
    /// the Newton loop end to end without needing a full `OdeEquations`.
    pub struct SquareClosure<M: Matrix> {
        jac: M,
        b: M::V,
        calls: RefCell<usize>,
    }

    impl<M: Matrix> SquareClosure<M> {
        pub fn new(jac: M, b: M::V) -> Self {
            Self {
                jac,
                b,
                calls: RefCell::new(0),
            }
        }
    }

    impl<M: Matrix> Op for SquareClosure<M> {
        type T = M::T;
        type V = M::V;
        type M = M;
        fn nstates(&self) -> usize {
            self.jac.nrows()
        }
        fn nout(&self) -> usize {
            self.jac.nrows()
        }
    }

    impl<M: Matrix> crate::op::NonLinearOp for SquareClosure<M> {
        fn call_inplace(&self, x: &M::V, _t: M::T, y: &mut M::V) {
            *self.calls.borrow_mut() += 1;
            self.jac.gemv(M::T::one(), x, M::T::zero(), y);
            *y -= &self.b;
        }
        fn jac_mul_inplace(&self, _x: &M::V, _t: M::T, v: &M::V, y: &mut M::V) {
            self.jac.gemv(M::T::one(), v, M::T::zero(), y);
        }
    }

    impl<M: Matrix> crate::op::Jacobian for SquareClosure<M> {
        fn jacobian(&self, _x: &M::V, _t: M::T) -> M {
            self.jac.clone()
        }
    }

    pub fn test_nonlinear_solver<S>(mut solver: S)
    where
        S: NonlinearSolver<SquareClosure<nalgebra::DMatrix<f64>>>,
    {
        type M = nalgebra::DMatrix<f64>;
        let jac = M::from_diagonal(&<M as Matrix>::V::from_vec(vec![2.0, 2.0]));
        let b = <M as Matrix>::V::from_vec(vec![2.0, 4.0]);
        let op = SquareClosure::new(jac, b);
        let mut x = <M as Matrix>::V::from_vec(vec![0.0, 0.0]);
        let ewt = <M as Matrix>::V::from_vec(vec![1.0, 1.0]);
        solver.solve_in_place(&op, &mut x, 0.0, &ewt).unwrap();
        let expect = <M as Matrix>::V::from_vec(vec![1.0, 2.0]);
        x.assert_eq(&expect, 1e-6);
    }
}
