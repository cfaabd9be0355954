use std::rc::Rc;

use num_traits::{One, Zero};

use crate::matrix::Matrix;
use crate::ode_solver::equations::OdeEquations;
use crate::ode_solver::problem::OdeSolverProblem;
use crate::ode_solver::rk_inner::FastRhs;
use crate::vector::Vector;

/// `y' = -0.1 y` as the slow direction, a minimal but non-trivial
/// `OdeEquations` used to exercise the full MRI stage machinery end to
/// end (an `OdeSolverProblem` built straight from a constant linear
/// right-hand side).
pub struct ExponentialDecay<M: Matrix> {
    decay: M::T,
    n: usize,
}

impl<M: Matrix> ExponentialDecay<M> {
    pub fn new(decay: M::T, n: usize) -> Self {
        Self { decay, n }
    }
}

impl<M: Matrix> OdeEquations for ExponentialDecay<M> {
    type T = M::T;
    type V = M::V;
    type M = M;

    fn nstates(&self) -> usize {
        self.n
    }

    fn rhs_inplace(&self, _t: M::T, y: &M::V, y_out: &mut M::V) {
        y_out.copy_from(y);
        *y_out *= -self.decay;
    }

    fn jac_mul_inplace(&self, _t: M::T, _y: &M::V, v: &M::V, y_out: &mut M::V) {
        y_out.copy_from(v);
        *y_out *= -self.decay;
    }

    fn jacobian_matrix(&self, _y: &M::V, _t: M::T) -> M {
        let diag = M::V::from_element(self.n, -self.decay);
        M::from_diagonal(&diag)
    }

    fn init(&self) -> M::V {
        M::V::from_element(self.n, M::T::one())
    }
}

/// A fast direction with zero derivative: the MRI forcing polynomial and
/// stage-coupling machinery still run in full, but the inner integration
/// contributes nothing beyond the forcing itself, keeping the expected
/// solution easy to reason about in tests.
pub struct ZeroFastRhs<V> {
    n: usize,
    _v: std::marker::PhantomData<V>,
}

impl<V: Vector> ZeroFastRhs<V> {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            _v: std::marker::PhantomData,
        }
    }
}

impl<V: Vector> FastRhs for ZeroFastRhs<V> {
    type T = V::T;
    type V = V;

    fn call(&self, _t: V::T, _y: &V, f_out: &mut V) {
        f_out.const_fill(V::T::zero());
        debug_assert_eq!(f_out.len(), self.n);
    }
}

/// Build a ready-to-run `OdeSolverProblem` for `y' = -0.1 y`, `y(0) = 1`,
/// together with the fast-direction right-hand side to pair it with.
pub fn exponential_decay_problem<M: Matrix<T = f64>>() -> (OdeSolverProblem<ExponentialDecay<M>>, ZeroFastRhs<M::V>)
{
    let eqn = Rc::new(ExponentialDecay::new(0.1, 2));
    let problem = OdeSolverProblem::new(eqn.clone(), 1e-6, M::V::from_element(2, 1e-6), 0.0, 0.1);
    (problem, ZeroFastRhs::new(2))
}
