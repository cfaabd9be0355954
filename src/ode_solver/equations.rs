use serde::Serialize;

use crate::matrix::Matrix;
use crate::scalar::Scalar;
use crate::vector::Vector;

/// Slow right-hand side `f_s(t, y)` of `y' = f_s(t,y) + f_f(t,y)`. The fast
/// right-hand side `f_f` is owned entirely by the inner stepper
/// (`crate::ode_solver::inner_stepper::InnerStepper`) and never appears
/// here, matching this crate's scope: only the outer MRI driver is
/// implemented, the inner integrator is a pluggable collaborator.
pub trait OdeEquations {
    type T: Scalar;
    type V: Vector<T = Self::T>;
    type M: Matrix<T = Self::T, V = Self::V>;

    fn nstates(&self) -> usize;
    fn nparams(&self) -> usize {
        0
    }

    /// `y_out <- f_s(t, y)`.
    fn rhs_inplace(&self, t: Self::T, y: &Self::V, y_out: &mut Self::V);

    /// `y_out <- f_s'(t, y) v`.
    fn jac_mul_inplace(&self, t: Self::T, y: &Self::V, v: &Self::V, y_out: &mut Self::V);

    /// Dense Jacobian of `f_s` at `(t, y)`, used by the default Newton
    /// solver for DIRK stages.
    fn jacobian_matrix(&self, y: &Self::V, t: Self::T) -> Self::M;

    /// `y_out <- M(t) v`; defaults to the identity mass matrix.
    fn mass_inplace(&self, _t: Self::T, v: &Self::V, y_out: &mut Self::V) {
        y_out.copy_from(v);
    }

    /// The initial state `y(t0)`.
    fn init(&self) -> Self::V;

    fn get_statistics(&self) -> EquationStatistics {
        EquationStatistics::default()
    }
}

/// Slow-equation-side counters, separate from the driver-side counters
/// (`nfs`, `nsetups`, ...) kept on `MriDriver`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EquationStatistics {
    pub number_of_rhs_evals: usize,
    pub number_of_jac_mul_evals: usize,
    pub number_of_jacobian_matrix_evals: usize,
    pub number_of_mass_evals: usize,
}
