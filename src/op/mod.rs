pub mod mri_residual;

use crate::matrix::Matrix;
use crate::scalar::Scalar;
use crate::vector::Vector;

/// Shared shape metadata for a callable operator, mirrored after the
/// teacher's `Op` trait.
pub trait Op {
    type T: Scalar;
    type V: Vector<T = Self::T>;
    type M: Matrix<T = Self::T, V = Self::V>;

    fn nstates(&self) -> usize;
    fn nout(&self) -> usize;
    fn nparams(&self) -> usize {
        0
    }
}

/// `F(x) = 0` residual operator, the shape consumed by the default Newton
/// solver for implicit (DIRK) stages.
pub trait NonLinearOp: Op {
    /// `y <- F(x)`.
    fn call_inplace(&self, x: &Self::V, t: Self::T, y: &mut Self::V);
    /// `y <- F'(x) v`.
    fn jac_mul_inplace(&self, x: &Self::V, t: Self::T, v: &Self::V, y: &mut Self::V);
}

/// An operator whose Jacobian can be materialized densely, consumed by the
/// default `LU`-backed linear solve inside Newton's inner loop.
pub trait Jacobian: NonLinearOp {
    fn jacobian(&self, x: &Self::V, t: Self::T) -> Self::M;
}

/// A linear (matrix-free or materialized) operator, used for the mass
/// matrix and the slow Jacobian individually, ahead of being combined into
/// the DIRK-stage residual's Jacobian.
pub trait LinearOp: Op {
    fn call_inplace(&self, x: &Self::V, t: Self::T, y: &mut Self::V);
    fn jacobian(&self, t: Self::T) -> Self::M;
}

/// A constant (state-independent) operator, used for the identity mass
/// matrix shortcut when `OdeEquations::mass_inplace` is unimplemented.
pub trait ConstantOp: Op {
    fn call_inplace(&self, t: Self::T, y: &mut Self::V);
}
