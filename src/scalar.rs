use std::fmt::{Debug, Display, LowerExp};

use num_traits::{Float, FromPrimitive, NumCast, Signed};

/// Floating-point scalar type used throughout the crate in place of SUNDIALS'
/// `realtype`. `f64` is the only implementation shipped, but solvers are
/// generic over it so that a `f32` or extended-precision type could be
/// dropped in without touching the stepper logic.
pub trait Scalar:
    Float
    + FromPrimitive
    + NumCast
    + Signed
    + Copy
    + Debug
    + Display
    + LowerExp
    + Default
    + Send
    + Sync
    + 'static
{
    /// `100 * machine epsilon`, the tolerance used throughout coupling-table
    /// validation.
    fn coupling_tol() -> Self {
        Self::from(100.0).unwrap() * Self::epsilon()
    }
}

impl Scalar for f64 {}

/// Wraps a scalar so it can be used as the right-hand side of `Vector * scale(..)`,
/// e.g. `point.state.abs() * scale(problem.rtol)`.
#[derive(Clone, Copy, Debug)]
pub struct Scale<T: Scalar>(pub T);

pub fn scale<T: Scalar>(t: T) -> Scale<T> {
    Scale(t)
}
