use num_traits::{NumCast, One};

use crate::scalar::Scalar;
use crate::vector::Vector;

/// The three ways to build the error-weight vector `ewt`, mirroring
/// `MRIStepSStolerances`/`MRIStepSVtolerances`/`MRIStepWFtolerances`. Only
/// `ewt` itself is built here; the adaptive step-size controller that
/// would consume it for local-error estimation is a host-framework
/// responsibility and is not implemented by this crate.
pub enum ErrorWeights<T: Scalar, V: Vector<T = T>> {
    /// Scalar relative tolerance, scalar absolute tolerance.
    Scalar { rtol: T, atol: T },
    /// Scalar relative tolerance, per-component absolute tolerance.
    Vector { rtol: T, atol: V },
    /// A user-supplied weight function, `efun(y, ewt)`.
    UserFn(Box<dyn Fn(&V, &mut V)>),
}

impl<T: Scalar, V: Vector<T = T>> ErrorWeights<T, V> {
    /// `ewt[i] <- 1 / (rtol * |y[i]| + atol[i])`, the default weighting used
    /// by both `MRIStepSStolerances` and `MRIStepSVtolerances`; a
    /// `UserFn` is invoked directly instead.
    pub fn compute(&self, y: &V, ewt: &mut V) {
        match self {
            ErrorWeights::Scalar { rtol, atol } => {
                ewt.copy_from(&y.abs());
                *ewt *= *rtol;
                ewt.add_scalar_mut(*atol);
                for i in 0..ewt.len() {
                    ewt[i] = T::one() / ewt[i];
                }
            }
            ErrorWeights::Vector { rtol, atol } => {
                ewt.copy_from(&y.abs());
                *ewt *= *rtol;
                *ewt += atol;
                for i in 0..ewt.len() {
                    ewt[i] = T::one() / ewt[i];
                }
            }
            ErrorWeights::UserFn(efun) => efun(y, ewt),
        }
    }
}

impl<T: Scalar, V: Vector<T = T>> Default for ErrorWeights<T, V> {
    /// Matches `mriStep_Init`'s fallback when the user installs neither
    /// `SStolerances`/`SVtolerances` nor `WFtolerances`: a minimum-abs
    /// weighting of `rtol = 1e-4`, `atol = 1e-9`.
    fn default() -> Self {
        ErrorWeights::Scalar {
            rtol: T::from(1.0e-4).unwrap(),
            atol: T::from(1.0e-9).unwrap(),
        }
    }
}
