use num_traits::{FromPrimitive, One, Zero};

use crate::error::MriResult;
use crate::scalar::Scalar;
use crate::vector::Vector;

use super::inner_stepper::InnerStepper;

/// Fast right-hand side `f_f(t, y)` evaluated by a concrete inner stepper.
/// A thin analogue of the `ODEIVP` trait the `rkf45` reference solver was
/// built around, scoped down to the one callback an inner stepper needs.
pub trait FastRhs {
    type T: Scalar;
    type V: Vector<T = Self::T>;

    fn call(&self, t: Self::T, y: &Self::V, f_out: &mut Self::V);
}

/// A concrete fixed-step classical Runge-Kutta (RK4) inner stepper, taking
/// `substeps` equal steps per `evolve` call. This is one possible
/// implementation of the pluggable `InnerStepper` collaborator, left
/// external so a host can supply its own; it exists so the crate has a
/// runnable end-to-end default rather than requiring every caller to
/// supply their own.
pub struct RkInner<F: FastRhs> {
    rhs: F,
    substeps: usize,
    tshift: F::T,
    tscale: F::T,
    forcing: Vec<F::V>,
}

impl<F: FastRhs> RkInner<F> {
    pub fn new(rhs: F, substeps: usize) -> Self {
        Self {
            rhs,
            substeps,
            tshift: F::T::zero(),
            tscale: F::T::one(),
            forcing: Vec::new(),
        }
    }

    /// `f_f(t,y) + sum_k forcing[k] * tau^k`, `tau = (t - tshift) / tscale`.
    fn forced_rhs(&self, t: F::T, y: &F::V, f_out: &mut F::V) {
        self.rhs.call(t, y, f_out);
        if self.forcing.is_empty() {
            return;
        }
        let tau = (t - self.tshift) / self.tscale;
        let mut tau_pow = F::T::one();
        for coeffs in &self.forcing {
            f_out.axpy(tau_pow, coeffs);
            tau_pow = tau_pow * tau;
        }
    }
}

impl<F: FastRhs> InnerStepper for RkInner<F> {
    type T = F::T;
    type V = F::V;

    fn evolve(&mut self, t0: F::T, tout: F::T, y: &mut F::V) -> MriResult<()> {
        let n = self.substeps.max(1);
        let h = (tout - t0) / F::T::from_usize(n).unwrap();
        let mut t = t0;
        let mut k1 = y.clone();
        let mut k2 = y.clone();
        let mut k3 = y.clone();
        let mut k4 = y.clone();
        let mut tmp = y.clone();
        let two = F::T::from_f64(2.0).unwrap();
        let six = F::T::from_f64(6.0).unwrap();
        for _ in 0..n {
            self.forced_rhs(t, y, &mut k1);

            tmp.copy_from(y);
            tmp.axpy(h / two, &k1);
            self.forced_rhs(t + h / two, &tmp, &mut k2);

            tmp.copy_from(y);
            tmp.axpy(h / two, &k2);
            self.forced_rhs(t + h / two, &tmp, &mut k3);

            tmp.copy_from(y);
            tmp.axpy(h, &k3);
            self.forced_rhs(t + h, &tmp, &mut k4);

            // y += h/6 * (k1 + 2k2 + 2k3 + k4)
            y.axpy(h / six, &k1);
            y.axpy(h * two / six, &k2);
            y.axpy(h * two / six, &k3);
            y.axpy(h / six, &k4);

            t = t + h;
        }
        Ok(())
    }

    fn full_rhs(&mut self, t: F::T, y: &F::V, f_out: &mut F::V) -> MriResult<()> {
        self.rhs.call(t, y, f_out);
        Ok(())
    }

    fn reset(&mut self, _t: F::T, _y: &F::V) -> MriResult<()> {
        Ok(())
    }

    fn add_forcing(&mut self, tshift: F::T, tscale: F::T, forcing_coeffs: &[F::V]) {
        self.tshift = tshift;
        self.tscale = tscale;
        self.forcing = forcing_coeffs.to_vec();
    }

    fn clear_forcing(&mut self) {
        self.forcing.clear();
    }
}
