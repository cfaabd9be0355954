use crate::error::MriResult;
use crate::scalar::Scalar;
use crate::vector::Vector;

/// The pluggable fast inner integrator (`MRIStepInnerStepper`). `MriDriver`
/// owns one instance per driver and holds a non-owning back-reference into
/// it for forcing updates, rather than an opaque handle plus `void*`
/// back-pointer.
pub trait InnerStepper {
    type T: Scalar;
    type V: Vector<T = Self::T>;

    /// Advance `y` from `t0` to `tout` under `f_f(t,y) + forcing(t)`, the
    /// forcing polynomial most recently installed by
    /// [`InnerStepper::add_forcing`].
    fn evolve(&mut self, t0: Self::T, tout: Self::T, y: &mut Self::V) -> MriResult<()>;

    /// `f_out <- f_f(t, y)`, with no forcing applied; used by
    /// `MriDriver::full_rhs`.
    fn full_rhs(&mut self, t: Self::T, y: &Self::V, f_out: &mut Self::V) -> MriResult<()>;

    /// Notify the inner stepper that `(t, y)` is an accepted state after a
    /// discontinuity (a new outer stage), so it may discard cached
    /// internal state. Optional: the default no-op matches
    /// `MRIStepInnerStepper_SetResetFn`'s nullable reset callback.
    fn reset(&mut self, _t: Self::T, _y: &Self::V) -> MriResult<()> {
        Ok(())
    }

    /// Install the forcing polynomial for the next [`InnerStepper::evolve`]
    /// call: `forcing(t) = sum_k forcing_coeffs[k] * ((t - tshift) /
    /// tscale)^k`, mirroring `MRIStepInnerStepper_AddForcing`.
    fn add_forcing(&mut self, tshift: Self::T, tscale: Self::T, forcing_coeffs: &[Self::V]);

    /// Clear any installed forcing polynomial, called before the first
    /// `ExplicitNoFast`/`ImplicitNoFast` stage of a step which has none.
    fn clear_forcing(&mut self);
}
