use std::fmt::Debug;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Sub, SubAssign};

use crate::scalar::{Scalar, Scale};

/// Required vector operations a host must supply for its `N_Vector`-analogue.
/// The core checks for these at [`crate::ode_solver::mri::MriDriver::create`]
/// time, mirroring `mriStep_CheckNVector`'s check of `clone`, `destroy`,
/// `linear_sum`, `linear_combination`, `const`, `scale`, `wrms_norm`, and
/// `get_array_pointer`/`space`.
pub trait VectorOps: Sized {
    type T: Scalar;

    fn clone_vec(&self) -> Self;
    fn const_fill(&mut self, c: Self::T);
    fn space(&self) -> (usize, usize);
}

/// A view of a [`Vector`], produced by accessors on [`crate::matrix::Matrix`].
pub trait VectorView<'a>: Index<usize, Output = <Self::Owned as VectorOps>::T> + Clone {
    type Owned: Vector;
}

/// A mutable vector view.
pub trait VectorViewMut<'a>: IndexMut<usize, Output = <Self::Owned as VectorOps>::T> {
    type Owned: Vector;
}

/// The dense vector abstraction consumed throughout the MRI driver: per-stage
/// scratch (`F`), implicit-stage scratch (`sdata`/`zpred`/`zcor`), and the
/// state `y`. The `VectorOps` collaborator a host vector/linear-algebra
/// backend supplies.
pub trait Vector:
    VectorOps
    + Clone
    + Debug
    + Index<usize, Output = <Self as VectorOps>::T>
    + IndexMut<usize, Output = <Self as VectorOps>::T>
    + for<'a> Add<&'a Self, Output = Self>
    + for<'a> Sub<&'a Self, Output = Self>
    + AddAssign<Self>
    + for<'a> AddAssign<&'a Self>
    + SubAssign<Self>
    + for<'a> SubAssign<&'a Self>
    + Mul<<Self as VectorOps>::T, Output = Self>
    + Mul<Scale<<Self as VectorOps>::T>, Output = Self>
    + Div<<Self as VectorOps>::T, Output = Self>
    + MulAssign<<Self as VectorOps>::T>
    + DivAssign<<Self as VectorOps>::T>
{
    type View<'a>: VectorView<'a, Owned = Self>
    where
        Self: 'a;
    type ViewMut<'a>: VectorViewMut<'a, Owned = Self>
    where
        Self: 'a;

    /// Create a vector of `n` zeros.
    fn zeros(n: usize) -> Self;
    /// Create a vector of `n` copies of `value`.
    fn from_element(n: usize, value: <Self as VectorOps>::T) -> Self;
    /// Create a vector from a literal list of values.
    fn from_vec(v: Vec<<Self as VectorOps>::T>) -> Self;
    /// Number of entries.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// `self <- other` without reallocating.
    fn copy_from(&mut self, other: &Self);
    /// `self <- a*x + self`.
    fn axpy(&mut self, a: <Self as VectorOps>::T, x: &Self);
    /// Element-wise absolute value.
    fn abs(&self) -> Self;
    /// `self[i] <- self[i] / other[i]`.
    fn component_div_assign(&mut self, other: &Self);
    /// `self[i] <- self[i] * other[i]`.
    fn component_mul_assign(&mut self, other: &Self);
    /// `self[i] <- self[i] + c`.
    fn add_scalar_mut(&mut self, c: <Self as VectorOps>::T);
    /// Weighted RMS norm, `sqrt(1/n * sum((self[i] * w[i])^2))`, mirroring
    /// `N_VWrmsNorm`.
    fn wrms_norm(&self, w: &Self) -> <Self as VectorOps>::T;
    /// Ordinary Euclidean norm, used by the default local-error surrogate.
    fn norm(&self) -> <Self as VectorOps>::T;
    /// Raw slice access, standing in for `N_VGetArrayPointer`.
    fn as_slice(&self) -> &[<Self as VectorOps>::T];
    fn as_mut_slice(&mut self) -> &mut [<Self as VectorOps>::T];

    /// `self <- sum_i(c[i] * x[i])`, the fused linear-combination kernel
    /// (`N_VLinearCombination`) used for the ERK update, the forcing
    /// polynomial, the predictor, and the implicit-stage `sdata` assembly.
    fn linear_combination(coeffs: &[<Self as VectorOps>::T], vecs: &[&Self]) -> Self {
        assert_eq!(coeffs.len(), vecs.len());
        let mut out = vecs[0].clone() * coeffs[0];
        for (c, v) in coeffs.iter().zip(vecs.iter()).skip(1) {
            out.axpy(*c, v);
        }
        out
    }

    /// Assert approximate equality within absolute tolerance `tol`
    /// (`y.assert_eq(&expect, tol)`).
    fn assert_eq(&self, other: &Self, tol: <Self as VectorOps>::T) {
        assert_eq!(self.len(), other.len());
        for i in 0..self.len() {
            let diff = (self[i] - other[i]).abs();
            assert!(
                diff <= tol,
                "vectors differ at index {i}: {} vs {} (tol {tol:?})",
                self[i],
                other[i]
            );
        }
    }

    fn assert_eq_st(&self, other: &Self, tol: <Self as VectorOps>::T) {
        self.assert_eq(other, tol)
    }
}

/// Dense `nalgebra`-backed implementation of [`Vector`], the only concrete
/// backend shipped (see `DESIGN.md` for why a `faer` backend is not
/// carried alongside it).
pub(crate) mod dense_nalgebra {
    use super::*;
    use nalgebra::DVector;

    impl VectorOps for DVector<f64> {
        type T = f64;

        fn clone_vec(&self) -> Self {
            self.clone()
        }

        fn const_fill(&mut self, c: f64) {
            self.fill(c);
        }

        fn space(&self) -> (usize, usize) {
            (self.len(), 1)
        }
    }

    #[derive(Clone)]
    pub struct DVectorView<'a> {
        data: &'a [f64],
    }

    impl<'a> DVectorView<'a> {
        pub fn from_slice(data: &'a [f64]) -> Self {
            DVectorView { data }
        }
    }

    impl<'a> Index<usize> for DVectorView<'a> {
        type Output = f64;
        fn index(&self, i: usize) -> &f64 {
            &self.data[i]
        }
    }

    impl<'a> VectorView<'a> for DVectorView<'a> {
        type Owned = DVector<f64>;
    }

    pub struct DVectorViewMut<'a> {
        data: &'a mut [f64],
    }

    impl<'a> DVectorViewMut<'a> {
        pub fn from_slice(data: &'a mut [f64]) -> Self {
            DVectorViewMut { data }
        }
    }

    impl<'a> Index<usize> for DVectorViewMut<'a> {
        type Output = f64;
        fn index(&self, i: usize) -> &f64 {
            &self.data[i]
        }
    }

    impl<'a> IndexMut<usize> for DVectorViewMut<'a> {
        fn index_mut(&mut self, i: usize) -> &mut f64 {
            &mut self.data[i]
        }
    }

    impl<'a> VectorViewMut<'a> for DVectorViewMut<'a> {
        type Owned = DVector<f64>;
    }

    /// Bridges our own [`Scale`] wrapper onto `nalgebra`'s native scalar
    /// multiplication, so `v * scale(t)` reads the same as
    /// `point.state.abs() * scale(problem.rtol)`.
    impl Mul<Scale<f64>> for DVector<f64> {
        type Output = DVector<f64>;
        fn mul(self, rhs: Scale<f64>) -> DVector<f64> {
            self * rhs.0
        }
    }

    impl Vector for DVector<f64> {
        type View<'a> = DVectorView<'a>;
        type ViewMut<'a> = DVectorViewMut<'a>;

        fn zeros(n: usize) -> Self {
            DVector::from_element(n, 0.0)
        }

        fn from_element(n: usize, value: f64) -> Self {
            DVector::from_element(n, value)
        }

        fn from_vec(v: Vec<f64>) -> Self {
            DVector::from_vec(v)
        }

        fn len(&self) -> usize {
            self.nrows()
        }

        fn copy_from(&mut self, other: &Self) {
            nalgebra::Matrix::copy_from(self, other);
        }

        fn axpy(&mut self, a: f64, x: &Self) {
            nalgebra::Matrix::axpy(self, a, x, 1.0);
        }

        fn abs(&self) -> Self {
            self.map(|x| x.abs())
        }

        fn component_div_assign(&mut self, other: &Self) {
            for i in 0..self.len() {
                self[i] /= other[i];
            }
        }

        fn component_mul_assign(&mut self, other: &Self) {
            for i in 0..self.len() {
                self[i] *= other[i];
            }
        }

        fn add_scalar_mut(&mut self, c: f64) {
            for i in 0..self.len() {
                self[i] += c;
            }
        }

        fn wrms_norm(&self, w: &Self) -> f64 {
            let n = self.len() as f64;
            let mut acc = 0.0;
            for i in 0..self.len() {
                let wi = self[i] * w[i];
                acc += wi * wi;
            }
            (acc / n).sqrt()
        }

        fn norm(&self) -> f64 {
            nalgebra::Matrix::norm(self)
        }

        fn as_slice(&self) -> &[f64] {
            nalgebra::Matrix::as_slice(self)
        }

        fn as_mut_slice(&mut self) -> &mut [f64] {
            nalgebra::Matrix::as_mut_slice(self)
        }
    }
}
