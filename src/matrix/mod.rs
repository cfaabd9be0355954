use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Sub, SubAssign};

use num_traits::{One, Zero};

use crate::scalar::Scalar;
use crate::vector::Vector;

/// Shared shape/indexing surface for a dense matrix.
pub trait MatrixCommon: Sized + Debug + Display {
    type V: Vector<T = Self::T>;
    type T: Scalar;

    fn diagonal(&self) -> Self::V;
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
}

pub trait MatrixOpsByValue<Rhs = Self, Output = Self>:
    MatrixCommon + Add<Rhs, Output = Output> + Sub<Rhs, Output = Output>
{
}

impl<M, Rhs, Output> MatrixOpsByValue<Rhs, Output> for M where
    M: MatrixCommon + Add<Rhs, Output = Output> + Sub<Rhs, Output = Output>
{
}

pub trait MatrixMutOpsByValue<Rhs = Self>: MatrixCommon + AddAssign<Rhs> + SubAssign<Rhs> {}

impl<M, Rhs> MatrixMutOpsByValue<Rhs> for M where M: MatrixCommon + AddAssign<Rhs> + SubAssign<Rhs> {}

pub trait MatrixOps:
    MatrixOpsByValue<Self> + Mul<Self::T, Output = Self> + Div<Self::T, Output = Self>
{
}

impl<M> MatrixOps for M where
    M: MatrixOpsByValue<Self> + Mul<Self::T, Output = Self> + Div<Self::T, Output = Self>
{
}

pub trait MatrixMutOps:
    MatrixMutOpsByValue<Self> + MulAssign<Self::T> + DivAssign<Self::T>
{
}

impl<M> MatrixMutOps for M where M: MatrixMutOpsByValue<Self> + MulAssign<Self::T> + DivAssign<Self::T>
{}

/// The Jacobian/mass-matrix abstraction consumed by the DIRK-stage residual
/// (`op::mri_residual`) and the default `LU` linear solver. Carries only the
/// dense `nalgebra` backend and has no call for sub-matrix column-range
/// views — `columns`/`columns_mut` are dropped, `column`/`column_mut` kept
/// since stage residual assembly does slice single columns out of `G`.
pub trait Matrix:
    MatrixOps
    + MatrixMutOps
    + Index<(usize, usize), Output = Self::T>
    + IndexMut<(usize, usize), Output = Self::T>
    + Clone
{
    /// Create a new matrix of shape `nrows` x `ncols` filled with zeros.
    fn zeros(nrows: usize, ncols: usize) -> Self;

    /// Create a new diagonal matrix from a vector holding the diagonal.
    fn from_diagonal(v: &Self::V) -> Self;

    /// Build from (row, col, value) triplets. Returns `None` on an
    /// out-of-range index.
    fn try_from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: Vec<(usize, usize, Self::T)>,
    ) -> Option<Self> {
        let mut out = Self::zeros(nrows, ncols);
        for (i, j, v) in triplets {
            if i >= nrows || j >= ncols {
                return None;
            }
            out[(i, j)] = v;
        }
        Some(out)
    }

    /// Get a vector view of column `i`.
    fn column(&self, i: usize) -> <Self::V as Vector>::View<'_>;

    /// Get a mutable vector view of column `i`.
    fn column_mut(&mut self, i: usize) -> <Self::V as Vector>::ViewMut<'_>;

    /// `self <- alpha*a*b + beta*self`.
    fn gemm(&mut self, alpha: Self::T, a: &Self, b: &Self, beta: Self::T);

    /// `y <- alpha*self*x + beta*y`.
    fn gemv(&self, alpha: Self::T, x: &Self::V, beta: Self::T, y: &mut Self::V);

    /// `a * b`, built atop [`Matrix::gemm`].
    fn mat_mul(&self, x: &Self) -> Self {
        let mut y = Self::zeros(self.nrows(), x.ncols());
        y.gemm(Self::T::one(), self, x, Self::T::zero());
        y
    }
}

mod dense_nalgebra {
    use super::*;
    use nalgebra::{DMatrix, DVector};

    impl MatrixCommon for DMatrix<f64> {
        type T = f64;
        type V = DVector<f64>;

        fn diagonal(&self) -> DVector<f64> {
            nalgebra::Matrix::diagonal(self)
        }

        fn nrows(&self) -> usize {
            nalgebra::Matrix::nrows(self)
        }

        fn ncols(&self) -> usize {
            nalgebra::Matrix::ncols(self)
        }
    }

    impl Matrix for DMatrix<f64> {
        fn zeros(nrows: usize, ncols: usize) -> Self {
            DMatrix::from_element(nrows, ncols, 0.0)
        }

        fn from_diagonal(v: &DVector<f64>) -> Self {
            DMatrix::from_diagonal(v)
        }

        fn column(&self, i: usize) -> crate::vector::dense_nalgebra::DVectorView<'_> {
            crate::vector::dense_nalgebra::DVectorView::from_slice(
                nalgebra::Matrix::column(self, i)
                    .as_slice(),
            )
        }

        fn column_mut(&mut self, i: usize) -> crate::vector::dense_nalgebra::DVectorViewMut<'_> {
            crate::vector::dense_nalgebra::DVectorViewMut::from_slice(
                nalgebra::Matrix::column_mut(self, i).as_mut_slice(),
            )
        }

        fn gemm(&mut self, alpha: f64, a: &Self, b: &Self, beta: f64) {
            nalgebra::Matrix::gemm(self, alpha, a, b, beta);
        }

        fn gemv(&self, alpha: f64, x: &DVector<f64>, beta: f64, y: &mut DVector<f64>) {
            y.gemv(alpha, self, x, beta);
        }
    }
}
