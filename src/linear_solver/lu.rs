use nalgebra::{DMatrix, DVector, LU as NalgebraLU};

use crate::error::{MriError, MriResult};

use super::LinearSolver;

/// Dense `LU`-factorization-backed linear solver, the default consumed by
/// [`crate::nonlinear_solver::newton::NewtonNonlinearSolver`] for each
/// implicit-stage Jacobian solve, wrapping `nalgebra::LU` directly.
pub struct LU<T> {
    lu: Option<NalgebraLU<T, nalgebra::Dyn, nalgebra::Dyn>>,
}

impl Default for LU<f64> {
    fn default() -> Self {
        LU { lu: None }
    }
}

impl LinearSolver<DMatrix<f64>> for LU<f64> {
    fn set_problem(&mut self, matrix: &DMatrix<f64>) {
        self.lu = Some(NalgebraLU::new(matrix.clone()));
    }

    fn is_problem_set(&self) -> bool {
        self.lu.is_some()
    }

    fn clear_problem(&mut self) {
        self.lu = None;
    }

    fn solve_in_place(&mut self, b: &mut DVector<f64>) -> MriResult<()> {
        let lu = self.lu.as_ref().ok_or(MriError::LinitFail)?;
        if !lu.solve_mut(b) {
            return Err(MriError::LinitFail);
        }
        Ok(())
    }
}
