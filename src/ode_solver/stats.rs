use serde::Serialize;

/// Driver-side counters exposed via `get_statistics()`
/// (`number_of_linear_solver_setups`, `number_of_steps`, ...). The
/// slow-equation-side counters (`number_of_rhs_evals`, ...) live on
/// [`crate::ode_solver::equations::EquationStatistics`] instead.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub number_of_steps: usize,
    pub number_of_linear_solver_setups: usize,
    pub number_of_error_test_failures: usize,
    pub number_of_nonlinear_solver_iterations: usize,
    pub number_of_nonlinear_solver_fails: usize,
    pub initial_step_size: f64,
    pub final_step_size: f64,
    /// Number of slow right-hand-side evaluations taken by the driver
    /// itself between stages, separate from
    /// `EquationStatistics::number_of_rhs_evals` which also counts any
    /// evaluations taken inside the nonlinear solver's Jacobian refresh.
    pub nfs: usize,
}
