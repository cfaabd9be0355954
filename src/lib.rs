//! A multirate infinitesimal (MRI) time-stepper core for `y' = f_s(t,y) +
//! f_f(t,y)`: the outer slow-stage driver, coupling-table validation,
//! forcing-polynomial assembly, and the pluggable fast-inner-stepper
//! boundary. Adaptive outer step-size control and solve-coupled
//! implicit-plus-fast stages are out of scope; see `DESIGN.md`.

pub mod error;
pub mod linear_solver;
pub mod matrix;
pub mod nonlinear_solver;
pub mod ode_solver;
pub mod op;
pub mod scalar;
pub mod vector;

pub use error::{MriError, MriResult, StepOutcome};
pub use matrix::Matrix;
pub use ode_solver::coupling::{CouplingTable, StageType};
pub use ode_solver::equations::OdeEquations;
pub use ode_solver::inner_stepper::InnerStepper;
pub use ode_solver::mri::{FullRhsMode, MriDriver, Predictor};
pub use ode_solver::problem::OdeSolverProblem;
pub use ode_solver::state::OdeSolverState;
pub use ode_solver::stats::Statistics;
pub use ode_solver::tolerances::ErrorWeights;
pub use scalar::{scale, Scalar, Scale};
pub use vector::Vector;
