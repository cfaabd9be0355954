use std::rc::Rc;

use crate::ode_solver::equations::OdeEquations;

/// Owns the slow-equations object together with the tolerances and fixed
/// outer step size the MRI driver is built from.
#[derive(Clone)]
pub struct OdeSolverProblem<Eqn: OdeEquations> {
    pub eqn: Rc<Eqn>,
    pub rtol: Eqn::T,
    pub atol: Rc<Eqn::V>,
    pub t0: Eqn::T,
    pub h0: Eqn::T,
}

impl<Eqn: OdeEquations> OdeSolverProblem<Eqn> {
    pub fn new(eqn: Rc<Eqn>, rtol: Eqn::T, atol: Eqn::V, t0: Eqn::T, h0: Eqn::T) -> Self {
        Self {
            eqn,
            rtol,
            atol: Rc::new(atol),
            t0,
            h0,
        }
    }
}
