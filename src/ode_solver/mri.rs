use std::rc::Rc;

use num_traits::{One, Zero};

use crate::error::{MriError, MriResult, StepOutcome};
use crate::op::mri_residual::MriResidual;
use crate::vector::Vector;

use super::coupling::{CouplingTable, StageType};
use super::equations::OdeEquations;
use super::inner_stepper::InnerStepper;
use super::problem::OdeSolverProblem;
use super::state::OdeSolverState;
use super::stats::Statistics;
use super::tolerances::ErrorWeights;

/// Which of `mriStep_Predict`'s five predictor methods to use for
/// `DIRK_NOFAST` stages. `MaximumOrder`/`VariableOrder`/`CutoffOrder` need
/// dense-output interpolation over prior steps, which this crate places
/// out of scope as a host framework's interpolation-module responsibility,
/// and so fall back to `Trivial` unless an [`Interpolant`] is supplied,
/// mirroring a fallback to `ARK_ILL_INPUT` when no interpolation module is
/// installed. `Bootstrap` needs only the current step's own stage history
/// and so is implemented directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    Trivial,
    MaximumOrder,
    VariableOrder,
    CutoffOrder,
    Bootstrap,
}

/// External dense-output collaborator for predictors 1-3; out of scope to
/// implement here, supplied as a trait so a host wired to a real
/// interpolation module can plug one in.
pub trait Interpolant<V: Vector> {
    fn predict(&self, t: V::T, order: usize) -> Option<V>;
}

type ErrorHandler = Box<dyn Fn(&MriError)>;

/// `pre_inner_evolve(t, forcing[], nforcing, user_data)`: observe (and
/// optionally veto) the forcing vectors just before an `ExplicitFast`
/// stage hands them to the inner stepper. Standard triple return: `0`
/// success, `>0` recoverable, `<0` unrecoverable.
type PreInnerEvolveFn<T, V> = Box<dyn FnMut(T, &[V]) -> i32>;

/// `post_inner_evolve(t, y, user_data)`: observe the state right after an
/// `ExplicitFast` stage's inner `evolve` call returns.
type PostInnerEvolveFn<T, V> = Box<dyn FnMut(T, &V) -> i32>;

/// `stage_predict(t, zpred, user_data)`: refine the predictor's guess for
/// a `DIRK_NOFAST` stage in place before it is handed to the nonlinear
/// solver.
type StagePredictFn<T, V> = Box<dyn FnMut(T, &mut V) -> i32>;

/// `ProcessStage(t, y, user_data)`: observe the accepted stage value after
/// every stage dispatch, regardless of stage type. Any non-zero return is
/// `POSTPROCESS_STAGE_FAIL`.
type ProcessStageFn<T, V> = Box<dyn FnMut(T, &V) -> i32>;

/// Which scratch vector receives the slow-RHS half of a `full_rhs`
/// evaluation, mirroring `mriStep_FullRHS`'s `mode` argument so that an
/// intermediate "dense output" call cannot clobber `F[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullRhsMode {
    /// Start of an `evolve` call: safe to (re)populate `F[0]`.
    Start,
    /// End of an `evolve` call: likewise safe to (re)populate `F[0]`.
    End,
    /// An intermediate call (e.g. dense output between accepted steps):
    /// must not touch `F[0]`.
    Other,
}

/// The owning MRI outer driver: coupling table, fixed outer step, current
/// state, per-stage scratch, the inner stepper, and the pluggable
/// nonlinear solver for implicit stages. Generic over the nonlinear solver
/// and the inner stepper so either can be swapped without touching the
/// stage machinery.
pub struct MriDriver<Eqn, NLS, Inner>
where
    Eqn: OdeEquations,
    Inner: InnerStepper<T = Eqn::T, V = Eqn::V>,
{
    problem: OdeSolverProblem<Eqn>,
    coupling: CouplingTable<Eqn::T>,
    inner: Inner,
    nls: Option<NLS>,
    predictor: Predictor,
    interpolant: Option<Box<dyn Interpolant<Eqn::V>>>,
    state: OdeSolverState<Eqn::V>,
    f: Vec<Eqn::V>,
    implicit: bool,
    call_fullrhs: bool,
    error_handler: ErrorHandler,
    /// `MRIStepSetPreInnerFn`: invoked just before each `ExplicitFast`
    /// stage's forcing is handed to the inner stepper.
    pre_inner_evolve: Option<PreInnerEvolveFn<Eqn::T, Eqn::V>>,
    /// `MRIStepSetPostInnerFn`: invoked right after each `ExplicitFast`
    /// stage's inner `evolve` call returns.
    post_inner_evolve: Option<PostInnerEvolveFn<Eqn::T, Eqn::V>>,
    /// `MRIStepSetStagePredictFn`: refines a `DIRK_NOFAST` stage's
    /// predictor in place ahead of the nonlinear solve.
    stage_predict: Option<StagePredictFn<Eqn::T, Eqn::V>>,
    /// `MRIStepSetPostprocessStageFn`: observes the accepted value of
    /// every stage, of any type.
    process_stage: Option<ProcessStageFn<Eqn::T, Eqn::V>>,
    stats: Statistics,
    nrtfn: usize,
    max_retries: usize,
    error_weights: ErrorWeights<Eqn::T, Eqn::V>,
    /// The predicted stage value most recently consumed by a Newton solve,
    /// retained only so [`MriDriver::compute_state`] can reproduce
    /// `MRIStepComputeState`'s `z = zpred + zcor` outside the stage loop.
    last_zpred: Option<Eqn::V>,
    /// `h * A[i][i]` for the stage currently (or most recently) solved.
    gamma: Eqn::T,
    /// `gamma` as of the last linear-solver setup (Jacobian evaluation).
    gammap: Eqn::T,
    /// `gamma / gammap`, the staleness ratio deciding whether the cached
    /// raw slow-equation Jacobian may be reused without calling
    /// `OdeEquations::jacobian_matrix` again.
    gamrat: Eqn::T,
    /// Reuse the cached Jacobian as long as `gamrat` stays within `dgmax` of
    /// 1 and fewer than `msbp` steps have elapsed since the last setup.
    dgmax: Eqn::T,
    msbp: usize,
    /// Whether `cached_jac` is known current for the present `gamma`.
    jcur: bool,
    cached_jac: Option<Eqn::M>,
    /// Step count (`stats.number_of_steps`) as of the last linear-solver
    /// setup.
    nstlp: usize,
    /// Max Newton corrector iterations per implicit-stage solve; mirrors
    /// into [`crate::nonlinear_solver::NonlinearSolver::set_max_iter`].
    maxcor: usize,
    /// Safety factor scaling the Newton convergence test.
    nlscoef: Eqn::T,
    /// Maximum tolerated per-iteration growth of the Newton correction norm
    /// before the solve is declared divergent.
    rdiv: Eqn::T,
    /// Target convergence-rate ceiling (currently informational; the
    /// default Newton solver's divergence test is driven by `rdiv`).
    crdown: Eqn::T,
}

impl<Eqn, NLS, Inner> MriDriver<Eqn, NLS, Inner>
where
    Eqn: OdeEquations,
    NLS: crate::nonlinear_solver::NonlinearSolver<MriResidual<Eqn>>,
    Inner: InnerStepper<T = Eqn::T, V = Eqn::V>,
{
    /// `MRIStepCreate`: build a driver from a problem, an inner stepper,
    /// and (optionally) a nonlinear solver for implicit stages. Returns
    /// `None` in place of a null handle on failure.
    pub fn create(problem: OdeSolverProblem<Eqn>, inner: Inner, nls: Option<NLS>) -> Option<Self> {
        let y0 = problem.eqn.init();
        let t0 = problem.t0;
        let h0 = problem.h0;
        let coupling = CouplingTable::default_explicit_3();
        if coupling.check().is_err() {
            return None;
        }
        let zero = Eqn::T::zero();
        let one = Eqn::T::one();
        let mut driver = MriDriver {
            problem,
            coupling,
            inner,
            nls,
            predictor: Predictor::Trivial,
            interpolant: None,
            state: OdeSolverState::new(y0, t0, h0),
            f: Vec::new(),
            implicit: false,
            call_fullrhs: true,
            error_handler: Box::new(|e| eprintln!("mri-step error: {e}")),
            pre_inner_evolve: None,
            post_inner_evolve: None,
            stage_predict: None,
            process_stage: None,
            stats: Statistics::default(),
            nrtfn: 0,
            max_retries: 1,
            error_weights: ErrorWeights::default(),
            last_zpred: None,
            gamma: zero,
            gammap: zero,
            gamrat: one,
            dgmax: Eqn::T::from(0.2).unwrap_or(one),
            msbp: 10,
            jcur: false,
            cached_jac: None,
            nstlp: 0,
            maxcor: 3,
            nlscoef: Eqn::T::from(0.1).unwrap_or(one),
            rdiv: Eqn::T::from(2.3).unwrap_or(one + one),
            crdown: Eqn::T::from(0.3).unwrap_or(one),
        };
        if let Some(nls) = driver.nls.as_mut() {
            nls.set_max_iter(driver.maxcor);
            nls.set_conv_params(driver.nlscoef, driver.rdiv);
        }
        if driver.init().is_err() {
            return None;
        }
        Some(driver)
    }

    /// `MRIStepSetMaxNonlinIters`: cap the Newton corrector iteration count
    /// per implicit-stage solve.
    pub fn set_maxcor(&mut self, maxcor: usize) {
        self.maxcor = maxcor.max(1);
        if let Some(nls) = self.nls.as_mut() {
            nls.set_max_iter(self.maxcor);
        }
    }

    /// `MRIStepSetNonlinConvCoef`: the `nlscoef` safety factor scaling the
    /// Newton convergence test.
    pub fn set_nlscoef(&mut self, nlscoef: Eqn::T) {
        self.nlscoef = nlscoef;
        if let Some(nls) = self.nls.as_mut() {
            nls.set_conv_params(self.nlscoef, self.rdiv);
        }
    }

    /// `MRIStepSetDeltaGammaMax`: the `gamrat` band outside which the cached
    /// raw Jacobian is discarded and recomputed.
    pub fn set_dgmax(&mut self, dgmax: Eqn::T) {
        self.dgmax = dgmax;
    }

    /// `MRIStepSetNonlinRDiv`: growth-rate ceiling on the Newton correction
    /// norm between iterations before a solve is declared divergent.
    pub fn set_rdiv(&mut self, rdiv: Eqn::T) {
        self.rdiv = rdiv;
        if let Some(nls) = self.nls.as_mut() {
            nls.set_conv_params(self.nlscoef, self.rdiv);
        }
    }

    /// `MRIStepSetMaxStepsBetweenLSetup`: steps allowed between Jacobian
    /// refreshes even when `gamrat` stays in band.
    pub fn set_msbp(&mut self, msbp: usize) {
        self.msbp = msbp.max(1);
    }

    /// `MRIStepSetNonlinCRDown`: target convergence-rate ceiling, recorded
    /// on the configuration surface even though this core's simplified
    /// Newton loop uses `rdiv` rather than an estimated per-iteration
    /// convergence rate to detect divergence.
    pub fn set_crdown(&mut self, crdown: Eqn::T) {
        self.crdown = crdown;
    }

    /// `MRIStepSetDeltaGammaMax`'s counterpart getter, exposed for tests.
    pub fn crdown(&self) -> Eqn::T {
        self.crdown
    }

    /// `mriStep_Init`: (re)allocate per-stage scratch and validate the
    /// coupling table. Runs once from [`MriDriver::create`] and again from
    /// [`MriDriver::reinit`].
    fn init(&mut self) -> MriResult<()> {
        self.coupling.check()?;
        let n = self.coupling.stages;
        let nstates = self.problem.eqn.nstates();
        self.f = (0..n).map(|_| Eqn::V::zeros(nstates)).collect();
        self.implicit = (1..n).any(|i| self.coupling.stage_type(i) == StageType::ImplicitNoFast);
        if self.implicit && self.nls.is_none() {
            return Err(MriError::NlsInitFail);
        }
        self.call_fullrhs = true;
        self.stats.initial_step_size = to_f64(self.state.h);
        self.jcur = false;
        self.cached_jac = None;
        self.gammap = Eqn::T::zero();
        self.gamrat = Eqn::T::one();
        self.nstlp = 0;
        Ok(())
    }

    /// `MRIStepReInit`: reset to a new `(t0, y0)` without reallocating.
    pub fn reinit(&mut self, t0: Eqn::T, y0: Eqn::V) -> MriResult<()> {
        self.state = OdeSolverState::new(y0, t0, self.state.h);
        self.call_fullrhs = true;
        self.stats = Statistics::default();
        self.init()
    }

    /// `MRIStepReset`: like [`MriDriver::reinit`] but also asks the inner
    /// stepper to discard any cached state.
    pub fn reset(&mut self, t0: Eqn::T, y0: Eqn::V) -> MriResult<()> {
        self.inner.reset(t0, &y0)?;
        self.reinit(t0, y0)
    }

    /// `MRIStepSetCoupling`: install a caller-supplied coupling table in
    /// place of the default, revalidating and reallocating per
    /// [`MriDriver::init`].
    pub fn set_coupling(&mut self, coupling: CouplingTable<Eqn::T>) -> MriResult<()> {
        self.coupling = coupling;
        self.init()
    }

    /// `MRIStepSetOrder`: select a built-in coupling table by its claimed
    /// order `q`. Only `q = 3` has a shipped default table; any other
    /// request is a recoverable condition, not a hard failure — it is
    /// routed through the error handler as a notice and falls back to the
    /// `q = 3` table, mirroring `mriStep_SetCoupling`'s own behavior when
    /// asked for an order with no corresponding default.
    pub fn set_order(&mut self, q: usize) -> MriResult<()> {
        if q != 3 {
            let notice = MriError::IllInput(format!(
                "no default MRI coupling table for order q = {q}; falling back to q = 3"
            ));
            (self.error_handler)(&notice);
        }
        self.set_coupling(CouplingTable::default_explicit_3())
    }

    /// `MRIStepSetNonlinearSolver`: attach (or replace) the nonlinear
    /// solver used for implicit (DIRK) stages. Revalidates the coupling
    /// table afterward so a method requiring an implicit solve that was
    /// previously rejected for lacking one can be installed again.
    pub fn set_nonlinear_solver(&mut self, nls: NLS) -> MriResult<()> {
        self.nls = Some(nls);
        if let Some(nls) = self.nls.as_mut() {
            nls.set_max_iter(self.maxcor);
            nls.set_conv_params(self.nlscoef, self.rdiv);
        }
        self.init()
    }

    /// `MRIStepResize`: reinitialize the driver at a new state, whose
    /// length may differ from the one the driver was built with (e.g. a
    /// host framework's own `resize_fn` has already interpolated `y0` onto
    /// the new mesh). Reallocates every owned per-stage vector (`F[*]`)
    /// and the cached Jacobian at the new size, and drops the
    /// Jacobian-staleness bookkeeping so the first stage after a resize
    /// always refreshes it, mirroring `MRIStepResize`'s own walk over
    /// every owned vector plus `nsetups` reset. This driver does not own
    /// `sdata`/`zpred`/`zcor` as persistent fields (they are assembled
    /// fresh per stage, see `stage_dirk_nofast`), so there is nothing
    /// further to resize for them; the nonlinear solver is left attached
    /// rather than destroyed and recreated, since this core takes it by
    /// value rather than tracking a separate "owned" flag.
    pub fn resize(&mut self, t0: Eqn::T, y0: Eqn::V) -> MriResult<()> {
        let nstates = y0.len();
        self.state = OdeSolverState::new(y0, t0, self.state.h);
        self.f = (0..self.coupling.stages)
            .map(|_| Eqn::V::zeros(nstates))
            .collect();
        self.cached_jac = None;
        self.jcur = false;
        self.gammap = Eqn::T::zero();
        self.gamrat = Eqn::T::one();
        self.nstlp = 0;
        self.stats.number_of_linear_solver_setups = 0;
        self.last_zpred = None;
        self.call_fullrhs = true;
        Ok(())
    }

    pub fn set_predictor(&mut self, predictor: Predictor) {
        self.predictor = predictor;
    }

    pub fn set_interpolant(&mut self, interpolant: Box<dyn Interpolant<Eqn::V>>) {
        self.interpolant = Some(interpolant);
    }

    pub fn set_error_handler(&mut self, handler: ErrorHandler) {
        self.error_handler = handler;
    }

    /// `MRIStepSetPreInnerFn`.
    pub fn set_pre_inner_evolve(&mut self, cb: PreInnerEvolveFn<Eqn::T, Eqn::V>) {
        self.pre_inner_evolve = Some(cb);
    }

    /// `MRIStepSetPostInnerFn`.
    pub fn set_post_inner_evolve(&mut self, cb: PostInnerEvolveFn<Eqn::T, Eqn::V>) {
        self.post_inner_evolve = Some(cb);
    }

    /// `MRIStepSetStagePredictFn`.
    pub fn set_stage_predict(&mut self, cb: StagePredictFn<Eqn::T, Eqn::V>) {
        self.stage_predict = Some(cb);
    }

    /// `MRIStepSetPostprocessStageFn`.
    pub fn set_process_stage(&mut self, cb: ProcessStageFn<Eqn::T, Eqn::V>) {
        self.process_stage = Some(cb);
    }

    pub fn set_max_retries(&mut self, max_retries: usize) {
        self.max_retries = max_retries.max(1);
    }

    /// `MRIStepSStolerances`: scalar relative and absolute tolerances.
    pub fn sstolerances(&mut self, rtol: Eqn::T, atol: Eqn::T) {
        self.error_weights = ErrorWeights::Scalar { rtol, atol };
    }

    /// `MRIStepSVtolerances`: scalar relative tolerance, per-component
    /// absolute tolerance.
    pub fn svtolerances(&mut self, rtol: Eqn::T, atol: Eqn::V) {
        self.error_weights = ErrorWeights::Vector { rtol, atol };
    }

    /// `MRIStepWFtolerances`: install a user-supplied error-weight function.
    pub fn wftolerances(&mut self, efun: Box<dyn Fn(&Eqn::V, &mut Eqn::V)>) {
        self.error_weights = ErrorWeights::UserFn(efun);
    }

    /// `gamma` of the most recently solved implicit stage.
    pub fn gamma(&self) -> Eqn::T {
        self.gamma
    }

    /// `gamma / gammap`, the staleness ratio driving Jacobian reuse.
    pub fn gamrat(&self) -> Eqn::T {
        self.gamrat
    }

    /// Whether the cached raw slow-equation Jacobian is considered current
    /// for the most recently solved implicit stage.
    pub fn jacobian_is_current(&self) -> bool {
        self.jcur
    }

    /// Linear-solver setup count (Jacobian refreshes), distinct from
    /// `stats.number_of_nonlinear_solver_iterations`.
    pub fn number_of_linear_solver_setups(&self) -> usize {
        self.stats.number_of_linear_solver_setups
    }

    /// Read access to the inner stepper, mainly useful for a test harness
    /// wrapping it to record calls.
    pub fn inner(&self) -> &Inner {
        &self.inner
    }

    /// Evaluate the current error-weight vector `ewt` at the driver's
    /// current state, per whichever `*tolerances` constructor was last
    /// installed (or the `mriStep_Init` default if none was).
    pub fn error_weights(&self) -> Eqn::V {
        let mut ewt = Eqn::V::zeros(self.problem.eqn.nstates());
        self.error_weights.compute(&self.state.y, &mut ewt);
        ewt
    }

    /// `MRIStepGetDky`: interpolated solution (or a derivative of it) over
    /// the most recently completed step. Dense-output interpolation over
    /// prior steps is a host-framework responsibility; this only forwards
    /// to an installed [`Interpolant`], mirroring `MRIStepGetDky`'s own
    /// thin wrapper around `arkGetDky`.
    pub fn get_dky(&self, t: Eqn::T, k: usize) -> Option<Eqn::V> {
        self.interpolant.as_ref().and_then(|interp| interp.predict(t, k))
    }

    /// `MRIStepComputeState`: `z <- zpred + zcor`, letting a caller holding
    /// onto a Newton correction reconstruct the full stage state, exactly
    /// as `MRIStepComputeState` combines `step_mem->zpred` with a
    /// caller-supplied `zcor`.
    pub fn compute_state(&self, zcor: &Eqn::V) -> MriResult<Eqn::V> {
        let zpred = self
            .last_zpred
            .as_ref()
            .ok_or_else(|| MriError::IllInput("no predicted stage value available".into()))?;
        let mut z = zpred.clone();
        z += zcor;
        Ok(z)
    }

    /// `MRIStepRootInit`: record a root-function count. Root-*finding*
    /// itself is out of scope for this core; this only satisfies the
    /// external-interface surface a host would otherwise wire up.
    pub fn root_init(&mut self, nrtfn: usize) {
        self.nrtfn = nrtfn;
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn state(&self) -> &OdeSolverState<Eqn::V> {
        &self.state
    }

    /// Read access to the per-stage slow-RHS scratch `F[i]`, mainly useful
    /// for a test harness checking that `full_rhs`'s `Other` mode does not
    /// disturb `F[0]`.
    pub fn stage_f(&self, i: usize) -> &Eqn::V {
        &self.f[i]
    }

    /// `mriStep_FullRHS`: evaluate `f_s(t,y) + f_f(t,y)` for the host's own
    /// use (e.g. dense-output construction, or the `START`/`END`
    /// bookends around an `evolve` loop). `mode` governs which scratch
    /// vector receives the slow-RHS half: `Start`/`End` store it into
    /// `F[0]` (safe to clobber at those boundaries), `Other` uses a local
    /// scratch so an intermediate call never disturbs `F[0]`.
    pub fn full_rhs(&mut self, t: Eqn::T, y: &Eqn::V, mode: FullRhsMode, out: &mut Eqn::V) -> MriResult<()> {
        match mode {
            FullRhsMode::Start | FullRhsMode::End => {
                self.problem.eqn.rhs_inplace(t, y, &mut self.f[0]);
                self.inner.full_rhs(t, y, out)?;
                *out += &self.f[0];
            }
            FullRhsMode::Other => {
                let mut tempv2 = y.clone();
                self.problem.eqn.rhs_inplace(t, y, &mut tempv2);
                self.inner.full_rhs(t, y, out)?;
                *out += &tempv2;
            }
        }
        Ok(())
    }

    /// `mriStep_TakeStep`: advance the state by one fixed outer step `h`.
    pub fn take_step(&mut self) -> MriResult<StepOutcome> {
        let h = self.state.h;
        let t0 = self.state.t;
        let stages = self.coupling.stages;

        if self.call_fullrhs {
            self.problem.eqn.rhs_inplace(t0, &self.state.y, &mut self.f[0]);
            self.call_fullrhs = false;
        }

        let mut ycur = self.state.y.clone();

        for is in 1..stages {
            let t_is = t0 + h * self.coupling.c[is];
            match self.coupling.stage_type(is) {
                StageType::ExplicitFast => self.stage_erk_fast(is, t0, h, &mut ycur)?,
                StageType::ExplicitNoFast => self.stage_erk_nofast(is, h, &mut ycur),
                StageType::ImplicitNoFast => self.stage_dirk_nofast(is, t_is, h, &mut ycur)?,
                StageType::ImplicitFast => {
                    return Err(MriError::InvalidTable(
                        "implicit stages coupled to the fast direction are unsupported".into(),
                    ));
                }
            }

            if let Some(cb) = self.process_stage.as_mut() {
                if cb(t_is, &ycur) != 0 {
                    return Err(MriError::PostprocessStageFail);
                }
            }

            if is < stages - 1 {
                self.problem.eqn.rhs_inplace(t_is, &ycur, &mut self.f[is]);
                self.stats.nfs += 1;
            }

            // Unless the stage was `ExplicitFast` with no postprocessing,
            // reset the inner stepper so the next fast stage starts from
            // the coupled state.
            let needs_reset = self.coupling.stage_type(is) != StageType::ExplicitFast
                || self.process_stage.is_some();
            if needs_reset {
                self.inner.reset(t_is, &ycur)?;
            }
        }

        self.state.y.copy_from(&ycur);
        self.state.t = t0 + h;
        self.stats.number_of_steps += 1;
        self.stats.final_step_size = to_f64(h);

        // `mriStep_FullRHS`'s `MRI_FULLRHS_END` call: `F[0]` is reused as
        // the "previous step" slow RHS on the *next* `take_step`, so it
        // must be refreshed at the new state before this call returns
        // rather than left holding the value from the step just completed.
        // `ycur` is scratch from here on, so it doubles as the `out`
        // parameter `full_rhs` needs for the (discarded) fast-direction
        // half.
        self.full_rhs(self.state.t, &self.state.y, FullRhsMode::End, &mut ycur)?;
        self.call_fullrhs = false;
        Ok(StepOutcome::Success)
    }

    fn stage_erk_fast(
        &mut self,
        is: usize,
        t0: Eqn::T,
        h: Eqn::T,
        ycur: &mut Eqn::V,
    ) -> MriResult<()> {
        let stage_t0 = t0 + h * self.coupling.c[is - 1];
        let stage_tout = t0 + h * self.coupling.c[is];
        let (rows, cdiff) = self.coupling.forcing_row(is);
        let refs: Vec<&Eqn::V> = self.f[..is].iter().collect();
        let forcing: Vec<Eqn::V> = rows
            .iter()
            .map(|row| Eqn::V::linear_combination(row, &refs))
            .collect();
        self.inner.add_forcing(stage_t0, cdiff, &forcing);

        if let Some(cb) = self.pre_inner_evolve.as_mut() {
            if cb(stage_t0, &forcing) < 0 {
                return Err(MriError::InnerStepFail);
            }
        }

        self.inner.evolve(stage_t0, stage_tout, ycur)?;

        if let Some(cb) = self.post_inner_evolve.as_mut() {
            if cb(stage_tout, ycur) < 0 {
                return Err(MriError::InnerStepFail);
            }
        }

        self.inner.clear_forcing();
        Ok(())
    }

    fn stage_erk_nofast(&mut self, is: usize, h: Eqn::T, ycur: &mut Eqn::V) {
        let row = self.coupling.rk_coeffs(is);
        ycur.copy_from(&self.state.y);
        for (j, coeff) in row.iter().enumerate() {
            ycur.axpy(h * *coeff, &self.f[j]);
        }
    }

    fn stage_dirk_nofast(
        &mut self,
        is: usize,
        t_is: Eqn::T,
        h: Eqn::T,
        ycur: &mut Eqn::V,
    ) -> MriResult<()> {
        let mut zpred = self.predict(is)?;
        if let Some(cb) = self.stage_predict.as_mut() {
            let code = cb(t_is, &mut zpred);
            if code < 0 {
                return Err(MriError::UserPredictFail);
            }
            if code > 0 {
                return Err(MriError::TryAgain);
            }
        }
        self.last_zpred = Some(zpred.clone());

        let row = self.coupling.rk_coeffs(is);
        let mut sdata = ycur.clone();
        sdata -= &zpred;
        for (j, coeff) in row.iter().enumerate() {
            sdata.axpy(h * *coeff, &self.f[j]);
        }

        let gamma = h * self.coupling.diag_coeff(is);
        self.gamma = gamma;
        self.gamrat = if self.gammap != Eqn::T::zero() {
            gamma / self.gammap
        } else {
            Eqn::T::one()
        };

        // `mriStep_StageSetup`'s Jacobian-staleness test: reuse the cached
        // raw slow-equation Jacobian unless it was never computed, `gamrat`
        // has drifted more than `dgmax` away from 1, or `msbp` steps have
        // elapsed since the last refresh.
        let steps_since_setup = self.stats.number_of_steps.saturating_sub(self.nstlp);
        let ratio_stale = (self.gamrat - Eqn::T::one()).abs() > self.dgmax;
        let needs_new_jac = !self.jcur || self.cached_jac.is_none() || ratio_stale || steps_since_setup >= self.msbp;
        if needs_new_jac {
            self.cached_jac = Some(self.problem.eqn.jacobian_matrix(&zpred, t_is));
            self.jcur = true;
            self.gammap = gamma;
            self.nstlp = self.stats.number_of_steps;
            self.stats.number_of_linear_solver_setups += 1;
        }
        let raw_jac = self.cached_jac.clone().expect("cached_jac populated above");

        let residual = MriResidual::new(
            self.problem.eqn.clone(),
            gamma,
            zpred.clone(),
            sdata,
            t_is,
            raw_jac,
        );

        let mut zcor = Eqn::V::zeros(self.problem.eqn.nstates());
        let ewt = self.error_weights();
        let nls = self.nls.as_mut().ok_or(MriError::NlsInitFail)?;
        let solve_result = nls.solve_in_place(&residual, &mut zcor, t_is, &ewt);
        self.stats.number_of_nonlinear_solver_iterations += nls.niter();
        if solve_result.is_err() {
            self.stats.number_of_nonlinear_solver_fails += 1;
            // A failed solve means the Jacobian (fresh or cached) did not
            // adequately model the stage residual; force a refresh before
            // the next stage that reaches this path.
            self.jcur = false;
        }
        solve_result?;

        ycur.copy_from(&zpred);
        *ycur += &zcor;
        Ok(())
    }

    /// `mriStep_Predict`: choose the initial Newton guess for stage `is`.
    fn predict(&self, is: usize) -> MriResult<Eqn::V> {
        match self.predictor {
            Predictor::Trivial => Ok(self.state.y.clone()),
            Predictor::Bootstrap => {
                let mut jstage = None;
                for j in (0..is).rev() {
                    if self.coupling.c[j] > Eqn::T::zero() && self.coupling.c[j] < self.coupling.c[is]
                    {
                        jstage = Some(j);
                        break;
                    }
                }
                match jstage {
                    Some(j) => {
                        let h_local = self.state.h * self.coupling.c[j];
                        let mut pred = self.state.y.clone();
                        pred.axpy(h_local, &self.f[j]);
                        Ok(pred)
                    }
                    None => Ok(self.state.y.clone()),
                }
            }
            Predictor::MaximumOrder | Predictor::VariableOrder | Predictor::CutoffOrder => {
                let t_is = self.state.t + self.state.h * self.coupling.c[is];
                match &self.interpolant {
                    Some(interp) => Ok(interp
                        .predict(t_is, self.coupling.q - 1)
                        .unwrap_or_else(|| self.state.y.clone())),
                    None => Ok(self.state.y.clone()),
                }
            }
        }
    }

    /// A minimal host `evolve` loop (a "host framework" collaborator
    /// reduced to its fixed-step form): repeatedly call
    /// [`MriDriver::take_step`] until `tout` is reached or a retry budget
    /// is exhausted on a recoverable error.
    pub fn evolve(&mut self, tout: Eqn::T) -> MriResult<Eqn::T> {
        while self.state.t < tout {
            let mut retries = 0;
            loop {
                match self.take_step() {
                    Ok(StepOutcome::Success) => break,
                    Ok(StepOutcome::Recoverable) if retries < self.max_retries => {
                        retries += 1;
                        self.stats.number_of_error_test_failures += 1;
                        continue;
                    }
                    Ok(outcome) => {
                        let err = MriError::IllInput(format!(
                            "take_step returned {outcome:?} with no retries remaining"
                        ));
                        (self.error_handler)(&err);
                        return Err(err);
                    }
                    // Only a recoverable error gets the same halve-and-retry
                    // treatment as `StepOutcome::Recoverable`; an
                    // unrecoverable one (`InvalidTable`, `MemFail`, ...)
                    // must end integration immediately per the propagation
                    // policy, regardless of remaining retry budget.
                    Err(e) if e.is_recoverable() && retries < self.max_retries => {
                        retries += 1;
                        self.stats.number_of_error_test_failures += 1;
                        continue;
                    }
                    Err(e) => {
                        (self.error_handler)(&e);
                        return Err(e);
                    }
                }
            }
        }
        Ok(self.state.t)
    }
}

fn to_f64<T: num_traits::NumCast>(t: T) -> f64 {
    num_traits::NumCast::from(t).unwrap_or(0.0)
}
