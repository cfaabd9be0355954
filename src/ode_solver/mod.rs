pub mod coupling;
pub mod equations;
pub mod inner_stepper;
pub mod mri;
pub mod problem;
pub mod rk_inner;
pub mod state;
pub mod stats;
pub mod test_models;
pub mod tolerances;

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::error::{MriResult, StepOutcome};
    use crate::nonlinear_solver::newton::NewtonNonlinearSolver;
    use crate::op::mri_residual::MriResidual;

    use super::coupling::{CouplingTable, StageType};
    use super::inner_stepper::InnerStepper;
    use super::mri::{FullRhsMode, MriDriver, Predictor};
    use super::rk_inner::RkInner;
    use super::test_models::exponential_decay::{exponential_decay_problem, ExponentialDecay};

    type Mcpu = nalgebra::DMatrix<f64>;
    type Nls = NewtonNonlinearSolver<MriResidual<ExponentialDecay<Mcpu>>>;
    type Driver = MriDriver<ExponentialDecay<Mcpu>, Nls, RkInner<super::test_models::exponential_decay::ZeroFastRhs<nalgebra::DVector<f64>>>>;

    fn build_driver() -> Driver {
        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        MriDriver::create(problem, inner, None).unwrap()
    }

    #[test]
    fn test_default_coupling_is_valid() {
        let table = CouplingTable::<f64>::default_explicit_3();
        table.check().unwrap();
        assert_eq!(table.stages, 3);
        assert_eq!(table.stage_type(1), StageType::ExplicitFast);
        assert_eq!(table.stage_type(2), StageType::ExplicitFast);
    }

    #[test]
    fn test_nfs_counter_law() {
        // For a fully-explicit table every stage but the last evaluates
        // the slow right-hand side once per step, so a completed step
        // increments `nfs` by `stages - 2`: stage 0's F is carried over
        // from the previous step (or the initial FullRHS call), and the
        // last stage's F feeds the next step rather than this one.
        let mut driver = build_driver();
        let stages = CouplingTable::<f64>::default_explicit_3().stages;
        let before = driver.statistics().nfs;
        driver.take_step().unwrap();
        let after = driver.statistics().nfs;
        assert_eq!(after - before, stages - 2);
    }

    #[test]
    fn test_take_step_advances_time() {
        let mut driver = build_driver();
        let t0 = driver.state().t;
        let h = driver.state().h;
        let outcome = driver.take_step().unwrap();
        assert_eq!(outcome, StepOutcome::Success);
        assert!((driver.state().t - (t0 + h)).abs() < 1e-12);
    }

    #[test]
    fn test_evolve_reaches_tout() {
        let mut driver = build_driver();
        let h = driver.state().h;
        let tout = driver.state().t + h * 5.0;
        let treached = driver.evolve(tout).unwrap();
        assert!((treached - tout).abs() < 1e-9);
        assert_eq!(driver.statistics().number_of_steps, 5);
    }

    #[test]
    fn test_solution_decays_towards_zero() {
        let mut driver = build_driver();
        let h = driver.state().h;
        let y0 = driver.state().y.clone();
        driver.evolve(driver.state().t + h * 10.0).unwrap();
        let y1 = driver.state().y.clone();
        assert!(y1[0].abs() < y0[0].abs());
    }

    #[test]
    fn test_rejects_invalid_table() {
        let bad = CouplingTable {
            stages: 2,
            nmat: 1,
            q: 1,
            p: 0,
            c: vec![0.1, 1.0],
            g: vec![vec![vec![0.0, 0.0], vec![0.9, 0.0]]],
            is_adaptive: false,
        };
        assert!(bad.check().is_err());
    }

    #[test]
    fn test_predictor_trivial_is_default() {
        let mut driver = build_driver();
        driver.set_predictor(Predictor::Trivial);
        driver.take_step().unwrap();
    }

    /// A 3-stage table with `c = [0, 1, 1]`: stage 1 is `ExplicitFast` over
    /// the whole step, stage 2 sits at the same abscissa (`cdiff = 0`) and
    /// carries a nonzero diagonal, so it classifies `ImplicitNoFast` and
    /// must route through `MriResidual`/`NewtonNonlinearSolver`.
    fn dirk_coupling() -> CouplingTable<f64> {
        CouplingTable {
            stages: 3,
            nmat: 1,
            q: 2,
            p: 0,
            c: vec![0.0, 1.0, 1.0],
            g: vec![vec![
                vec![0.0, 0.0, 0.0],
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 1.0],
            ]],
            is_adaptive: false,
        }
    }

    #[test]
    fn test_dirk_coupling_is_valid_and_classified() {
        let table = dirk_coupling();
        table.check().unwrap();
        assert_eq!(table.stage_type(1), StageType::ExplicitFast);
        assert_eq!(table.stage_type(2), StageType::ImplicitNoFast);
    }

    #[test]
    fn test_dirk_stage_runs_through_newton() {
        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver =
            MriDriver::create(problem, inner, Some(Nls::default())).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();

        let before = driver.statistics().number_of_nonlinear_solver_iterations;
        let outcome = driver.take_step().unwrap();
        assert_eq!(outcome, StepOutcome::Success);
        assert!(driver.statistics().number_of_nonlinear_solver_iterations > before);
        assert_eq!(driver.statistics().number_of_nonlinear_solver_fails, 0);
    }

    #[test]
    fn test_dirk_table_rejected_without_nls() {
        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver = MriDriver::create(problem, inner, None).unwrap();
        assert!(driver.set_coupling(dirk_coupling()).is_err());
    }

    #[test]
    fn test_compute_state_matches_current_state() {
        use crate::vector::Vector as _;

        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver =
            MriDriver::create(problem, inner, Some(Nls::default())).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();
        driver.take_step().unwrap();

        // After a successful DIRK stage, `last_zpred` is populated, so
        // `compute_state(zcor=0) == zpred` exactly.
        let zcor = nalgebra::DVector::<f64>::zeros(2);
        let z = driver.compute_state(&zcor).unwrap();
        assert_eq!(z.len(), 2);
    }

    #[test]
    fn test_sstolerances_updates_error_weights() {
        let mut driver = build_driver();
        driver.sstolerances(1e-3, 1e-6);
        let ewt = driver.error_weights();
        assert!(ewt[0] > 0.0);
    }

    #[test]
    fn test_get_dky_without_interpolant_is_none() {
        let driver = build_driver();
        assert!(driver.get_dky(driver.state().t, 0).is_none());
    }

    #[test]
    fn test_adaptive_table_rejected_with_ill_input() {
        use crate::error::MriError;

        let table = CouplingTable {
            is_adaptive: true,
            ..dirk_coupling()
        };
        match table.check() {
            Err(MriError::IllInput(msg)) => {
                assert_eq!(msg, "Adaptive outer time stepping is not currently supported");
            }
            other => panic!("expected IllInput, got {other:?}"),
        }
    }

    #[test]
    fn test_forcing_consistency_law() {
        // forcing[k][j] = G[k][i][j] / cdiff, so cdiff * sum_k
        // forcing[k][j]/(k+1) must reproduce rk_coeffs(i)[j] exactly for
        // any fast stage i.
        let table = CouplingTable::<f64>::default_explicit_3();
        for i in 1..table.stages {
            if table.stage_type(i) != StageType::ExplicitFast {
                continue;
            }
            let (forcing, cdiff) = table.forcing_row(i);
            let rk = table.rk_coeffs(i);
            for j in 0..i {
                let mut acc = 0.0;
                for (k, row) in forcing.iter().enumerate() {
                    acc += row[j] / (k as f64 + 1.0);
                }
                acc *= cdiff;
                assert!(
                    (acc - rk[j]).abs() < 1e-12,
                    "stage {i} coeff {j}: {acc} != {}",
                    rk[j]
                );
            }
        }
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut driver = build_driver();
        driver.take_step().unwrap();
        let t = driver.state().t + 1.0;
        let y = driver.state().y.clone();

        driver.reset(t, y.clone()).unwrap();
        let t1 = driver.state().t;
        let y1 = driver.state().y.clone();
        let steps1 = driver.statistics().number_of_steps;

        driver.reset(t, y.clone()).unwrap();
        let t2 = driver.state().t;
        let y2 = driver.state().y.clone();
        let steps2 = driver.statistics().number_of_steps;

        assert_eq!(t1, t2);
        assert_eq!(steps1, steps2);
        for idx in 0..y1.len() {
            assert_eq!(y1[idx], y2[idx]);
        }
    }

    /// An `InnerStepper` wrapper recording every `reset` call's `(t, y)`,
    /// used to check `take_step` calls it exactly once per non-`ExplicitFast`
    /// stage.
    struct RecordingInner<Inner> {
        inner: Inner,
        resets: RefCell<Vec<f64>>,
    }

    impl<Inner> RecordingInner<Inner> {
        fn new(inner: Inner) -> Self {
            Self {
                inner,
                resets: RefCell::new(Vec::new()),
            }
        }
    }

    impl<Inner: InnerStepper<T = f64>> InnerStepper for RecordingInner<Inner> {
        type T = f64;
        type V = Inner::V;

        fn evolve(&mut self, t0: f64, tout: f64, y: &mut Self::V) -> MriResult<()> {
            self.inner.evolve(t0, tout, y)
        }

        fn full_rhs(&mut self, t: f64, y: &Self::V, f_out: &mut Self::V) -> MriResult<()> {
            self.inner.full_rhs(t, y, f_out)
        }

        fn reset(&mut self, t: f64, y: &Self::V) -> MriResult<()> {
            self.resets.borrow_mut().push(t);
            self.inner.reset(t, y)
        }

        fn add_forcing(&mut self, tshift: f64, tscale: f64, forcing_coeffs: &[Self::V]) {
            self.inner.add_forcing(tshift, tscale, forcing_coeffs)
        }

        fn clear_forcing(&mut self) {
            self.inner.clear_forcing()
        }
    }

    #[test]
    fn test_reset_called_once_per_nonfast_stage() {
        type RecInner =
            RecordingInner<RkInner<super::test_models::exponential_decay::ZeroFastRhs<nalgebra::DVector<f64>>>>;
        type RecDriver = MriDriver<ExponentialDecay<Mcpu>, Nls, RecInner>;

        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RecordingInner::new(RkInner::new(fast, 4));
        let mut driver: RecDriver = MriDriver::create(problem, inner, Some(Nls::default())).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();

        driver.take_step().unwrap();

        // dirk_coupling has stages [ExplicitFast, ImplicitNoFast] beyond
        // stage 0, so exactly one reset is expected (for stage 2).
        assert_eq!(driver.inner().resets.borrow().len(), 1);
    }

    #[test]
    fn test_jacobian_reused_across_unchanged_gamma() {
        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver = MriDriver::create(problem, inner, Some(Nls::default())).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();

        driver.take_step().unwrap();
        let setups_after_first = driver.number_of_linear_solver_setups();
        assert!(setups_after_first >= 1);
        assert!(driver.jacobian_is_current());

        driver.take_step().unwrap();
        let setups_after_second = driver.number_of_linear_solver_setups();

        // Same fixed step size and the same table means `gamma` is
        // unchanged between steps, so the cached Jacobian is reused rather
        // than recomputed.
        assert_eq!(setups_after_first, setups_after_second);
    }

    #[test]
    fn test_pre_and_post_inner_evolve_are_invoked_per_fast_stage() {
        use std::rc::Rc;

        let mut driver = build_driver();
        let pre_calls = Rc::new(RefCell::new(0usize));
        let post_calls = Rc::new(RefCell::new(0usize));
        let pre_calls_cb = pre_calls.clone();
        let post_calls_cb = post_calls.clone();

        driver.set_pre_inner_evolve(Box::new(move |_t, _forcing| {
            *pre_calls_cb.borrow_mut() += 1;
            0
        }));
        driver.set_post_inner_evolve(Box::new(move |_t, _y| {
            *post_calls_cb.borrow_mut() += 1;
            0
        }));

        driver.take_step().unwrap();

        // `default_explicit_3` has two `ExplicitFast` stages beyond stage 0.
        assert_eq!(*pre_calls.borrow(), 2);
        assert_eq!(*post_calls.borrow(), 2);
    }

    #[test]
    fn test_pre_inner_evolve_negative_return_fails_unrecoverably() {
        use crate::error::MriError;

        let mut driver = build_driver();
        driver.set_pre_inner_evolve(Box::new(|_t, _forcing| -1));

        match driver.take_step() {
            Err(MriError::InnerStepFail) => {}
            other => panic!("expected InnerStepFail, got {other:?}"),
        }
    }

    #[test]
    fn test_stage_predict_refines_zpred_in_place() {
        use std::rc::Rc;

        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver =
            MriDriver::create(problem, inner, Some(Nls::default())).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();

        let seen: Rc<RefCell<Option<f64>>> = Rc::new(RefCell::new(None));
        let seen_cb = seen.clone();
        driver.set_stage_predict(Box::new(move |_t, zpred| {
            *seen_cb.borrow_mut() = Some(zpred[0]);
            zpred[0] += 1.0;
            0
        }));

        driver.take_step().unwrap();
        assert!(seen.borrow().is_some());
    }

    #[test]
    fn test_stage_predict_positive_return_is_try_again() {
        use crate::error::MriError;

        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver =
            MriDriver::create(problem, inner, Some(Nls::default())).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();
        driver.set_stage_predict(Box::new(|_t, _zpred| 1));

        match driver.take_step() {
            Err(MriError::TryAgain) => {}
            other => panic!("expected TryAgain, got {other:?}"),
        }
    }

    #[test]
    fn test_process_stage_nonzero_return_fails() {
        use crate::error::MriError;

        let mut driver = build_driver();
        driver.set_process_stage(Box::new(|_t, _y| 1));

        match driver.take_step() {
            Err(MriError::PostprocessStageFail) => {}
            other => panic!("expected PostprocessStageFail, got {other:?}"),
        }
    }

    #[test]
    fn test_process_stage_forces_reset_even_on_fast_stage() {
        type RecInner =
            RecordingInner<RkInner<super::test_models::exponential_decay::ZeroFastRhs<nalgebra::DVector<f64>>>>;
        type RecDriver = MriDriver<ExponentialDecay<Mcpu>, Nls, RecInner>;

        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RecordingInner::new(RkInner::new(fast, 4));
        let mut driver: RecDriver = MriDriver::create(problem, inner, None).unwrap();
        driver.set_process_stage(Box::new(|_t, _y| 0));

        driver.take_step().unwrap();

        // `default_explicit_3` has two `ExplicitFast` stages beyond stage
        // 0; normally neither resets, but a `ProcessStage` callback forces
        // a reset after every stage regardless of type.
        assert_eq!(driver.inner().resets.borrow().len(), 2);
    }

    #[test]
    fn test_full_rhs_start_mode_matches_slow_plus_fast() {
        use crate::vector::Vector as _;

        // `ZeroFastRhs` contributes nothing, so `full_rhs` in `Start` mode
        // should equal `-0.1 * y` exactly (the `ExponentialDecay` slow
        // direction alone).
        let mut driver = build_driver();
        let t0 = driver.state().t;
        let y0 = driver.state().y.clone();

        let mut out = y0.clone();
        driver.full_rhs(t0, &y0, FullRhsMode::Start, &mut out).unwrap();

        let expect = nalgebra::DVector::from_vec(vec![-0.1 * y0[0], -0.1 * y0[1]]);
        out.assert_eq(&expect, 1e-12);
    }

    #[test]
    fn test_full_rhs_other_mode_does_not_clobber_f0() {
        use crate::vector::Vector as _;

        let mut driver = build_driver();
        driver.take_step().unwrap();
        let f0_before = driver.stage_f(0).clone();

        let t = driver.state().t;
        let y = driver.state().y.clone();
        let mut out = y.clone();
        driver.full_rhs(t, &y, FullRhsMode::Other, &mut out).unwrap();

        let f0_after = driver.stage_f(0).clone();
        f0_after.assert_eq(&f0_before, 1e-12);
    }

    #[test]
    fn test_f0_is_refreshed_at_end_of_step() {
        use crate::vector::Vector as _;

        // `F[0]` must hold the slow RHS at the state the step just landed
        // on, not the one it started from, since the next `take_step`
        // reuses it as stage 0's already-computed slow RHS rather than
        // recomputing it.
        let mut driver = build_driver();
        driver.take_step().unwrap();
        let y1 = driver.state().y.clone();

        let expect = nalgebra::DVector::from_vec(vec![-0.1 * y1[0], -0.1 * y1[1]]);
        driver.stage_f(0).assert_eq(&expect, 1e-12);
    }

    #[test]
    fn test_dirk_stage_uses_running_stage_value_not_step_start() {
        use crate::vector::Vector as _;

        // `dirk_coupling`'s stage 2 follows a mutating `ExplicitFast` stage
        // 1 in the same step; its `sdata` must be built from that stage's
        // running value (`ycur`), not from `self.state.y` (the value at
        // the *start* of the step, before stage 1 ran). The expected value
        // below is the closed-form result of `y' = -0.1y` through one
        // explicit fast stage (exact, since the forcing is constant over
        // the stage) followed by one linear DIRK correction.
        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver =
            MriDriver::create(problem, inner, Some(Nls::default())).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();

        driver.take_step().unwrap();
        let y = driver.state().y.clone();

        let expect = nalgebra::DVector::from_vec(vec![0.9703960396039604, 0.9703960396039604]);
        y.assert_eq(&expect, 1e-9);
    }

    #[test]
    fn test_set_order_q3_installs_default_table_without_notice() {
        use std::rc::Rc;

        let mut driver = build_driver();
        let notices: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let notices_cb = notices.clone();
        driver.set_error_handler(Box::new(move |e| {
            notices_cb.borrow_mut().push(e.to_string());
        }));

        driver.set_order(3).unwrap();
        assert!(notices.borrow().is_empty());
        driver.take_step().unwrap();
    }

    #[test]
    fn test_set_order_unsupported_q_falls_back_with_notice() {
        use std::rc::Rc;

        let mut driver = build_driver();
        let notices: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let notices_cb = notices.clone();
        driver.set_error_handler(Box::new(move |e| {
            notices_cb.borrow_mut().push(e.to_string());
        }));

        driver.set_order(5).unwrap();
        assert_eq!(notices.borrow().len(), 1);
        assert!(notices.borrow()[0].contains("q = 3"));

        // Falls back to a valid table rather than leaving the driver
        // unusable.
        driver.take_step().unwrap();
    }

    #[test]
    fn test_set_nonlinear_solver_enables_previously_rejected_dirk_table() {
        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver = MriDriver::create(problem, inner, None).unwrap();
        assert!(driver.set_coupling(dirk_coupling()).is_err());

        driver.set_nonlinear_solver(Nls::default()).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();

        let outcome = driver.take_step().unwrap();
        assert_eq!(outcome, StepOutcome::Success);
    }

    #[test]
    fn test_resize_resets_jacobian_bookkeeping_and_preserves_steppability() {
        // `resize` is exercised here at a fixed state length: the shared
        // `ExponentialDecay`/`ZeroFastRhs` test fixtures each carry their
        // own `n` field sized at construction (independent of whatever
        // length a live vector happens to be), so growing the vector length
        // through `resize` alone, without also rebuilding the equations
        // object, is a host-side responsibility this test does not model.
        // What `resize` owns — scratch reallocation and Jacobian-staleness
        // bookkeeping — is fully exercised at the existing length.
        let (problem, fast) = exponential_decay_problem::<Mcpu>();
        let inner = RkInner::new(fast, 4);
        let mut driver: Driver =
            MriDriver::create(problem, inner, Some(Nls::default())).unwrap();
        driver.set_coupling(dirk_coupling()).unwrap();
        driver.take_step().unwrap();
        driver.take_step().unwrap();
        assert!(driver.number_of_linear_solver_setups() >= 1);
        assert!(driver.jacobian_is_current());

        let t_mid = driver.state().t;
        let y_mid = nalgebra::DVector::from_vec(vec![2.0, 3.0]);
        driver.resize(t_mid, y_mid.clone()).unwrap();

        assert_eq!(driver.state().y.len(), 2);
        assert_eq!(driver.stage_f(0).len(), 2);
        assert_eq!(driver.stage_f(1).len(), 2);
        assert_eq!(driver.number_of_linear_solver_setups(), 0);
        assert!(!driver.jacobian_is_current());
        assert_eq!(driver.state().t, t_mid);
        assert_eq!(driver.state().y[0], 2.0);
        assert_eq!(driver.state().y[1], 3.0);

        // Stepping after a resize must still work end to end, including
        // through the DIRK path that the earlier Jacobian bookkeeping
        // assertions above care about.
        let h = driver.state().h;
        let treached = driver.evolve(t_mid + h * 3.0).unwrap();
        assert!((treached - (t_mid + h * 3.0)).abs() < 1e-9);
        assert!(driver.state().y[0] < 2.0);
        assert!(driver.state().y[1] < 3.0);
    }
}
