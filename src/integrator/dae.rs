use log::{info, warn};

use super::{
    check_allocation, check_flag, check_len, model_flag, FlagCheck, IntegratorStatus, SessionState,
};
use crate::error::IntegratorError;
use crate::stepper::{
    flags::{ILL_INPUT, ROOT_RETURN, TOO_MUCH_WORK},
    DaeCallbacks, DaeSession, DenseLinearSolver, SolverOptions, Stats,
};
use crate::{
    integrator_error, DaeModel, IndexType, RealType, SdMatrixViewMut, SdVector, SdVectorView,
    SdVectorViewMut,
};

/// Forwards the stepper's raw-buffer callbacks to a [DaeModel]
struct DaeTrampoline<'a> {
    model: &'a dyn DaeModel,
    n_eq: IndexType,
}

impl DaeCallbacks for DaeTrampoline<'_> {
    fn res(&self, t: RealType, y: &[RealType], yp: &[RealType], rr: &mut [RealType]) -> i32 {
        let y = SdVectorView::new(y);
        let ydot = SdVectorView::new(yp);
        let mut res = SdVectorViewMut::new(rr);
        model_flag(self.model.f(t, &y, &ydot, &mut res), "f")
    }

    fn jac(
        &self,
        t: RealType,
        cj: RealType,
        y: &[RealType],
        yp: &[RealType],
        rr: &[RealType],
        jac: &mut [RealType],
    ) -> i32 {
        let y = SdVectorView::new(y);
        let ydot = SdVectorView::new(yp);
        let res = SdVectorView::new(rr);
        let mut jac = SdMatrixViewMut::new(jac, self.n_eq, self.n_eq);
        model_flag(self.model.jac(t, &y, &ydot, &res, cj, &mut jac), "jac")
    }

    fn roots(&self, t: RealType, y: &[RealType], yp: &[RealType], gout: &mut [RealType]) -> i32 {
        let y = SdVectorView::new(y);
        let ydot = SdVectorView::new(yp);
        let mut gout = SdVectorViewMut::new(gout);
        model_flag(self.model.g(t, &y, &ydot, &mut gout), "g")
    }
}

/// Integrates a [DaeModel] `F(t, y, y') = 0` with variable-step BDF formulas.
///
/// `y0` and `ydot0` must be consistent, or [DaeIntegrator::calc_consistent_ic] can compute the
/// algebraic components of `y0` and the differential components of `ydot0` after
/// [DaeIntegrator::initialize]. `component_id` marks each component as differential (1.0)
/// or algebraic (0.0).
pub struct DaeIntegrator<'m> {
    pub reltol: RealType,
    pub abstol: SdVector,
    pub find_roots: bool,
    pub n_roots: IndexType,
    pub t0: RealType,
    pub y0: SdVector,
    pub ydot0: SdVector,
    pub component_id: SdVector,
    pub options: SolverOptions,

    n_eq: IndexType,
    model: Option<&'m dyn DaeModel>,
    session: Option<DaeSession>,
    state: SessionState,
    t_int: RealType,
    y: SdVector,
    ydot: SdVector,
    roots_found: Vec<i32>,
}

impl<'m> DaeIntegrator<'m> {
    /// An integrator for `n_eq` equations, all differential, with both tolerances set to 1e-6
    pub fn new(n_eq: IndexType) -> Self {
        Self {
            reltol: 1e-6,
            abstol: SdVector::from_element(n_eq, 1e-6),
            find_roots: false,
            n_roots: 0,
            t0: 0.0,
            y0: SdVector::zeros(n_eq),
            ydot0: SdVector::zeros(n_eq),
            component_id: SdVector::from_element(n_eq, 1.0),
            options: SolverOptions::default(),
            n_eq,
            model: None,
            session: None,
            state: SessionState::Uninitialized,
            t_int: 0.0,
            y: SdVector::zeros(n_eq),
            ydot: SdVector::zeros(n_eq),
            roots_found: Vec::new(),
        }
    }

    pub fn n_eq(&self) -> IndexType {
        self.n_eq
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn t_int(&self) -> RealType {
        self.t_int
    }

    pub fn y(&self) -> &SdVector {
        &self.y
    }

    pub fn ydot(&self) -> &SdVector {
        &self.ydot
    }

    pub fn roots_found(&self) -> &[i32] {
        &self.roots_found
    }

    pub fn set_dae(&mut self, model: &'m dyn DaeModel) -> Result<(), IntegratorError> {
        if self.state != SessionState::Uninitialized {
            return Err(integrator_error!(ModelRebind));
        }
        self.model = Some(model);
        Ok(())
    }

    pub fn initialize(&mut self) -> Result<(), IntegratorError> {
        if self.state != SessionState::Uninitialized {
            return Err(integrator_error!(AlreadyInitialized));
        }
        if self.model.is_none() {
            return Err(integrator_error!(ModelNotSet));
        }
        check_len("y0", self.n_eq, self.y0.len())?;
        check_len("ydot0", self.n_eq, self.ydot0.len())?;
        check_len("abstol", self.n_eq, self.abstol.len())?;
        check_len("component_id", self.n_eq, self.component_id.len())?;
        if self.find_roots && self.n_roots == 0 {
            return Err(IntegratorError::InvalidState(
                "root finding needs at least one root function",
            ));
        }

        let mut session = check_allocation(
            DaeSession::create(),
            "DaeSession::create",
            FlagCheck::Allocation,
        )?;
        let flag = session.init(self.t0, self.y0.as_slice(), self.ydot0.as_slice());
        check_flag(&flag, "DaeSession::init", FlagCheck::ReturnFlag)?;
        let flag = session.sv_tolerances(self.reltol, self.abstol.as_slice());
        check_flag(&flag, "DaeSession::sv_tolerances", FlagCheck::ReturnFlag)?;
        let flag = session.set_options(self.options.clone());
        check_flag(&flag, "DaeSession::set_options", FlagCheck::ReturnFlag)?;
        let flag = session.set_id(self.component_id.as_slice());
        check_flag(&flag, "DaeSession::set_id", FlagCheck::ReturnFlag)?;
        let linear_solver = check_allocation(
            DenseLinearSolver::new(self.n_eq),
            "DenseLinearSolver::new",
            FlagCheck::ComponentAllocation,
        )?;
        let flag = session.set_linear_solver(linear_solver);
        check_flag(&flag, "DaeSession::set_linear_solver", FlagCheck::ReturnFlag)?;
        if self.find_roots {
            let flag = session.root_init(self.n_roots);
            check_flag(&flag, "DaeSession::root_init", FlagCheck::ReturnFlag)?;
            self.roots_found = vec![0; self.n_roots];
        } else {
            self.roots_found.clear();
        }

        self.session = Some(session);
        self.t_int = self.t0;
        self.y.copy_from_slice(self.y0.as_slice());
        self.ydot.copy_from_slice(self.ydot0.as_slice());
        self.state = SessionState::Initialized;
        Ok(())
    }

    fn live_session(&self) -> Result<&DaeSession, IntegratorError> {
        match self.state {
            SessionState::Uninitialized => Err(integrator_error!(NotInitialized)),
            SessionState::Failed => Err(integrator_error!(SessionFailed)),
            _ => self.session.as_ref().ok_or(integrator_error!(NotInitialized)),
        }
    }

    fn trampoline(&self) -> Result<DaeTrampoline<'m>, IntegratorError> {
        let model = self.model.ok_or(integrator_error!(ModelNotSet))?;
        Ok(DaeTrampoline {
            model,
            n_eq: self.n_eq,
        })
    }

    /// Make `y` and `ydot` consistent at `t0`, keeping the differential components of `y`.
    /// Only valid between [Self::initialize] and the first [Self::integrate_to_time].
    pub fn calc_consistent_ic(&mut self) -> Result<(), IntegratorError> {
        self.live_session()?;
        if self.state != SessionState::Initialized {
            return Err(IntegratorError::InvalidState(
                "consistent initial conditions must be computed before the first step",
            ));
        }
        let trampoline = self.trampoline()?;
        let session = self.session.as_mut().ok_or(integrator_error!(NotInitialized))?;
        let flag = session.calc_ic(&trampoline);
        check_flag(&flag, "DaeSession::calc_ic", FlagCheck::ReturnFlag)?;
        let flag = session.get_consistent_ic(self.y.as_mut_slice(), self.ydot.as_mut_slice());
        check_flag(&flag, "DaeSession::get_consistent_ic", FlagCheck::ReturnFlag)
    }

    /// Advance the solution towards `t`, see [crate::OdeIntegrator::integrate_to_time]
    pub fn integrate_to_time(&mut self, t: RealType) -> Result<IntegratorStatus, IntegratorError> {
        self.live_session()?;
        if !t.is_finite() {
            return Err(IntegratorError::InvalidState("target time is not finite"));
        }
        let trampoline = self.trampoline()?;
        let session = self.session.as_mut().ok_or(integrator_error!(NotInitialized))?;
        let t_start = self.t_int;
        let mut tret = t_start;
        let flag = session.solve(
            &trampoline,
            t,
            self.y.as_mut_slice(),
            self.ydot.as_mut_slice(),
            &mut tret,
        );
        self.t_int = tret;
        if flag == TOO_MUCH_WORK {
            warn!(
                "maximum number of steps ({}) taken before t = {}, stopped at t = {}",
                self.options.max_num_steps, t, tret
            );
            self.state = SessionState::Stepping;
            return Err(integrator_error!(TooMuchWork, t: tret));
        }
        if let Err(err) = check_flag(&flag, "DaeSession::solve", FlagCheck::ReturnFlag) {
            // a rejected target leaves the session where it was
            if !(flag == ILL_INPUT && tret == t_start) {
                self.state = SessionState::Failed;
            }
            return Err(err);
        }
        if flag == ROOT_RETURN {
            self.get_root_info()?;
            self.state = SessionState::RootFound;
            Ok(IntegratorStatus::RootFound)
        } else {
            self.state = SessionState::Stepping;
            Ok(IntegratorStatus::Success)
        }
    }

    pub fn get_root_info(&mut self) -> Result<(), IntegratorError> {
        let session = self.session.as_ref().ok_or(integrator_error!(NotInitialized))?;
        if self.roots_found.is_empty() {
            return Err(integrator_error!(RootFindingDisabled));
        }
        let flag = session.get_root_info(&mut self.roots_found);
        check_flag(&flag, "DaeSession::get_root_info", FlagCheck::ReturnFlag)
    }

    fn get_dky(&self, t: RealType, k: IndexType) -> Result<SdVector, IntegratorError> {
        let session = self.live_session()?;
        let mut dky = SdVector::zeros(self.n_eq);
        let flag = session.get_dky(t, k, dky.as_mut_slice());
        check_flag(&flag, "DaeSession::get_dky", FlagCheck::ReturnFlag)?;
        Ok(dky)
    }

    /// Solution at any `t` within the last internal step
    pub fn interpolate(&self, t: RealType) -> Result<SdVector, IntegratorError> {
        self.get_dky(t, 0)
    }

    /// Derivative of the solution at any `t` within the last internal step
    pub fn interpolate_derivative(&self, t: RealType) -> Result<SdVector, IntegratorError> {
        self.get_dky(t, 1)
    }

    pub fn stats(&self) -> Result<Stats, IntegratorError> {
        let session = self.session.as_ref().ok_or(integrator_error!(NotInitialized))?;
        Ok(session.stats())
    }

    pub fn print_stats(&self) -> Result<(), IntegratorError> {
        let stats = self.stats()?;
        info!("DAE integrator statistics:\n{}", stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::integrator::test_models::exponential_decay_with_algebraic::{
        exponential_decay_with_algebraic_problem, ExponentialDecayWithAlgebraic,
    };
    use crate::stepper::flags::{IC_FAIL, RHSFUNC_FAIL};
    use crate::{ModelError, ModelResult};

    fn integrator(model: &ExponentialDecayWithAlgebraic) -> DaeIntegrator<'_> {
        let (_, y0, ydot0, _) = exponential_decay_with_algebraic_problem();
        let mut integrator = DaeIntegrator::new(2);
        integrator.y0 = y0;
        integrator.ydot0 = ydot0;
        integrator.component_id = SdVector::from_vec(vec![1.0, 0.0]);
        integrator.abstol.fill(1e-8);
        integrator.set_dae(model).unwrap();
        integrator
    }

    #[test]
    fn test_calc_consistent_ic() {
        let (model, _, _, _) = exponential_decay_with_algebraic_problem();
        let mut integrator = integrator(&model);
        assert_eq!(
            integrator.calc_consistent_ic(),
            Err(IntegratorError::NotInitialized)
        );
        integrator.initialize().unwrap();
        integrator.calc_consistent_ic().unwrap();
        assert!((integrator.y()[0] - 1.0).abs() < 1e-12);
        assert!((integrator.y()[1] - 1.0).abs() < 1e-12);
        assert!((integrator.ydot()[0] + 0.5).abs() < 1e-12);
        // y0 is left as configured
        assert_eq!(integrator.y0[1], 0.0);
    }

    #[test]
    fn test_exponential_decay_with_algebraic() {
        let (model, _, _, soln) = exponential_decay_with_algebraic_problem();
        let mut integrator = integrator(&model);
        integrator.initialize().unwrap();
        integrator.calc_consistent_ic().unwrap();
        for point in soln.solution_points.iter() {
            let status = integrator.integrate_to_time(point.t).unwrap();
            assert_eq!(status, IntegratorStatus::Success);
            assert_eq!(integrator.t_int(), point.t);
            for i in 0..2 {
                let expect = point.state[i];
                assert!(
                    (integrator.y()[i] - expect).abs() <= 1e-4 * expect,
                    "t = {}, y = {}",
                    point.t,
                    integrator.y()
                );
            }
            assert!((integrator.ydot()[0] + 0.5 * integrator.y()[0]).abs() < 1e-3);
        }
        let ydot = integrator.interpolate_derivative(integrator.t_int()).unwrap();
        assert!((ydot[0] - integrator.ydot()[0]).abs() < 1e-10);
        assert_eq!(
            integrator.calc_consistent_ic(),
            Err(IntegratorError::InvalidState(
                "consistent initial conditions must be computed before the first step"
            ))
        );
    }

    #[test]
    fn test_root_finding() {
        let (model, _, _, _) = exponential_decay_with_algebraic_problem();
        let mut integrator = integrator(&model);
        integrator.find_roots = true;
        integrator.n_roots = 1;
        integrator.initialize().unwrap();
        integrator.calc_consistent_ic().unwrap();
        let status = integrator.integrate_to_time(5.0).unwrap();
        assert_eq!(status, IntegratorStatus::RootFound);
        assert!((integrator.t_int() - 2.0 * 2.0f64.ln()).abs() < 1e-4);
        assert_eq!(integrator.roots_found(), &[-1]);
        let y = integrator.interpolate(integrator.t_int()).unwrap();
        assert!((y[0] - 0.5).abs() < 1e-5);
        integrator.print_stats().unwrap();
    }

    #[test]
    fn test_precondition_errors() {
        let (model, _, _, _) = exponential_decay_with_algebraic_problem();
        let mut integrator = DaeIntegrator::new(2);
        assert_eq!(
            integrator.integrate_to_time(1.0),
            Err(IntegratorError::NotInitialized)
        );
        assert_eq!(integrator.initialize(), Err(IntegratorError::ModelNotSet));
        integrator.set_dae(&model).unwrap();
        integrator.ydot0 = SdVector::zeros(1);
        assert_eq!(
            integrator.initialize(),
            Err(IntegratorError::DimensionMismatch {
                what: "ydot0",
                expected: 2,
                found: 1
            })
        );
        integrator.ydot0 = SdVector::zeros(2);
        integrator.component_id = SdVector::from_vec(vec![1.0, 2.0]);
        assert!(matches!(
            integrator.initialize(),
            Err(IntegratorError::SolverFailure { .. })
        ));
        integrator.component_id = SdVector::from_vec(vec![1.0, 0.0]);
        integrator.initialize().unwrap();
        assert_eq!(integrator.set_dae(&model), Err(IntegratorError::ModelRebind));
        assert_eq!(
            integrator.initialize(),
            Err(IntegratorError::AlreadyInitialized)
        );
    }

    // 0 = y^2 + 1 has no real solution
    struct NoSolution;

    impl DaeModel for NoSolution {
        fn f(
            &self,
            _t: RealType,
            y: &SdVectorView,
            _ydot: &SdVectorView,
            res: &mut SdVectorViewMut,
        ) -> ModelResult {
            res[0] = y[0] * y[0] + 1.0;
            Ok(())
        }
        fn jac(
            &self,
            _t: RealType,
            y: &SdVectorView,
            _ydot: &SdVectorView,
            _res: &SdVectorView,
            _c_j: RealType,
            jac: &mut SdMatrixViewMut,
        ) -> ModelResult {
            if y[0] == 0.0 {
                return Err(ModelError::Unrecoverable("singular".to_string()));
            }
            jac[(0, 0)] = 2.0 * y[0];
            Ok(())
        }
    }

    #[test]
    fn test_calc_consistent_ic_failure() {
        let model = NoSolution;
        let mut integrator = DaeIntegrator::new(1);
        integrator.y0[0] = 1.0;
        integrator.component_id[0] = 0.0;
        integrator.set_dae(&model).unwrap();
        integrator.initialize().unwrap();
        let err = integrator.calc_consistent_ic().unwrap_err();
        assert!(matches!(
            err,
            IntegratorError::SolverFailure { flag: IC_FAIL, .. }
        ));
        assert_eq!(integrator.state(), SessionState::Initialized);
    }

    #[test]
    fn test_root_info_requires_root_finding() {
        let (model, _, _, _) = exponential_decay_with_algebraic_problem();
        let mut integrator = integrator(&model);
        integrator.initialize().unwrap();
        assert_eq!(
            integrator.get_root_info(),
            Err(IntegratorError::RootFindingDisabled)
        );
        // enabling root finding after initialize does not add root functions
        integrator.find_roots = true;
        integrator.n_roots = 1;
        assert_eq!(
            integrator.get_root_info(),
            Err(IntegratorError::RootFindingDisabled)
        );
        integrator.calc_consistent_ic().unwrap();
        assert_eq!(
            integrator.integrate_to_time(5.0),
            Ok(IntegratorStatus::Success)
        );
    }

    #[test]
    fn test_too_much_work_is_retryable() {
        let (model, _, _, _) = exponential_decay_with_algebraic_problem();
        let mut integrator = integrator(&model);
        integrator.options.max_num_steps = 5;
        integrator.initialize().unwrap();
        integrator.calc_consistent_ic().unwrap();
        let err = integrator.integrate_to_time(4.0).unwrap_err();
        assert!(matches!(err, IntegratorError::TooMuchWork { .. }));
        assert!(integrator.t_int() > 0.0 && integrator.t_int() < 4.0);
        assert_eq!(integrator.state(), SessionState::Stepping);
        for _ in 0..1000 {
            match integrator.integrate_to_time(4.0) {
                Ok(status) => {
                    assert_eq!(status, IntegratorStatus::Success);
                    break;
                }
                Err(IntegratorError::TooMuchWork { .. }) => continue,
                Err(err) => panic!("unexpected error {}", err),
            }
        }
        assert_eq!(integrator.t_int(), 4.0);
        let expect = (-2.0f64).exp();
        assert!((integrator.y()[0] - expect).abs() < 1e-4);
        assert!((integrator.y()[1] - expect).abs() < 1e-4);
    }

    #[test]
    fn test_bad_target_time_keeps_session_usable() {
        let (model, _, _, _) = exponential_decay_with_algebraic_problem();
        let mut integrator = integrator(&model);
        integrator.initialize().unwrap();
        integrator.calc_consistent_ic().unwrap();
        integrator.integrate_to_time(1.0).unwrap();
        let err = integrator.integrate_to_time(-1.0).unwrap_err();
        assert!(matches!(
            err,
            IntegratorError::SolverFailure {
                flag: ILL_INPUT,
                ..
            }
        ));
        assert_eq!(integrator.state(), SessionState::Stepping);
        assert_eq!(integrator.t_int(), 1.0);
        assert!(matches!(
            integrator.integrate_to_time(RealType::NAN),
            Err(IntegratorError::InvalidState(_))
        ));
        assert_eq!(
            integrator.integrate_to_time(2.0),
            Ok(IntegratorStatus::Success)
        );
        assert!((integrator.y()[0] - (-1.0f64).exp()).abs() < 1e-4);
    }

    // y' = -y, 0 = z - y, with every residual call after `fail_after` failing
    struct Failing {
        calls: Cell<usize>,
        fail_after: usize,
    }

    impl DaeModel for Failing {
        fn f(
            &self,
            _t: RealType,
            y: &SdVectorView,
            ydot: &SdVectorView,
            res: &mut SdVectorViewMut,
        ) -> ModelResult {
            let calls = self.calls.get() + 1;
            self.calls.set(calls);
            if calls > self.fail_after {
                return Err(ModelError::Unrecoverable("blew up".to_string()));
            }
            res[0] = ydot[0] + y[0];
            res[1] = y[1] - y[0];
            Ok(())
        }
        fn jac(
            &self,
            _t: RealType,
            _y: &SdVectorView,
            _ydot: &SdVectorView,
            _res: &SdVectorView,
            c_j: RealType,
            jac: &mut SdMatrixViewMut,
        ) -> ModelResult {
            jac[(0, 0)] = 1.0 + c_j;
            jac[(1, 0)] = -1.0;
            jac[(1, 1)] = 1.0;
            Ok(())
        }
    }

    #[test]
    fn test_unrecoverable_residual_error_fails_session() {
        let model = Failing {
            calls: Cell::new(0),
            fail_after: 10,
        };
        let mut integrator = DaeIntegrator::new(2);
        integrator.y0 = SdVector::from_vec(vec![1.0, 1.0]);
        integrator.ydot0 = SdVector::from_vec(vec![-1.0, -1.0]);
        integrator.component_id = SdVector::from_vec(vec![1.0, 0.0]);
        integrator.set_dae(&model).unwrap();
        integrator.initialize().unwrap();
        let err = integrator.integrate_to_time(1.0).unwrap_err();
        assert!(matches!(
            err,
            IntegratorError::SolverFailure {
                flag: RHSFUNC_FAIL,
                ..
            }
        ));
        assert_eq!(integrator.state(), SessionState::Failed);
        assert!(integrator.t_int() < 1.0);
        assert_eq!(
            integrator.integrate_to_time(2.0),
            Err(IntegratorError::SessionFailed)
        );
        assert_eq!(
            integrator.interpolate(0.0),
            Err(IntegratorError::SessionFailed)
        );
    }
}
