use log::{info, warn};

use super::{
    check_allocation, check_flag, check_len, model_flag, FlagCheck, IntegratorStatus, SessionState,
};
use crate::error::IntegratorError;
use crate::stepper::{
    flags::{ILL_INPUT, ROOT_RETURN, TOO_MUCH_WORK},
    DenseLinearSolver, LinearMultistep, NonlinearIteration, OdeCallbacks, OdeSession,
    SolverOptions, Stats,
};
use crate::{
    integrator_error, IndexType, OdeModel, RealType, SdMatrixViewMut, SdVector, SdVectorView,
    SdVectorViewMut,
};

/// Forwards the stepper's raw-buffer callbacks to an [OdeModel]
struct OdeTrampoline<'a> {
    model: &'a dyn OdeModel,
    n_eq: IndexType,
}

impl OdeCallbacks for OdeTrampoline<'_> {
    fn rhs(&self, t: RealType, y: &[RealType], ydot: &mut [RealType]) -> i32 {
        let y = SdVectorView::new(y);
        let mut ydot = SdVectorViewMut::new(ydot);
        model_flag(self.model.f(t, &y, &mut ydot), "f")
    }

    fn jac(&self, t: RealType, y: &[RealType], fy: &[RealType], jac: &mut [RealType]) -> i32 {
        let y = SdVectorView::new(y);
        let fy = SdVectorView::new(fy);
        let mut jac = SdMatrixViewMut::new(jac, self.n_eq, self.n_eq);
        model_flag(self.model.jac(t, &y, &fy, &mut jac), "jac")
    }

    fn roots(&self, t: RealType, y: &[RealType], gout: &mut [RealType]) -> i32 {
        let y = SdVectorView::new(y);
        let mut gout = SdVectorViewMut::new(gout);
        model_flag(self.model.g(t, &y, &mut gout), "g")
    }
}

/// Integrates an [OdeModel] `y' = f(t, y)` with a variable-step Adams or BDF method.
///
/// Configure the public fields, attach a model with [OdeIntegrator::set_ode] and call
/// [OdeIntegrator::initialize]. Changes to the configuration after `initialize` have no effect.
///
/// # Example
///
/// ```
/// use sdsolve::{
///     IntegratorStatus, ModelResult, OdeIntegrator, OdeModel, SdMatrixViewMut, SdVectorView,
///     SdVectorViewMut,
/// };
///
/// struct Decay;
///
/// impl OdeModel for Decay {
///     fn f(&self, _t: f64, y: &SdVectorView, ydot: &mut SdVectorViewMut) -> ModelResult {
///         ydot[0] = -y[0];
///         Ok(())
///     }
///     fn jac(
///         &self,
///         _t: f64,
///         _y: &SdVectorView,
///         _fy: &SdVectorView,
///         jac: &mut SdMatrixViewMut,
///     ) -> ModelResult {
///         jac[(0, 0)] = -1.0;
///         Ok(())
///     }
/// }
///
/// let model = Decay;
/// let mut integrator = OdeIntegrator::new(1);
/// integrator.y0[0] = 1.0;
/// integrator.set_ode(&model).unwrap();
/// integrator.initialize().unwrap();
/// let status = integrator.integrate_to_time(1.0).unwrap();
/// assert_eq!(status, IntegratorStatus::Success);
/// let exact = (-1.0f64).exp();
/// assert!((integrator.y()[0] - exact).abs() <= integrator.reltol * exact + 1e-6);
/// ```
pub struct OdeIntegrator<'m> {
    pub reltol: RealType,
    /// Absolute tolerance per component
    pub abstol: SdVector,
    pub linear_multistep_method: LinearMultistep,
    pub nonlinear_solver_method: NonlinearIteration,
    pub find_roots: bool,
    /// Number of root functions evaluated by [OdeModel::g]
    pub n_roots: IndexType,
    pub t0: RealType,
    pub y0: SdVector,
    pub options: SolverOptions,

    n_eq: IndexType,
    model: Option<&'m dyn OdeModel>,
    session: Option<OdeSession>,
    state: SessionState,
    t_int: RealType,
    y: SdVector,
    roots_found: Vec<i32>,
}

impl<'m> OdeIntegrator<'m> {
    /// A BDF integrator with Newton iteration for `n_eq` equations, with both tolerances
    /// set to 1e-6 and `y0` zero.
    pub fn new(n_eq: IndexType) -> Self {
        Self {
            reltol: 1e-6,
            abstol: SdVector::from_element(n_eq, 1e-6),
            linear_multistep_method: LinearMultistep::Bdf,
            nonlinear_solver_method: NonlinearIteration::Newton,
            find_roots: false,
            n_roots: 0,
            t0: 0.0,
            y0: SdVector::zeros(n_eq),
            options: SolverOptions::default(),
            n_eq,
            model: None,
            session: None,
            state: SessionState::Uninitialized,
            t_int: 0.0,
            y: SdVector::zeros(n_eq),
            roots_found: Vec::new(),
        }
    }

    pub fn n_eq(&self) -> IndexType {
        self.n_eq
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Time reached by the last call to [Self::integrate_to_time]
    pub fn t_int(&self) -> RealType {
        self.t_int
    }

    /// Solution at [Self::t_int]
    pub fn y(&self) -> &SdVector {
        &self.y
    }

    /// Root directions from the last root return, see [Self::get_root_info]
    pub fn roots_found(&self) -> &[i32] {
        &self.roots_found
    }

    /// Attach the model. The integrator borrows it for its whole lifetime.
    pub fn set_ode(&mut self, model: &'m dyn OdeModel) -> Result<(), IntegratorError> {
        if self.state != SessionState::Uninitialized {
            return Err(integrator_error!(ModelRebind));
        }
        self.model = Some(model);
        Ok(())
    }

    /// Create the stepper session and register the configuration and callbacks
    pub fn initialize(&mut self) -> Result<(), IntegratorError> {
        if self.state != SessionState::Uninitialized {
            return Err(integrator_error!(AlreadyInitialized));
        }
        if self.model.is_none() {
            return Err(integrator_error!(ModelNotSet));
        }
        check_len("y0", self.n_eq, self.y0.len())?;
        check_len("abstol", self.n_eq, self.abstol.len())?;
        if self.find_roots && self.n_roots == 0 {
            return Err(IntegratorError::InvalidState(
                "root finding needs at least one root function",
            ));
        }

        let mut session = check_allocation(
            OdeSession::create(self.linear_multistep_method, self.nonlinear_solver_method),
            "OdeSession::create",
            FlagCheck::Allocation,
        )?;
        let flag = session.init(self.t0, self.y0.as_slice());
        check_flag(&flag, "OdeSession::init", FlagCheck::ReturnFlag)?;
        let flag = session.sv_tolerances(self.reltol, self.abstol.as_slice());
        check_flag(&flag, "OdeSession::sv_tolerances", FlagCheck::ReturnFlag)?;
        let flag = session.set_options(self.options.clone());
        check_flag(&flag, "OdeSession::set_options", FlagCheck::ReturnFlag)?;
        if self.nonlinear_solver_method == NonlinearIteration::Newton {
            let linear_solver = check_allocation(
                DenseLinearSolver::new(self.n_eq),
                "DenseLinearSolver::new",
                FlagCheck::ComponentAllocation,
            )?;
            let flag = session.set_linear_solver(linear_solver);
            check_flag(&flag, "OdeSession::set_linear_solver", FlagCheck::ReturnFlag)?;
        }
        if self.find_roots {
            let flag = session.root_init(self.n_roots);
            check_flag(&flag, "OdeSession::root_init", FlagCheck::ReturnFlag)?;
            self.roots_found = vec![0; self.n_roots];
        } else {
            self.roots_found.clear();
        }

        self.session = Some(session);
        self.t_int = self.t0;
        self.y.copy_from_slice(self.y0.as_slice());
        self.state = SessionState::Initialized;
        Ok(())
    }

    fn live_session(&self) -> Result<&OdeSession, IntegratorError> {
        match self.state {
            SessionState::Uninitialized => Err(integrator_error!(NotInitialized)),
            SessionState::Failed => Err(integrator_error!(SessionFailed)),
            _ => self.session.as_ref().ok_or(integrator_error!(NotInitialized)),
        }
    }

    /// Advance the solution towards `t`.
    ///
    /// Stops early at a root if root finding is enabled, in which case [Self::roots_found]
    /// is updated. On return [Self::t_int] and [Self::y] hold the time and solution reached.
    ///
    /// A target that is not finite or lies behind the last internal step is rejected without
    /// changing the session.
    pub fn integrate_to_time(&mut self, t: RealType) -> Result<IntegratorStatus, IntegratorError> {
        self.live_session()?;
        if !t.is_finite() {
            return Err(IntegratorError::InvalidState("target time is not finite"));
        }
        let (session, model) = match (self.session.as_mut(), self.model) {
            (Some(session), Some(model)) => (session, model),
            _ => return Err(integrator_error!(NotInitialized)),
        };
        let trampoline = OdeTrampoline {
            model,
            n_eq: self.n_eq,
        };
        let t_start = self.t_int;
        let mut tret = t_start;
        let flag = session.solve(&trampoline, t, self.y.as_mut_slice(), &mut tret);
        self.t_int = tret;
        if flag == TOO_MUCH_WORK {
            warn!(
                "maximum number of steps ({}) taken before t = {}, stopped at t = {}",
                self.options.max_num_steps, t, tret
            );
            self.state = SessionState::Stepping;
            return Err(integrator_error!(TooMuchWork, t: tret));
        }
        if let Err(err) = check_flag(&flag, "OdeSession::solve", FlagCheck::ReturnFlag) {
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

    /// Fetch the directions of the roots found by the last root return into
    /// [Self::roots_found]: `1` rising, `-1` falling, `0` did not fire.
    pub fn get_root_info(&mut self) -> Result<(), IntegratorError> {
        let session = self.session.as_ref().ok_or(integrator_error!(NotInitialized))?;
        if self.roots_found.is_empty() {
            return Err(integrator_error!(RootFindingDisabled));
        }
        let flag = session.get_root_info(&mut self.roots_found);
        check_flag(&flag, "OdeSession::get_root_info", FlagCheck::ReturnFlag)
    }

    /// Solution at any `t` within the last internal step
    pub fn interpolate(&self, t: RealType) -> Result<SdVector, IntegratorError> {
        let session = self.live_session()?;
        let mut y = SdVector::zeros(self.n_eq);
        let flag = session.get_dky(t, 0, y.as_mut_slice());
        check_flag(&flag, "OdeSession::get_dky", FlagCheck::ReturnFlag)?;
        Ok(y)
    }

    pub fn stats(&self) -> Result<Stats, IntegratorError> {
        let session = self.session.as_ref().ok_or(integrator_error!(NotInitialized))?;
        Ok(session.stats())
    }

    /// Log the solver counters at `info` level
    pub fn print_stats(&self) -> Result<(), IntegratorError> {
        let stats = self.stats()?;
        info!("ODE integrator statistics:\n{}", stats);
        Ok(())
    }
}
