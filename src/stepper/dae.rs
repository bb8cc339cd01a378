use nalgebra::{DMatrix, DVector};

use super::engine::{Engine, ImplicitSystem};
use super::flags::*;
use super::{
    impl_session_common, DaeCallbacks, DenseLinearSolver, LinearMultistep, NonlinearIteration,
    SolverOptions, Stats,
};
use crate::{IndexType, RealType};

struct DaeSystem<'a, C: DaeCallbacks + ?Sized> {
    callbacks: &'a C,
}

impl<C: DaeCallbacks + ?Sized> ImplicitSystem for DaeSystem<'_, C> {
    fn residual(
        &mut self,
        t: RealType,
        y: &[RealType],
        yp: &[RealType],
        res: &mut [RealType],
    ) -> i32 {
        self.callbacks.res(t, y, yp, res)
    }

    fn setup(
        &mut self,
        t: RealType,
        cj: RealType,
        y: &[RealType],
        yp: &[RealType],
        res: &[RealType],
        matrix: &mut DMatrix<RealType>,
    ) -> i32 {
        self.callbacks.jac(t, cj, y, yp, res, matrix.as_mut_slice())
    }

    fn roots(
        &mut self,
        t: RealType,
        y: &[RealType],
        yp: &[RealType],
        gout: &mut [RealType],
    ) -> i32 {
        self.callbacks.roots(t, y, yp, gout)
    }
}

/// A stepper session for implicit problems `F(t, y, y') = 0`, integrated with BDF formulas
/// and a modified Newton iteration.
///
/// Create with [DaeSession::create], then call [DaeSession::init] before any other function.
pub struct DaeSession {
    engine: Engine,
    id: Option<DVector<RealType>>,
}

impl DaeSession {
    pub fn create() -> Option<Self> {
        Some(Self {
            engine: Engine::new(LinearMultistep::Bdf, NonlinearIteration::Newton),
            id: None,
        })
    }

    /// Allocate the session for the initial condition `y(t0) = y0`, `y'(t0) = yp0`
    pub fn init(&mut self, t0: RealType, y0: &[RealType], yp0: &[RealType]) -> i32 {
        self.id = None;
        self.engine.init(t0, y0, yp0)
    }

    /// Mark each component as differential (1.0) or algebraic (0.0)
    pub fn set_id(&mut self, id: &[RealType]) -> i32 {
        if !self.engine.is_initialized() {
            return NO_MALLOC;
        }
        if id.len() != self.engine.n() || id.iter().any(|&v| v != 0.0 && v != 1.0) {
            return ILL_INPUT;
        }
        self.id = Some(DVector::from_column_slice(id));
        SUCCESS
    }

    /// Correct the algebraic components of `y0` and the differential components of `yp0`
    /// so that the residual vanishes at `t0`. Requires [DaeSession::set_id] and a linear
    /// solver, and must be called before the first [DaeSession::solve].
    pub fn calc_ic<C: DaeCallbacks + ?Sized>(&mut self, callbacks: &C) -> i32 {
        let id = match self.id.as_ref() {
            Some(id) => id,
            None => return ILL_INPUT,
        };
        let mut system = DaeSystem { callbacks };
        self.engine.calc_ic(&mut system, id.as_slice())
    }

    /// The current `(y, y')` at the last internal time, e.g. after [DaeSession::calc_ic]
    pub fn get_consistent_ic(&self, y: &mut [RealType], yp: &mut [RealType]) -> i32 {
        if !self.engine.is_initialized() {
            return NO_MALLOC;
        }
        let (_, yn, ypn) = self.engine.current();
        if y.len() != yn.len() || yp.len() != ypn.len() {
            return ILL_INPUT;
        }
        y.copy_from_slice(yn);
        yp.copy_from_slice(ypn);
        SUCCESS
    }

    /// Integrate towards `tout`, writing `y` and `y'` at `tret` into `yout` and `ypout`
    pub fn solve<C: DaeCallbacks + ?Sized>(
        &mut self,
        callbacks: &C,
        tout: RealType,
        yout: &mut [RealType],
        ypout: &mut [RealType],
        tret: &mut RealType,
    ) -> i32 {
        let mut system = DaeSystem { callbacks };
        self.engine.solve(&mut system, tout, yout, Some(ypout), tret)
    }
}

impl_session_common!(DaeSession);
