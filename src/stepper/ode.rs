use nalgebra::DMatrix;

use super::engine::{Engine, ImplicitSystem};
use super::flags::*;
use super::{
    impl_session_common, DenseLinearSolver, LinearMultistep, NonlinearIteration, OdeCallbacks,
    SolverOptions, Stats,
};
use crate::{IndexType, RealType};

/// Integrates `y' = f(t, y)` as the implicit system `y' - f(t, y) = 0`
struct OdeSystem<'a, C: OdeCallbacks + ?Sized> {
    callbacks: &'a C,
}

impl<C: OdeCallbacks + ?Sized> ImplicitSystem for OdeSystem<'_, C> {
    fn initial_derivative(
        &mut self,
        t: RealType,
        y: &[RealType],
        yp: &mut [RealType],
    ) -> Option<i32> {
        Some(self.callbacks.rhs(t, y, yp))
    }

    fn residual(
        &mut self,
        t: RealType,
        y: &[RealType],
        yp: &[RealType],
        res: &mut [RealType],
    ) -> i32 {
        let flag = self.callbacks.rhs(t, y, res);
        if flag != 0 {
            return flag;
        }
        for (r, &yp) in res.iter_mut().zip(yp) {
            *r = yp - *r;
        }
        0
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
        let fy: Vec<RealType> = yp.iter().zip(res).map(|(yp, r)| yp - r).collect();
        let flag = self.callbacks.jac(t, y, &fy, matrix.as_mut_slice());
        if flag != 0 {
            return flag;
        }
        // cj I - J
        matrix.neg_mut();
        for i in 0..matrix.nrows() {
            matrix[(i, i)] += cj;
        }
        0
    }

    fn roots(
        &mut self,
        t: RealType,
        y: &[RealType],
        _yp: &[RealType],
        gout: &mut [RealType],
    ) -> i32 {
        self.callbacks.roots(t, y, gout)
    }
}

/// A stepper session for explicit problems `y' = f(t, y)`.
///
/// Create with [OdeSession::create], then call [OdeSession::init] before any other
/// function. The derivative at `t0` is evaluated at the first call to [OdeSession::solve].
pub struct OdeSession {
    engine: Engine,
}

impl OdeSession {
    pub fn create(method: LinearMultistep, iteration: NonlinearIteration) -> Option<Self> {
        Some(Self {
            engine: Engine::new(method, iteration),
        })
    }

    /// Allocate the session for the initial condition `y(t0) = y0`
    pub fn init(&mut self, t0: RealType, y0: &[RealType]) -> i32 {
        let yp0 = vec![0.0; y0.len()];
        self.engine.init(t0, y0, &yp0)
    }

    /// Integrate towards `tout`. On return `yout` holds the solution at `tret`, which is
    /// `tout` on [SUCCESS], the root time on [ROOT_RETURN] and the last internal time otherwise.
    pub fn solve<C: OdeCallbacks + ?Sized>(
        &mut self,
        callbacks: &C,
        tout: RealType,
        yout: &mut [RealType],
        tret: &mut RealType,
    ) -> i32 {
        let mut system = OdeSystem { callbacks };
        self.engine.solve(&mut system, tout, yout, None, tret)
    }
}

impl_session_common!(OdeSession);

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    // y0' = -y0, y1' = y0 - 2 y1
    struct Chain {
        nroots: Cell<usize>,
    }

    impl OdeCallbacks for Chain {
        fn rhs(&self, _t: RealType, y: &[RealType], ydot: &mut [RealType]) -> i32 {
            ydot[0] = -y[0];
            ydot[1] = y[0] - 2.0 * y[1];
            0
        }
        fn jac(
            &self,
            _t: RealType,
            _y: &[RealType],
            _fy: &[RealType],
            jac: &mut [RealType],
        ) -> i32 {
            jac[0] = -1.0;
            jac[1] = 1.0;
            jac[3] = -2.0;
            0
        }
        fn roots(&self, t: RealType, _y: &[RealType], gout: &mut [RealType]) -> i32 {
            self.nroots.set(self.nroots.get() + 1);
            gout[0] = t - 0.25;
            0
        }
    }

    fn exact(t: RealType) -> [RealType; 2] {
        [(-t).exp(), (-t).exp() - (-2.0 * t).exp()]
    }

    #[test]
    fn test_ode_session_solve() {
        let chain = Chain { nroots: Cell::new(0) };
        let mut session =
            OdeSession::create(LinearMultistep::Bdf, NonlinearIteration::Newton).unwrap();
        assert_eq!(session.init(0.0, &[1.0, 0.0]), SUCCESS);
        assert_eq!(session.ss_tolerances(1e-6, 1e-9), SUCCESS);
        assert_eq!(session.set_linear_solver(DenseLinearSolver::new(2).unwrap()), SUCCESS);
        assert_eq!(session.root_init(1), SUCCESS);

        let mut y = [0.0; 2];
        let mut tret = 0.0;
        assert_eq!(session.solve(&chain, 1.0, &mut y, &mut tret), ROOT_RETURN);
        assert!((tret - 0.25).abs() < 1e-8);
        let mut roots = [0];
        assert_eq!(session.get_root_info(&mut roots), SUCCESS);
        assert_eq!(roots, [1]);

        assert_eq!(session.solve(&chain, 1.0, &mut y, &mut tret), SUCCESS);
        assert_eq!(tret, 1.0);
        let expect = exact(1.0);
        for i in 0..2 {
            assert!((y[i] - expect[i]).abs() < 1e-4, "y = {:?}", y);
        }
        let stats = session.stats();
        assert!(stats.number_of_steps > 0);
        assert!(stats.number_of_jacobian_evals > 0);
        assert_eq!(stats.number_of_root_evals, chain.nroots.get());
    }

    #[test]
    fn test_ode_session_options() {
        let mut session =
            OdeSession::create(LinearMultistep::Adams, NonlinearIteration::Functional).unwrap();
        assert_eq!(session.ss_tolerances(1e-6, 1e-9), NO_MALLOC);
        assert_eq!(session.init(0.0, &[1.0, 0.0]), SUCCESS);
        assert_eq!(session.set_max_order(6), ILL_INPUT);
        assert_eq!(session.set_max_order(3), SUCCESS);
        assert_eq!(session.set_max_num_steps(0), ILL_INPUT);
        assert_eq!(session.set_max_num_steps(20), SUCCESS);
        assert_eq!(session.options().max_num_steps, 20);
        assert_eq!(session.sv_tolerances(1e-6, &[1e-9]), ILL_INPUT);
        assert_eq!(session.set_linear_solver(DenseLinearSolver::new(3).unwrap()), ILL_INPUT);
        let mut roots = [0];
        assert_eq!(session.get_root_info(&mut roots), ILL_INPUT);
    }

    #[test]
    fn test_too_much_work_then_continue() {
        let chain = Chain { nroots: Cell::new(0) };
        let mut session =
            OdeSession::create(LinearMultistep::Adams, NonlinearIteration::Functional).unwrap();
        session.init(0.0, &[1.0, 0.0]);
        session.ss_tolerances(1e-6, 1e-9);
        session.set_max_num_steps(5);
        let mut y = [0.0; 2];
        let mut tret = 0.0;
        assert_eq!(session.solve(&chain, 1.0, &mut y, &mut tret), TOO_MUCH_WORK);
        assert!(tret > 0.0 && tret < 1.0);
        session.set_max_num_steps(5000);
        assert_eq!(session.solve(&chain, 1.0, &mut y, &mut tret), SUCCESS);
        let expect = exact(1.0);
        assert!((y[0] - expect[0]).abs() < 1e-4);
    }

    struct Failing;

    impl OdeCallbacks for Failing {
        fn rhs(&self, t: RealType, y: &[RealType], ydot: &mut [RealType]) -> i32 {
            if t > 0.5 {
                return -1;
            }
            ydot[0] = -y[0];
            0
        }
        fn jac(
            &self,
            _t: RealType,
            _y: &[RealType],
            _fy: &[RealType],
            jac: &mut [RealType],
        ) -> i32 {
            jac[0] = -1.0;
            0
        }
        fn roots(&self, _t: RealType, _y: &[RealType], _gout: &mut [RealType]) -> i32 {
            0
        }
    }

    #[test]
    fn test_unrecoverable_rhs_failure() {
        let mut session =
            OdeSession::create(LinearMultistep::Bdf, NonlinearIteration::Newton).unwrap();
        session.init(0.0, &[1.0]);
        session.ss_tolerances(1e-6, 1e-9);
        session.set_linear_solver(DenseLinearSolver::new(1).unwrap());
        let mut y = [0.0];
        let mut tret = 0.0;
        assert_eq!(session.solve(&Failing, 1.0, &mut y, &mut tret), RHSFUNC_FAIL);
        assert!(tret <= 0.5);
    }
}
