//! Variable-order, variable-step multistep integration of implicit systems `F(t, y, y') = 0`.
//!
//! The solution history is held as backward differences on an equally spaced grid of spacing
//! `h`. Changing the step size re-interpolates the differences onto the new grid. The BDF
//! family (orders 1 to 5, as numerical differentiation formulas) differences `y`, the
//! Adams-Moulton family (orders 1 to 5) differences `h y'`. Each step solves the corrector
//! equation `F(t1, y, c_j (y - a)) = 0` by Newton or functional iteration, and an explicit
//! ODE `y' = f(t, y)` is integrated as `F = y' - f(t, y)`.
//!
//! The local error is tested per unit step for steps shorter than one time unit, so that the
//! global error stays proportional to the tolerances.
//!
//! References:
//! - Shampine, L. F., & Reichelt, M. W. (1997). The MATLAB ODE suite. SIAM Journal on
//!   Scientific Computing, 18(1), 1-22.
//! - Hairer, E., Norsett, S. P., & Wanner, G. (1993). Solving Ordinary Differential
//!   Equations I, chapter III.1.
use std::ops::AddAssign;

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::convergence::{Convergence, ConvergenceStatus};
use super::flags::*;
use super::linear::DenseLinearSolver;
use super::root::RootFinder;
use super::{LinearMultistep, NonlinearIteration, SolverOptions, Stats};
use crate::{scalar::wrms_norm, IndexType, RealType, UNIT_ROUNDOFF};

/// Highest order of either formula family
pub(crate) const MAX_ORDER: IndexType = 5;

// Adams-Bashforth coefficients of the predictor
const ADAMS_PREDICTOR: [RealType; MAX_ORDER] =
    [1.0, 1.0 / 2.0, 5.0 / 12.0, 3.0 / 8.0, 251.0 / 720.0];

// magnitudes of the Adams-Moulton coefficients, the error constant of order q is entry q
const ADAMS_ERROR: [RealType; MAX_ORDER + 1] = [
    1.0,
    1.0 / 2.0,
    1.0 / 12.0,
    1.0 / 24.0,
    19.0 / 720.0,
    3.0 / 160.0,
];

/// The raw-buffer view of a problem that the [Engine] steps.
///
/// Return values follow the callback convention: 0 on success, positive for a
/// recoverable failure and negative for an unrecoverable one.
pub(crate) trait ImplicitSystem {
    /// Called once before the first step; may overwrite `yp` with a consistent derivative.
    /// Returns `None` if nothing was evaluated.
    fn initial_derivative(
        &mut self,
        _t: RealType,
        _y: &[RealType],
        _yp: &mut [RealType],
    ) -> Option<i32> {
        None
    }

    fn residual(
        &mut self,
        t: RealType,
        y: &[RealType],
        yp: &[RealType],
        res: &mut [RealType],
    ) -> i32;

    /// Fill the zeroed `matrix` with `dF/dy + cj dF/dy'`. `res` holds `F(t, y, yp)`.
    fn setup(
        &mut self,
        t: RealType,
        cj: RealType,
        y: &[RealType],
        yp: &[RealType],
        res: &[RealType],
        matrix: &mut DMatrix<RealType>,
    ) -> i32;

    fn roots(&mut self, t: RealType, y: &[RealType], yp: &[RealType], gout: &mut [RealType])
        -> i32;
}

enum NlsFailure {
    Recoverable,
    Fatal(i32),
}

/// Coefficients of the numerical differentiation formulas
struct BdfCoefficients {
    gamma: [RealType; MAX_ORDER + 1],
    // (1 - kappa) gamma
    alpha: [RealType; MAX_ORDER + 1],
    error_const: [RealType; MAX_ORDER + 1],
}

impl BdfCoefficients {
    fn new() -> Self {
        // kappa values for difference orders, taken from Table 1 of Shampine & Reichelt
        let kappa = [0.0, -0.1850, -1.0 / 9.0, -0.0823, -0.0415, 0.0];
        let mut gamma = [0.0; MAX_ORDER + 1];
        let mut alpha = [0.0; MAX_ORDER + 1];
        let mut error_const = [1.0; MAX_ORDER + 1];
        for i in 1..=MAX_ORDER {
            let i_t = i as RealType;
            gamma[i] = gamma[i - 1] + 1.0 / i_t;
            alpha[i] = (1.0 - kappa[i]) * gamma[i];
            error_const[i] = kappa[i] * gamma[i] + 1.0 / (i_t + 1.0);
        }
        Self {
            gamma,
            alpha,
            error_const,
        }
    }
}

/// Computes the R matrix with entries given by the first equation on page 8 of Shampine &
/// Reichelt, used to update the differences when the step size changes by
/// `factor = h_new / h`. `factor = 1` gives the U matrix of the same section.
fn compute_r(order: IndexType, factor: RealType) -> DMatrix<RealType> {
    let mut r = DMatrix::zeros(order + 1, order + 1);
    for j in 0..=order {
        r[(0, j)] = 1.0;
    }
    for i in 1..=order {
        for j in 1..=order {
            let i_t = i as RealType;
            let j_t = j as RealType;
            r[(i, j)] = r[(i - 1, j)] * (i_t - 1.0 - factor * j_t) / i_t;
        }
    }
    r
}

/// Solution at the last internal time and the backward differences behind it
struct History {
    method: LinearMultistep,
    order: IndexType,
    // spacing of the difference grid, the size of the next step
    h: RealType,
    tn: RealType,
    t_prev: RealType,
    yn: DVector<RealType>,
    ypn: DVector<RealType>,
    // column j holds the j-th backward difference of y (BDF) or h y' (Adams)
    diff: DMatrix<RealType>,
}

impl History {
    fn new(method: LinearMultistep, t0: RealType, y0: &[RealType], yp0: &[RealType]) -> Self {
        Self {
            method,
            order: 1,
            h: 0.0,
            tn: t0,
            t_prev: t0,
            yn: DVector::from_column_slice(y0),
            ypn: DVector::from_column_slice(yp0),
            diff: DMatrix::zeros(y0.len(), MAX_ORDER + 3),
        }
    }

    /// Size of the last accepted step, zero before the first
    fn h_used(&self) -> RealType {
        self.tn - self.t_prev
    }

    fn fuzz(&self) -> RealType {
        100.0 * UNIT_ROUNDOFF * (self.tn.abs() + self.h_used().abs())
    }

    /// Degree of the highest difference the current order uses
    fn degree(&self) -> IndexType {
        match self.method {
            LinearMultistep::Bdf => self.order,
            LinearMultistep::Adams => self.order - 1,
        }
    }

    /// Reset to order 1 with a first step of size `h`
    fn start(&mut self, h: RealType) {
        self.order = 1;
        self.h = h;
        self.diff.fill(0.0);
        let hyp = &self.ypn * h;
        match self.method {
            LinearMultistep::Bdf => {
                self.diff.set_column(0, &self.yn);
                self.diff.set_column(1, &hyp);
            }
            LinearMultistep::Adams => self.diff.set_column(0, &hyp),
        }
    }

    /// Switch to `order` and scale the step size by `factor`
    fn rescale(&mut self, factor: RealType, order: IndexType) {
        self.order = order;
        self.h *= factor;
        let degree = self.degree();
        if degree > 0 {
            let ru = compute_r(degree, factor) * compute_r(degree, 1.0);
            let rescaled = self.diff.columns(0, degree + 1) * ru;
            self.diff.columns_mut(0, degree + 1).copy_from(&rescaled);
        }
        if self.method == LinearMultistep::Adams {
            // differences of h y' also carry the step size
            self.diff.columns_mut(0, degree + 1).scale_mut(factor);
        }
    }

    /// Fold an accepted step into the differences, `v` is the difference of order
    /// `degree + 1` at the new point
    fn update_differences(&mut self, v: &DVector<RealType>) {
        let degree = self.degree();
        let next = v - self.diff.column(degree + 1);
        self.diff.set_column(degree + 2, &next);
        self.diff.set_column(degree + 1, v);
        for i in (0..=degree).rev() {
            let higher = self.diff.column(i + 1).into_owned();
            self.diff.column_mut(i).add_assign(&higher);
        }
    }

    /// Weighted norm of difference column `j`
    fn column_norm(&self, j: IndexType, ewt: &DVector<RealType>) -> RealType {
        let n = self.diff.nrows();
        wrms_norm(&self.diff.as_slice()[j * n..(j + 1) * n], ewt.as_slice())
    }

    /// Value and derivative of the interpolating polynomial on `[t_prev, tn]`, returns false
    /// if `t` is outside
    fn interpolate(&self, t: RealType, y: &mut [RealType], yp: &mut [RealType]) -> bool {
        let fuzz = self.fuzz();
        if (t - self.tn).abs() <= fuzz {
            y.copy_from_slice(self.yn.as_slice());
            yp.copy_from_slice(self.ypn.as_slice());
            return true;
        }
        if self.h_used() == 0.0 || t < self.t_prev - fuzz || t > self.tn + fuzz {
            return false;
        }
        let h = self.h;
        let x = (t - self.tn) / h;
        yp.fill(0.0);
        match self.method {
            LinearMultistep::Bdf => {
                // y(t) = sum_j D_j p_j(x), p_j(x) = prod_{i<j} (x + i) / (i + 1)
                y.copy_from_slice(&self.diff.as_slice()[..y.len()]);
                let mut p = 1.0;
                let mut dp = 0.0;
                for j in 1..=self.order {
                    let i = (j - 1) as RealType;
                    dp = dp * (x + i) / (i + 1.0) + p / (i + 1.0);
                    p *= (x + i) / (i + 1.0);
                    for (k, dk) in self.diff.column(j).iter().enumerate() {
                        y[k] += p * dk;
                        yp[k] += dp * dk / h;
                    }
                }
            }
            LinearMultistep::Adams => {
                // h y'(t) = sum_j E_j q_j(x), with q_j like p_j above in monomial form
                y.copy_from_slice(self.yn.as_slice());
                let mut coeffs = vec![0.0; self.order + 1];
                coeffs[0] = 1.0;
                for j in 0..self.order {
                    if j > 0 {
                        let i = (j - 1) as RealType;
                        for m in (0..=j).rev() {
                            let lower = if m > 0 { coeffs[m - 1] } else { 0.0 };
                            coeffs[m] = (lower + i * coeffs[m]) / (i + 1.0);
                        }
                    }
                    let mut q = 0.0;
                    let mut q_int = 0.0;
                    let mut xm = 1.0;
                    for (m, c) in coeffs.iter().enumerate().take(j + 1) {
                        q += c * xm;
                        xm *= x;
                        q_int += c * xm / (m as RealType + 1.0);
                    }
                    for (k, ek) in self.diff.column(j).iter().enumerate() {
                        y[k] += q_int * ek;
                        yp[k] += q * ek / h;
                    }
                }
            }
        }
        true
    }
}

/// Corrector parameters of one step attempt
struct Prediction {
    cj: RealType,
    // scales the weighted norm of `y - pred` into the local error estimate
    error_coef: RealType,
    // scales `y - pred` into the new highest difference
    diff_scale: RealType,
}

pub(crate) struct Engine {
    method: LinearMultistep,
    iteration: NonlinearIteration,
    options: SolverOptions,
    n: IndexType,
    initialized: bool,
    started: bool,

    rtol: RealType,
    atol: DVector<RealType>,
    ewt: DVector<RealType>,
    hist: History,
    bdf: BdfCoefficients,
    n_equal_steps: IndexType,
    order_used: IndexType,

    linear_solver: Option<DenseLinearSolver>,
    convergence: Convergence,
    cj_setup: RealType,
    steps_since_setup: IndexType,
    setup_needed: bool,
    jac_fresh: bool,

    roots: Option<RootFinder>,
    roots_found: Vec<i32>,

    stats: Stats,

    // workspace
    a: DVector<RealType>,
    pred: DVector<RealType>,
    y_new: DVector<RealType>,
    yp_new: DVector<RealType>,
    res: DVector<RealType>,
    ytmp: DVector<RealType>,
    yptmp: DVector<RealType>,
}

impl Engine {
    const MAX_STEPS_BETWEEN_SETUPS: IndexType = 20;
    const MAX_CJ_CHANGE: RealType = 0.3;
    const CONV_FAIL_FACTOR: RealType = 0.25;
    const ERR_FAILS_BEFORE_ORDER_DROP: IndexType = 3;
    const MIN_FACTOR: RealType = 0.2;
    const MAX_FACTOR: RealType = 10.0;
    const MAX_IC_ITERS: IndexType = 10;
    const IC_CONV_TOL: RealType = 0.0033;

    pub fn new(method: LinearMultistep, iteration: NonlinearIteration) -> Self {
        let options = SolverOptions::default();
        let convergence = Convergence::new(options.nonlin_conv_coef, options.max_nonlin_iters);
        Self {
            method,
            iteration,
            options,
            n: 0,
            initialized: false,
            started: false,
            rtol: 0.0,
            atol: DVector::zeros(0),
            ewt: DVector::zeros(0),
            hist: History::new(method, 0.0, &[], &[]),
            bdf: BdfCoefficients::new(),
            n_equal_steps: 0,
            order_used: 0,
            linear_solver: None,
            convergence,
            cj_setup: 0.0,
            steps_since_setup: 0,
            setup_needed: true,
            jac_fresh: false,
            roots: None,
            roots_found: Vec::new(),
            stats: Stats::default(),
            a: DVector::zeros(0),
            pred: DVector::zeros(0),
            y_new: DVector::zeros(0),
            yp_new: DVector::zeros(0),
            res: DVector::zeros(0),
            ytmp: DVector::zeros(0),
            yptmp: DVector::zeros(0),
        }
    }

    pub fn init(&mut self, t0: RealType, y0: &[RealType], yp0: &[RealType]) -> i32 {
        let n = y0.len();
        if n == 0 || yp0.len() != n || !t0.is_finite() {
            return ILL_INPUT;
        }
        self.n = n;
        self.hist = History::new(self.method, t0, y0, yp0);
        self.atol = DVector::zeros(n);
        self.ewt = DVector::zeros(n);
        for v in [
            &mut self.a,
            &mut self.pred,
            &mut self.y_new,
            &mut self.yp_new,
            &mut self.res,
            &mut self.ytmp,
            &mut self.yptmp,
        ] {
            *v = DVector::zeros(n);
        }
        self.n_equal_steps = 0;
        self.order_used = 0;
        self.stats = Stats {
            current_time: t0,
            ..Stats::default()
        };
        self.initialized = true;
        self.started = false;
        self.setup_needed = true;
        SUCCESS
    }

    pub fn n(&self) -> IndexType {
        self.n
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn sv_tolerances(&mut self, rtol: RealType, atol: &[RealType]) -> i32 {
        if !self.initialized {
            return NO_MALLOC;
        }
        if atol.len() != self.n || rtol < 0.0 || atol.iter().any(|&a| a < 0.0) {
            return ILL_INPUT;
        }
        self.rtol = rtol;
        self.atol.copy_from_slice(atol);
        SUCCESS
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: SolverOptions) -> i32 {
        if options.max_num_steps == 0
            || !(1..=MAX_ORDER).contains(&options.max_order)
            || options.max_nonlin_iters == 0
            || options.max_err_test_fails == 0
            || options.max_conv_fails == 0
            || options.nonlin_conv_coef <= 0.0
            || options.max_step <= 0.0
            || options.min_step < 0.0
            || options.min_step > options.max_step
            || options.initial_step.is_some_and(|h| h <= 0.0)
        {
            return ILL_INPUT;
        }
        self.convergence.set_tol(options.nonlin_conv_coef);
        self.convergence.set_max_iter(options.max_nonlin_iters);
        self.options = options;
        SUCCESS
    }

    pub fn set_linear_solver(&mut self, linear_solver: DenseLinearSolver) -> i32 {
        if !self.initialized {
            return NO_MALLOC;
        }
        if linear_solver.n() != self.n {
            return ILL_INPUT;
        }
        self.linear_solver = Some(linear_solver);
        self.setup_needed = true;
        SUCCESS
    }

    pub fn root_init(&mut self, nroots: IndexType) -> i32 {
        if !self.initialized {
            return NO_MALLOC;
        }
        if nroots == 0 {
            self.roots = None;
            self.roots_found.clear();
        } else {
            self.roots = Some(RootFinder::new(nroots));
            self.roots_found = vec![0; nroots];
        }
        SUCCESS
    }

    pub fn get_root_info(&self, roots_found: &mut [i32]) -> i32 {
        if self.roots.is_none() {
            return ILL_INPUT;
        }
        if roots_found.len() != self.roots_found.len() {
            return ILL_INPUT;
        }
        roots_found.copy_from_slice(&self.roots_found);
        SUCCESS
    }

    pub fn stats(&self) -> Stats {
        Stats {
            last_order: self.order_used,
            last_step: self.hist.h_used(),
            current_step: self.hist.h,
            current_time: self.hist.tn,
            ..self.stats.clone()
        }
    }

    /// Interpolated `k`-th derivative (k = 0 or 1) of the solution within the last step
    pub fn get_dky(&self, t: RealType, k: IndexType, dky: &mut [RealType]) -> i32 {
        if !self.initialized {
            return NO_MALLOC;
        }
        if dky.len() != self.n {
            return ILL_INPUT;
        }
        if k > 1 {
            return BAD_K;
        }
        let mut y = vec![0.0; self.n];
        let mut yp = vec![0.0; self.n];
        if !self.hist.interpolate(t, &mut y, &mut yp) {
            return BAD_T;
        }
        dky.copy_from_slice(if k == 0 { &y } else { &yp });
        SUCCESS
    }

    fn set_weights(&mut self) -> bool {
        for i in 0..self.n {
            let w = self.rtol * self.hist.yn[i].abs() + self.atol[i];
            if w <= 0.0 {
                return false;
            }
            self.ewt[i] = 1.0 / w;
        }
        true
    }

    fn min_step(&self) -> RealType {
        RealType::max(self.options.min_step, 4.0 * UNIT_ROUNDOFF * self.hist.tn.abs())
    }

    fn initial_step(&self, tout: RealType) -> RealType {
        if let Some(h0) = self.options.initial_step {
            return h0.min(self.options.max_step);
        }
        let mut h0 = 0.001 * (tout - self.hist.tn);
        let ypnorm = wrms_norm(self.hist.ypn.as_slice(), self.ewt.as_slice());
        if ypnorm * h0 > 0.5 {
            h0 = 0.5 / ypnorm;
        }
        h0.min(self.options.max_step)
    }

    /// Error norms are taken per unit step for steps shorter than one time unit, down to the
    /// step size where roundoff in the weighted norm would dominate
    fn error_scale(&self, h: RealType) -> RealType {
        let floor = if self.rtol > 0.0 {
            (100.0 * UNIT_ROUNDOFF / self.rtol).min(1.0)
        } else {
            1.0
        };
        h.abs().clamp(floor, 1.0)
    }

    /// Step size factor that brings the error `err` of an order `order` step to one
    fn order_factor(err: RealType, order: IndexType, h: RealType) -> RealType {
        let p = if h.abs() < 1.0 { order } else { order + 1 };
        err.powf(-1.0 / p as RealType)
    }

    /// Fill `pred` and `a` for a step of the current size and order
    fn predict(&mut self) -> Prediction {
        let hist = &self.hist;
        let order = hist.order;
        let h = hist.h;
        match self.method {
            LinearMultistep::Bdf => {
                // pred = sum_{j<=k} D_j, a = pred - sum_{1<=j<=k} gamma_j D_j / alpha_k
                self.pred.fill(0.0);
                self.a.fill(0.0);
                for j in 0..=order {
                    let dj = hist.diff.column(j);
                    self.pred += &dj;
                    if j > 0 {
                        self.a.axpy(self.bdf.gamma[j], &dj, 1.0);
                    }
                }
                let alpha = self.bdf.alpha[order];
                self.a *= -1.0 / alpha;
                self.a += &self.pred;
                Prediction {
                    cj: alpha / h,
                    error_coef: self.bdf.error_const[order],
                    diff_scale: 1.0,
                }
            }
            LinearMultistep::Adams => {
                // pred = y_n + sum_{j<q} gamma_j E_j, a = pred - beta sum_{j<q} E_j
                self.pred.copy_from(&hist.yn);
                self.a.fill(0.0);
                for j in 0..order {
                    let ej = hist.diff.column(j);
                    self.pred.axpy(ADAMS_PREDICTOR[j], &ej, 1.0);
                    self.a += &ej;
                }
                let beta = ADAMS_PREDICTOR[order - 1];
                self.a *= -beta;
                self.a += &self.pred;
                Prediction {
                    cj: 1.0 / (beta * h),
                    error_coef: ADAMS_ERROR[order] / beta,
                    diff_scale: 1.0 / beta,
                }
            }
        }
    }

    fn eval_residual(
        &mut self,
        sys: &mut dyn ImplicitSystem,
        t: RealType,
    ) -> Result<(), NlsFailure> {
        let flag = sys.residual(
            t,
            self.y_new.as_slice(),
            self.yp_new.as_slice(),
            self.res.as_mut_slice(),
        );
        self.stats.number_of_function_evals += 1;
        match flag {
            0 => Ok(()),
            f if f > 0 => Err(NlsFailure::Recoverable),
            _ => Err(NlsFailure::Fatal(RHSFUNC_FAIL)),
        }
    }

    fn linear_setup(
        &mut self,
        sys: &mut dyn ImplicitSystem,
        t: RealType,
        cj: RealType,
    ) -> Result<(), NlsFailure> {
        self.eval_residual(sys, t)?;
        let linear_solver = match self.linear_solver.as_mut() {
            Some(ls) => ls,
            None => return Err(NlsFailure::Fatal(LINSOL_NULL)),
        };
        let matrix = linear_solver.matrix_mut();
        matrix.fill(0.0);
        let flag = sys.setup(
            t,
            cj,
            self.y_new.as_slice(),
            self.yp_new.as_slice(),
            self.res.as_slice(),
            matrix,
        );
        self.stats.number_of_jacobian_evals += 1;
        self.stats.number_of_linear_setups += 1;
        if flag < 0 {
            return Err(NlsFailure::Fatal(LSETUP_FAIL));
        }
        if flag > 0 {
            return Err(NlsFailure::Recoverable);
        }
        if !linear_solver.factorize() {
            debug!("singular iteration matrix at t = {}", t);
            return Err(NlsFailure::Recoverable);
        }
        self.cj_setup = cj;
        self.steps_since_setup = 0;
        self.setup_needed = false;
        self.jac_fresh = true;
        self.convergence.reset_rate();
        Ok(())
    }

    /// Solve the corrector equation, returns the number of iterations taken
    fn nonlinear_solve(
        &mut self,
        sys: &mut dyn ImplicitSystem,
        t: RealType,
        cj: RealType,
        err_scale: RealType,
    ) -> Result<IndexType, NlsFailure> {
        let newton = self.iteration == NonlinearIteration::Newton;
        if newton {
            let factorized = self
                .linear_solver
                .as_ref()
                .is_some_and(|ls| ls.is_factorized());
            if self.setup_needed
                || !factorized
                || (cj / self.cj_setup - 1.0).abs() > Self::MAX_CJ_CHANGE
                || self.steps_since_setup >= Self::MAX_STEPS_BETWEEN_SETUPS
            {
                self.linear_setup(sys, t, cj)?;
            }
        }
        self.convergence.reset();
        loop {
            self.eval_residual(sys, t)?;
            // res holds the correction
            if newton {
                let solved = self
                    .linear_solver
                    .as_ref()
                    .is_some_and(|ls| ls.solve_in_place(&mut self.res));
                if !solved {
                    return Err(NlsFailure::Fatal(LSOLVE_FAIL));
                }
                let cj_ratio = cj / self.cj_setup;
                if cj_ratio != 1.0 {
                    self.res *= 2.0 / (1.0 + cj_ratio);
                }
            } else {
                self.res /= cj;
            }
            self.y_new -= &self.res;
            self.yp_new.axpy(-cj, &self.res, 1.0);
            self.stats.number_of_nonlinear_iterations += 1;

            let norm = wrms_norm(self.res.as_slice(), self.ewt.as_slice()) / err_scale;
            match self.convergence.check_new_iteration(norm) {
                ConvergenceStatus::Converged => return Ok(self.convergence.niter()),
                ConvergenceStatus::Continue => continue,
                ConvergenceStatus::Diverged | ConvergenceStatus::MaximumIterations => {
                    if newton && !self.jac_fresh {
                        self.setup_needed = true;
                    }
                    return Err(NlsFailure::Recoverable);
                }
            }
        }
    }

    /// Take one internal step, retrying with smaller steps on convergence or error test
    /// failures
    fn step(&mut self, sys: &mut dyn ImplicitSystem) -> Result<(), i32> {
        let mut ncf = 0;
        let mut nef = 0;
        if self.hist.order > self.options.max_order {
            self.hist.rescale(1.0, self.options.max_order);
            self.n_equal_steps = 0;
        }
        loop {
            let order = self.hist.order;
            let h = self.hist.h;
            let prediction = self.predict();
            let cj = prediction.cj;
            let t1 = self.hist.tn + h;
            let err_scale = self.error_scale(h);
            self.y_new.copy_from(&self.pred);
            // y' = cj (y - a)
            self.yp_new.copy_from(&self.pred);
            self.yp_new -= &self.a;
            self.yp_new *= cj;

            let niter = match self.nonlinear_solve(sys, t1, cj, err_scale) {
                Ok(niter) => niter,
                Err(NlsFailure::Fatal(flag)) => return Err(flag),
                Err(NlsFailure::Recoverable) => {
                    ncf += 1;
                    self.stats.number_of_nonlinear_conv_fails += 1;
                    debug!("corrector failed to converge at t = {}, h = {}", t1, h);
                    if ncf >= self.options.max_conv_fails
                        || (h * Self::CONV_FAIL_FACTOR).abs() <= self.min_step()
                    {
                        return Err(CONV_FAILURE);
                    }
                    self.hist.rescale(Self::CONV_FAIL_FACTOR, order);
                    self.n_equal_steps = 0;
                    continue;
                }
            };
            let max_iter = self.options.max_nonlin_iters as RealType;
            let safety = 0.9 * (2.0 * max_iter + 1.0) / (2.0 * max_iter + niter as RealType);

            // estimated local error
            self.ytmp.copy_from(&self.y_new);
            self.ytmp -= &self.pred;
            let err = prediction.error_coef
                * wrms_norm(self.ytmp.as_slice(), self.ewt.as_slice())
                / err_scale;
            if err > 1.0 {
                nef += 1;
                self.stats.number_of_error_test_fails += 1;
                debug!("error test failed at t = {}, h = {}, err = {}", t1, h, err);
                if nef >= self.options.max_err_test_fails {
                    return Err(ERR_FAILURE);
                }
                let (factor, new_order) = if nef >= Self::ERR_FAILS_BEFORE_ORDER_DROP {
                    (0.1, 1)
                } else {
                    let factor = safety * Self::order_factor(err, order, h);
                    (factor.clamp(Self::MIN_FACTOR, 0.9), order)
                };
                if (h * factor).abs() <= self.min_step() {
                    return Err(ERR_FAILURE);
                }
                self.hist.rescale(factor, new_order);
                self.n_equal_steps = 0;
                continue;
            }

            // accept
            self.ytmp *= prediction.diff_scale;
            self.hist.update_differences(&self.ytmp);
            self.hist.yn.copy_from(&self.y_new);
            self.hist.ypn.copy_from(&self.yp_new);
            self.hist.t_prev = self.hist.tn;
            self.hist.tn = t1;
            self.stats.number_of_steps += 1;
            self.order_used = order;
            self.jac_fresh = false;
            self.steps_since_setup += 1;
            self.n_equal_steps += 1;
            if !self.set_weights() {
                return Err(ILL_INPUT);
            }
            if self.n_equal_steps > order {
                self.select_order(err, safety);
            }
            return Ok(());
        }
    }

    /// After `order + 1` steps of equal size, move to the neighbouring order that allows the
    /// largest next step
    fn select_order(&mut self, err: RealType, safety: RealType) {
        let order = self.hist.order;
        let h = self.hist.h;
        let err_scale = self.error_scale(h);
        let can_lower = order > 1;
        let can_raise = order < self.options.max_order;
        let (err_m, err_p) = match self.method {
            LinearMultistep::Bdf => (
                can_lower.then(|| {
                    self.bdf.error_const[order - 1] * self.hist.column_norm(order, &self.ewt)
                }),
                can_raise.then(|| {
                    self.bdf.error_const[order + 1] * self.hist.column_norm(order + 2, &self.ewt)
                }),
            ),
            LinearMultistep::Adams => (
                can_lower.then(|| {
                    ADAMS_ERROR[order - 1] * self.hist.column_norm(order - 1, &self.ewt)
                }),
                can_raise.then(|| {
                    ADAMS_ERROR[order + 1] * self.hist.column_norm(order + 1, &self.ewt)
                }),
            ),
        };
        let mut best = (order, Self::order_factor(err, order, h));
        for (new_order, new_err) in [(order.saturating_sub(1), err_m), (order + 1, err_p)] {
            if let Some(new_err) = new_err {
                let factor = Self::order_factor(new_err / err_scale, new_order, h);
                if factor > best.1 {
                    best = (new_order, factor);
                }
            }
        }
        let (new_order, factor) = best;
        let factor = (safety * factor)
            .min(Self::MAX_FACTOR)
            .min(self.options.max_step / h.abs());
        debug!(
            "order {} -> {}, step size factor {} at t = {}",
            order, new_order, factor, self.hist.tn
        );
        self.hist.rescale(factor, new_order);
        self.n_equal_steps = 0;
    }

    fn check_roots(
        &mut self,
        sys: &mut dyn ImplicitSystem,
        thi: RealType,
    ) -> Result<Option<RealType>, i32> {
        let hist = &self.hist;
        let ytmp = &mut self.ytmp;
        let yptmp = &mut self.yptmp;
        let nge = &mut self.stats.number_of_root_evals;
        let roots_found = &mut self.roots_found;
        let finder = match self.roots.as_mut() {
            Some(finder) => finder,
            None => return Ok(None),
        };
        let mut eval = |t: RealType, g: &mut [RealType]| {
            hist.interpolate(t, ytmp.as_mut_slice(), yptmp.as_mut_slice());
            *nge += 1;
            sys.roots(t, ytmp.as_slice(), yptmp.as_slice(), g)
        };
        let root = finder.set_g1(thi, &mut eval)?;
        if let Some(t_root) = root {
            finder.root_directions(t_root, roots_found);
        }
        Ok(root)
    }

    fn finish(
        &self,
        t: RealType,
        yout: &mut [RealType],
        ypout: Option<&mut [RealType]>,
        tret: &mut RealType,
    ) {
        let mut yp = vec![0.0; self.n];
        if !self.hist.interpolate(t, yout, &mut yp) {
            // only reached with t == tn
            yout.copy_from_slice(self.hist.yn.as_slice());
            yp.copy_from_slice(self.hist.ypn.as_slice());
        }
        if let Some(ypout) = ypout {
            ypout.copy_from_slice(&yp);
        }
        *tret = t;
    }

    /// Integrate towards `tout`, writing the solution at the returned time `tret` into `yout`
    /// (and its derivative into `ypout`).
    pub fn solve(
        &mut self,
        sys: &mut dyn ImplicitSystem,
        tout: RealType,
        yout: &mut [RealType],
        mut ypout: Option<&mut [RealType]>,
        tret: &mut RealType,
    ) -> i32 {
        if !self.initialized {
            return NO_MALLOC;
        }
        if yout.len() != self.n || ypout.as_ref().is_some_and(|yp| yp.len() != self.n) {
            return ILL_INPUT;
        }
        if self.iteration == NonlinearIteration::Newton && self.linear_solver.is_none() {
            return LINSOL_NULL;
        }
        if !tout.is_finite() || tout < self.hist.t_prev - self.hist.fuzz() {
            return ILL_INPUT;
        }

        if !self.started {
            if let Some(flag) = sys.initial_derivative(
                self.hist.tn,
                self.hist.yn.as_slice(),
                self.hist.ypn.as_mut_slice(),
            ) {
                self.stats.number_of_function_evals += 1;
                if flag != 0 {
                    return FIRST_RHSFUNC_ERR;
                }
            }
            if !self.set_weights() {
                return ILL_INPUT;
            }
            if let Some(finder) = self.roots.as_mut() {
                let hist = &self.hist;
                let nge = &mut self.stats.number_of_root_evals;
                let flag = finder.set_g0(hist.tn, |t, g| {
                    *nge += 1;
                    sys.roots(t, hist.yn.as_slice(), hist.ypn.as_slice(), g)
                });
                if flag.is_err() {
                    return RTFUNC_FAIL;
                }
            }
            if tout - self.hist.tn <= self.hist.fuzz() {
                self.finish(self.hist.tn, yout, ypout, tret);
                return SUCCESS;
            }
            let h0 = self.initial_step(tout);
            self.hist.start(h0);
            self.n_equal_steps = 0;
            self.started = true;
        }

        let mut nsteps = 0;
        loop {
            let thi = RealType::min(self.hist.tn, tout);
            if self.roots.as_ref().is_some_and(|r| thi > r.t0()) {
                match self.check_roots(sys, thi) {
                    Err(_) => return RTFUNC_FAIL,
                    Ok(Some(t_root)) => {
                        debug!("root found at t = {}", t_root);
                        self.finish(t_root, yout, ypout, tret);
                        return ROOT_RETURN;
                    }
                    Ok(None) => {}
                }
            }
            if tout - self.hist.tn <= self.hist.fuzz() {
                self.finish(tout, yout, ypout.as_deref_mut(), tret);
                return SUCCESS;
            }
            if nsteps >= self.options.max_num_steps {
                self.finish(self.hist.tn, yout, ypout, tret);
                return TOO_MUCH_WORK;
            }
            if let Err(flag) = self.step(sys) {
                self.finish(self.hist.tn, yout, ypout, tret);
                return flag;
            }
            nsteps += 1;
        }
    }

    /// Compute the algebraic components of `y` and the differential components of `y'`
    /// at the initial time so that `F(t0, y, y') = 0`. `id` is 1.0 for differential and
    /// 0.0 for algebraic components.
    pub fn calc_ic(&mut self, sys: &mut dyn ImplicitSystem, id: &[RealType]) -> i32 {
        if !self.initialized {
            return NO_MALLOC;
        }
        if self.started || id.len() != self.n {
            return ILL_INPUT;
        }
        if !self.set_weights() {
            return ILL_INPUT;
        }
        let t0 = self.hist.tn;
        self.setup_needed = true;
        for _ in 0..Self::MAX_IC_ITERS {
            let flag = sys.residual(
                t0,
                self.hist.yn.as_slice(),
                self.hist.ypn.as_slice(),
                self.res.as_mut_slice(),
            );
            self.stats.number_of_function_evals += 1;
            if flag != 0 {
                return IC_FAIL;
            }
            let linear_solver = match self.linear_solver.as_mut() {
                Some(ls) => ls,
                None => return LINSOL_NULL,
            };
            // dF/dy
            linear_solver.matrix_mut().fill(0.0);
            let flag = sys.setup(
                t0,
                0.0,
                self.hist.yn.as_slice(),
                self.hist.ypn.as_slice(),
                self.res.as_slice(),
                linear_solver.matrix_mut(),
            );
            if flag != 0 {
                return IC_FAIL;
            }
            let dfdy = linear_solver.matrix_mut().clone();
            // dF/dy + dF/dy'
            linear_solver.matrix_mut().fill(0.0);
            let flag = sys.setup(
                t0,
                1.0,
                self.hist.yn.as_slice(),
                self.hist.ypn.as_slice(),
                self.res.as_slice(),
                linear_solver.matrix_mut(),
            );
            self.stats.number_of_jacobian_evals += 2;
            if flag != 0 {
                return IC_FAIL;
            }
            // unknowns are y'_j for differential and y_j for algebraic components
            let matrix = linear_solver.matrix_mut();
            for j in 0..self.n {
                let differential = id[j] > 0.5;
                for i in 0..self.n {
                    if differential {
                        matrix[(i, j)] -= dfdy[(i, j)];
                    } else {
                        matrix[(i, j)] = dfdy[(i, j)];
                    }
                }
            }
            if !linear_solver.factorize() || !linear_solver.solve_in_place(&mut self.res) {
                return IC_FAIL;
            }
            for (j, &idj) in id.iter().enumerate() {
                if idj > 0.5 {
                    self.hist.ypn[j] -= self.res[j];
                } else {
                    self.hist.yn[j] -= self.res[j];
                }
            }
            if !self.set_weights() {
                return ILL_INPUT;
            }
            if wrms_norm(self.res.as_slice(), self.ewt.as_slice()) <= Self::IC_CONV_TOL {
                return SUCCESS;
            }
        }
        IC_FAIL
    }

    /// The current solution `(t, y, y')` at the last internal time
    pub fn current(&self) -> (RealType, &[RealType], &[RealType]) {
        (
            self.hist.tn,
            self.hist.yn.as_slice(),
            self.hist.ypn.as_slice(),
        )
    }
}
