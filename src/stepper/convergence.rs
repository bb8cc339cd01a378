use crate::{IndexType, RealType, UNIT_ROUNDOFF};

/// Convergence test for the corrector iteration.
///
/// Norms passed in are weighted RMS norms of the corrections, so a value of 1
/// corresponds to the local error tolerance. The estimated convergence rate is
/// kept between steps.
pub struct Convergence {
    tol: RealType,
    max_iter: IndexType,
    iter: IndexType,
    rate: RealType,
    old_norm: Option<RealType>,
}

#[derive(Debug, PartialEq)]
pub enum ConvergenceStatus {
    Converged,
    Diverged,
    Continue,
    MaximumIterations,
}

impl Convergence {
    const RATE_DECAY: RealType = 0.3;
    const DIVERGENCE_RATIO: RealType = 2.0;

    pub fn new(tol: RealType, max_iter: IndexType) -> Self {
        Self {
            tol,
            max_iter,
            iter: 0,
            rate: 1.0,
            old_norm: None,
        }
    }
    pub fn set_tol(&mut self, tol: RealType) {
        self.tol = tol;
    }
    pub fn set_max_iter(&mut self, max_iter: IndexType) {
        self.max_iter = max_iter;
    }
    pub fn reset(&mut self) {
        self.iter = 0;
        self.old_norm = None;
    }
    /// Forget the rate estimate, e.g. after the iteration matrix is rebuilt
    pub fn reset_rate(&mut self) {
        self.rate = 1.0;
    }
    /// Iterations taken since the last [Convergence::reset]
    pub fn niter(&self) -> IndexType {
        self.iter
    }
    pub fn check_new_iteration(&mut self, norm: RealType) -> ConvergenceStatus {
        self.iter += 1;
        if norm <= UNIT_ROUNDOFF {
            return ConvergenceStatus::Converged;
        }
        if let Some(old_norm) = self.old_norm {
            if norm > Self::DIVERGENCE_RATIO * old_norm {
                return ConvergenceStatus::Diverged;
            }
            self.rate = RealType::max(Self::RATE_DECAY * self.rate, norm / old_norm);
        }
        if norm * RealType::min(1.0, self.rate) <= self.tol {
            return ConvergenceStatus::Converged;
        }
        self.old_norm = Some(norm);
        if self.iter >= self.max_iter {
            ConvergenceStatus::MaximumIterations
        } else {
            ConvergenceStatus::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converges_on_contracting_sequence() {
        let mut conv = Convergence::new(0.1, 5);
        conv.reset();
        assert_eq!(conv.check_new_iteration(1.0), ConvergenceStatus::Continue);
        assert_eq!(conv.check_new_iteration(0.5), ConvergenceStatus::Continue);
        assert_eq!(conv.check_new_iteration(0.1), ConvergenceStatus::Converged);
        assert_eq!(conv.niter(), 3);
    }

    #[test]
    fn test_diverges() {
        let mut conv = Convergence::new(0.1, 5);
        conv.reset();
        assert_eq!(conv.check_new_iteration(1.0), ConvergenceStatus::Continue);
        assert_eq!(conv.check_new_iteration(3.0), ConvergenceStatus::Diverged);
    }

    #[test]
    fn test_maximum_iterations() {
        let mut conv = Convergence::new(1e-3, 2);
        conv.reset();
        assert_eq!(conv.check_new_iteration(1.0), ConvergenceStatus::Continue);
        assert_eq!(
            conv.check_new_iteration(0.9),
            ConvergenceStatus::MaximumIterations
        );
    }
}
