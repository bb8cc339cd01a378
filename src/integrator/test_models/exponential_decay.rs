use super::Solution;
use crate::{
    ModelResult, OdeModel, RealType, SdMatrixViewMut, SdVector, SdVectorView, SdVectorViewMut,
};

// exponential decay problem
// dy/dt = -ay
// root when y[0] = 0.5
pub struct ExponentialDecay {
    pub a: RealType,
}

impl OdeModel for ExponentialDecay {
    fn f(&self, _t: RealType, y: &SdVectorView, ydot: &mut SdVectorViewMut) -> ModelResult {
        for i in 0..y.len() {
            ydot[i] = -self.a * y[i];
        }
        Ok(())
    }

    fn g(&self, _t: RealType, y: &SdVectorView, gout: &mut SdVectorViewMut) -> ModelResult {
        gout[0] = y[0] - 0.5;
        Ok(())
    }

    fn jac(
        &self,
        _t: RealType,
        y: &SdVectorView,
        _fy: &SdVectorView,
        jac: &mut SdMatrixViewMut,
    ) -> ModelResult {
        for i in 0..y.len() {
            jac[(i, i)] = -self.a;
        }
        Ok(())
    }
}

pub fn exponential_decay_problem() -> (ExponentialDecay, SdVector, Solution) {
    let model = ExponentialDecay { a: 0.5 };
    let y0 = SdVector::from_vec(vec![1.0, 2.0]);
    let mut soln = Solution::default();
    for i in 1..10 {
        let t = i as RealType * 0.5;
        let decay = (-model.a * t).exp();
        soln.push(SdVector::from_vec(vec![decay, 2.0 * decay]), t);
    }
    (model, y0, soln)
}
