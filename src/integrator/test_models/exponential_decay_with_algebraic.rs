use super::Solution;
use crate::{
    DaeModel, ModelResult, RealType, SdMatrixViewMut, SdVector, SdVectorView, SdVectorViewMut,
};

// exponential decay problem with algebraic constraint
// dy/dt = -ay
// 0 = z - y
// root when y = 0.5
pub struct ExponentialDecayWithAlgebraic {
    pub a: RealType,
}

impl DaeModel for ExponentialDecayWithAlgebraic {
    fn f(
        &self,
        _t: RealType,
        y: &SdVectorView,
        ydot: &SdVectorView,
        res: &mut SdVectorViewMut,
    ) -> ModelResult {
        res[0] = ydot[0] + self.a * y[0];
        res[1] = y[1] - y[0];
        Ok(())
    }

    fn g(
        &self,
        _t: RealType,
        y: &SdVectorView,
        _ydot: &SdVectorView,
        gout: &mut SdVectorViewMut,
    ) -> ModelResult {
        gout[0] = y[0] - 0.5;
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
        jac[(0, 0)] = self.a + c_j;
        jac[(1, 0)] = -1.0;
        jac[(1, 1)] = 1.0;
        Ok(())
    }
}

/// The returned `y0` has an inconsistent algebraic component and `ydot0` is zero
pub fn exponential_decay_with_algebraic_problem(
) -> (ExponentialDecayWithAlgebraic, SdVector, SdVector, Solution) {
    let model = ExponentialDecayWithAlgebraic { a: 0.5 };
    let y0 = SdVector::from_vec(vec![1.0, 0.0]);
    let ydot0 = SdVector::zeros(2);
    let mut soln = Solution::default();
    for i in 1..10 {
        let t = i as RealType * 0.5;
        let decay = (-model.a * t).exp();
        soln.push(SdVector::from_vec(vec![decay, decay]), t);
    }
    (model, y0, ydot0, soln)
}
