use super::Solution;
use crate::{
    ModelResult, OdeModel, RealType, SdMatrixViewMut, SdVector, SdVectorView, SdVectorViewMut,
};

// Robertson's stiff chemical kinetics problem
// dy1/dt = -.04 y1 + 1e4 y2 y3
// dy2/dt = .04 y1 - 1e4 y2 y3 - 3e7 y2^2
// dy3/dt = 3e7 y2^2
pub struct Robertson;

impl OdeModel for Robertson {
    fn f(&self, _t: RealType, y: &SdVectorView, ydot: &mut SdVectorViewMut) -> ModelResult {
        ydot[0] = -0.04 * y[0] + 1.0e4 * y[1] * y[2];
        ydot[2] = 3.0e7 * y[1] * y[1];
        ydot[1] = -ydot[0] - ydot[2];
        Ok(())
    }

    fn jac(
        &self,
        _t: RealType,
        y: &SdVectorView,
        _fy: &SdVectorView,
        jac: &mut SdMatrixViewMut,
    ) -> ModelResult {
        jac[(0, 0)] = -0.04;
        jac[(0, 1)] = 1.0e4 * y[2];
        jac[(0, 2)] = 1.0e4 * y[1];
        jac[(1, 0)] = 0.04;
        jac[(1, 1)] = -1.0e4 * y[2] - 6.0e7 * y[1];
        jac[(1, 2)] = -1.0e4 * y[1];
        jac[(2, 1)] = 6.0e7 * y[1];
        Ok(())
    }
}

pub fn robertson_problem() -> (Robertson, SdVector, Solution) {
    let y0 = SdVector::from_vec(vec![1.0, 0.0, 0.0]);
    let mut soln = Solution::default();
    soln.push(
        SdVector::from_vec(vec![9.8517e-01, 3.3864e-05, 1.4794e-02]),
        0.4,
    );
    soln.push(
        SdVector::from_vec(vec![9.0552e-01, 2.2405e-05, 9.4459e-02]),
        4.0,
    );
    soln.push(
        SdVector::from_vec(vec![7.1583e-01, 9.1856e-06, 2.8416e-01]),
        40.0,
    );
    (Robertson, y0, soln)
}
