use crate::{RealType, SdVector};

pub mod exponential_decay;
pub mod exponential_decay_with_algebraic;
pub mod robertson;

pub struct SolutionPoint {
    pub state: SdVector,
    pub t: RealType,
}

/// Reference solution of a test problem, sorted by time
#[derive(Default)]
pub struct Solution {
    pub solution_points: Vec<SolutionPoint>,
}

impl Solution {
    pub fn push(&mut self, state: SdVector, t: RealType) {
        // keep the times sorted
        let index = self
            .solution_points
            .iter()
            .position(|x| x.t > t)
            .unwrap_or(self.solution_points.len());
        self.solution_points.insert(index, SolutionPoint { state, t });
    }
}
