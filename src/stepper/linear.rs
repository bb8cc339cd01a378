use nalgebra::{DMatrix, DVector, Dyn};

use crate::{IndexType, RealType};

/// Dense direct linear solver for the Newton iteration matrix, using the LU
/// decomposition in the [`nalgebra` library](https://nalgebra.org/).
pub struct DenseLinearSolver {
    matrix: DMatrix<RealType>,
    lu: Option<nalgebra::LU<RealType, Dyn, Dyn>>,
}

impl DenseLinearSolver {
    /// Allocate an `n` by `n` solver, returns `None` for an empty system
    pub fn new(n: IndexType) -> Option<Self> {
        if n == 0 {
            return None;
        }
        Some(Self {
            matrix: DMatrix::zeros(n, n),
            lu: None,
        })
    }

    pub fn n(&self) -> IndexType {
        self.matrix.nrows()
    }

    /// The matrix to fill before calling [Self::factorize]
    pub fn matrix_mut(&mut self) -> &mut DMatrix<RealType> {
        &mut self.matrix
    }

    /// Factorize the current matrix. Returns false if it is singular.
    pub fn factorize(&mut self) -> bool {
        let lu = self.matrix.clone().lu();
        let invertible = lu.is_invertible();
        self.lu = if invertible { Some(lu) } else { None };
        invertible
    }

    pub fn is_factorized(&self) -> bool {
        self.lu.is_some()
    }

    /// Solve `A x = b` in place, returns false if no factorisation is available
    pub fn solve_in_place(&self, b: &mut DVector<RealType>) -> bool {
        match self.lu.as_ref() {
            Some(lu) => lu.solve_mut(b),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve() {
        let mut ls = DenseLinearSolver::new(2).unwrap();
        ls.matrix_mut().copy_from_slice(&[2.0, 1.0, 1.0, 3.0]);
        assert!(ls.factorize());
        let mut b = DVector::from_vec(vec![3.0, 4.0]);
        assert!(ls.solve_in_place(&mut b));
        assert!((b[0] - 1.0).abs() < 1e-14);
        assert!((b[1] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_singular_and_empty() {
        assert!(DenseLinearSolver::new(0).is_none());
        let mut ls = DenseLinearSolver::new(2).unwrap();
        assert!(!ls.factorize());
        let mut b = DVector::from_vec(vec![1.0, 1.0]);
        assert!(!ls.solve_in_place(&mut b));
    }
}
