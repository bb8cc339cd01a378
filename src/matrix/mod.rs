use std::fmt::{self, Display, Formatter};
use std::ops::{Index, IndexMut};

use nalgebra::DMatrix;

use crate::{IndexType, RealType};

/// An owning dense matrix stored in column-major order.
///
/// `SdMatrix` is intentionally not `Clone`:
///
/// ```compile_fail
/// use sdsolve::SdMatrix;
/// let m = SdMatrix::zeros(2, 2);
/// let copy = m.clone();
/// ```
#[derive(Debug)]
pub struct SdMatrix {
    data: DMatrix<RealType>,
}

/// A mutable, non-owning view over a column-major buffer of `nrows * ncols` values.
///
/// This is what a model's Jacobian callback writes into.
#[derive(Debug)]
pub struct SdMatrixViewMut<'a> {
    data: &'a mut [RealType],
    nrows: IndexType,
    ncols: IndexType,
}

impl SdMatrix {
    pub fn zeros(nrows: IndexType, ncols: IndexType) -> Self {
        Self {
            data: DMatrix::zeros(nrows, ncols),
        }
    }
    pub fn nrows(&self) -> IndexType {
        self.data.nrows()
    }
    pub fn ncols(&self) -> IndexType {
        self.data.ncols()
    }
    pub fn as_slice(&self) -> &[RealType] {
        self.data.as_slice()
    }
    pub fn as_mut_slice(&mut self) -> &mut [RealType] {
        self.data.as_mut_slice()
    }
    pub fn as_view_mut(&mut self) -> SdMatrixViewMut<'_> {
        let (nrows, ncols) = self.data.shape();
        SdMatrixViewMut::new(self.data.as_mut_slice(), nrows, ncols)
    }
    pub fn fill(&mut self, value: RealType) {
        self.data.fill(value);
    }
    pub fn as_dmatrix(&self) -> &DMatrix<RealType> {
        &self.data
    }
}

impl From<DMatrix<RealType>> for SdMatrix {
    fn from(data: DMatrix<RealType>) -> Self {
        Self { data }
    }
}

impl<'a> SdMatrixViewMut<'a> {
    /// Wrap an externally owned column-major buffer without taking ownership
    pub fn new(data: &'a mut [RealType], nrows: IndexType, ncols: IndexType) -> Self {
        assert_eq!(
            data.len(),
            nrows * ncols,
            "buffer of length {} cannot hold a {}x{} matrix",
            data.len(),
            nrows,
            ncols
        );
        Self { data, nrows, ncols }
    }
    pub fn nrows(&self) -> IndexType {
        self.nrows
    }
    pub fn ncols(&self) -> IndexType {
        self.ncols
    }
    pub fn as_slice(&self) -> &[RealType] {
        &*self.data
    }
    pub fn as_mut_slice(&mut self) -> &mut [RealType] {
        &mut *self.data
    }
    pub fn fill(&mut self, value: RealType) {
        self.data.fill(value);
    }
    fn offset(&self, (i, j): (IndexType, IndexType)) -> IndexType {
        if i >= self.nrows || j >= self.ncols {
            panic!("Index out of bounds");
        }
        j * self.nrows + i
    }
}

impl Index<(IndexType, IndexType)> for SdMatrix {
    type Output = RealType;
    fn index(&self, index: (IndexType, IndexType)) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<(IndexType, IndexType)> for SdMatrix {
    fn index_mut(&mut self, index: (IndexType, IndexType)) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Index<(IndexType, IndexType)> for SdMatrixViewMut<'_> {
    type Output = RealType;
    fn index(&self, index: (IndexType, IndexType)) -> &Self::Output {
        &self.data[self.offset(index)]
    }
}

impl IndexMut<(IndexType, IndexType)> for SdMatrixViewMut<'_> {
    fn index_mut(&mut self, index: (IndexType, IndexType)) -> &mut Self::Output {
        let offset = self.offset(index);
        &mut self.data[offset]
    }
}

fn fmt_rows(
    f: &mut Formatter,
    nrows: IndexType,
    ncols: IndexType,
    get: impl Fn(IndexType, IndexType) -> RealType,
) -> fmt::Result {
    for i in 0..nrows {
        for j in 0..ncols {
            if j > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", get(i, j))?;
        }
        if i + 1 < nrows {
            writeln!(f)?;
        }
    }
    Ok(())
}

impl Display for SdMatrix {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        fmt_rows(f, self.nrows(), self.ncols(), |i, j| self[(i, j)])
    }
}

impl Display for SdMatrixViewMut<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        fmt_rows(f, self.nrows, self.ncols, |i, j| self[(i, j)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexing() {
        let mut m = SdMatrix::zeros(2, 2);
        m[(0, 0)] = 1.0;
        m[(0, 1)] = 2.0;
        m[(1, 0)] = 3.0;
        m[(1, 1)] = 4.0;
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(1, 0)], 3.0);
        assert_eq!(m[(1, 1)], 4.0);
        // column-major
        assert_eq!(m.as_slice(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_view_wraps_buffer() {
        let mut buffer = vec![0.0; 6];
        {
            let mut view = SdMatrixViewMut::new(&mut buffer, 2, 3);
            view[(1, 2)] = 5.0;
            view[(0, 1)] = -1.0;
            assert_eq!(view.nrows(), 2);
            assert_eq!(view.ncols(), 3);
        }
        assert_eq!(buffer, vec![0.0, 0.0, -1.0, 0.0, 0.0, 5.0]);

        let mut m = SdMatrix::zeros(2, 3);
        m.as_view_mut().as_mut_slice().copy_from_slice(&buffer);
        assert_eq!(m[(1, 2)], 5.0);
    }

    #[test]
    #[should_panic(expected = "Index out of bounds")]
    fn test_view_out_of_bounds() {
        let mut buffer = vec![0.0; 4];
        let view = SdMatrixViewMut::new(&mut buffer, 2, 2);
        let _ = view[(2, 0)];
    }

    #[test]
    fn test_display() {
        let mut m = SdMatrix::zeros(2, 2);
        m[(0, 0)] = 1.0;
        m[(1, 1)] = 2.5;
        insta::assert_snapshot!(m.to_string(), @r###"
        1 0
        0 2.5
        "###);
    }
}
