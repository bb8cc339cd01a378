use std::fmt::{self, Display, Formatter};
use std::ops::{Index, IndexMut};

use nalgebra::DVector;

use crate::{IndexType, RealType};

/// An owning vector of [RealType] values.
///
/// Used for state vectors, derivatives and tolerances. Cloning always
/// allocates and copies, whether the source is an owning vector or a view.
#[derive(Debug, Clone, PartialEq)]
pub struct SdVector {
    data: DVector<RealType>,
}

/// A read-only, non-owning view over a buffer of [RealType] values.
///
/// Dropping a view never frees or modifies the buffer it wraps.
#[derive(Debug, Clone, Copy)]
pub struct SdVectorView<'a> {
    data: &'a [RealType],
}

/// A mutable, non-owning view over a buffer of [RealType] values.
#[derive(Debug)]
pub struct SdVectorViewMut<'a> {
    data: &'a mut [RealType],
}

impl SdVector {
    /// Allocate a zero-initialised vector of length `len`
    pub fn zeros(len: IndexType) -> Self {
        Self::from_element(len, 0.0)
    }
    pub fn from_element(len: IndexType, value: RealType) -> Self {
        Self {
            data: DVector::from_element(len, value),
        }
    }
    pub fn from_vec(vec: Vec<RealType>) -> Self {
        Self {
            data: DVector::from_vec(vec),
        }
    }
    /// Copy the contents of a view into a newly allocated vector
    pub fn from_view(view: &SdVectorView<'_>) -> Self {
        Self::from_vec(view.data.to_vec())
    }
    pub fn as_view(&self) -> SdVectorView<'_> {
        SdVectorView::new(self.data.as_slice())
    }
    pub fn as_view_mut(&mut self) -> SdVectorViewMut<'_> {
        SdVectorViewMut::new(self.data.as_mut_slice())
    }
    pub fn as_slice(&self) -> &[RealType] {
        self.data.as_slice()
    }
    pub fn as_mut_slice(&mut self) -> &mut [RealType] {
        self.data.as_mut_slice()
    }
    pub fn len(&self) -> IndexType {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn fill(&mut self, value: RealType) {
        self.data.fill(value);
    }
    /// Copy `other` into this vector, panics if the lengths differ
    pub fn copy_from_slice(&mut self, other: &[RealType]) {
        self.data.as_mut_slice().copy_from_slice(other);
    }
    pub fn into_dvector(self) -> DVector<RealType> {
        self.data
    }
}

impl<'a> SdVectorView<'a> {
    /// Wrap an externally owned buffer without taking ownership
    pub fn new(data: &'a [RealType]) -> Self {
        Self { data }
    }
    pub fn as_slice(&self) -> &'a [RealType] {
        self.data
    }
    pub fn len(&self) -> IndexType {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn into_owned(self) -> SdVector {
        SdVector::from_view(&self)
    }
}

impl<'a> SdVectorViewMut<'a> {
    /// Wrap an externally owned buffer without taking ownership
    pub fn new(data: &'a mut [RealType]) -> Self {
        Self { data }
    }
    pub fn as_slice(&self) -> &[RealType] {
        &*self.data
    }
    pub fn as_mut_slice(&mut self) -> &mut [RealType] {
        &mut *self.data
    }
    pub fn as_view(&self) -> SdVectorView<'_> {
        SdVectorView::new(&*self.data)
    }
    pub fn len(&self) -> IndexType {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn fill(&mut self, value: RealType) {
        self.data.fill(value);
    }
    pub fn copy_from_slice(&mut self, other: &[RealType]) {
        self.data.copy_from_slice(other);
    }
    pub fn into_owned(self) -> SdVector {
        SdVector::from_vec(self.data.to_vec())
    }
}

impl From<Vec<RealType>> for SdVector {
    fn from(vec: Vec<RealType>) -> Self {
        Self::from_vec(vec)
    }
}

impl From<DVector<RealType>> for SdVector {
    fn from(data: DVector<RealType>) -> Self {
        Self { data }
    }
}

impl<'a> From<&'a SdVector> for SdVectorView<'a> {
    fn from(v: &'a SdVector) -> Self {
        v.as_view()
    }
}

macro_rules! impl_helper {
    ($trait:path, SdVector, $inner:tt) => {
        impl $trait for SdVector $inner
    };
    ($trait:path, SdVectorView, $inner:tt) => {
        impl<'a> $trait for SdVectorView<'a> $inner
    };
    ($trait:path, SdVectorViewMut, $inner:tt) => {
        impl<'a> $trait for SdVectorViewMut<'a> $inner
    };
}

// Index
macro_rules! impl_index {
    ($type:tt) => {
        impl_helper!(Index<IndexType>, $type, {
            type Output = RealType;
            fn index(&self, index: IndexType) -> &Self::Output {
                &self.as_slice()[index]
            }
        });
    };
}

impl_index!(SdVector);
impl_index!(SdVectorView);
impl_index!(SdVectorViewMut);

// IndexMut
macro_rules! impl_index_mut {
    ($type:tt) => {
        impl_helper!(IndexMut<IndexType>, $type, {
            fn index_mut(&mut self, index: IndexType) -> &mut Self::Output {
                &mut self.as_mut_slice()[index]
            }
        });
    };
}

impl_index_mut!(SdVector);
impl_index_mut!(SdVectorViewMut);

// Display
macro_rules! impl_display {
    ($type:tt) => {
        impl_helper!(Display, $type, {
            fn fmt(&self, f: &mut Formatter) -> fmt::Result {
                for (i, x) in self.as_slice().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", x)?;
                }
                Ok(())
            }
        });
    };
}

impl_display!(SdVector);
impl_display!(SdVectorView);
impl_display!(SdVectorViewMut);
