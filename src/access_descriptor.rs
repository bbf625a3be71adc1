//! Access descriptors and regions.
//!
//! An [`AccessDescriptor`] is how a caller addresses the elements of a variable: the whole variable, one element, a contiguous block, or a strided block.
//! A descriptor is resolved against the current extent of a variable into a [`Region`], which can produce the linearised indices of its elements.

use std::iter::FusedIterator;

use derive_more::Display;
use itertools::{izip, Itertools};
use thiserror::Error;

/// An array index. Each element is the index along a dimension.
pub type ArrayIndices = Vec<u64>;

/// An array shape. Each element is the length of a dimension.
pub type ArrayShape = Vec<u64>;

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

/// An incompatible array shape error.
#[derive(Clone, Debug, Error)]
#[error("region {0} is not within array shape {1:?}")]
pub struct IncompatibleArrayShapeError(Region, ArrayShape);

/// The elements of a variable addressed by an access.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessDescriptor {
    /// The entire current extent of the variable.
    Whole,
    /// A single element.
    Index(ArrayIndices),
    /// A contiguous block of `count` elements per dimension from `start`.
    Region {
        /// The start of the region.
        start: ArrayIndices,
        /// The number of elements along each dimension.
        count: ArrayShape,
    },
    /// A block of `count` elements per dimension from `start`, taking every `stride`-th element.
    StridedRegion {
        /// The start of the region.
        start: ArrayIndices,
        /// The number of elements along each dimension.
        count: ArrayShape,
        /// The step between selected elements along each dimension.
        stride: ArrayShape,
    },
}

impl AccessDescriptor {
    /// Returns the dimensionality of the descriptor, or [`None`] for [`AccessDescriptor::Whole`].
    #[must_use]
    pub fn dimensionality(&self) -> Option<usize> {
        match self {
            Self::Whole => None,
            Self::Index(index) => Some(index.len()),
            Self::Region { start, .. } | Self::StridedRegion { start, .. } => Some(start.len()),
        }
    }

    /// Resolve the descriptor against a variable with `extent`.
    ///
    /// The region is not bounds checked.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the descriptor components do not match the dimensionality of `extent`.
    pub fn resolve(&self, extent: &[u64]) -> Result<Region, IncompatibleDimensionalityError> {
        let dimensionality = extent.len();
        let check = |len: usize| {
            if len == dimensionality {
                Ok(())
            } else {
                Err(IncompatibleDimensionalityError::new(len, dimensionality))
            }
        };
        match self {
            Self::Whole => Ok(Region::new_with_shape(extent.to_vec())),
            Self::Index(index) => {
                check(index.len())?;
                Region::new_with_start_count(index.clone(), vec![1; dimensionality])
            }
            Self::Region { start, count } => {
                check(start.len())?;
                Region::new_with_start_count(start.clone(), count.clone())
            }
            Self::StridedRegion {
                start,
                count,
                stride,
            } => {
                check(start.len())?;
                Region::new_with_start_count_stride(start.clone(), count.clone(), stride.clone())
            }
        }
    }
}

impl core::fmt::Display for AccessDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Whole => write!(f, "whole"),
            Self::Index(index) => write!(f, "index {index:?}"),
            Self::Region { start, count } => write!(f, "start {start:?} count {count:?}"),
            Self::StridedRegion {
                start,
                count,
                stride,
            } => write!(f, "start {start:?} count {count:?} stride {stride:?}"),
        }
    }
}

/// A region of an array.
///
/// Selects `count[d]` elements along each dimension `d`, beginning at `start[d]` and stepping by `stride[d]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Display)]
#[display("start {start:?} count {count:?} stride {stride:?}")]
pub struct Region {
    start: ArrayIndices,
    count: ArrayShape,
    stride: ArrayShape,
}

impl Region {
    /// Create a new region with `shape` starting at the origin.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            stride: vec![1; shape.len()],
            count: shape,
        }
    }

    /// Create a new contiguous region.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the lengths of `start` and `count` do not match.
    pub fn new_with_start_count(
        start: ArrayIndices,
        count: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        let stride = vec![1; start.len()];
        Self::new_with_start_count_stride(start, count, stride)
    }

    /// Create a new strided region.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the lengths of `start`, `count` and `stride` do not match.
    pub fn new_with_start_count_stride(
        start: ArrayIndices,
        count: ArrayShape,
        stride: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() != count.len() {
            Err(IncompatibleDimensionalityError::new(count.len(), start.len()))
        } else if start.len() != stride.len() {
            Err(IncompatibleDimensionalityError::new(
                stride.len(),
                start.len(),
            ))
        } else {
            Ok(Self {
                start,
                count,
                stride,
            })
        }
    }

    /// Return the start of the region.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the number of elements along each dimension.
    #[must_use]
    pub fn count(&self) -> &[u64] {
        &self.count
    }

    /// Return the stride along each dimension.
    #[must_use]
    pub fn stride(&self) -> &[u64] {
        &self.stride
    }

    /// Return the dimensionality of the region.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Returns true if any stride is zero.
    #[must_use]
    pub fn has_zero_stride(&self) -> bool {
        self.stride.contains(&0)
    }

    /// Return the number of elements of the region, saturating at [`u64::MAX`].
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.checked_num_elements().unwrap_or(u64::MAX)
    }

    /// Return the number of elements of the region, or [`None`] if it exceeds [`u64::MAX`].
    #[must_use]
    pub fn checked_num_elements(&self) -> Option<u64> {
        if self.count.contains(&0) {
            Some(0)
        } else {
            self.count
                .iter()
                .try_fold(1u64, |num_elements, &count| num_elements.checked_mul(count))
        }
    }

    /// Return the end (exclusive) of the region along each dimension, saturating at [`u64::MAX`].
    ///
    /// This is one past the last selected index, or `start` where the count is zero.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        izip!(&self.start, &self.count, &self.stride)
            .map(|(&start, &count, &stride)| {
                dimension_end_exc(start, count, stride).unwrap_or(u64::MAX)
            })
            .collect()
    }

    /// Return the end (exclusive) of the region along each dimension, or [`None`] if any end exceeds [`u64::MAX`].
    #[must_use]
    pub fn checked_end_exc(&self) -> Option<ArrayIndices> {
        izip!(&self.start, &self.count, &self.stride)
            .map(|(&start, &count, &stride)| dimension_end_exc(start, count, stride))
            .collect()
    }

    /// Returns true if the region is within `array_shape`.
    #[must_use]
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && self.checked_end_exc().is_some_and(|end| {
                std::iter::zip(end, array_shape).all(|(end, &len)| end <= len)
            })
            && std::iter::zip(&self.start, array_shape).all(|(&start, &len)| start <= len)
    }

    /// Returns an iterator over the linearised indices of the region elements within an array of `array_shape`.
    ///
    /// Iterates over the last dimension fastest (i.e. C-contiguous order).
    ///
    /// # Errors
    /// Returns [`IncompatibleArrayShapeError`] if the region is not within `array_shape`.
    pub fn iter_linearised_indices<'a>(
        &'a self,
        array_shape: &'a [u64],
    ) -> Result<LinearisedIndicesIterator<'a>, IncompatibleArrayShapeError> {
        if self.inbounds(array_shape) {
            Ok(LinearisedIndicesIterator {
                region: self,
                array_shape,
                index_front: 0,
                index_back: self.num_elements(),
            })
        } else {
            Err(IncompatibleArrayShapeError(
                self.clone(),
                array_shape.to_vec(),
            ))
        }
    }
}

fn dimension_end_exc(start: u64, count: u64, stride: u64) -> Option<u64> {
    if count == 0 {
        Some(start)
    } else {
        (count - 1).checked_mul(stride)?.checked_add(start)?.checked_add(1)
    }
}

/// Convert a linearised index within `shape` to an index.
fn unravel_index(mut index: u64, shape: &[u64]) -> ArrayIndices {
    let mut indices = vec![0; shape.len()];
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        *indices_i = index % dim;
        index /= dim;
    }
    indices
}

/// Convert an index within `shape` to a linearised index.
fn ravel_index(indices: &[u64], shape: &[u64]) -> u64 {
    let mut index = 0;
    let mut count = 1;
    for (&i, &dim) in std::iter::zip(indices, shape).rev() {
        index += i * count;
        count *= dim;
    }
    index
}

/// An iterator over the linearised indices of a [`Region`] within an array.
pub struct LinearisedIndicesIterator<'a> {
    region: &'a Region,
    array_shape: &'a [u64],
    index_front: u64,
    index_back: u64,
}

impl LinearisedIndicesIterator<'_> {
    fn linearise(&self, index: u64) -> u64 {
        let indices = unravel_index(index, &self.region.count)
            .into_iter()
            .zip_eq(izip!(&self.region.start, &self.region.stride))
            .map(|(i, (&start, &stride))| start + i * stride)
            .collect_vec();
        ravel_index(&indices, self.array_shape)
    }
}

impl Iterator for LinearisedIndicesIterator<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index_front < self.index_back {
            let index = self.linearise(self.index_front);
            self.index_front += 1;
            Some(index)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let length = usize::try_from(self.index_back - self.index_front).unwrap_or(usize::MAX);
        (length, Some(length))
    }
}

impl ExactSizeIterator for LinearisedIndicesIterator<'_> {}

impl FusedIterator for LinearisedIndicesIterator<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_descriptor_resolve() {
        let extent = [1, 4, 3];
        assert_eq!(
            AccessDescriptor::Whole.resolve(&extent).unwrap(),
            Region::new_with_shape(vec![1, 4, 3])
        );
        let region = AccessDescriptor::Index(vec![0, 2, 1])
            .resolve(&extent)
            .unwrap();
        assert_eq!(region.count(), &[1, 1, 1]);
        assert_eq!(region.num_elements(), 1);
        assert!(AccessDescriptor::Index(vec![0, 0]).resolve(&extent).is_err());
        let region = AccessDescriptor::StridedRegion {
            start: vec![0, 0, 0],
            count: vec![1, 2, 2],
            stride: vec![1, 2, 2],
        }
        .resolve(&extent)
        .unwrap();
        assert_eq!(region.end_exc(), vec![1, 3, 3]);
        assert!(region.inbounds(&extent));
        assert_eq!(AccessDescriptor::Whole.dimensionality(), None);
    }

    #[test]
    fn region_linearised_indices() {
        let shape = [2, 4, 3];
        let region = Region::new_with_start_count(vec![1, 1, 1], vec![1, 2, 2]).unwrap();
        assert_eq!(
            region.iter_linearised_indices(&shape).unwrap().collect_vec(),
            vec![16, 17, 19, 20]
        );
        let strided =
            Region::new_with_start_count_stride(vec![0, 0, 0], vec![1, 2, 2], vec![1, 2, 2])
                .unwrap();
        assert_eq!(
            strided.iter_linearised_indices(&shape).unwrap().collect_vec(),
            vec![0, 2, 6, 8]
        );
        let out_of_bounds = Region::new_with_start_count(vec![0, 3, 0], vec![1, 2, 1]).unwrap();
        assert!(out_of_bounds.iter_linearised_indices(&shape).is_err());
    }

    #[test]
    fn region_unit_stride_matches_contiguous() {
        let shape = [1, 40, 40];
        let contiguous = Region::new_with_start_count(vec![0, 0, 0], vec![1, 40, 40]).unwrap();
        let strided =
            Region::new_with_start_count_stride(vec![0, 0, 0], vec![1, 40, 40], vec![1, 1, 1])
                .unwrap();
        assert_eq!(contiguous, strided);
        assert!(contiguous
            .iter_linearised_indices(&shape)
            .unwrap()
            .eq(0..1600));
    }

    #[test]
    fn region_empty() {
        let region = Region::new_with_shape(vec![0, 40, 40]);
        assert_eq!(region.num_elements(), 0);
        assert_eq!(region.end_exc(), vec![0, 40, 40]);
        assert_eq!(
            region.iter_linearised_indices(&[0, 40, 40]).unwrap().count(),
            0
        );
    }

    #[test]
    fn region_overflow() {
        let huge =
            Region::new_with_start_count(vec![0, 1 << 60, 0], vec![1 << 60, 40, 40]).unwrap();
        assert_eq!(huge.checked_num_elements(), None);
        assert_eq!(huge.num_elements(), u64::MAX);
        assert_eq!(huge.checked_end_exc(), Some(vec![1 << 60, (1 << 60) + 40, 40]));

        let index = Region::new_with_start_count(vec![0, u64::MAX, 0], vec![1, 1, 1]).unwrap();
        assert_eq!(index.checked_end_exc(), None);
        assert_eq!(index.end_exc(), vec![1, u64::MAX, 1]);
        assert!(!index.inbounds(&[1, 40, 40]));
        assert!(index.iter_linearised_indices(&[1, 40, 40]).is_err());

        let strided =
            Region::new_with_start_count_stride(vec![0], vec![3], vec![u64::MAX]).unwrap();
        assert_eq!(strided.checked_end_exc(), None);

        let empty =
            Region::new_with_start_count(vec![0, 0, 0], vec![u64::MAX, u64::MAX, 0]).unwrap();
        assert_eq!(empty.checked_num_elements(), Some(0));
    }

    #[test]
    fn region_dimensionality_mismatch() {
        assert!(Region::new_with_start_count(vec![0, 0], vec![1]).is_err());
        assert!(
            Region::new_with_start_count_stride(vec![0, 0], vec![1, 1], vec![1]).is_err()
        );
        assert_eq!(
            IncompatibleDimensionalityError::new(2, 3).to_string(),
            "incompatible dimensionality 2, expected 3"
        );
    }
}
