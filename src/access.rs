//! Access pattern writers and readers.
//!
//! Each [`AccessPattern`] writes the fixture of every element kind tested for the flavor to its variable, and reads it back and compares it bit-for-bit.
//! The element kinds are iterated from the [`ELEMENT_KINDS`](crate::data_type::ELEMENT_KINDS) registry rather than branching per type.

use thiserror::Error;

use crate::{
    access_descriptor::{AccessDescriptor, ArrayIndices, ArrayShape},
    data_type::{ElementKind, ElementKindEntry},
    fixtures::{Fixture, Fixtures, X_DIM_LEN, Y_DIM_LEN},
    schema::{PutGetFile, NDIM},
    storage::{DatasetStorage, StorageError, VarId},
};

/// The error code of a value read back that differs from the value written.
pub const ERR_WRONG: i32 = 1112;

/// An access pattern.
///
/// The discriminant is the ordinal used in dataset file names.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessPattern {
    /// The entire variable in one call.
    Whole = 0,
    /// One element at an index.
    Single = 1,
    /// A contiguous block.
    Region = 2,
    /// A strided block.
    Strided = 3,
}

impl AccessPattern {
    /// All access patterns, in ordinal order.
    pub const ALL: [Self; 4] = [Self::Whole, Self::Single, Self::Region, Self::Strided];

    /// Returns the ordinal of the access pattern.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        *self as usize
    }

    /// Returns the name of the access pattern.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Whole => "whole",
            Self::Single => "single",
            Self::Region => "region",
            Self::Strided => "strided",
        }
    }
}

impl core::fmt::Display for AccessPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The index, start, count and stride used by the access patterns of a matrix cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessDescriptors {
    index: ArrayIndices,
    start: ArrayIndices,
    count: ArrayShape,
    stride: ArrayShape,
}

impl Default for AccessDescriptors {
    fn default() -> Self {
        Self::sample()
    }
}

impl AccessDescriptors {
    /// The descriptors of the putget matrix.
    ///
    /// The index is the origin, and the region covers one timestep of the whole `x` × `y` extent with unit stride.
    #[must_use]
    pub fn sample() -> Self {
        Self {
            index: vec![0; NDIM],
            start: vec![0; NDIM],
            count: vec![1, X_DIM_LEN, Y_DIM_LEN],
            stride: vec![1; NDIM],
        }
    }

    /// Create access descriptors.
    #[must_use]
    pub fn new(
        index: ArrayIndices,
        start: ArrayIndices,
        count: ArrayShape,
        stride: ArrayShape,
    ) -> Self {
        Self {
            index,
            start,
            count,
            stride,
        }
    }

    /// Returns the descriptor of `pattern`.
    #[must_use]
    pub fn descriptor(&self, pattern: AccessPattern) -> AccessDescriptor {
        match pattern {
            AccessPattern::Whole => AccessDescriptor::Whole,
            AccessPattern::Single => AccessDescriptor::Index(self.index.clone()),
            AccessPattern::Region => AccessDescriptor::Region {
                start: self.start.clone(),
                count: self.count.clone(),
            },
            AccessPattern::Strided => AccessDescriptor::StridedRegion {
                start: self.start.clone(),
                count: self.count.clone(),
                stride: self.stride.clone(),
            },
        }
    }
}

/// The operation of a failed storage call.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// A write.
    Write,
    /// A read.
    Read,
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Write => write!(f, "write"),
            Self::Read => write!(f, "read"),
        }
    }
}

/// How a read differs from the fixture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MismatchDetail {
    /// An element differs.
    Value {
        /// The element index within the read.
        index: usize,
        /// The expected element.
        expected: String,
        /// The element read.
        found: String,
    },
    /// The number of elements differs.
    Length {
        /// The expected number of elements.
        expected: usize,
        /// The number of elements read.
        found: usize,
    },
}

/// A successful read returned data that is not bit-identical to the fixture.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind} read back wrong: {}", format_detail(.detail))]
pub struct DataMismatch {
    kind: ElementKind,
    detail: MismatchDetail,
}

fn format_detail(detail: &MismatchDetail) -> String {
    match detail {
        MismatchDetail::Value {
            index,
            expected,
            found,
        } => format!("element {index} is {found}, expected {expected}"),
        MismatchDetail::Length { expected, found } => {
            format!("read {found} elements, expected {expected}")
        }
    }
}

impl DataMismatch {
    /// Compare `found` against `expected`, both native endian bytes of `entry.kind`.
    ///
    /// Returns [`None`] if they are bit-identical.
    #[must_use]
    pub fn compare(entry: &ElementKindEntry, expected: &[u8], found: &[u8]) -> Option<Self> {
        let index = (entry.first_mismatch)(expected, found)?;
        let size = entry.kind.size();
        let detail = if expected.len() == found.len() {
            MismatchDetail::Value {
                index,
                expected: (entry.format_element)(expected, index),
                found: (entry.format_element)(found, index),
            }
        } else {
            MismatchDetail::Length {
                expected: expected.len() / size,
                found: found.len() / size,
            }
        };
        Some(Self {
            kind: entry.kind,
            detail,
        })
    }

    /// Returns the element kind.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Returns how the read differs.
    #[must_use]
    pub const fn detail(&self) -> &MismatchDetail {
        &self.detail
    }
}

/// An access pattern error.
#[derive(Debug, Error)]
pub enum AccessError {
    /// A storage call failed.
    #[error("{operation} of {kind} failed: {source}")]
    Storage {
        /// The element kind.
        kind: ElementKind,
        /// The operation.
        operation: Operation,
        /// The storage error.
        source: StorageError,
    },
    /// The data read back differs from the fixture.
    #[error(transparent)]
    Mismatch(#[from] DataMismatch),
    /// The dataset has no variable for an element kind tested for its flavor.
    #[error("dataset has no variable for {0}")]
    MissingVariable(ElementKind),
}

impl AccessError {
    /// Returns the error code: the storage error code, or [`ERR_WRONG`].
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Storage { source, .. } => source.code(),
            Self::Mismatch(_) | Self::MissingVariable(_) => ERR_WRONG,
        }
    }

    /// Returns the element kind being accessed.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Storage { kind, .. } | Self::MissingVariable(kind) => *kind,
            Self::Mismatch(mismatch) => mismatch.kind,
        }
    }
}

/// Returns the bytes of `fixture` written and read by `pattern`.
#[must_use]
pub fn pattern_bytes(fixture: &Fixture, pattern: AccessPattern) -> &[u8] {
    match pattern {
        AccessPattern::Single => fixture.scalar_bytes(),
        AccessPattern::Whole | AccessPattern::Region | AccessPattern::Strided => {
            fixture.array_bytes()
        }
    }
}

fn variable(file: &PutGetFile, entry: &ElementKindEntry) -> Result<VarId, AccessError> {
    file.variable(entry.kind)
        .ok_or(AccessError::MissingVariable(entry.kind))
}

/// Write the fixtures with `pattern` to every variable tested for the flavor of `file`.
///
/// # Errors
/// Returns [`AccessError::Storage`] for the first write that fails.
pub fn write_pattern(
    storage: &dyn DatasetStorage,
    file: &PutGetFile,
    pattern: AccessPattern,
    descriptors: &AccessDescriptors,
    fixtures: &Fixtures,
) -> Result<(), AccessError> {
    let access = descriptors.descriptor(pattern);
    for entry in ElementKind::tested_for(file.flavor()) {
        let var = variable(file, entry)?;
        let bytes = pattern_bytes(fixtures.get(entry.kind), pattern);
        tracing::debug!(kind = %entry.kind, %var, %access, "write");
        storage
            .put(file.dataset(), var, &access, entry.kind, bytes)
            .map_err(|source| AccessError::Storage {
                kind: entry.kind,
                operation: Operation::Write,
                source,
            })?;
    }
    Ok(())
}

/// Read every variable tested for the flavor of `file` with `pattern` and compare against the fixtures.
///
/// A whole variable read of a dataset with an unlimited `timestep` dimension must be empty, since no records are written by the whole variable pattern.
///
/// # Errors
/// Returns [`AccessError::Storage`] for the first read that fails, or [`AccessError::Mismatch`] for the first read that differs from its fixture.
pub fn read_pattern(
    storage: &dyn DatasetStorage,
    file: &PutGetFile,
    pattern: AccessPattern,
    descriptors: &AccessDescriptors,
    fixtures: &Fixtures,
) -> Result<(), AccessError> {
    let access = descriptors.descriptor(pattern);
    let expect_empty = pattern == AccessPattern::Whole && file.unlimited();
    for entry in ElementKind::tested_for(file.flavor()) {
        let var = variable(file, entry)?;
        tracing::debug!(kind = %entry.kind, %var, %access, "read");
        let found = storage
            .get(file.dataset(), var, &access, entry.kind)
            .map_err(|source| AccessError::Storage {
                kind: entry.kind,
                operation: Operation::Read,
                source,
            })?;
        let expected: &[u8] = if expect_empty {
            &[]
        } else {
            pattern_bytes(fixtures.get(entry.kind), pattern)
        };
        if let Some(mismatch) = DataMismatch::compare(entry, expected, &found) {
            return Err(mismatch.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collective::SingleTask,
        data_type::elements_to_bytes,
        schema::create_putget_file,
        storage::{Flavor, StoreDatasetStorage},
        store::MemoryStore,
    };
    use std::{error::Error, sync::Arc};

    #[test]
    fn access_pattern_ordinals() {
        for (ordinal, pattern) in AccessPattern::ALL.iter().enumerate() {
            assert_eq!(pattern.ordinal(), ordinal);
        }
        assert_eq!(AccessPattern::Strided.to_string(), "strided");
    }

    #[test]
    fn access_pattern_bytes() {
        let fixtures = Fixtures::new();
        let fixture = fixtures.get(ElementKind::Float64);
        assert_eq!(pattern_bytes(fixture, AccessPattern::Single).len(), 8);
        for pattern in [
            AccessPattern::Whole,
            AccessPattern::Region,
            AccessPattern::Strided,
        ] {
            assert_eq!(
                pattern_bytes(fixture, pattern).len(),
                8 * crate::fixtures::ARRAY_NUM_ELEMENTS
            );
        }
    }

    #[test]
    fn access_descriptors_sample() {
        let descriptors = AccessDescriptors::sample();
        assert_eq!(
            descriptors.descriptor(AccessPattern::Single),
            AccessDescriptor::Index(vec![0, 0, 0])
        );
        assert_eq!(
            descriptors.descriptor(AccessPattern::Strided),
            AccessDescriptor::StridedRegion {
                start: vec![0, 0, 0],
                count: vec![1, 40, 40],
                stride: vec![1, 1, 1],
            }
        );
    }

    #[test]
    fn data_mismatch_detail() {
        let entry = ElementKind::Float32.entry();
        let expected = elements_to_bytes(&[1.0f32, 2.0, 3.0]);
        assert!(DataMismatch::compare(entry, &expected, &expected).is_none());

        let found = elements_to_bytes(&[1.0f32, 2.5, 3.0]);
        let mismatch = DataMismatch::compare(entry, &expected, &found).unwrap();
        assert_eq!(
            mismatch.detail(),
            &MismatchDetail::Value {
                index: 1,
                expected: "2".to_string(),
                found: "2.5".to_string(),
            }
        );
        assert_eq!(
            mismatch.to_string(),
            "float32 read back wrong: element 1 is 2.5, expected 2"
        );

        let mismatch = DataMismatch::compare(entry, &[], &found).unwrap();
        assert_eq!(
            mismatch.detail(),
            &MismatchDetail::Length {
                expected: 0,
                found: 3
            }
        );
        assert_eq!(AccessError::from(mismatch).code(), ERR_WRONG);
    }

    #[test]
    fn data_mismatch_is_bitwise() {
        let entry = ElementKind::Float64.entry();
        let positive = elements_to_bytes(&[0.0f64]);
        let negative = elements_to_bytes(&[-0.0f64]);
        assert!(DataMismatch::compare(entry, &positive, &negative).is_some());
    }

    #[test]
    fn access_patterns_round_trip() -> Result<(), Box<dyn Error>> {
        let storage = StoreDatasetStorage::new(Arc::new(MemoryStore::new()));
        let fixtures = Fixtures::new();
        let descriptors = AccessDescriptors::sample();
        for pattern in AccessPattern::ALL {
            let file = create_putget_file(
                &storage,
                &SingleTask,
                "t",
                pattern,
                false,
                Flavor::NetCdf4Parallel,
            )?;
            write_pattern(&storage, &file, pattern, &descriptors, &fixtures)?;
            read_pattern(&storage, &file, pattern, &descriptors, &fixtures)?;
            storage.close(file.dataset())?;
        }
        Ok(())
    }

    #[test]
    fn access_storage_error_is_attributed() -> Result<(), Box<dyn Error>> {
        let storage = StoreDatasetStorage::new(Arc::new(MemoryStore::new()));
        let fixtures = Fixtures::new();
        let file = create_putget_file(
            &storage,
            &SingleTask,
            "t",
            AccessPattern::Single,
            false,
            Flavor::NetCdf,
        )?;
        let descriptors =
            AccessDescriptors::new(vec![0, 40, 0], vec![0; 3], vec![1; 3], vec![1; 3]);
        let err = write_pattern(&storage, &file, AccessPattern::Single, &descriptors, &fixtures)
            .unwrap_err();
        assert_eq!(err.kind(), ElementKind::Int8);
        assert_eq!(err.code(), crate::storage::NC_EINVALCOORDS);
        assert!(matches!(
            err,
            AccessError::Storage {
                operation: Operation::Write,
                ..
            }
        ));
        storage.close(file.dataset())?;
        Ok(())
    }
}
