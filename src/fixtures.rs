//! Deterministic sample data.
//!
//! Each [`ElementKind`] has one representative scalar, and a [`X_DIM_LEN`] × [`Y_DIM_LEN`] array holding that scalar in every cell.
//! The same [`Fixtures`] value is written by the access patterns and compared against when reading back.

use crate::data_type::{bytes_to_elements, elements_to_bytes, Element, ElementKind};

/// The length of the `x` dimension.
pub const X_DIM_LEN: u64 = 40;

/// The length of the `y` dimension.
pub const Y_DIM_LEN: u64 = 40;

/// The number of elements in an array fixture.
#[allow(clippy::cast_possible_truncation)]
pub const ARRAY_NUM_ELEMENTS: usize = (X_DIM_LEN * Y_DIM_LEN) as usize;

/// The sample data of one element kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    kind: ElementKind,
    scalar: Vec<u8>,
    array: Vec<u8>,
}

impl Fixture {
    fn new<T: Element>(value: T) -> Self {
        Self {
            kind: T::KIND,
            scalar: elements_to_bytes(&[value]),
            array: elements_to_bytes(&[value; ARRAY_NUM_ELEMENTS]),
        }
    }

    /// Returns the element kind.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Returns the native endian bytes of the scalar.
    #[must_use]
    pub fn scalar_bytes(&self) -> &[u8] {
        &self.scalar
    }

    /// Returns the native endian bytes of the array, in row-major order.
    #[must_use]
    pub fn array_bytes(&self) -> &[u8] {
        &self.array
    }

    /// Returns the scalar as `T`, or [`None`] if `T` is not the element type of this fixture.
    #[must_use]
    pub fn scalar<T: Element>(&self) -> Option<T> {
        (T::KIND == self.kind).then(|| bytemuck::pod_read_unaligned(&self.scalar))
    }

    /// Returns the array as elements of `T`, or [`None`] if `T` is not the element type of this fixture.
    #[must_use]
    pub fn array<T: Element>(&self) -> Option<Vec<T>> {
        if T::KIND == self.kind {
            bytes_to_elements(&self.array)
        } else {
            None
        }
    }
}

/// The sample data of every element kind.
///
/// Construct it once at start-up and share it by reference; it is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixtures {
    fixtures: Vec<Fixture>,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixtures {
    /// Create the sample data.
    #[must_use]
    #[allow(clippy::excessive_precision)]
    pub fn new() -> Self {
        Self {
            fixtures: vec![
                Fixture::new(-42i8),
                Fixture::new(-300i16),
                Fixture::new(-10_000i32),
                Fixture::new(-42.42f32),
                Fixture::new(-420_000_000_000.5f64),
                Fixture::new(43u8),
                Fixture::new(666u16),
                Fixture::new(666_666u32),
                Fixture::new(-99_999_999_999i64),
                Fixture::new(99_999_999_999u64),
            ],
        }
    }

    /// Returns the fixture of `kind`.
    #[must_use]
    pub fn get(&self, kind: ElementKind) -> &Fixture {
        self.fixtures
            .iter()
            .find(|fixture| fixture.kind == kind)
            .unwrap_or_else(|| unreachable!("every element kind has a fixture"))
    }

    /// Returns an iterator over all fixtures.
    pub fn iter(&self) -> impl Iterator<Item = &Fixture> {
        self.fixtures.iter()
    }
}
