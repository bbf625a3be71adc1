//! Storage data types and the element kinds exercised by the conformance matrix.
//!
//! A [`DataType`] is the type tag recorded for a variable in a dataset.
//! An [`ElementKind`] is an in-memory element type that is written and read back.
//! Every element kind maps to exactly one data type, but the `char` and `string` data types have no element kind: variables of those types are declared and never accessed.

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::storage::Flavor;

/// A storage data type.
///
/// The discriminant is the type tag written into dataset metadata and used in variable names.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize_repr, Deserialize_repr,
)]
#[repr(i32)]
#[rustfmt::skip]
pub enum DataType {
    /// `byte` signed 8-bit integer.
    Byte = 1,
    /// `char` 8-bit text character.
    Char = 2,
    /// `short` signed 16-bit integer.
    Short = 3,
    /// `int` signed 32-bit integer.
    Int = 4,
    /// `float` IEEE 754 single-precision floating point.
    Float = 5,
    /// `double` IEEE 754 double-precision floating point.
    Double = 6,
    /// `ubyte` unsigned 8-bit integer.
    UByte = 7,
    /// `ushort` unsigned 16-bit integer.
    UShort = 8,
    /// `uint` unsigned 32-bit integer.
    UInt = 9,
    /// `int64` signed 64-bit integer.
    Int64 = 10,
    /// `uint64` unsigned 64-bit integer.
    UInt64 = 11,
    /// `string` variable length UTF-8 string.
    String = 12,
}

/// The size of a data type.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataTypeSize {
    /// Fixed size (in bytes).
    Fixed(usize),
    /// Variable sized.
    Variable,
}

impl DataType {
    /// The classic data types, in type tag order.
    pub const CLASSIC: [Self; 6] = [
        Self::Byte,
        Self::Char,
        Self::Short,
        Self::Int,
        Self::Float,
        Self::Double,
    ];

    /// All data types, in type tag order. The first six are [`DataType::CLASSIC`].
    pub const ALL: [Self; 12] = [
        Self::Byte,
        Self::Char,
        Self::Short,
        Self::Int,
        Self::Float,
        Self::Double,
        Self::UByte,
        Self::UShort,
        Self::UInt,
        Self::Int64,
        Self::UInt64,
        Self::String,
    ];

    /// Returns the data types that can be defined in a dataset of `flavor`.
    #[must_use]
    pub fn for_flavor(flavor: Flavor) -> &'static [Self] {
        if flavor.supports_extended_types() {
            &Self::ALL
        } else {
            &Self::CLASSIC
        }
    }

    /// Returns the numeric type tag.
    #[must_use]
    pub const fn type_tag(&self) -> i32 {
        *self as i32
    }

    /// Returns the data type with type tag `type_tag`, if there is one.
    #[must_use]
    pub fn from_type_tag(type_tag: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|data_type| data_type.type_tag() == type_tag)
    }

    /// Returns the identifier.
    #[must_use]
    pub const fn identifier(&self) -> &'static str {
        match self {
            Self::Byte => "byte",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Float => "float",
            Self::Double => "double",
            Self::UByte => "ubyte",
            Self::UShort => "ushort",
            Self::UInt => "uint",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::String => "string",
        }
    }

    /// Returns true if the data type is only available in formats with extended type support.
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        self.type_tag() > Self::Double.type_tag()
    }

    /// Returns the [`DataTypeSize`].
    #[must_use]
    pub const fn size(&self) -> DataTypeSize {
        match self {
            Self::Byte | Self::Char | Self::UByte => DataTypeSize::Fixed(1),
            Self::Short | Self::UShort => DataTypeSize::Fixed(2),
            Self::Int | Self::UInt | Self::Float => DataTypeSize::Fixed(4),
            Self::Double | Self::Int64 | Self::UInt64 => DataTypeSize::Fixed(8),
            Self::String => DataTypeSize::Variable,
        }
    }

    /// Returns the size in bytes of a fixed-size data type, otherwise returns [`None`].
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self.size() {
            DataTypeSize::Fixed(size) => Some(size),
            DataTypeSize::Variable => None,
        }
    }

    /// Returns the native endian bytes of the default fill value, or [`None`] for variable sized data types.
    ///
    /// Unwritten elements of a variable read back as this value.
    #[must_use]
    pub fn fill_value(&self) -> Option<Vec<u8>> {
        let bytes = match self {
            Self::Byte => (-127i8).to_ne_bytes().to_vec(),
            Self::Char => vec![0],
            Self::Short => (-32767i16).to_ne_bytes().to_vec(),
            Self::Int => (-2_147_483_647i32).to_ne_bytes().to_vec(),
            Self::Float => 9.969_21e36_f32.to_ne_bytes().to_vec(),
            Self::Double => 9.969_209_968_386_869e36_f64.to_ne_bytes().to_vec(),
            Self::UByte => u8::MAX.to_ne_bytes().to_vec(),
            Self::UShort => u16::MAX.to_ne_bytes().to_vec(),
            Self::UInt => u32::MAX.to_ne_bytes().to_vec(),
            Self::Int64 => (-9_223_372_036_854_775_806i64).to_ne_bytes().to_vec(),
            Self::UInt64 => (u64::MAX - 1).to_ne_bytes().to_vec(),
            Self::String => return None,
        };
        Some(bytes)
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// An element kind written and read by the access patterns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `i8`.
    Int8,
    /// `i16`.
    Int16,
    /// `i32`.
    Int32,
    /// `i64`.
    Int64,
    /// `u8`.
    UInt8,
    /// `u16`.
    UInt16,
    /// `u32`.
    UInt32,
    /// `u64`.
    UInt64,
    /// `f32`.
    Float32,
    /// `f64`.
    Float64,
}

impl ElementKind {
    /// Returns the identifier.
    #[must_use]
    pub const fn identifier(&self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Returns the storage data type of the element kind.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Int8 => DataType::Byte,
            Self::Int16 => DataType::Short,
            Self::Int32 => DataType::Int,
            Self::Int64 => DataType::Int64,
            Self::UInt8 => DataType::UByte,
            Self::UInt16 => DataType::UShort,
            Self::UInt32 => DataType::UInt,
            Self::UInt64 => DataType::UInt64,
            Self::Float32 => DataType::Float,
            Self::Float64 => DataType::Double,
        }
    }

    /// Returns the element size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Returns true if the element kind is only tested for flavors with extended type support.
    #[must_use]
    pub const fn is_extended(&self) -> bool {
        self.data_type().is_extended()
    }

    /// Returns the registry entry of the element kind.
    #[must_use]
    pub fn entry(&self) -> &'static ElementKindEntry {
        ELEMENT_KINDS
            .iter()
            .find(|entry| entry.kind == *self)
            .unwrap_or_else(|| unreachable!("every element kind has an entry"))
    }

    /// Returns the position of the variable holding this element kind in the type tag ordered variable list of a dataset.
    #[must_use]
    pub fn variable_index(&self) -> usize {
        self.entry().variable_index
    }

    /// Returns the registry entries tested for `flavor`, in variable order.
    pub fn tested_for(flavor: Flavor) -> impl Iterator<Item = &'static ElementKindEntry> {
        let extended = flavor.supports_extended_types();
        ELEMENT_KINDS
            .iter()
            .filter(move |entry| extended || !entry.kind.is_extended())
    }
}

impl core::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// A native element type with a fixed byte representation.
pub trait Element: bytemuck::Pod + PartialEq + core::fmt::Debug + core::fmt::Display {
    /// The element kind of the type.
    const KIND: ElementKind;
}

macro_rules! impl_element {
    ($t:ty, $kind:ident) => {
        impl Element for $t {
            const KIND: ElementKind = ElementKind::$kind;
        }
    };
}

impl_element!(i8, Int8);
impl_element!(i16, Int16);
impl_element!(i32, Int32);
impl_element!(i64, Int64);
impl_element!(u8, UInt8);
impl_element!(u16, UInt16);
impl_element!(u32, UInt32);
impl_element!(u64, UInt64);
impl_element!(f32, Float32);
impl_element!(f64, Float64);

/// Convert a slice of elements into native endian bytes.
#[must_use]
pub fn elements_to_bytes<T: Element>(elements: &[T]) -> Vec<u8> {
    bytemuck::cast_slice(elements).to_vec()
}

/// Convert native endian bytes into elements.
///
/// Returns [`None`] if the number of bytes is not a multiple of the element size.
#[must_use]
pub fn bytes_to_elements<T: Element>(bytes: &[u8]) -> Option<Vec<T>> {
    if bytes.len() % core::mem::size_of::<T>() == 0 {
        Some(bytemuck::allocation::pod_collect_to_vec(bytes))
    } else {
        None
    }
}

/// An element kind registry entry.
///
/// The access patterns iterate [`ELEMENT_KINDS`] rather than branching per type.
#[derive(Debug)]
pub struct ElementKindEntry {
    /// The element kind.
    pub kind: ElementKind,
    /// The storage data type of variables holding this kind.
    pub data_type: DataType,
    /// The position of the variable in the type tag ordered variable list.
    pub variable_index: usize,
    /// Returns the index of the first element of `found` that is not bit-identical to `expected`.
    ///
    /// A length difference is reported at the index of the first missing or extra element.
    pub first_mismatch: fn(expected: &[u8], found: &[u8]) -> Option<usize>,
    /// Formats the element at an index of native endian bytes.
    pub format_element: fn(bytes: &[u8], index: usize) -> String,
}

fn first_mismatch<T: Element>(expected: &[u8], found: &[u8]) -> Option<usize> {
    let size = core::mem::size_of::<T>();
    let mismatch = expected
        .chunks_exact(size)
        .zip(found.chunks_exact(size))
        .position(|(expected, found)| expected != found);
    match mismatch {
        Some(index) => Some(index),
        None if expected.len() == found.len() => None,
        None => Some(expected.len().min(found.len()) / size),
    }
}

fn format_element<T: Element>(bytes: &[u8], index: usize) -> String {
    let size = core::mem::size_of::<T>();
    bytes
        .get(index * size..(index + 1) * size)
        .map_or_else(
            || "<missing>".to_string(),
            |element| bytemuck::pod_read_unaligned::<T>(element).to_string(),
        )
}

const fn entry<T: Element>(variable_index: usize) -> ElementKindEntry {
    ElementKindEntry {
        kind: T::KIND,
        data_type: T::KIND.data_type(),
        variable_index,
        first_mismatch: first_mismatch::<T>,
        format_element: format_element::<T>,
    }
}

/// The element kind registry, in variable order.
///
/// Baseline kinds come first, then the extended kinds.
pub static ELEMENT_KINDS: [ElementKindEntry; 10] = [
    entry::<i8>(0),
    entry::<i16>(2),
    entry::<i32>(3),
    entry::<f32>(4),
    entry::<f64>(5),
    entry::<u8>(6),
    entry::<u16>(7),
    entry::<u32>(8),
    entry::<i64>(9),
    entry::<u64>(10),
];
