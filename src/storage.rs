//! The dataset storage service.
//!
//! [`DatasetStorage`] is the interface to a multi-dimensional, typed, array-oriented storage service in the style of netCDF.
//! A dataset is created in define mode, where dimensions and variables are declared.
//! After [`enddef`](DatasetStorage::enddef), elements of variables are written and read through an [`AccessDescriptor`].
//!
//! [`StoreDatasetStorage`] is a reference implementation which keeps dataset metadata and variable data in a key-value [`store`](crate::store).
//!
//! ## Collective calls
//! Datasets are created and opened by a team of tasks (a [`Collective`]).
//! Every method of [`DatasetStorage`] is a collective call:
//! every member of the team must issue the same calls, in the same order, with consistent arguments.
//! A [`DatasetStorage`] implementation may assume this precondition holds and is not required to detect divergence.

mod dataset_metadata;
mod store_dataset_storage;

pub use store_dataset_storage::StoreDatasetStorage;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    access_descriptor::{AccessDescriptor, IncompatibleDimensionalityError},
    collective::Collective,
    data_type::{DataType, ElementKind},
    store::StoreError,
};

/// No such file or directory.
pub const ENOENT: i32 = 2;
/// Invalid argument.
pub const NC_EINVAL: i32 = -36;
/// Write to read only.
pub const NC_EPERM: i32 = -37;
/// Operation not allowed in data mode.
pub const NC_ENOTINDEFINE: i32 = -38;
/// Operation not allowed in define mode.
pub const NC_EINDEFINE: i32 = -39;
/// Index exceeds dimension bound.
pub const NC_EINVALCOORDS: i32 = -40;
/// String match to name in use.
pub const NC_ENAMEINUSE: i32 = -42;
/// Not a valid ID.
pub const NC_EBADID: i32 = -33;
/// Not a valid data type or type mismatch.
pub const NC_EBADTYPE: i32 = -45;
/// Invalid dimension id or name.
pub const NC_EBADDIM: i32 = -46;
/// Unlimited dimension in the wrong index.
pub const NC_EUNLIMPOS: i32 = -47;
/// Variable not found.
pub const NC_ENOTVAR: i32 = -49;
/// Not a dataset of the expected format.
pub const NC_ENOTNC: i32 = -51;
/// Unlimited dimension already defined.
pub const NC_EUNLIMIT: i32 = -54;
/// Start plus count exceeds dimension bound.
pub const NC_EEDGE: i32 = -57;
/// Illegal stride.
pub const NC_ESTRIDE: i32 = -58;
/// Attribute or variable name contains illegal characters.
pub const NC_EBADNAME: i32 = -59;
/// Generic IO error.
pub const NC_EIO: i32 = -68;

/// A dataset handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
pub struct DatasetId(u64);

/// A dimension id, unique within a dataset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
pub struct DimId(usize);

impl DimId {
    /// Returns the position of the dimension in definition order.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// A variable id, unique within a dataset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
pub struct VarId(usize);

impl VarId {
    /// Returns the position of the variable in definition order.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

/// A format family.
///
/// A dataset created with a flavor of one family cannot be opened with a flavor of another.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum FormatFamily {
    /// The classic format and its 64-bit offset variants.
    #[display("classic")]
    Classic,
    /// The extended, HDF5 based format.
    #[display("netcdf4")]
    NetCdf4,
}

/// A storage format backend variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flavor {
    /// Parallel classic format. Writes are deferred until [`sync`](DatasetStorage::sync) or [`close`](DatasetStorage::close).
    #[serde(rename = "pnetcdf")]
    PnetCdf,
    /// Serial classic format.
    #[serde(rename = "netcdf")]
    NetCdf,
    /// Serial extended format with compression.
    #[serde(rename = "netcdf4c")]
    NetCdf4Compressed,
    /// Parallel extended format.
    #[serde(rename = "netcdf4p")]
    NetCdf4Parallel,
}

impl Flavor {
    /// All flavors.
    pub const ALL: [Self; 4] = [
        Self::PnetCdf,
        Self::NetCdf,
        Self::NetCdf4Compressed,
        Self::NetCdf4Parallel,
    ];

    /// Returns the name of the flavor, as used in dataset file names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PnetCdf => "pnetcdf",
            Self::NetCdf => "netcdf",
            Self::NetCdf4Compressed => "netcdf4c",
            Self::NetCdf4Parallel => "netcdf4p",
        }
    }

    /// Returns the format family of the flavor.
    #[must_use]
    pub const fn format_family(&self) -> FormatFamily {
        match self {
            Self::PnetCdf | Self::NetCdf => FormatFamily::Classic,
            Self::NetCdf4Compressed | Self::NetCdf4Parallel => FormatFamily::NetCdf4,
        }
    }

    /// Returns true if the flavor supports the extended data types.
    #[must_use]
    pub const fn supports_extended_types(&self) -> bool {
        matches!(self.format_family(), FormatFamily::NetCdf4)
    }

    /// Returns true if writes only materialize on [`sync`](DatasetStorage::sync) or [`close`](DatasetStorage::close).
    #[must_use]
    pub const fn defers_writes(&self) -> bool {
        matches!(self, Self::PnetCdf)
    }
}

impl core::fmt::Display for Flavor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An unknown flavor name.
#[derive(Debug, Error, From)]
#[error("unknown flavor {0}")]
pub struct UnknownFlavorError(String);

impl core::str::FromStr for Flavor {
    type Err = UnknownFlavorError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|flavor| flavor.name() == name)
            .ok_or_else(|| UnknownFlavorError(name.to_string()))
    }
}

/// The mode of an opened dataset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Reads only. Writes fail with [`StorageError::ReadOnly`].
    ReadOnly,
    /// Reads and writes.
    Write,
}

/// The length of a dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DimensionLength {
    /// A fixed length.
    Fixed(u64),
    /// An unlimited length, growing as records are written. Initially zero.
    Unlimited,
}

impl core::fmt::Display for DimensionLength {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Fixed(length) => write!(f, "{length}"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// The definition of a variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableInfo {
    name: String,
    data_type: DataType,
    dimensions: Vec<DimId>,
}

impl VariableInfo {
    /// Create a new variable definition.
    #[must_use]
    pub fn new(name: String, data_type: DataType, dimensions: Vec<DimId>) -> Self {
        Self {
            name,
            data_type,
            dimensions,
        }
    }

    /// Returns the variable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the data type.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the dimensions, slowest varying first.
    #[must_use]
    pub fn dimensions(&self) -> &[DimId] {
        &self.dimensions
    }
}

/// A dataset storage error.
///
/// Each error has a stable numeric [`code`](StorageError::code) following netCDF conventions.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The dataset handle is not open.
    #[error("dataset {0} is not open")]
    BadId(DatasetId),
    /// The dimension id does not exist.
    #[error("dimension {0} does not exist")]
    BadDimension(DimId),
    /// The variable id does not exist.
    #[error("variable {0} does not exist")]
    NotVariable(VarId),
    /// The name is not a valid dimension, variable or dataset name.
    #[error("invalid name {0:?}")]
    BadName(String),
    /// The name is already used by another dimension or variable.
    #[error("name {0} is already in use")]
    NameInUse(String),
    /// The element kind does not match the data type of the variable, or the data type cannot be accessed.
    #[error("element kind {kind} cannot access a variable of data type {data_type}")]
    BadType {
        /// The element kind of the access.
        kind: ElementKind,
        /// The data type of the variable.
        data_type: DataType,
    },
    /// The data type is not supported by the flavor.
    #[error("data type {data_type} is not supported by flavor {flavor}")]
    UnsupportedDataType {
        /// The data type.
        data_type: DataType,
        /// The flavor of the dataset.
        flavor: Flavor,
    },
    /// The operation is not allowed in define mode.
    #[error("operation not allowed in define mode")]
    InDefineMode,
    /// The operation is only allowed in define mode.
    #[error("operation only allowed in define mode")]
    NotInDefineMode,
    /// A write was attempted on a read only dataset.
    #[error("dataset is read only")]
    ReadOnly,
    /// The unlimited dimension is not the first dimension of a variable.
    #[error("unlimited dimension must be the first dimension of variable {0}")]
    UnlimitedPosition(String),
    /// A second unlimited dimension was defined.
    #[error("dataset already has an unlimited dimension")]
    MultipleUnlimited,
    /// A start index exceeds a dimension length.
    #[error("start {start:?} exceeds extent {extent:?}")]
    InvalidCoordinates {
        /// The start of the access.
        start: Vec<u64>,
        /// The extent of the variable.
        extent: Vec<u64>,
    },
    /// An access extends past a dimension length.
    #[error("access ending at {end:?} exceeds extent {extent:?}")]
    EdgeExceeded {
        /// The exclusive end of the access.
        end: Vec<u64>,
        /// The extent of the variable.
        extent: Vec<u64>,
    },
    /// A stride is zero.
    #[error("stride {0:?} is not valid")]
    BadStride(Vec<u64>),
    /// An access has the wrong dimensionality.
    #[error(transparent)]
    IncompatibleDimensionality(#[from] IncompatibleDimensionalityError),
    /// An argument is not valid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No dataset exists at the path.
    #[error("dataset {0} does not exist")]
    NotFound(String),
    /// The dataset is not of the expected format or is corrupt.
    #[error("dataset {path} is not a valid {family} dataset: {reason}")]
    NotDataset {
        /// The dataset path.
        path: String,
        /// The expected format family.
        family: FormatFamily,
        /// Why the dataset is not valid.
        reason: String,
    },
    /// An underlying store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StorageError {
    /// Returns the netCDF style error code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::BadId(_) => NC_EBADID,
            Self::BadDimension(_) => NC_EBADDIM,
            Self::NotVariable(_) => NC_ENOTVAR,
            Self::BadName(_) => NC_EBADNAME,
            Self::NameInUse(_) => NC_ENAMEINUSE,
            Self::BadType { .. } | Self::UnsupportedDataType { .. } => NC_EBADTYPE,
            Self::InDefineMode => NC_EINDEFINE,
            Self::NotInDefineMode => NC_ENOTINDEFINE,
            Self::ReadOnly => NC_EPERM,
            Self::UnlimitedPosition(_) => NC_EUNLIMPOS,
            Self::MultipleUnlimited => NC_EUNLIMIT,
            Self::InvalidCoordinates { .. } => NC_EINVALCOORDS,
            Self::EdgeExceeded { .. } => NC_EEDGE,
            Self::BadStride(_) => NC_ESTRIDE,
            Self::IncompatibleDimensionality(_) | Self::InvalidArgument(_) => NC_EINVAL,
            Self::NotFound(_) => ENOENT,
            Self::NotDataset { .. } => NC_ENOTNC,
            Self::Store(_) => NC_EIO,
        }
    }
}

/// The interface of a dataset storage service.
///
/// Element data crosses the interface as native endian bytes of an [`ElementKind`], in row-major order.
/// Implementations do not convert between types: the element kind must match the data type of the variable.
///
/// See the [module documentation](self) for the collective call precondition.
pub trait DatasetStorage: Send + Sync {
    /// Create a dataset at `path` in define mode, replacing any existing dataset.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the path is invalid or the underlying storage fails.
    fn create(
        &self,
        team: &dyn Collective,
        flavor: Flavor,
        path: &str,
    ) -> Result<DatasetId, StorageError>;

    /// Open an existing dataset at `path` in data mode.
    ///
    /// # Errors
    /// Returns [`StorageError::NotFound`] if there is no dataset at `path`, or [`StorageError::NotDataset`] if it is not of the format family of `flavor`.
    fn open(
        &self,
        team: &dyn Collective,
        flavor: Flavor,
        path: &str,
        mode: OpenMode,
    ) -> Result<DatasetId, StorageError>;

    /// Define a dimension.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the dataset is not in define mode, the name is in use, or a second unlimited dimension is defined.
    fn def_dim(
        &self,
        dataset: DatasetId,
        name: &str,
        length: DimensionLength,
    ) -> Result<DimId, StorageError>;

    /// Define a variable over `dimensions`, slowest varying first.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the dataset is not in define mode, the name is in use, a dimension does not exist, the unlimited dimension is not first, or the data type is not supported by the flavor.
    fn def_var(
        &self,
        dataset: DatasetId,
        name: &str,
        data_type: DataType,
        dimensions: &[DimId],
    ) -> Result<VarId, StorageError>;

    /// Leave define mode.
    ///
    /// # Errors
    /// Returns [`StorageError::NotInDefineMode`] if the dataset is not in define mode.
    fn enddef(&self, dataset: DatasetId) -> Result<(), StorageError>;

    /// Write the elements addressed by `access` from `bytes`.
    ///
    /// Writes along the unlimited dimension grow it.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the access is out of bounds, `bytes` holds too few elements, the element kind does not match, or the dataset is read only.
    fn put(
        &self,
        dataset: DatasetId,
        var: VarId,
        access: &AccessDescriptor,
        kind: ElementKind,
        bytes: &[u8],
    ) -> Result<(), StorageError>;

    /// Read the elements addressed by `access`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the access is out of bounds or the element kind does not match.
    fn get(
        &self,
        dataset: DatasetId,
        var: VarId,
        access: &AccessDescriptor,
        kind: ElementKind,
    ) -> Result<Vec<u8>, StorageError>;

    /// Make all writes durable.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the dataset is in define mode or the underlying storage fails.
    fn sync(&self, dataset: DatasetId) -> Result<(), StorageError>;

    /// Close the dataset, making all writes durable.
    ///
    /// The handle is released even if an error is returned.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the handle is not open or the underlying storage fails.
    fn close(&self, dataset: DatasetId) -> Result<(), StorageError>;

    /// Returns the current length of a dimension.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the dimension does not exist.
    fn inq_dim_len(&self, dataset: DatasetId, dim: DimId) -> Result<u64, StorageError>;

    /// Returns the definition of a variable.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the variable does not exist.
    fn inq_var(&self, dataset: DatasetId, var: VarId) -> Result<VariableInfo, StorageError>;

    /// Returns the number of variables.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the handle is not open.
    fn inq_nvars(&self, dataset: DatasetId) -> Result<usize, StorageError>;

    /// Write the entire current extent of a variable.
    ///
    /// # Errors
    /// See [`put`](DatasetStorage::put).
    fn put_var(
        &self,
        dataset: DatasetId,
        var: VarId,
        kind: ElementKind,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.put(dataset, var, &AccessDescriptor::Whole, kind, bytes)
    }

    /// Write a single element at `index`.
    ///
    /// # Errors
    /// See [`put`](DatasetStorage::put).
    fn put_var1(
        &self,
        dataset: DatasetId,
        var: VarId,
        index: &[u64],
        kind: ElementKind,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.put(
            dataset,
            var,
            &AccessDescriptor::Index(index.to_vec()),
            kind,
            bytes,
        )
    }

    /// Write a contiguous block.
    ///
    /// # Errors
    /// See [`put`](DatasetStorage::put).
    fn put_vara(
        &self,
        dataset: DatasetId,
        var: VarId,
        start: &[u64],
        count: &[u64],
        kind: ElementKind,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let access = AccessDescriptor::Region {
            start: start.to_vec(),
            count: count.to_vec(),
        };
        self.put(dataset, var, &access, kind, bytes)
    }

    /// Write a strided block.
    ///
    /// # Errors
    /// See [`put`](DatasetStorage::put).
    #[allow(clippy::too_many_arguments)]
    fn put_vars(
        &self,
        dataset: DatasetId,
        var: VarId,
        start: &[u64],
        count: &[u64],
        stride: &[u64],
        kind: ElementKind,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let access = AccessDescriptor::StridedRegion {
            start: start.to_vec(),
            count: count.to_vec(),
            stride: stride.to_vec(),
        };
        self.put(dataset, var, &access, kind, bytes)
    }

    /// Read the entire current extent of a variable.
    ///
    /// # Errors
    /// See [`get`](DatasetStorage::get).
    fn get_var(
        &self,
        dataset: DatasetId,
        var: VarId,
        kind: ElementKind,
    ) -> Result<Vec<u8>, StorageError> {
        self.get(dataset, var, &AccessDescriptor::Whole, kind)
    }

    /// Read a single element at `index`.
    ///
    /// # Errors
    /// See [`get`](DatasetStorage::get).
    fn get_var1(
        &self,
        dataset: DatasetId,
        var: VarId,
        index: &[u64],
        kind: ElementKind,
    ) -> Result<Vec<u8>, StorageError> {
        self.get(dataset, var, &AccessDescriptor::Index(index.to_vec()), kind)
    }

    /// Read a contiguous block.
    ///
    /// # Errors
    /// See [`get`](DatasetStorage::get).
    fn get_vara(
        &self,
        dataset: DatasetId,
        var: VarId,
        start: &[u64],
        count: &[u64],
        kind: ElementKind,
    ) -> Result<Vec<u8>, StorageError> {
        let access = AccessDescriptor::Region {
            start: start.to_vec(),
            count: count.to_vec(),
        };
        self.get(dataset, var, &access, kind)
    }

    /// Read a strided block.
    ///
    /// # Errors
    /// See [`get`](DatasetStorage::get).
    fn get_vars(
        &self,
        dataset: DatasetId,
        var: VarId,
        start: &[u64],
        count: &[u64],
        stride: &[u64],
        kind: ElementKind,
    ) -> Result<Vec<u8>, StorageError> {
        let access = AccessDescriptor::StridedRegion {
            start: start.to_vec(),
            count: count.to_vec(),
            stride: stride.to_vec(),
        };
        self.get(dataset, var, &access, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_names() {
        for flavor in Flavor::ALL {
            assert_eq!(flavor.name().parse::<Flavor>().unwrap(), flavor);
            assert_eq!(
                serde_json::to_string(&flavor).unwrap(),
                format!("\"{}\"", flavor.name())
            );
        }
        assert!("netcdf3".parse::<Flavor>().is_err());
        assert_eq!(Flavor::NetCdf4Parallel.to_string(), "netcdf4p");
    }

    #[test]
    fn flavor_capabilities() {
        assert!(Flavor::PnetCdf.defers_writes());
        assert!(!Flavor::NetCdf.defers_writes());
        assert!(!Flavor::PnetCdf.supports_extended_types());
        assert!(!Flavor::NetCdf.supports_extended_types());
        assert!(Flavor::NetCdf4Compressed.supports_extended_types());
        assert!(Flavor::NetCdf4Parallel.supports_extended_types());
        assert_eq!(Flavor::NetCdf.format_family(), FormatFamily::Classic);
        assert_eq!(Flavor::NetCdf4Parallel.format_family(), FormatFamily::NetCdf4);
    }

    #[test]
    fn storage_error_codes() {
        assert_eq!(StorageError::BadId(DatasetId::from(7)).code(), -33);
        assert_eq!(StorageError::NotVariable(VarId::from(3)).code(), -49);
        assert_eq!(StorageError::ReadOnly.code(), -37);
        assert_eq!(StorageError::BadStride(vec![0, 1, 1]).code(), -58);
        assert_eq!(StorageError::NotFound("a.nc".to_string()).code(), 2);
        assert_eq!(StorageError::from(StoreError::ReadOnly).code(), -68);
        assert_eq!(
            StorageError::from(IncompatibleDimensionalityError::new(2, 3)).code(),
            -36
        );
    }
}
