//! The dataset schema of the putget matrix.
//!
//! Every dataset has the dimensions `timestep`, `x` and `y`, and one variable `foo_{type tag}` per data type of the flavor, in type tag order.
//! The `timestep` dimension is either fixed at [`NUM_TIMESTEPS`] or unlimited.

use thiserror::Error;

use crate::{
    access::AccessPattern,
    collective::Collective,
    data_type::{DataType, ElementKind},
    fixtures::{X_DIM_LEN, Y_DIM_LEN},
    storage::{DatasetId, DatasetStorage, DimId, DimensionLength, Flavor, StorageError, VarId},
};

/// The number of dimensions of every variable.
pub const NDIM: usize = 3;

/// The dimension names, slowest varying first.
pub const DIM_NAMES: [&str; NDIM] = ["timestep", "x", "y"];

/// The length of the `timestep` dimension when it is not unlimited.
pub const NUM_TIMESTEPS: u64 = 1;

/// The base name of every variable.
pub const VAR_NAME: &str = "foo";

/// The number of variables of a classic flavor dataset.
pub const NUM_CLASSIC_TYPES: usize = DataType::CLASSIC.len();

/// The number of variables of an extended flavor dataset.
pub const NUM_NETCDF4_TYPES: usize = DataType::ALL.len();

/// Returns the name of the variable of `data_type`.
#[must_use]
pub fn variable_name(data_type: DataType) -> String {
    format!("{VAR_NAME}_{}", data_type.type_tag())
}

/// Returns the dataset file name of a matrix cell.
#[must_use]
pub fn putget_filename(
    test_name: &str,
    access: AccessPattern,
    unlimited: bool,
    flavor: Flavor,
) -> String {
    format!(
        "{test_name}_putget_access_{}_unlim_{}_{}.nc",
        access.ordinal(),
        u8::from(unlimited),
        flavor.name()
    )
}

/// Returns the dimension lengths, in [`DIM_NAMES`] order.
#[must_use]
pub const fn dimension_lengths(unlimited: bool) -> [DimensionLength; NDIM] {
    [
        if unlimited {
            DimensionLength::Unlimited
        } else {
            DimensionLength::Fixed(NUM_TIMESTEPS)
        },
        DimensionLength::Fixed(X_DIM_LEN),
        DimensionLength::Fixed(Y_DIM_LEN),
    ]
}

/// A dataset created by [`create_putget_file`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutGetFile {
    dataset: DatasetId,
    path: String,
    flavor: Flavor,
    unlimited: bool,
    dimensions: [DimId; NDIM],
    variables: Vec<VarId>,
}

impl PutGetFile {
    /// Returns the dataset handle.
    #[must_use]
    pub const fn dataset(&self) -> DatasetId {
        self.dataset
    }

    /// Returns the dataset path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the flavor.
    #[must_use]
    pub const fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Returns true if the `timestep` dimension is unlimited.
    #[must_use]
    pub const fn unlimited(&self) -> bool {
        self.unlimited
    }

    /// Returns the dimension ids, in [`DIM_NAMES`] order.
    #[must_use]
    pub const fn dimensions(&self) -> &[DimId; NDIM] {
        &self.dimensions
    }

    /// Returns the variable ids, in type tag order.
    #[must_use]
    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }

    /// Returns the id of the variable holding `kind`, or [`None`] if the flavor has no such variable.
    #[must_use]
    pub fn variable(&self, kind: ElementKind) -> Option<VarId> {
        self.variables.get(kind.variable_index()).copied()
    }

    /// Returns the same file accessed through another handle, such as after reopening.
    ///
    /// Dimension and variable ids are stable across reopening.
    #[must_use]
    pub fn reopened(&self, dataset: DatasetId) -> Self {
        Self {
            dataset,
            ..self.clone()
        }
    }
}

/// A dataset schema error.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Creating the dataset failed.
    #[error("failed to create dataset {path}: {source}")]
    Create {
        /// The dataset path.
        path: String,
        /// The storage error.
        source: StorageError,
    },
    /// Defining a dimension failed.
    #[error("failed to define dimension {name}: {source}")]
    DefineDimension {
        /// The open dataset.
        dataset: DatasetId,
        /// The dimension name.
        name: String,
        /// The storage error.
        source: StorageError,
    },
    /// Defining a variable failed.
    #[error("failed to define variable {name}: {source}")]
    DefineVariable {
        /// The open dataset.
        dataset: DatasetId,
        /// The variable name.
        name: String,
        /// The storage error.
        source: StorageError,
    },
    /// Leaving define mode failed.
    #[error("failed to end define mode: {source}")]
    EndDefinition {
        /// The open dataset.
        dataset: DatasetId,
        /// The storage error.
        source: StorageError,
    },
}

impl SchemaError {
    /// Returns the storage error code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.storage_error().code()
    }

    /// Returns the underlying storage error.
    #[must_use]
    pub const fn storage_error(&self) -> &StorageError {
        match self {
            Self::Create { source, .. }
            | Self::DefineDimension { source, .. }
            | Self::DefineVariable { source, .. }
            | Self::EndDefinition { source, .. } => source,
        }
    }

    /// Returns the dataset handle left open by the failure, if any.
    #[must_use]
    pub const fn dataset(&self) -> Option<DatasetId> {
        match self {
            Self::Create { .. } => None,
            Self::DefineDimension { dataset, .. }
            | Self::DefineVariable { dataset, .. }
            | Self::EndDefinition { dataset, .. } => Some(*dataset),
        }
    }
}

/// Create the dataset of a matrix cell, define its dimensions and variables, and leave define mode.
///
/// An existing dataset of the same name is replaced.
///
/// # Errors
/// Returns a [`SchemaError`] naming the first step that failed.
/// The builder does not close the dataset on failure; see [`SchemaError::dataset`].
pub fn create_putget_file(
    storage: &dyn DatasetStorage,
    team: &dyn Collective,
    test_name: &str,
    access: AccessPattern,
    unlimited: bool,
    flavor: Flavor,
) -> Result<PutGetFile, SchemaError> {
    let path = putget_filename(test_name, access, unlimited, flavor);
    let dataset = storage
        .create(team, flavor, &path)
        .map_err(|source| SchemaError::Create {
            path: path.clone(),
            source,
        })?;

    let mut dimensions = [DimId::from(0); NDIM];
    for ((dimension, name), length) in dimensions
        .iter_mut()
        .zip(DIM_NAMES)
        .zip(dimension_lengths(unlimited))
    {
        *dimension =
            storage
                .def_dim(dataset, name, length)
                .map_err(|source| SchemaError::DefineDimension {
                    dataset,
                    name: name.to_string(),
                    source,
                })?;
    }

    let variables = DataType::for_flavor(flavor)
        .iter()
        .map(|&data_type| {
            let name = variable_name(data_type);
            storage
                .def_var(dataset, &name, data_type, &dimensions)
                .map_err(|source| SchemaError::DefineVariable {
                    dataset,
                    name,
                    source,
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    storage
        .enddef(dataset)
        .map_err(|source| SchemaError::EndDefinition { dataset, source })?;

    Ok(PutGetFile {
        dataset,
        path,
        flavor,
        unlimited,
        dimensions,
        variables,
    })
}
