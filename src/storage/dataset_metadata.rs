use serde::{Deserialize, Serialize};

use crate::{
    access_descriptor::ArrayShape,
    data_type::DataType,
    storage::{Flavor, FormatFamily},
};

/// Dataset metadata.
///
/// Serialised as JSON:
/// ```json
/// {
///   "format": "netcdf4",
///   "flavor": "netcdf4p",
///   "dimensions": [
///     { "name": "timestep", "length": null },
///     { "name": "x", "length": 40 },
///     { "name": "y", "length": 40 }
///   ],
///   "variables": [
///     { "name": "foo_1", "data_type": 1, "dimensions": [0, 1, 2] }
///   ],
///   "num_records": 1
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(super) struct DatasetMetadata {
    pub format: FormatFamily,
    pub flavor: Flavor,
    pub dimensions: Vec<DimensionMetadata>,
    pub variables: Vec<VariableMetadata>,
    pub num_records: u64,
}

/// Dimension metadata. A length of [`None`] is the unlimited dimension.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(super) struct DimensionMetadata {
    pub name: String,
    pub length: Option<u64>,
}

/// Variable metadata.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub(super) struct VariableMetadata {
    pub name: String,
    pub data_type: DataType,
    pub dimensions: Vec<usize>,
}

impl DatasetMetadata {
    pub fn new(flavor: Flavor) -> Self {
        Self {
            format: flavor.format_family(),
            flavor,
            dimensions: vec![],
            variables: vec![],
            num_records: 0,
        }
    }

    pub fn unlimited_dimension(&self) -> Option<usize> {
        self.dimensions
            .iter()
            .position(|dimension| dimension.length.is_none())
    }

    pub fn name_in_use(&self, name: &str) -> bool {
        self.dimensions.iter().any(|dimension| dimension.name == name)
            || self.variables.iter().any(|variable| variable.name == name)
    }

    /// The current length of a dimension.
    pub fn dimension_length(&self, dimension: usize) -> u64 {
        self.dimensions[dimension]
            .length
            .unwrap_or(self.num_records)
    }

    /// The current extent of a variable.
    pub fn variable_extent(&self, variable: &VariableMetadata) -> ArrayShape {
        variable
            .dimensions
            .iter()
            .map(|&dimension| self.dimension_length(dimension))
            .collect()
    }

    /// Returns true if `dimension` of `variable` is the unlimited dimension.
    pub fn is_unlimited(&self, variable: &VariableMetadata, dimension: usize) -> bool {
        variable
            .dimensions
            .get(dimension)
            .is_some_and(|&dimension| self.dimensions[dimension].length.is_none())
    }

    /// Returns true if the variable grows with the unlimited dimension.
    pub fn is_record_variable(&self, variable: &VariableMetadata) -> bool {
        self.is_unlimited(variable, 0)
    }

    /// The number of elements in one record of a record variable, or the whole variable otherwise.
    pub fn record_num_elements(&self, variable: &VariableMetadata) -> u64 {
        let extent = self.variable_extent(variable);
        if self.is_record_variable(variable) {
            extent[1..].iter().product()
        } else {
            extent.iter().product()
        }
    }

    /// Validate the consistency of deserialised metadata.
    pub fn validate(&self) -> Result<(), String> {
        if self.format != self.flavor.format_family() {
            return Err(format!(
                "flavor {} is not of format {}",
                self.flavor, self.format
            ));
        }
        if self
            .dimensions
            .iter()
            .filter(|dimension| dimension.length.is_none())
            .count()
            > 1
        {
            return Err("more than one unlimited dimension".to_string());
        }
        for variable in &self.variables {
            if let Some(dimension) = variable
                .dimensions
                .iter()
                .find(|&&dimension| dimension >= self.dimensions.len())
            {
                return Err(format!(
                    "variable {} references dimension {dimension} which does not exist",
                    variable.name
                ));
            }
        }
        Ok(())
    }
}
