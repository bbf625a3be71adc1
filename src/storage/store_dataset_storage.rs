use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use itertools::izip;
use parking_lot::{Mutex, RwLock};

use super::{
    dataset_metadata::{DatasetMetadata, DimensionMetadata, VariableMetadata},
    DatasetId, DatasetStorage, DimId, DimensionLength, Flavor, OpenMode, StorageError, VarId,
    VariableInfo,
};
use crate::{
    access_descriptor::{AccessDescriptor, Region},
    collective::Collective,
    data_type::{DataType, ElementKind},
    store::{
        ReadableStorageTraits, StoreError, StoreKey, StoreKeyStartValue, WritableStorageTraits,
    },
};

const METADATA_KEY: &str = "dataset.json";

/// A [`DatasetStorage`] implementation over a key-value store.
///
/// A dataset at `path` is held under the store prefix `path/`:
///  - `path/dataset.json`: the dimensions and variables of the dataset,
///  - `path/var/{index}`: the elements of each variable, in native endian row-major order.
///
/// Every member of a team holds its own [`StoreDatasetStorage`] over a shared store.
/// Members write identical data, so the store content does not depend on the team size.
///
/// Record variables (those whose first dimension is unlimited) grow together: writing record `r` of one variable extends every record variable to `r + 1` records, padding with fill values.
/// Only a single unlimited dimension is supported, and it must be the first dimension of any variable using it.
pub struct StoreDatasetStorage<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    next_id: AtomicU64,
    datasets: RwLock<HashMap<DatasetId, Mutex<OpenDataset>>>,
}

impl<TStorage: ?Sized> core::fmt::Debug for StoreDatasetStorage<TStorage> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreDatasetStorage")
            .field("open", &self.datasets.read().len())
            .finish_non_exhaustive()
    }
}

/// A write queued until the dataset is flushed.
struct PendingWrite {
    variable: usize,
    region: Region,
    bytes: Vec<u8>,
}

struct OpenDataset {
    path: StoreKey,
    mode: OpenMode,
    define_mode: bool,
    metadata: DatasetMetadata,
    metadata_dirty: bool,
    pending: Vec<PendingWrite>,
}

impl<TStorage: ?Sized> StoreDatasetStorage<TStorage> {
    /// Create a new dataset storage service over `storage`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self {
            storage,
            next_id: AtomicU64::new(1),
            datasets: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, dataset: OpenDataset) -> DatasetId {
        let id = DatasetId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.datasets.write().insert(id, Mutex::new(dataset));
        id
    }

    fn with_dataset<R>(
        &self,
        dataset: DatasetId,
        f: impl FnOnce(&mut OpenDataset) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let datasets = self.datasets.read();
        let open = datasets.get(&dataset).ok_or(StorageError::BadId(dataset))?;
        let mut open = open.lock();
        f(&mut open)
    }
}

fn path_key(path: &str) -> Result<StoreKey, StorageError> {
    StoreKey::new(path).map_err(|_| StorageError::BadName(path.to_string()))
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.contains('/') || name.chars().any(char::is_control) {
        Err(StorageError::BadName(name.to_string()))
    } else {
        Ok(())
    }
}

fn element_size(kind: ElementKind, data_type: DataType) -> Result<usize, StorageError> {
    match data_type.fixed_size() {
        Some(size) if kind.data_type() == data_type => Ok(size),
        _ => Err(StorageError::BadType { kind, data_type }),
    }
}

/// Returns the number of bytes of `region` with elements of `size` bytes.
fn region_num_bytes(region: &Region, size: usize) -> Result<usize, StorageError> {
    region
        .checked_num_elements()
        .and_then(|num_elements| num_elements.checked_mul(u64::try_from(size).ok()?))
        .and_then(|num_bytes| usize::try_from(num_bytes).ok())
        .ok_or_else(|| {
            StorageError::InvalidArgument(format!("region {region} exceeds the address space"))
        })
}

fn checked_product(a: u64, b: u64) -> Result<u64, StorageError> {
    a.checked_mul(b)
        .ok_or_else(|| {
            StorageError::InvalidArgument(format!("{a} * {b} exceeds the address space"))
        })
}

fn to_usize(value: u64) -> Result<usize, StorageError> {
    usize::try_from(value)
        .map_err(|_| StorageError::InvalidArgument(format!("{value} exceeds the address space")))
}

/// Split the linearised indices of `region` within `extent` into runs of consecutive indices.
///
/// Returns `(linearised start, number of elements)` pairs in region order.
fn contiguous_runs(region: &Region, extent: &[u64]) -> Result<Vec<(u64, u64)>, StorageError> {
    let mut runs: Vec<(u64, u64)> = vec![];
    let indices = region
        .iter_linearised_indices(extent)
        .map_err(|err| StorageError::InvalidArgument(err.to_string()))?;
    for index in indices {
        match runs.last_mut() {
            Some((start, length)) if *start + *length == index => *length += 1,
            _ => runs.push((index, 1)),
        }
    }
    Ok(runs)
}

impl OpenDataset {
    fn metadata_key(&self) -> Result<StoreKey, StorageError> {
        Ok(self.path.join(METADATA_KEY).map_err(StoreError::from)?)
    }

    fn variable_key(&self, variable: usize) -> Result<StoreKey, StorageError> {
        Ok(self
            .path
            .join(&format!("var/{variable}"))
            .map_err(StoreError::from)?)
    }

    fn variable(&self, var: VarId) -> Result<&VariableMetadata, StorageError> {
        self.metadata
            .variables
            .get(var.index())
            .ok_or(StorageError::NotVariable(var))
    }

    fn require_data_mode(&self) -> Result<(), StorageError> {
        if self.define_mode {
            Err(StorageError::InDefineMode)
        } else {
            Ok(())
        }
    }

    fn require_define_mode(&self) -> Result<(), StorageError> {
        if self.define_mode {
            Ok(())
        } else {
            Err(StorageError::NotInDefineMode)
        }
    }

    /// Resolve and bounds check an access of a variable.
    ///
    /// On writes, the unlimited dimension is not bounds checked.
    fn resolve_access(
        &self,
        var: VarId,
        access: &AccessDescriptor,
        kind: ElementKind,
        write: bool,
    ) -> Result<(Region, usize), StorageError> {
        let variable = self.variable(var)?;
        let size = element_size(kind, variable.data_type)?;
        let extent = self.metadata.variable_extent(variable);
        let region = access.resolve(&extent)?;
        if region.has_zero_stride() {
            return Err(StorageError::BadStride(region.stride().to_vec()));
        }
        let bounds_checked =
            |dimension: usize| !(write && self.metadata.is_unlimited(variable, dimension));
        for (dimension, (&start, &count, &length)) in
            izip!(region.start(), region.count(), &extent).enumerate()
        {
            if bounds_checked(dimension) && (start > length || (start == length && count > 0)) {
                return Err(StorageError::InvalidCoordinates {
                    start: region.start().to_vec(),
                    extent: extent.clone(),
                });
            }
        }
        let edge_exceeded = || StorageError::EdgeExceeded {
            end: region.end_exc(),
            extent: extent.clone(),
        };
        let end = region.checked_end_exc().ok_or_else(edge_exceeded)?;
        for (dimension, (&end, &length)) in std::iter::zip(&end, &extent).enumerate() {
            if bounds_checked(dimension) && end > length {
                return Err(edge_exceeded());
            }
        }
        Ok((region, size))
    }

    fn write_metadata<TStorage: ?Sized + WritableStorageTraits>(
        &mut self,
        storage: &TStorage,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&self.metadata)
            .map_err(|err| StorageError::InvalidArgument(err.to_string()))?;
        storage.set(&self.metadata_key()?, &json)?;
        self.metadata_dirty = false;
        Ok(())
    }

    /// Allocate the fixed size variables, filled with their fill value.
    fn allocate<TStorage: ?Sized + WritableStorageTraits>(
        &self,
        storage: &TStorage,
    ) -> Result<(), StorageError> {
        for (index, variable) in self.metadata.variables.iter().enumerate() {
            let Some(fill_value) = variable.data_type.fill_value() else {
                continue;
            };
            let num_elements = if self.metadata.is_record_variable(variable) {
                checked_product(
                    self.metadata.num_records,
                    self.metadata.record_num_elements(variable),
                )?
            } else {
                self.metadata.record_num_elements(variable)
            };
            storage.set(
                &self.variable_key(index)?,
                &fill_value.repeat(to_usize(num_elements)?),
            )?;
        }
        Ok(())
    }

    /// Extend every record variable to `num_records` records.
    fn grow_records<TStorage: ?Sized + WritableStorageTraits>(
        &mut self,
        storage: &TStorage,
        num_records: u64,
    ) -> Result<(), StorageError> {
        let old_records = self.metadata.num_records;
        for (index, variable) in self.metadata.variables.iter().enumerate() {
            if !self.metadata.is_record_variable(variable) {
                continue;
            }
            let Some(fill_value) = variable.data_type.fill_value() else {
                continue;
            };
            let record_num_elements = self.metadata.record_num_elements(variable);
            let record_bytes = checked_product(record_num_elements, fill_value.len() as u64)?;
            let new_elements = checked_product(num_records - old_records, record_num_elements)?;
            // the grown variable must remain addressable
            to_usize(checked_product(num_records, record_bytes)?)?;
            let fill = fill_value.repeat(to_usize(new_elements)?);
            storage.set_partial_values(&[StoreKeyStartValue::new(
                self.variable_key(index)?,
                old_records * record_bytes,
                &fill,
            )])?;
        }
        self.metadata.num_records = num_records;
        self.metadata_dirty = true;
        Ok(())
    }

    fn write_region<TStorage: ?Sized + WritableStorageTraits>(
        &mut self,
        storage: &TStorage,
        variable: usize,
        region: &Region,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        if region.num_elements() == 0 {
            return Ok(());
        }
        let metadata = &self.metadata.variables[variable];
        if self.metadata.is_record_variable(metadata) {
            let records = region.end_exc()[0];
            if records > self.metadata.num_records {
                self.grow_records(storage, records)?;
            }
        }
        let metadata = &self.metadata.variables[variable];
        let size = metadata.data_type.fixed_size().unwrap_or_default() as u64;
        let extent = self.metadata.variable_extent(metadata);
        let key = self.variable_key(variable)?;
        let mut offset = 0;
        let mut key_start_values = vec![];
        for (start, length) in contiguous_runs(region, &extent)? {
            let length = to_usize(length * size)?;
            key_start_values.push(StoreKeyStartValue::new(
                key.clone(),
                start * size,
                &bytes[offset..offset + length],
            ));
            offset += length;
        }
        storage.set_partial_values(&key_start_values)?;
        Ok(())
    }

    fn read_region<TStorage: ?Sized + ReadableStorageTraits>(
        &self,
        storage: &TStorage,
        var: VarId,
        region: &Region,
        size: usize,
    ) -> Result<Vec<u8>, StorageError> {
        let num_bytes = region_num_bytes(region, size)?;
        if num_bytes == 0 {
            return Ok(vec![]);
        }
        let variable = self.variable(var)?;
        let extent = self.metadata.variable_extent(variable);
        let data = storage
            .get(&self.variable_key(var.index())?)?
            .unwrap_or_default();
        let expected = to_usize(extent.iter().product::<u64>())? * size;
        if data.len() < expected {
            return Err(StorageError::NotDataset {
                path: self.path.to_string(),
                family: self.metadata.format,
                reason: format!(
                    "variable {} holds {} bytes, expected {expected}",
                    variable.name,
                    data.len()
                ),
            });
        }
        let mut bytes = Vec::with_capacity(num_bytes);
        for (start, length) in contiguous_runs(region, &extent)? {
            let start = to_usize(start)? * size;
            let length = to_usize(length)? * size;
            bytes.extend_from_slice(&data[start..start + length]);
        }
        Ok(bytes)
    }

    /// Materialise deferred writes and persist changed metadata.
    fn flush<TStorage: ?Sized + WritableStorageTraits>(
        &mut self,
        storage: &TStorage,
    ) -> Result<(), StorageError> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            tracing::debug!(
                path = %self.path,
                writes = pending.len(),
                "materialising deferred writes"
            );
        }
        for write in pending {
            self.write_region(storage, write.variable, &write.region, &write.bytes)?;
        }
        if self.metadata_dirty {
            self.write_metadata(storage)?;
        }
        Ok(())
    }

    fn enddef<TStorage: ?Sized + WritableStorageTraits>(
        &mut self,
        storage: &TStorage,
    ) -> Result<(), StorageError> {
        self.require_define_mode()?;
        self.define_mode = false;
        self.allocate(storage)?;
        self.write_metadata(storage)
    }
}

impl<TStorage> DatasetStorage for StoreDatasetStorage<TStorage>
where
    TStorage: ?Sized + ReadableStorageTraits + WritableStorageTraits,
{
    fn create(
        &self,
        team: &dyn Collective,
        flavor: Flavor,
        path: &str,
    ) -> Result<DatasetId, StorageError> {
        let path = path_key(path)?;
        self.storage.erase_prefix(&path.to_prefix())?;
        let mut dataset = OpenDataset {
            path,
            mode: OpenMode::Write,
            define_mode: true,
            metadata: DatasetMetadata::new(flavor),
            metadata_dirty: true,
            pending: vec![],
        };
        dataset.write_metadata(self.storage.as_ref())?;
        tracing::debug!(path = %dataset.path, %flavor, team_size = team.size(), "created dataset");
        Ok(self.insert(dataset))
    }

    fn open(
        &self,
        team: &dyn Collective,
        flavor: Flavor,
        path: &str,
        mode: OpenMode,
    ) -> Result<DatasetId, StorageError> {
        let key = path_key(path)?;
        let json = self
            .storage
            .get(&key.join(METADATA_KEY).map_err(StoreError::from)?)?
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        let not_dataset = |reason: String| StorageError::NotDataset {
            path: path.to_string(),
            family: flavor.format_family(),
            reason,
        };
        let metadata: DatasetMetadata =
            serde_json::from_slice(&json).map_err(|err| not_dataset(err.to_string()))?;
        metadata.validate().map_err(not_dataset)?;
        if metadata.format != flavor.format_family() {
            return Err(not_dataset(format!("dataset has format {}", metadata.format)));
        }
        let dataset = OpenDataset {
            path: key,
            mode,
            define_mode: false,
            metadata,
            metadata_dirty: false,
            pending: vec![],
        };
        tracing::debug!(path, %flavor, ?mode, team_size = team.size(), "opened dataset");
        Ok(self.insert(dataset))
    }

    fn def_dim(
        &self,
        dataset: DatasetId,
        name: &str,
        length: DimensionLength,
    ) -> Result<DimId, StorageError> {
        self.with_dataset(dataset, |dataset| {
            dataset.require_define_mode()?;
            validate_name(name)?;
            if dataset.metadata.name_in_use(name) {
                return Err(StorageError::NameInUse(name.to_string()));
            }
            let length = match length {
                DimensionLength::Fixed(0) => {
                    return Err(StorageError::InvalidArgument(format!(
                        "fixed dimension {name} must have a non-zero length"
                    )))
                }
                DimensionLength::Fixed(length) => Some(length),
                DimensionLength::Unlimited => {
                    if dataset.metadata.unlimited_dimension().is_some() {
                        return Err(StorageError::MultipleUnlimited);
                    }
                    None
                }
            };
            dataset.metadata.dimensions.push(DimensionMetadata {
                name: name.to_string(),
                length,
            });
            dataset.metadata_dirty = true;
            Ok(DimId(dataset.metadata.dimensions.len() - 1))
        })
    }

    fn def_var(
        &self,
        dataset: DatasetId,
        name: &str,
        data_type: DataType,
        dimensions: &[DimId],
    ) -> Result<VarId, StorageError> {
        self.with_dataset(dataset, |dataset| {
            dataset.require_define_mode()?;
            validate_name(name)?;
            if dataset.metadata.name_in_use(name) {
                return Err(StorageError::NameInUse(name.to_string()));
            }
            let flavor = dataset.metadata.flavor;
            if data_type.is_extended() && !flavor.supports_extended_types() {
                return Err(StorageError::UnsupportedDataType { data_type, flavor });
            }
            if let Some(&dim) = dimensions
                .iter()
                .find(|dim| dim.index() >= dataset.metadata.dimensions.len())
            {
                return Err(StorageError::BadDimension(dim));
            }
            let unlimited = dataset.metadata.unlimited_dimension();
            if dimensions
                .iter()
                .skip(1)
                .any(|dim| Some(dim.index()) == unlimited)
            {
                return Err(StorageError::UnlimitedPosition(name.to_string()));
            }
            dataset.metadata.variables.push(VariableMetadata {
                name: name.to_string(),
                data_type,
                dimensions: dimensions.iter().map(DimId::index).collect(),
            });
            dataset.metadata_dirty = true;
            Ok(VarId(dataset.metadata.variables.len() - 1))
        })
    }

    fn enddef(&self, dataset: DatasetId) -> Result<(), StorageError> {
        self.with_dataset(dataset, |dataset| dataset.enddef(self.storage.as_ref()))
    }

    fn put(
        &self,
        dataset: DatasetId,
        var: VarId,
        access: &AccessDescriptor,
        kind: ElementKind,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.with_dataset(dataset, |dataset| {
            if dataset.mode == OpenMode::ReadOnly {
                return Err(StorageError::ReadOnly);
            }
            dataset.require_data_mode()?;
            let (region, size) = dataset.resolve_access(var, access, kind, true)?;
            let num_bytes = region_num_bytes(&region, size)?;
            if bytes.len() < num_bytes {
                return Err(StorageError::InvalidArgument(format!(
                    "{} bytes were provided for {} elements of {kind}",
                    bytes.len(),
                    region.num_elements()
                )));
            }
            let bytes = &bytes[..num_bytes];
            if dataset.metadata.flavor.defers_writes() {
                dataset.pending.push(PendingWrite {
                    variable: var.index(),
                    region,
                    bytes: bytes.to_vec(),
                });
                Ok(())
            } else {
                dataset.write_region(self.storage.as_ref(), var.index(), &region, bytes)
            }
        })
    }

    fn get(
        &self,
        dataset: DatasetId,
        var: VarId,
        access: &AccessDescriptor,
        kind: ElementKind,
    ) -> Result<Vec<u8>, StorageError> {
        self.with_dataset(dataset, |dataset| {
            dataset.require_data_mode()?;
            let (region, size) = dataset.resolve_access(var, access, kind, false)?;
            dataset.read_region(self.storage.as_ref(), var, &region, size)
        })
    }

    fn sync(&self, dataset: DatasetId) -> Result<(), StorageError> {
        self.with_dataset(dataset, |dataset| {
            dataset.require_data_mode()?;
            dataset.flush(self.storage.as_ref())
        })
    }

    fn close(&self, dataset: DatasetId) -> Result<(), StorageError> {
        let open = self
            .datasets
            .write()
            .remove(&dataset)
            .ok_or(StorageError::BadId(dataset))?;
        let mut open = open.into_inner();
        if open.mode == OpenMode::Write {
            if open.define_mode {
                open.enddef(self.storage.as_ref())?;
            }
            open.flush(self.storage.as_ref())?;
        }
        tracing::debug!(path = %open.path, "closed dataset");
        Ok(())
    }

    fn inq_dim_len(&self, dataset: DatasetId, dim: DimId) -> Result<u64, StorageError> {
        self.with_dataset(dataset, |dataset| {
            if dim.index() < dataset.metadata.dimensions.len() {
                Ok(dataset.metadata.dimension_length(dim.index()))
            } else {
                Err(StorageError::BadDimension(dim))
            }
        })
    }

    fn inq_var(&self, dataset: DatasetId, var: VarId) -> Result<VariableInfo, StorageError> {
        self.with_dataset(dataset, |dataset| {
            let variable = dataset.variable(var)?;
            Ok(VariableInfo::new(
                variable.name.clone(),
                variable.data_type,
                variable.dimensions.iter().copied().map(DimId).collect(),
            ))
        })
    }

    fn inq_nvars(&self, dataset: DatasetId) -> Result<usize, StorageError> {
        self.with_dataset(dataset, |dataset| Ok(dataset.metadata.variables.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collective::SingleTask,
        data_type::{bytes_to_elements, elements_to_bytes},
        storage::{NC_EBADTYPE, NC_EEDGE, NC_EINDEFINE, NC_EINVALCOORDS, NC_ENOTNC, NC_EPERM},
        store::MemoryStore,
    };
    use std::error::Error;

    fn storage() -> StoreDatasetStorage<MemoryStore> {
        StoreDatasetStorage::new(Arc::new(MemoryStore::new()))
    }

    /// A dataset with dimensions (`t` unlimited or 1, `x` 4, `y` 3) and an int variable `v` over all three.
    fn define(
        storage: &StoreDatasetStorage<MemoryStore>,
        flavor: Flavor,
        unlimited: bool,
    ) -> Result<(DatasetId, VarId), StorageError> {
        let dataset = storage.create(&SingleTask, flavor, "a.nc")?;
        let t = storage.def_dim(
            dataset,
            "t",
            if unlimited {
                DimensionLength::Unlimited
            } else {
                DimensionLength::Fixed(1)
            },
        )?;
        let x = storage.def_dim(dataset, "x", DimensionLength::Fixed(4))?;
        let y = storage.def_dim(dataset, "y", DimensionLength::Fixed(3))?;
        let var = storage.def_var(dataset, "v", DataType::Int, &[t, x, y])?;
        storage.enddef(dataset)?;
        Ok((dataset, var))
    }

    #[test]
    fn store_dataset_storage_fill_and_region() -> Result<(), Box<dyn Error>> {
        let storage = storage();
        let (dataset, var) = define(&storage, Flavor::NetCdf, false)?;
        let fill =
            bytes_to_elements::<i32>(&storage.get_var(dataset, var, ElementKind::Int32)?).unwrap();
        assert_eq!(fill, vec![-2_147_483_647; 12]);

        let values: Vec<i32> = (0..4).collect();
        storage.put_vars(
            dataset,
            var,
            &[0, 0, 1],
            &[1, 2, 2],
            &[1, 2, 1],
            ElementKind::Int32,
            &elements_to_bytes(&values),
        )?;
        let all =
            bytes_to_elements::<i32>(&storage.get_var(dataset, var, ElementKind::Int32)?).unwrap();
        let f = -2_147_483_647;
        assert_eq!(all, vec![f, 0, 1, f, f, f, f, 2, 3, f, f, f]);
        let block = storage.get_vara(dataset, var, &[0, 2, 1], &[1, 1, 2], ElementKind::Int32)?;
        assert_eq!(bytes_to_elements::<i32>(&block).unwrap(), vec![2, 3]);
        let one = storage.get_var1(dataset, var, &[0, 0, 2], ElementKind::Int32)?;
        assert_eq!(bytes_to_elements::<i32>(&one).unwrap(), vec![1]);
        storage.close(dataset)?;
        Ok(())
    }

    #[test]
    fn store_dataset_storage_bounds() -> Result<(), Box<dyn Error>> {
        let storage = storage();
        let (dataset, var) = define(&storage, Flavor::NetCdf, false)?;
        let one = elements_to_bytes(&[1i32]);
        let err = storage
            .put_var1(dataset, var, &[0, 4, 0], ElementKind::Int32, &one)
            .unwrap_err();
        assert_eq!(err.code(), NC_EINVALCOORDS);
        let err = storage
            .get_vara(dataset, var, &[0, 3, 0], &[1, 2, 3], ElementKind::Int32)
            .unwrap_err();
        assert_eq!(err.code(), NC_EEDGE);
        let err = storage
            .get_vars(dataset, var, &[0, 0, 0], &[1, 1, 1], &[1, 0, 1], ElementKind::Int32)
            .unwrap_err();
        assert!(matches!(err, StorageError::BadStride(_)));
        let err = storage
            .put_var1(dataset, var, &[0, 0, 0], ElementKind::UInt32, &one)
            .unwrap_err();
        assert_eq!(err.code(), NC_EBADTYPE);
        let err = storage
            .put_var1(dataset, var, &[0, 0], ElementKind::Int32, &one)
            .unwrap_err();
        assert!(matches!(err, StorageError::IncompatibleDimensionality(_)));
        let err = storage
            .put_vara(dataset, var, &[0, 0, 0], &[1, 1, 2], ElementKind::Int32, &one)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        Ok(())
    }

    #[test]
    fn store_dataset_storage_overflow() -> Result<(), Box<dyn Error>> {
        let storage = storage();
        let (dataset, var) = define(&storage, Flavor::NetCdf4Compressed, true)?;
        let one = elements_to_bytes(&[1i32]);

        // the unlimited dimension is not bounds checked on writes
        let err = storage
            .put_vara(dataset, var, &[0, 0, 0], &[1 << 60, 4, 3], ElementKind::Int32, &one)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        let err = storage
            .put_var1(dataset, var, &[u64::MAX, 0, 0], ElementKind::Int32, &one)
            .unwrap_err();
        assert_eq!(err.code(), NC_EEDGE);
        let err = storage
            .put_var1(dataset, var, &[1 << 62, 0, 0], ElementKind::Int32, &one)
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        let err = storage
            .put_vars(
                dataset,
                var,
                &[0, 0, 0],
                &[2, 1, 1],
                &[u64::MAX, 1, 1],
                ElementKind::Int32,
                &one,
            )
            .unwrap_err();
        assert_eq!(err.code(), NC_EEDGE);
        assert_eq!(storage.inq_dim_len(dataset, DimId(0))?, 0);

        storage.put_var1(dataset, var, &[0, 0, 0], ElementKind::Int32, &one)?;
        let err = storage
            .get_var1(dataset, var, &[0, u64::MAX, 0], ElementKind::Int32)
            .unwrap_err();
        assert_eq!(err.code(), NC_EINVALCOORDS);
        let err = storage
            .get_vars(
                dataset,
                var,
                &[0, 1, 0],
                &[1, 3, 1],
                &[1, u64::MAX, 1],
                ElementKind::Int32,
            )
            .unwrap_err();
        assert_eq!(err.code(), NC_EEDGE);
        storage.close(dataset)?;
        Ok(())
    }

    #[test]
    fn store_dataset_storage_unlimited_growth() -> Result<(), Box<dyn Error>> {
        let storage = storage();
        let (dataset, var) = define(&storage, Flavor::NetCdf4Compressed, true)?;
        assert_eq!(storage.inq_dim_len(dataset, DimId(0))?, 0);
        assert!(storage.get_var(dataset, var, ElementKind::Int32)?.is_empty());
        // nothing to write along an empty unlimited dimension
        storage.put_var(dataset, var, ElementKind::Int32, &elements_to_bytes(&[5i32; 12]))?;
        assert_eq!(storage.inq_dim_len(dataset, DimId(0))?, 0);

        let seven = elements_to_bytes(&[7i32]);
        storage.put_var1(dataset, var, &[2, 1, 1], ElementKind::Int32, &seven)?;
        assert_eq!(storage.inq_dim_len(dataset, DimId(0))?, 3);
        let all =
            bytes_to_elements::<i32>(&storage.get_var(dataset, var, ElementKind::Int32)?).unwrap();
        assert_eq!(all.len(), 36);
        assert_eq!(all[2 * 12 + 4], 7);
        assert_eq!(all.iter().filter(|&&v| v == -2_147_483_647).count(), 35);
        storage.close(dataset)?;

        let dataset =
            storage.open(&SingleTask, Flavor::NetCdf4Parallel, "a.nc", OpenMode::ReadOnly)?;
        assert_eq!(storage.inq_dim_len(dataset, DimId(0))?, 3);
        let one = storage.get_var1(dataset, var, &[2, 1, 1], ElementKind::Int32)?;
        assert_eq!(bytes_to_elements::<i32>(&one).unwrap(), vec![7]);
        let err = storage
            .get_var1(dataset, var, &[3, 0, 0], ElementKind::Int32)
            .unwrap_err();
        assert_eq!(err.code(), NC_EINVALCOORDS);
        storage.close(dataset)?;
        Ok(())
    }

    #[test]
    fn store_dataset_storage_deferred_writes() -> Result<(), Box<dyn Error>> {
        let storage = storage();
        let (dataset, var) = define(&storage, Flavor::PnetCdf, false)?;
        let one = elements_to_bytes(&[9i32]);
        storage.put_var1(dataset, var, &[0, 0, 0], ElementKind::Int32, &one)?;
        let before = storage.get_var1(dataset, var, &[0, 0, 0], ElementKind::Int32)?;
        assert_eq!(bytes_to_elements::<i32>(&before).unwrap(), vec![-2_147_483_647]);
        storage.sync(dataset)?;
        let after = storage.get_var1(dataset, var, &[0, 0, 0], ElementKind::Int32)?;
        assert_eq!(after, one);
        storage.close(dataset)?;
        Ok(())
    }

    #[test]
    fn store_dataset_storage_modes() -> Result<(), Box<dyn Error>> {
        let storage = storage();
        let dataset = storage.create(&SingleTask, Flavor::NetCdf, "a.nc")?;
        let x = storage.def_dim(dataset, "x", DimensionLength::Fixed(2))?;
        let var = storage.def_var(dataset, "v", DataType::Short, &[x])?;
        let err = storage
            .put_var(dataset, var, ElementKind::Int16, &elements_to_bytes(&[1i16, 2]))
            .unwrap_err();
        assert_eq!(err.code(), NC_EINDEFINE);
        assert_eq!(storage.sync(dataset).unwrap_err().code(), NC_EINDEFINE);
        // closing in define mode ends define mode
        storage.close(dataset)?;
        assert_eq!(storage.close(dataset).unwrap_err().code(), -33);

        let dataset = storage.open(&SingleTask, Flavor::PnetCdf, "a.nc", OpenMode::ReadOnly)?;
        assert_eq!(storage.inq_nvars(dataset)?, 1);
        assert_eq!(storage.inq_var(dataset, var)?.name(), "v");
        let err = storage
            .put_var(dataset, var, ElementKind::Int16, &elements_to_bytes(&[1i16, 2]))
            .unwrap_err();
        assert_eq!(err.code(), NC_EPERM);
        assert_eq!(
            storage.get_var(dataset, var, ElementKind::Int16)?,
            elements_to_bytes(&[-32767i16, -32767])
        );
        assert_eq!(
            storage.def_dim(dataset, "y", DimensionLength::Fixed(1)).unwrap_err().code(),
            -38
        );
        storage.close(dataset)?;

        let err = storage
            .open(&SingleTask, Flavor::NetCdf4Parallel, "a.nc", OpenMode::ReadOnly)
            .unwrap_err();
        assert_eq!(err.code(), NC_ENOTNC);
        let err = storage
            .open(&SingleTask, Flavor::NetCdf, "b.nc", OpenMode::ReadOnly)
            .unwrap_err();
        assert_eq!(err.code(), 2);
        Ok(())
    }

    #[test]
    fn store_dataset_storage_definitions() -> Result<(), Box<dyn Error>> {
        let storage = storage();
        let dataset = storage.create(&SingleTask, Flavor::NetCdf, "a.nc")?;
        let t = storage.def_dim(dataset, "t", DimensionLength::Unlimited)?;
        let x = storage.def_dim(dataset, "x", DimensionLength::Fixed(2))?;
        assert!(matches!(
            storage.def_dim(dataset, "u", DimensionLength::Unlimited),
            Err(StorageError::MultipleUnlimited)
        ));
        assert!(matches!(
            storage.def_dim(dataset, "x", DimensionLength::Fixed(3)),
            Err(StorageError::NameInUse(_))
        ));
        assert!(matches!(
            storage.def_var(dataset, "v", DataType::Int, &[x, t]),
            Err(StorageError::UnlimitedPosition(_))
        ));
        assert!(matches!(
            storage.def_var(dataset, "v", DataType::UInt64, &[t, x]),
            Err(StorageError::UnsupportedDataType { .. })
        ));
        assert!(matches!(
            storage.def_var(dataset, "v", DataType::Int, &[t, DimId(9)]),
            Err(StorageError::BadDimension(_))
        ));
        assert!(matches!(
            storage.def_var(dataset, "", DataType::Int, &[t]),
            Err(StorageError::BadName(_))
        ));
        let var = storage.def_var(dataset, "c", DataType::Char, &[t, x])?;
        storage.enddef(dataset)?;
        assert!(matches!(
            storage.get_var(dataset, var, ElementKind::Int8),
            Err(StorageError::BadType { .. })
        ));
        assert!(matches!(
            storage.get_var(dataset, VarId(1), ElementKind::Int8),
            Err(StorageError::NotVariable(_))
        ));
        storage.close(dataset)?;
        Ok(())
    }

    #[test]
    fn store_dataset_storage_create_clobbers() -> Result<(), Box<dyn Error>> {
        let store = Arc::new(MemoryStore::new());
        let storage = StoreDatasetStorage::new(store.clone());
        let dataset = storage.create(&SingleTask, Flavor::NetCdf, "a.nc")?;
        let x = storage.def_dim(dataset, "x", DimensionLength::Fixed(2))?;
        storage.def_var(dataset, "v", DataType::Short, &[x])?;
        storage.close(dataset)?;
        assert_eq!(
            crate::store::ListableStorageTraits::list(store.as_ref())?.len(),
            2
        );

        let dataset = storage.create(&SingleTask, Flavor::NetCdf, "a.nc")?;
        storage.close(dataset)?;
        let dataset = storage.open(&SingleTask, Flavor::NetCdf, "a.nc", OpenMode::ReadOnly)?;
        assert_eq!(storage.inq_nvars(dataset)?, 0);
        storage.close(dataset)?;
        Ok(())
    }
}
