//! A storage adapter which logs store method calls.

use std::sync::Arc;

use itertools::Itertools;

use super::{
    ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StoreError, StoreKey,
    StoreKeyStartValue, StoreKeys, StorePrefix, WritableStorageTraits,
};

/// The usage log storage adapter.
///
/// Each call is forwarded to the inner store and then logged as a `debug` event with the target `putget_conformance::store`.
/// It reveals the store access pattern of the reference dataset service, e.g.
/// ```text
/// set(test_pioc_putget_access_0_unlim_0_netcdf.nc/dataset.json, len=613) -> Ok(())
/// set_partial_values([test_pioc_putget_access_0_unlim_0_netcdf.nc/var/0[0..1600]]) -> Ok(())
/// get(test_pioc_putget_access_0_unlim_0_netcdf.nc/var/0) -> len=Ok(1600)
/// ```
pub struct UsageLogStorageAdapter<TStorage: ?Sized> {
    storage: Arc<TStorage>,
}

impl<TStorage: ?Sized> core::fmt::Debug for UsageLogStorageAdapter<TStorage> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "usage log")
    }
}

impl<TStorage: ?Sized> UsageLogStorageAdapter<TStorage> {
    /// Create a new usage log storage adapter.
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self { storage }
    }
}

fn format_key_start_value(key_start_value: &StoreKeyStartValue) -> String {
    format!(
        "{}[{}..{}]",
        key_start_value.key(),
        key_start_value.start(),
        key_start_value.end()
    )
}

impl<TStorage: ?Sized + ReadableStorageTraits> ReadableStorageTraits
    for UsageLogStorageAdapter<TStorage>
{
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StoreError> {
        let result = self.storage.get(key);
        tracing::debug!(
            target: "putget_conformance::store",
            "get({key}) -> len={:?}",
            result.as_ref().map(|v| v.as_ref().map_or(0, Vec::len))
        );
        result
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StoreError> {
        let result = self.storage.size_key(key);
        tracing::debug!(target: "putget_conformance::store", "size_key({key}) -> {result:?}");
        result
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> WritableStorageTraits
    for UsageLogStorageAdapter<TStorage>
{
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        let result = self.storage.set(key, value);
        tracing::debug!(
            target: "putget_conformance::store",
            "set({key}, len={}) -> {result:?}",
            value.len()
        );
        result
    }

    fn set_partial_values(
        &self,
        key_start_values: &[StoreKeyStartValue],
    ) -> Result<(), StoreError> {
        let result = self.storage.set_partial_values(key_start_values);
        tracing::debug!(
            target: "putget_conformance::store",
            "set_partial_values([{}]) -> {result:?}",
            key_start_values.iter().map(format_key_start_value).format(", ")
        );
        result
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StoreError> {
        let result = self.storage.erase(key);
        tracing::debug!(target: "putget_conformance::store", "erase({key}) -> {result:?}");
        result
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StoreError> {
        let result = self.storage.erase_prefix(prefix);
        tracing::debug!(
            target: "putget_conformance::store",
            "erase_prefix({prefix}) -> {result:?}"
        );
        result
    }
}

impl<TStorage: ?Sized + ListableStorageTraits> ListableStorageTraits
    for UsageLogStorageAdapter<TStorage>
{
    fn list(&self) -> Result<StoreKeys, StoreError> {
        let result = self.storage.list();
        tracing::debug!(
            target: "putget_conformance::store",
            "list() -> {:?}",
            result.as_ref().map(|keys| keys.iter().format(", ").to_string())
        );
        result
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StoreError> {
        let result = self.storage.list_prefix(prefix);
        tracing::debug!(
            target: "putget_conformance::store",
            "list_prefix({prefix}) -> {:?}",
            result.as_ref().map(|keys| keys.iter().format(", ").to_string())
        );
        result
    }
}
