//! An in-memory store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{
    ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StoreError, StoreKey,
    StoreKeyStartValue, StoreKeys, StorePrefix, WritableStorageTraits,
};

/// An in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    data_map: RwLock<BTreeMap<StoreKey, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new, empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_map: RwLock::new(BTreeMap::default()),
        }
    }

    /// Returns the total size in bytes of all values in the store.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data_map
            .read()
            .values()
            .map(|value| value.len() as u64)
            .sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StoreError> {
        Ok(self.data_map.read().get(key).cloned())
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StoreError> {
        Ok(self
            .data_map
            .read()
            .get(key)
            .map(|value| value.len() as u64))
    }
}

impl WritableStorageTraits for MemoryStore {
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        self.data_map.write().insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn set_partial_values(
        &self,
        key_start_values: &[StoreKeyStartValue],
    ) -> Result<(), StoreError> {
        let mut data_map = self.data_map.write();
        for key_start_value in key_start_values {
            let start = usize::try_from(key_start_value.start()).ok();
            let end = start.and_then(|start| start.checked_add(key_start_value.value().len()));
            let (Some(start), Some(end)) = (start, end) else {
                return Err(StoreError::Other(format!(
                    "partial value of {} exceeds the address space",
                    key_start_value.key()
                )));
            };
            let data = data_map.entry(key_start_value.key().clone()).or_default();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[start..end].copy_from_slice(key_start_value.value());
        }
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StoreError> {
        self.data_map.write().remove(key);
        Ok(())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StoreError> {
        self.data_map.write().retain(|key, _| !key.has_prefix(prefix));
        Ok(())
    }
}

impl ListableStorageTraits for MemoryStore {
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StoreError> {
        Ok(self
            .data_map
            .read()
            .keys()
            .filter(|&key| key.has_prefix(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn memory_set() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        let key: StoreKey = "a/b".try_into()?;
        store.set(&key, &[0, 1, 2])?;
        assert_eq!(store.get(&key)?, Some(vec![0, 1, 2]));
        assert_eq!(store.size_key(&key)?, Some(3));
        store.set_partial_values(&[StoreKeyStartValue::new(key.clone(), 1, &[3, 4])])?;
        assert_eq!(store.get(&key)?, Some(vec![0, 3, 4]));
        store.set_partial_values(&[StoreKeyStartValue::new(key.clone(), 4, &[5])])?;
        assert_eq!(store.get(&key)?, Some(vec![0, 3, 4, 0, 5]));
        assert_eq!(store.size(), 5);
        assert_eq!(store.get(&"a/c".try_into()?)?, None);
        Ok(())
    }

    #[test]
    fn memory_set_partial_values_past_address_space() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();
        let key: StoreKey = "a/b".try_into()?;
        let key_start_value = StoreKeyStartValue::new(key.clone(), u64::MAX, &[1]);
        let result = store.set_partial_values(&[key_start_value]);
        assert!(matches!(result, Err(StoreError::Other(_))));
        assert_eq!(store.get(&key)?, None);
        Ok(())
    }

    #[test]
    fn memory_list() -> Result<(), Box<dyn Error>> {
        let store = MemoryStore::new();

        store.set(&"a/b".try_into()?, &[])?;
        store.set(&"a/c".try_into()?, &[])?;
        store.set(&"a/d/e".try_into()?, &[])?;
        store.set(&"a/d/f".try_into()?, &[])?;
        store.erase(&"a/d/e".try_into()?)?;
        assert_eq!(
            store.list()?,
            &["a/b".try_into()?, "a/c".try_into()?, "a/d/f".try_into()?]
        );
        assert_eq!(
            store.list_prefix(&"a/d/".try_into()?)?,
            &["a/d/f".try_into()?]
        );
        store.erase_prefix(&"a/".try_into()?)?;
        assert!(store.list()?.is_empty());
        Ok(())
    }
}
