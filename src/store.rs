//! Key-value stores.
//!
//! A store holds values (bytes) under [`StoreKey`]s.
//! The reference dataset service in [`storage`](crate::storage) persists dataset metadata and variable data in a store.
//!
//! Included stores:
//!  - [`MemoryStore`]: values live in process memory and are lost when the store is dropped,
//!  - [`FilesystemStore`]: each value is a file below a base directory.
//!
//! [`UsageLogStorageAdapter`](usage_log::UsageLogStorageAdapter) wraps any store and logs its calls.

mod filesystem;
mod memory;
mod store_key;
mod store_prefix;
pub mod usage_log;

use std::sync::Arc;

use thiserror::Error;

pub use filesystem::{FilesystemStore, FilesystemStoreCreateError};
pub use memory::MemoryStore;
pub use store_key::{StoreKey, StoreKeyError, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError};

/// An optional store value.
pub type MaybeBytes = Option<Vec<u8>>;

/// Readable store traits.
pub trait ReadableStorageTraits: Send + Sync {
    /// Retrieve the value (bytes) associated with a given [`StoreKey`].
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if there is an underlying store error.
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StoreError>;

    /// Return the size in bytes of the value at `key`.
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if there is an underlying store error.
    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StoreError>;
}

/// Writable store traits.
pub trait WritableStorageTraits: Send + Sync {
    /// Store bytes at a [`StoreKey`], replacing any existing value.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on failure to store.
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError>;

    /// Store bytes at offsets of existing values.
    ///
    /// A value is extended with zeros if a write starts beyond its current end.
    ///
    /// # Errors
    /// Returns a [`StoreError`] on failure to store.
    fn set_partial_values(&self, key_start_values: &[StoreKeyStartValue]) -> Result<(), StoreError>;

    /// Erase a [`StoreKey`].
    ///
    /// Succeeds if the key does not exist.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if there is an underlying error with the store.
    fn erase(&self, key: &StoreKey) -> Result<(), StoreError>;

    /// Erase all [`StoreKey`] under [`StorePrefix`].
    ///
    /// # Errors
    /// Returns a [`StoreError`] if there is an underlying error with the store.
    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StoreError>;
}

/// Listable store traits.
pub trait ListableStorageTraits: Send + Sync {
    /// Retrieve all [`StoreKeys`] in the store, sorted.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if there is an underlying error with the store.
    fn list(&self) -> Result<StoreKeys, StoreError> {
        self.list_prefix(&StorePrefix::root())
    }

    /// Retrieve all [`StoreKeys`] with a given [`StorePrefix`], sorted.
    ///
    /// # Errors
    /// Returns a [`StoreError`] if there is an underlying error with the store.
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StoreError>;
}

/// A supertrait of [`ReadableStorageTraits`], [`WritableStorageTraits`] and [`ListableStorageTraits`].
pub trait ReadableWritableListableStorageTraits:
    ReadableStorageTraits + WritableStorageTraits + ListableStorageTraits
{
}

impl<T> ReadableWritableListableStorageTraits for T where
    T: ?Sized + ReadableStorageTraits + WritableStorageTraits + ListableStorageTraits
{
}

/// [`Arc`] wrapped readable, writable, and listable storage.
pub type ReadableWritableListableStorage = Arc<dyn ReadableWritableListableStorageTraits>;

/// A [`StoreKey`], a byte offset, and a value (bytes).
#[derive(Debug, Clone)]
#[must_use]
pub struct StoreKeyStartValue<'a> {
    key: StoreKey,
    start: u64,
    value: &'a [u8],
}

impl<'a> StoreKeyStartValue<'a> {
    /// Create a new [`StoreKeyStartValue`].
    pub const fn new(key: StoreKey, start: u64, value: &'a [u8]) -> Self {
        Self { key, start, value }
    }

    /// Returns the key.
    #[must_use]
    pub const fn key(&self) -> &StoreKey {
        &self.key
    }

    /// Returns the starting byte offset.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Returns the value.
    #[must_use]
    pub const fn value(&self) -> &[u8] {
        self.value
    }

    /// Get the offset of exclusive end of the [`StoreKeyStartValue`].
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.value.len() as u64
    }
}

/// A store error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid store key.
    #[error(transparent)]
    InvalidStoreKey(#[from] StoreKeyError),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for StoreError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StoreError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
