//! A filesystem store.
//!
//! Each [`StoreKey`] maps to a file below the base directory, with `/` separated key components mapping to subdirectories.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use walkdir::WalkDir;

use super::{
    ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StoreError, StoreKey, StoreKeyError,
    StoreKeyStartValue, StoreKeys, StorePrefix, WritableStorageTraits,
};

/// A file system store.
#[derive(Debug)]
pub struct FilesystemStore {
    base_directory: PathBuf,
    readonly: bool,
    files: RwLock<HashMap<StoreKey, Arc<Mutex<()>>>>,
}

impl FilesystemStore {
    /// Create a new file system store at a given `base_directory`.
    /// The base directory will be created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`FilesystemStoreCreateError`] if `base_directory`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(
        base_directory: P,
    ) -> Result<Self, FilesystemStoreCreateError> {
        let base_directory = base_directory.as_ref().to_path_buf();
        if base_directory.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBaseDirectory(
                base_directory,
            ));
        }
        if base_directory.is_file() {
            return Err(FilesystemStoreCreateError::ExistingFile(base_directory));
        }
        let readonly = if base_directory.is_dir() {
            std::fs::metadata(&base_directory)?.permissions().readonly()
        } else {
            std::fs::create_dir_all(&base_directory)?;
            false
        };
        Ok(Self {
            base_directory,
            readonly,
            files: RwLock::new(HashMap::new()),
        })
    }

    /// Returns the base directory of the store.
    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Maps a [`StoreKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        self.base_directory.join(key.as_str())
    }

    /// Maps a [`StorePrefix`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn prefix_to_fspath(&self, prefix: &StorePrefix) -> PathBuf {
        self.base_directory.join(prefix.as_str())
    }

    fn fspath_to_key(&self, path: &Path) -> Result<StoreKey, StoreKeyError> {
        let invalid = || StoreKeyError::from(path.to_string_lossy().into_owned());
        let relative = pathdiff::diff_paths(path, &self.base_directory).ok_or_else(invalid)?;
        let components: Vec<&str> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect::<Option<_>>()
            .ok_or_else(invalid)?;
        StoreKey::new(components.join("/"))
    }

    fn key_lock(&self, key: &StoreKey) -> Arc<Mutex<()>> {
        self.files.write().entry(key.clone()).or_default().clone()
    }

    fn set_impl(
        &self,
        key: &StoreKey,
        value: &[u8],
        offset: Option<u64>,
        truncate: bool,
    ) -> Result<(), StoreError> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        let key_path = self.key_to_fspath(key);
        let lock = self.key_lock(key);
        let _guard = lock.lock();

        if let Some(parent) = key_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(truncate)
            .open(key_path)?;
        if let Some(offset) = offset {
            file.seek(SeekFrom::Start(offset))?;
        }
        file.write_all(value)?;
        Ok(())
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StoreError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock();
        let mut file = match File::open(self.key_to_fspath(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(Some(buffer))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StoreError> {
        match std::fs::metadata(self.key_to_fspath(key)) {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn set(&self, key: &StoreKey, value: &[u8]) -> Result<(), StoreError> {
        self.set_impl(key, value, None, true)
    }

    fn set_partial_values(
        &self,
        key_start_values: &[StoreKeyStartValue],
    ) -> Result<(), StoreError> {
        for key_start_value in key_start_values {
            self.set_impl(
                key_start_value.key(),
                key_start_value.value(),
                Some(key_start_value.start()),
                false,
            )?;
        }
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StoreError> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        let lock = self.key_lock(key);
        let _guard = lock.lock();
        match std::fs::remove_file(self.key_to_fspath(key)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StoreError> {
        if self.readonly {
            return Err(StoreError::ReadOnly);
        }
        if prefix.as_str().is_empty() {
            for key in self.list()? {
                self.erase(&key)?;
            }
            return Ok(());
        }
        match std::fs::remove_dir_all(self.prefix_to_fspath(prefix)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl ListableStorageTraits for FilesystemStore {
    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StoreError> {
        let prefix_path = self.prefix_to_fspath(prefix);
        if !prefix_path.is_dir() {
            return Ok(vec![]);
        }
        let mut keys: StoreKeys = WalkDir::new(prefix_path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.fspath_to_key(entry.path()).ok())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// Base directory is an existing file.
    #[error("{0} is an existing file")]
    ExistingFile(PathBuf),
    /// The path is not valid on this system.
    #[error("base directory {0} is not valid")]
    InvalidBaseDirectory(PathBuf),
}
