use derive_more::{Display, From};
use thiserror::Error;

use super::StorePrefix;

/// A key in a key-value store.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StoreKey(String);

/// An invalid store key.
#[derive(Debug, From, Error)]
#[error("invalid store key {0}")]
pub struct StoreKeyError(String);

/// A list of [`StoreKey`].
pub type StoreKeys = Vec<StoreKey>;

impl StoreKey {
    /// Create a new store key from `key`.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if `key` is not valid according to [`StoreKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, StoreKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(StoreKeyError(key))
        }
    }

    /// Extracts a string slice of the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a key.
    ///
    /// A key is a non-empty string that neither starts nor ends with `/` and has no empty, `.` or `..` components.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty()
            && key
                .split('/')
                .all(|component| !component.is_empty() && component != "." && component != "..")
    }

    /// Returns true if the key has prefix `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &StorePrefix) -> bool {
        self.0.starts_with(prefix.as_str())
    }

    /// Returns the prefix formed by this key and a trailing `/`.
    #[must_use]
    pub fn to_prefix(&self) -> StorePrefix {
        StorePrefix::from_key(self)
    }

    /// Returns the key formed by appending `/` and `name` to this key.
    ///
    /// # Errors
    /// Returns [`StoreKeyError`] if the resulting key is invalid.
    pub fn join(&self, name: &str) -> Result<Self, StoreKeyError> {
        Self::new(format!("{}/{name}", self.0))
    }
}

impl TryFrom<&str> for StoreKey {
    type Error = StoreKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}
