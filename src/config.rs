//! Global configuration options.

use std::{
    path::{Path, PathBuf},
    sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::storage::Flavor;

/// Global configuration options for the conformance driver.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Test Name
///  > default: `test_pioc_putget`
///
/// The prefix of every dataset file name.
///
/// ## Output Directory
///  > default: `.`
///
/// The directory holding the datasets written by the `putget` binary.
///
/// ## Usage Log
///  > default: [`false`]
///
/// If enabled, the `putget` binary wraps its store in a [`UsageLogStorageAdapter`](crate::store::usage_log::UsageLogStorageAdapter), logging every store call at the `debug` level.
///
/// ## Flavors
///  > default: [`Flavor::ALL`]
///
/// The flavors exercised by the `putget` binary, in matrix order.
#[derive(Debug)]
pub struct Config {
    test_name: String,
    output_directory: PathBuf,
    usage_log: bool,
    flavors: Vec<Flavor>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            test_name: "test_pioc_putget".to_string(),
            output_directory: PathBuf::from("."),
            usage_log: false,
            flavors: Flavor::ALL.to_vec(),
        }
    }
}

impl Config {
    /// Get the [test name](#test-name) configuration.
    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Set the [test name](#test-name) configuration.
    pub fn set_test_name(&mut self, test_name: impl Into<String>) {
        self.test_name = test_name.into();
    }

    /// Get the [output directory](#output-directory) configuration.
    #[must_use]
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Set the [output directory](#output-directory) configuration.
    pub fn set_output_directory(&mut self, output_directory: impl Into<PathBuf>) {
        self.output_directory = output_directory.into();
    }

    /// Get the [usage log](#usage-log) configuration.
    #[must_use]
    pub fn usage_log(&self) -> bool {
        self.usage_log
    }

    /// Set the [usage log](#usage-log) configuration.
    pub fn set_usage_log(&mut self, usage_log: bool) {
        self.usage_log = usage_log;
    }

    /// Get the [flavors](#flavors) configuration.
    #[must_use]
    pub fn flavors(&self) -> &[Flavor] {
        &self.flavors
    }

    /// Set the [flavors](#flavors) configuration.
    pub fn set_flavors(&mut self, flavors: Vec<Flavor>) {
        self.flavors = flavors;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
