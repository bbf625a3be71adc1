//! A conformance test driver for a multi-dimensional typed array storage API.
//!
//! The driver creates datasets holding one three-dimensional variable per element type, writes known fixtures with four access patterns, and reads them back both through the handle that wrote them and through a freshly reopened read only handle.
//! This is repeated for every storage [flavor](storage::Flavor), with the slowest varying `timestep` dimension either fixed or unlimited.
//!
//! ## Getting Started
//! - [`driver::PutGetDriver`] runs the conformance matrix against any [`storage::DatasetStorage`].
//! - [`storage::StoreDatasetStorage`] is a reference dataset service over a key-value [`store`].
//! - The `putget` binary runs the full matrix against a [`store::FilesystemStore`] and exits with a failure status if any cell fails.
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use putget_conformance::{
//!     collective::SingleTask,
//!     driver::PutGetDriver,
//!     fixtures::Fixtures,
//!     storage::{Flavor, StoreDatasetStorage},
//!     store::MemoryStore,
//! };
//!
//! let storage = StoreDatasetStorage::new(Arc::new(MemoryStore::new()));
//! let fixtures = Fixtures::new();
//! let report = PutGetDriver::new(&storage, &SingleTask, &fixtures).run(&Flavor::ALL);
//! assert!(report.passed());
//! assert_eq!(report.status(), 0);
//! ```
//!
//! ## Logging
//! The crate emits [`tracing`] events.
//! Matrix progress is logged at the `info` level, per element type accesses at the `debug` level, and failures at the `error` level.
//!
//! ## Licence
//! `putget_conformance` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]

pub mod access;
pub mod access_descriptor;
pub mod collective;
pub mod config;
pub mod data_type;
pub mod driver;
pub mod fixtures;
pub mod schema;
pub mod storage;
pub mod store;
