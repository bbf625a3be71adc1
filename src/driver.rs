//! The conformance matrix driver.
//!
//! The matrix is the product of the unlimited `timestep` flag, the [`AccessPattern`]s, and the requested [`Flavor`]s.
//! Each [`MatrixCell`] runs through the [`Phase`]s in order:
//! create, write, sync, verify on the same handle, close, reopen read only, verify on the fresh handle, close.
//!
//! A failing phase ends its cell. The driver closes any handle the cell still holds and continues with the next cell.

use thiserror::Error;

use crate::{
    access::{read_pattern, write_pattern, AccessDescriptors, AccessError, AccessPattern},
    collective::Collective,
    config::global_config,
    data_type::ElementKind,
    fixtures::Fixtures,
    schema::{create_putget_file, PutGetFile, SchemaError},
    storage::{DatasetId, DatasetStorage, Flavor, OpenMode, StorageError},
};

/// One combination of the conformance matrix.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MatrixCell {
    /// True if the `timestep` dimension is unlimited.
    pub unlimited: bool,
    /// The access pattern.
    pub access: AccessPattern,
    /// The flavor.
    pub flavor: Flavor,
}

impl core::fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "unlim {} access {} ({}) flavor {}",
            u8::from(self.unlimited),
            self.access.ordinal(),
            self.access,
            self.flavor
        )
    }
}

/// A step of a matrix cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Create the dataset and define its schema.
    Create,
    /// Write the fixtures.
    Write,
    /// Make the writes durable.
    Sync,
    /// Read and compare on the handle that wrote.
    VerifySameHandle,
    /// Close the handle that wrote.
    Close,
    /// Reopen the dataset read only.
    Reopen,
    /// Read and compare on the reopened handle.
    VerifyFreshHandle,
    /// Close the reopened handle.
    CloseReopened,
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Write => "write",
            Self::Sync => "sync",
            Self::VerifySameHandle => "verify (same handle)",
            Self::Close => "close",
            Self::Reopen => "reopen",
            Self::VerifyFreshHandle => "verify (fresh handle)",
            Self::CloseReopened => "close (reopened)",
        };
        write!(f, "{name}")
    }
}

/// The cause of a failed phase.
#[derive(Debug, Error)]
pub enum CellError {
    /// Creating the dataset schema failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// An access pattern failed.
    #[error(transparent)]
    Access(#[from] AccessError),
    /// A sync, close or open call failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CellError {
    /// Returns the error code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Schema(err) => err.code(),
            Self::Access(err) => err.code(),
            Self::Storage(err) => err.code(),
        }
    }
}

/// A failed matrix cell.
#[derive(Debug, Error)]
#[error("{cell}: {phase} failed: {source}")]
pub struct ConformanceError {
    cell: MatrixCell,
    phase: Phase,
    source: CellError,
}

impl ConformanceError {
    /// Create a new conformance error.
    pub fn new(cell: MatrixCell, phase: Phase, source: impl Into<CellError>) -> Self {
        Self {
            cell,
            phase,
            source: source.into(),
        }
    }

    /// Returns the matrix cell.
    #[must_use]
    pub const fn cell(&self) -> &MatrixCell {
        &self.cell
    }

    /// Returns the failed phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the cause.
    #[must_use]
    pub const fn cause(&self) -> &CellError {
        &self.source
    }

    /// Returns the element kind being accessed, if the failure was in an access pattern.
    #[must_use]
    pub const fn kind(&self) -> Option<ElementKind> {
        match &self.source {
            CellError::Access(err) => Some(err.kind()),
            CellError::Schema(_) | CellError::Storage(_) => None,
        }
    }

    /// Returns the error code of the cause.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.source.code()
    }
}

/// The outcome of a matrix cell.
#[derive(Debug)]
pub struct CellReport {
    cell: MatrixCell,
    result: Result<(), ConformanceError>,
}

impl CellReport {
    /// Returns the matrix cell.
    #[must_use]
    pub const fn cell(&self) -> &MatrixCell {
        &self.cell
    }

    /// Returns the outcome.
    #[must_use]
    pub const fn result(&self) -> &Result<(), ConformanceError> {
        &self.result
    }

    /// Returns true if the cell passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// The outcome of every cell of the matrix, in matrix order.
#[derive(Debug, Default)]
pub struct MatrixReport {
    cells: Vec<CellReport>,
}

impl MatrixReport {
    /// Returns the cell reports.
    #[must_use]
    pub fn cells(&self) -> &[CellReport] {
        &self.cells
    }

    /// Returns the failures, in matrix order.
    pub fn failures(&self) -> impl Iterator<Item = &ConformanceError> {
        self.cells
            .iter()
            .filter_map(|report| report.result.as_ref().err())
    }

    /// Returns the first failure in matrix order.
    #[must_use]
    pub fn first_failure(&self) -> Option<&ConformanceError> {
        self.failures().next()
    }

    /// Returns true if every cell passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.first_failure().is_none()
    }

    /// Returns the status: zero if every cell passed, otherwise the error code of the first failure.
    #[must_use]
    pub fn status(&self) -> i32 {
        self.first_failure().map_or(0, ConformanceError::code)
    }
}

/// The conformance matrix driver.
pub struct PutGetDriver<'a> {
    storage: &'a dyn DatasetStorage,
    team: &'a dyn Collective,
    fixtures: &'a Fixtures,
    test_name: String,
    descriptors: AccessDescriptors,
}

impl<'a> PutGetDriver<'a> {
    /// Create a new driver.
    ///
    /// The dataset file names are prefixed by the [test name](crate::config::Config#test-name) of the global configuration.
    #[must_use]
    pub fn new(
        storage: &'a dyn DatasetStorage,
        team: &'a dyn Collective,
        fixtures: &'a Fixtures,
    ) -> Self {
        Self {
            storage,
            team,
            fixtures,
            test_name: global_config().test_name().to_string(),
            descriptors: AccessDescriptors::sample(),
        }
    }

    /// Set the prefix of the dataset file names.
    #[must_use]
    pub fn with_test_name(mut self, test_name: impl Into<String>) -> Self {
        self.test_name = test_name.into();
        self
    }

    /// Set the access descriptors.
    #[must_use]
    pub fn with_descriptors(mut self, descriptors: AccessDescriptors) -> Self {
        self.descriptors = descriptors;
        self
    }

    /// Returns the test name.
    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Returns the matrix cells of `flavors`.
    ///
    /// The unlimited flag varies slowest, then the access pattern, then the flavor.
    #[must_use]
    pub fn cells(flavors: &[Flavor]) -> Vec<MatrixCell> {
        [false, true]
            .into_iter()
            .flat_map(move |unlimited| {
                AccessPattern::ALL.into_iter().flat_map(move |access| {
                    flavors.iter().map(move |&flavor| MatrixCell {
                        unlimited,
                        access,
                        flavor,
                    })
                })
            })
            .collect()
    }

    /// Best effort close of a handle left open by a failure.
    fn cleanup(&self, cell: &MatrixCell, dataset: DatasetId) {
        if let Err(err) = self.storage.close(dataset) {
            let rank = self.team.rank();
            tracing::warn!(
                rank,
                %cell,
                %dataset,
                "failed to close dataset after failure: {err}"
            );
        }
    }

    /// Write, sync and verify on the handle that created the dataset.
    fn exercise(&self, cell: &MatrixCell, file: &PutGetFile) -> Result<(), ConformanceError> {
        let rank = self.team.rank();
        tracing::info!(rank, %cell, "writing");
        write_pattern(
            self.storage,
            file,
            cell.access,
            &self.descriptors,
            self.fixtures,
        )
        .map_err(|err| ConformanceError::new(*cell, Phase::Write, err))?;

        tracing::info!(rank, %cell, "syncing");
        self.storage
            .sync(file.dataset())
            .map_err(|err| ConformanceError::new(*cell, Phase::Sync, err))?;

        tracing::info!(rank, %cell, "verifying on the same handle");
        read_pattern(
            self.storage,
            file,
            cell.access,
            &self.descriptors,
            self.fixtures,
        )
        .map_err(|err| ConformanceError::new(*cell, Phase::VerifySameHandle, err))
    }

    /// Run one matrix cell.
    ///
    /// # Errors
    /// Returns a [`ConformanceError`] for the first phase that fails.
    pub fn run_cell(&self, cell: &MatrixCell) -> Result<(), ConformanceError> {
        let rank = self.team.rank();
        tracing::info!(rank, %cell, "creating test file");
        let file = create_putget_file(
            self.storage,
            self.team,
            &self.test_name,
            cell.access,
            cell.unlimited,
            cell.flavor,
        )
        .map_err(|err| {
            if let Some(dataset) = err.dataset() {
                self.cleanup(cell, dataset);
            }
            ConformanceError::new(*cell, Phase::Create, err)
        })?;

        if let Err(err) = self.exercise(cell, &file) {
            self.cleanup(cell, file.dataset());
            return Err(err);
        }

        tracing::info!(rank, %cell, "closing");
        self.storage
            .close(file.dataset())
            .map_err(|err| ConformanceError::new(*cell, Phase::Close, err))?;

        tracing::info!(rank, %cell, path = file.path(), "reopening read only");
        let dataset = self
            .storage
            .open(self.team, cell.flavor, file.path(), OpenMode::ReadOnly)
            .map_err(|err| ConformanceError::new(*cell, Phase::Reopen, err))?;
        let reopened = file.reopened(dataset);

        tracing::info!(rank, %cell, "verifying on the fresh handle");
        if let Err(err) = read_pattern(
            self.storage,
            &reopened,
            cell.access,
            &self.descriptors,
            self.fixtures,
        ) {
            self.cleanup(cell, dataset);
            return Err(ConformanceError::new(*cell, Phase::VerifyFreshHandle, err));
        }

        self.storage
            .close(dataset)
            .map_err(|err| ConformanceError::new(*cell, Phase::CloseReopened, err))
    }

    /// Run every cell of the matrix of `flavors`, in order.
    ///
    /// A failed cell does not stop the run.
    pub fn run(&self, flavors: &[Flavor]) -> MatrixReport {
        let rank = self.team.rank();
        let cells = Self::cells(flavors)
            .into_iter()
            .map(|cell| {
                let result = self.run_cell(&cell);
                match &result {
                    Ok(()) => tracing::info!(rank, %cell, "passed"),
                    Err(err) => {
                        tracing::error!(rank, %cell, code = err.code(), "{err}");
                    }
                }
                CellReport { cell, result }
            })
            .collect();
        MatrixReport { cells }
    }
}
