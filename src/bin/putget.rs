use std::{process::ExitCode, sync::Arc};

use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    EnvFilter,
};

use putget_conformance::{
    collective::SingleTask,
    config::{global_config, global_config_mut},
    driver::PutGetDriver,
    fixtures::Fixtures,
    storage::StoreDatasetStorage,
    store::{usage_log::UsageLogStorageAdapter, FilesystemStore, ReadableWritableListableStorage},
};

/// The log filter: `RUST_LOG` if set, otherwise `info`.
///
/// Store calls are logged at the `debug` level, so enabling the usage log enables `debug` for the store.
fn env_filter(usage_log: bool) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    match "putget_conformance::store=debug".parse::<Directive>() {
        Ok(directive) if usage_log => filter.add_directive(directive),
        _ => filter,
    }
}

fn putget() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let (output_directory, usage_log, flavors) = {
        let config = global_config();
        (
            config.output_directory().to_path_buf(),
            config.usage_log(),
            config.flavors().to_vec(),
        )
    };

    let mut store: ReadableWritableListableStorage =
        Arc::new(FilesystemStore::new(&output_directory)?);
    if usage_log {
        store = Arc::new(UsageLogStorageAdapter::new(store));
    }
    let storage = StoreDatasetStorage::new(store);

    let fixtures = Fixtures::new();
    let report = PutGetDriver::new(&storage, &SingleTask, &fixtures).run(&flavors);

    let num_failures = report.failures().count();
    if let Some(failure) = report.first_failure() {
        tracing::error!(
            num_failures,
            num_cells = report.cells().len(),
            status = report.status(),
            "first failure: {failure}"
        );
        Ok(ExitCode::FAILURE)
    } else {
        tracing::info!(num_cells = report.cells().len(), "all cells passed");
        Ok(ExitCode::SUCCESS)
    }
}

fn main() -> ExitCode {
    if let Some(arg1) = std::env::args().nth(1) {
        if arg1 == "--usage-log" {
            global_config_mut().set_usage_log(true);
        }
    }
    let usage_log = global_config().usage_log();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(usage_log))
        .init();

    match putget() {
        Ok(exit_code) => exit_code,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
