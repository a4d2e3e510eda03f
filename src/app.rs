//! Application wiring.
//!
//! Builds the runtime, opens the configured backing store, and runs the
//! supervisor together with its auxiliary tasks (signal forwarding, the
//! timestamp injector). All of the service's shared state is constructed
//! here and handed down; nothing lives in globals.

use std::{io, sync::Arc};

use snafu::{ResultExt, Snafu};
use tokio::{runtime, sync::Mutex};
use tracing::{error, info};

use crate::cli::Opts;
use crate::config::{ConfigError, ServiceConfig};
use crate::daemon::{self, DaemonError};
use crate::server::{Server, ServerError};
use crate::shutdown::{ShutdownCoordinator, SignalListener};
use crate::store::{BackingStore, SharedStore, StoreError};
use crate::trace;

#[derive(Debug, Snafu)]
pub enum AppError {
    #[snafu(display("{source}"))]
    Daemonize { source: DaemonError },

    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    #[snafu(display("failed to build runtime: {source}"))]
    Runtime { source: io::Error },

    #[snafu(display("failed to install signal handlers: {source}"))]
    Signals { source: io::Error },

    #[snafu(display("{source}"))]
    Store { source: StoreError },

    #[snafu(display("{source}"))]
    Server { source: ServerError },
}

/// Runs the whole application, returning the process exit code.
pub fn run(opts: Opts) -> i32 {
    trace::init("info");

    match prepare_and_run(opts) {
        Ok(()) => exitcode::OK,
        Err(error) => {
            error!(message = "Fatal error, exiting.", %error);
            match error {
                AppError::Daemonize { .. } => exitcode::OSERR,
                AppError::Config { .. } => exitcode::CONFIG,
                AppError::Store { .. } => exitcode::IOERR,
                _ => exitcode::SOFTWARE,
            }
        }
    }
}

fn prepare_and_run(opts: Opts) -> Result<(), AppError> {
    // Fork before anything spawns threads.
    if opts.daemonize {
        daemon::daemonize().context(DaemonizeSnafu)?;
        info!(message = "Detached from terminal.", pid = std::process::id());
    }

    let config = ServiceConfig::from_env().context(ConfigSnafu)?;
    info!(
        message = "Starting backlogd.",
        address = %config.address,
        data_path = %config.data_path.display(),
    );

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context(RuntimeSnafu)?;

    runtime.block_on(run_service(config))
}

async fn run_service(config: ServiceConfig) -> Result<(), AppError> {
    // Fatal if handlers cannot be installed, so do it before anything else.
    let mut signals = SignalListener::install().context(SignalsSnafu)?;
    let coordinator = ShutdownCoordinator::new();

    let store: SharedStore = Arc::new(Mutex::new(open_store(&config)?));

    let trigger = coordinator.clone();
    tokio::spawn(async move {
        let signal = signals.recv().await;
        info!(message = "Caught signal, exiting.", %signal);
        trigger.shutdown();
    });

    // The device backend owns its own content; only the file-backed build
    // injects wall-clock markers.
    #[cfg(not(feature = "char-device"))]
    let injector = tokio::spawn(crate::timestamp::run_injector(
        Arc::clone(&store),
        std::time::Duration::from_secs(config.timestamp_interval_secs),
        coordinator.signal(),
    ));

    let server = Server::bind(config.address, Arc::clone(&store), coordinator.signal())
        .context(ServerSnafu)?;
    let result = server.run().await.context(ServerSnafu);

    // Stop the injector even when the server failed, then let the store drop
    // (the file backend unlinks its file here).
    coordinator.shutdown();
    #[cfg(not(feature = "char-device"))]
    let _ = injector.await;
    drop(store);

    result
}

#[cfg(not(feature = "char-device"))]
fn open_store(config: &ServiceConfig) -> Result<Box<dyn BackingStore>, AppError> {
    let store = crate::store::FileStore::open(&config.data_path).context(StoreSnafu)?;
    Ok(Box::new(store))
}

#[cfg(feature = "char-device")]
fn open_store(config: &ServiceConfig) -> Result<Box<dyn BackingStore>, AppError> {
    let store = crate::store::DeviceStore::open(&config.data_path).context(StoreSnafu)?;
    Ok(Box::new(store))
}
