//! Shutdown coordination.
//!
//! A [`ShutdownCoordinator`] fans a single shutdown event out to every task
//! that holds a [`ShutdownSignal`]. Process signals (SIGTERM/SIGINT) are
//! observed only by the [`SignalListener`] installed at startup and forwarded
//! into the coordinator; worker tasks never see them.

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;

/// Hands out shutdown signals and triggers them.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    trigger: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (trigger, _) = watch::channel(false);
        Self { trigger }
    }

    /// A signal that resolves once shutdown has been requested.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.trigger.subscribe(),
        }
    }

    /// Requests shutdown. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.trigger.send(true);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle that resolves when shutdown is requested.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Completes once shutdown has been requested. If every coordinator
    /// handle is gone, that also counts as shutdown.
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Listener for the process termination signals.
#[derive(Debug)]
pub struct SignalListener {
    sigterm: Signal,
    sigint: Signal,
}

impl SignalListener {
    /// Installs handlers for SIGTERM and SIGINT. Installation failure is a
    /// fatal setup error.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Waits for the next termination signal and names it.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}
