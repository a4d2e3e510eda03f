//! Connection supervisor.
//!
//! Owns the listening socket and the worker registry. The accept loop,
//! worker reaping, and the shutdown signal are multiplexed on one
//! `select!`; every accepted connection gets its own worker task.

use std::{io, net::SocketAddr};

use snafu::{ResultExt, Snafu};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::TcpListener, task::JoinSet};
use tracing::{error, info};

use crate::connection::handle_client;
use crate::shutdown::ShutdownSignal;
use crate::store::SharedStore;

/// Listen backlog; overload shows up as connection queueing, not rejects.
pub const LISTEN_BACKLOG: i32 = 8;

/// Fatal supervisor errors. Any of these tears the process down.
#[derive(Debug, Snafu)]
pub enum ServerError {
    #[snafu(display("failed to create listening socket: {source}"))]
    CreateListener { source: io::Error },

    #[snafu(display("failed to bind {addr}: {source}"))]
    Bind { addr: SocketAddr, source: io::Error },

    #[snafu(display("failed to listen on {addr}: {source}"))]
    Listen { addr: SocketAddr, source: io::Error },

    #[snafu(display("failed to accept client connection: {source}"))]
    Accept { source: io::Error },
}

/// The accept/reap/shutdown supervisor.
pub struct Server {
    listener: TcpListener,
    store: SharedStore,
    shutdown: ShutdownSignal,
}

impl Server {
    /// Binds the listener with address reuse and a bounded backlog.
    pub fn bind(
        addr: SocketAddr,
        store: SharedStore,
        shutdown: ShutdownSignal,
    ) -> Result<Self, ServerError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .context(CreateListenerSnafu)?;
        socket
            .set_reuse_address(true)
            .context(CreateListenerSnafu)?;
        socket.bind(&addr.into()).context(BindSnafu { addr })?;
        socket.listen(LISTEN_BACKLOG).context(ListenSnafu { addr })?;
        socket.set_nonblocking(true).context(CreateListenerSnafu)?;

        let listener =
            TcpListener::from_std(socket.into()).context(CreateListenerSnafu)?;

        Ok(Self {
            listener,
            store,
            shutdown,
        })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().context(CreateListenerSnafu)
    }

    /// Runs until shutdown is requested or a fatal error occurs.
    ///
    /// On shutdown every live worker is cancelled and awaited before this
    /// returns, so the caller may tear down the store immediately after.
    pub async fn run(mut self) -> Result<(), ServerError> {
        let mut workers: JoinSet<()> = JoinSet::new();

        info!(
            message = "Listening for connections.",
            addr = %self.local_addr()?,
        );

        let result = loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted.context(AcceptSnafu) {
                        Ok((socket, peer_addr)) => {
                            workers.spawn(handle_client(
                                socket,
                                peer_addr,
                                self.store.clone(),
                            ));
                        }
                        Err(error) => break Err(error),
                    }
                }
                Some(finished) = workers.join_next(), if !workers.is_empty() => {
                    reap(finished);
                }
                _ = self.shutdown.wait() => break Ok(()),
            }
        };

        info!(message = "Shutting down.", live_workers = workers.len());
        // Cancel every live worker and join them all. Locks and sockets are
        // released as each cancelled task unwinds at its await point.
        workers.shutdown().await;

        result
    }
}

fn reap(finished: Result<(), tokio::task::JoinError>) {
    if let Err(error) = finished {
        if error.is_panic() {
            error!(message = "Worker panicked.", %error);
        }
    }
}
