//! Per-connection worker.
//!
//! Each accepted socket is driven by one worker task: read one packet, commit
//! it, stream the whole store back, close. Commit and streamback happen under
//! a single critical section, so every client observes a prefix of the commit
//! order that includes its own packet and no two streambacks interleave.

use std::{io, net::SocketAddr};

use snafu::{ResultExt, Snafu};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tracing::{info, warn};

use crate::framing::{FramingError, PacketReader};
use crate::store::{SharedStore, StoreError};

/// Error terminating a single worker. Never propagates to the supervisor.
#[derive(Debug, Snafu)]
pub enum ConnectionError {
    #[snafu(display("failed to read packet: {source}"))]
    ReadPacket { source: FramingError },

    #[snafu(display("failed to commit packet: {source}"))]
    Commit { source: StoreError },

    #[snafu(display("failed to stream history back: {source}"))]
    Streamback { source: StoreError },

    #[snafu(display("failed to close client socket: {source}"))]
    Close { source: io::Error },
}

/// Runs one client connection to completion.
///
/// All failure handling is terminal for this worker only: errors are logged
/// and the socket, packet buffer, and (if held) history lock are released on
/// the way out.
pub async fn handle_client(mut socket: TcpStream, peer_addr: SocketAddr, store: SharedStore) {
    info!(message = "Accepted connection.", %peer_addr);

    match serve_client(&mut socket, &store).await {
        Ok(committed) => {
            if !committed {
                info!(message = "Connection closed before a complete packet.", %peer_addr);
            }
        }
        Err(error) => {
            warn!(message = "Client connection failed.", %peer_addr, %error);
        }
    }

    info!(message = "Closed connection.", %peer_addr);
}

async fn serve_client(socket: &mut TcpStream, store: &SharedStore) -> Result<bool, ConnectionError> {
    let mut reader = PacketReader::new();
    let Some(packet) = reader
        .read_packet(socket)
        .await
        .context(ReadPacketSnafu)?
    else {
        // Peer went away before sending a newline; nothing to commit.
        return Ok(false);
    };

    // Critical section: commit, then echo the full history to this client
    // before anyone else can commit.
    {
        let mut store = store.lock().await;
        store.append(packet).await.context(CommitSnafu)?;
        let sink: &mut (dyn AsyncWrite + Send + Unpin) = &mut *socket;
        store.stream_all(sink).await.context(StreambackSnafu)?;
    }

    socket.shutdown().await.context(CloseSnafu)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use tokio::{
        io::AsyncReadExt,
        net::{TcpListener, TcpStream},
        sync::Mutex,
    };

    use super::*;
    use crate::store::{BackingStore, HistoryStore};

    fn history_store() -> SharedStore {
        Arc::new(Mutex::new(
            Box::new(HistoryStore::<10>::new()) as Box<dyn BackingStore>
        ))
    }

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn commits_and_echoes_history() {
        let store = history_store();
        store
            .lock()
            .await
            .append(Bytes::from_static(b"old\n"))
            .await
            .unwrap();

        let (mut client, server) = socket_pair().await;
        let peer_addr = server.peer_addr().unwrap();
        let worker = tokio::spawn(handle_client(server, peer_addr, Arc::clone(&store)));

        client.write_all(b"new\n").await.unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        worker.await.unwrap();

        assert_eq!(reply, b"old\nnew\n");
        assert_eq!(store.lock().await.total_size(), 8);
    }

    #[tokio::test]
    async fn no_commit_when_peer_closes_early() {
        let store = history_store();
        let (mut client, server) = socket_pair().await;
        let peer_addr = server.peer_addr().unwrap();
        let worker = tokio::spawn(handle_client(server, peer_addr, Arc::clone(&store)));

        client.write_all(b"no newline").await.unwrap();
        drop(client);
        worker.await.unwrap();

        assert_eq!(store.lock().await.total_size(), 0);
    }
}
