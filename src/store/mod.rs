//! Backing stores for the write history.
//!
//! A [`BackingStore`] is an append-only byte log with offset-addressed
//! streaming. Workers commit packets with [`BackingStore::append`] and echo
//! the accumulated content with [`BackingStore::stream_to`]; both run under
//! the service's history lock, so implementations may assume exclusive
//! access.

use std::{io, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::Snafu;
use tokio::{io::AsyncWrite, sync::Mutex};

#[cfg(feature = "char-device")]
mod device;
mod file;
mod history;

#[cfg(feature = "char-device")]
pub use device::DeviceStore;
pub use file::FileStore;
pub use history::HistoryStore;

/// The shared, lock-guarded store. The critical section spans append plus
/// streamback, so the mutex must be the async flavor.
pub type SharedStore = Arc<Mutex<Box<dyn BackingStore>>>;

/// Error raised by a backing store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Opening the backing file or device failed. Fatal at startup.
    #[snafu(display("failed to open backing store at {}: {source}", path.display()))]
    Open { path: PathBuf, source: io::Error },

    /// The backing file could not be mapped. Fatal at startup.
    #[snafu(display("failed to map backing file: {source}"))]
    Map { source: io::Error },

    /// Extending the backing file to make room for an append failed.
    #[snafu(display("failed to extend backing file: {source}"))]
    Grow { source: io::Error },

    /// Writing appended bytes to the store failed.
    #[snafu(display("failed to append to backing store: {source}"))]
    Append { source: io::Error },

    /// Streaming store content into the sink failed.
    #[snafu(display("failed to stream store contents: {source}"))]
    Stream { source: io::Error },
}

/// Abstract sink behind the history lock.
#[async_trait]
pub trait BackingStore: Send {
    /// Atomically extends the logical content by `bytes`, returning the size
    /// delta on success.
    async fn append(&mut self, bytes: Bytes) -> Result<usize, StoreError>;

    /// Writes up to `max_len` bytes of content starting at `offset` into
    /// `sink`, returning the number of bytes delivered.
    async fn stream_to(
        &mut self,
        offset: u64,
        max_len: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError>;

    /// Current logical size in bytes.
    fn total_size(&self) -> u64;

    /// Streams the entire current content into `sink`.
    async fn stream_all(
        &mut self,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError> {
        let total = self.total_size();
        self.stream_to(0, total, sink).await
    }
}
