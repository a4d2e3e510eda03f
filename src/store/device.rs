//! Character-device store.
//!
//! Writes one full packet per append and streams through sequential reads,
//! never through a mapping. The device driver owns the content; in
//! particular, what a reader observes after the driver evicts old writes is
//! the driver's business.

use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::ResultExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt},
};

use super::{AppendSnafu, BackingStore, OpenSnafu, StoreError, StreamSnafu};

const READ_CHUNK: usize = 8 * 1024;

/// Store backed by an existing character device node.
#[derive(Debug)]
pub struct DeviceStore {
    file: File,
    path: PathBuf,
    /// Logical bytes written through this store.
    size: u64,
}

impl DeviceStore {
    /// Opens the device node at `path`. The node must already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|_| OpenSnafu { path: path.clone() })?;

        Ok(Self {
            file: File::from_std(file),
            path,
            size: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BackingStore for DeviceStore {
    async fn append(&mut self, bytes: Bytes) -> Result<usize, StoreError> {
        let delta = bytes.len();
        self.file.write_all(&bytes).await.context(AppendSnafu)?;
        self.file.flush().await.context(AppendSnafu)?;
        self.size += delta as u64;
        Ok(delta)
    }

    async fn stream_to(
        &mut self,
        offset: u64,
        max_len: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .await
            .context(StreamSnafu)?;

        let mut remaining = max_len;
        let mut delivered = 0u64;
        let mut chunk = [0u8; READ_CHUNK];
        while remaining > 0 {
            let want = remaining.min(READ_CHUNK as u64) as usize;
            let read = self
                .file
                .read(&mut chunk[..want])
                .await
                .context(StreamSnafu)?;
            if read == 0 {
                break;
            }
            sink.write_all(&chunk[..read]).await.context(StreamSnafu)?;
            remaining -= read as u64;
            delivered += read as u64;
        }

        sink.flush().await.context(StreamSnafu)?;
        Ok(delivered)
    }

    fn total_size(&self) -> u64 {
        self.size
    }
}
