//! Memory-mapped file store.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use memmap2::MmapMut;
use snafu::ResultExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{BackingStore, GrowSnafu, MapSnafu, OpenSnafu, StoreError, StreamSnafu};

/// Store backed by a memory-mapped regular file.
///
/// The file is kept truncated to the next page multiple of the logical size;
/// appends that would overflow the mapping extend the file and remap. An
/// existing file is adopted as-is, so a restart continues appending where the
/// previous content ends. The file is removed when the store is dropped.
#[derive(Debug)]
pub struct FileStore {
    file: File,
    map: MmapMut,
    path: PathBuf,
    /// Logical content size; the file itself is padded out to `mapped`.
    size: u64,
    /// Current mapping length, always a page multiple covering `size`.
    mapped: u64,
    page_size: u64,
}

impl FileStore {
    /// Opens (creating if absent) and maps the backing file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|_| OpenSnafu { path: path.clone() })?;

        let size = file
            .metadata()
            .with_context(|_| OpenSnafu { path: path.clone() })?
            .len();

        let page_size = page_size();
        let mapped = (size / page_size + 1) * page_size;
        file.set_len(mapped).context(GrowSnafu)?;
        let map = unsafe { MmapMut::map_mut(&file) }.context(MapSnafu)?;

        Ok(Self {
            file,
            map,
            path,
            size,
            mapped,
            page_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extends the file to the next page multiple covering `required` bytes
    /// and replaces the mapping.
    fn grow(&mut self, required: u64) -> Result<(), StoreError> {
        let mapped = (required / self.page_size + 1) * self.page_size;
        self.file.set_len(mapped).context(GrowSnafu)?;
        self.map = unsafe { MmapMut::map_mut(&self.file) }.context(MapSnafu)?;
        self.mapped = mapped;
        Ok(())
    }
}

#[async_trait]
impl BackingStore for FileStore {
    async fn append(&mut self, bytes: Bytes) -> Result<usize, StoreError> {
        let delta = bytes.len();
        let required = self.size + delta as u64;
        if required > self.mapped {
            self.grow(required)?;
        }

        let start = self.size as usize;
        self.map[start..start + delta].copy_from_slice(&bytes);
        self.size = required;
        Ok(delta)
    }

    async fn stream_to(
        &mut self,
        offset: u64,
        max_len: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError> {
        if offset >= self.size {
            return Ok(0);
        }
        let end = self.size.min(offset.saturating_add(max_len));
        let chunk = &self.map[offset as usize..end as usize];

        sink.write_all(chunk).await.context(StreamSnafu)?;
        sink.flush().await.context(StreamSnafu)?;
        Ok(end - offset)
    }

    fn total_size(&self) -> u64 {
        self.size
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                message = "Failed to remove backing file.",
                path = %self.path.display(),
                %error,
            );
        }
    }
}

fn page_size() -> u64 {
    use nix::unistd::{sysconf, SysconfVar};

    // 4 KiB is correct for every platform this runs on in practice.
    const FALLBACK: u64 = 4096;
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(value)) if value > 0 => value as u64,
        _ => FALLBACK,
    }
}
