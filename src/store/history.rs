//! In-memory store backed by the bounded [`CircularHistory`].

use async_trait::async_trait;
use bytes::Bytes;
use snafu::ResultExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{BackingStore, StoreError, StreamSnafu};
use crate::history::{CircularHistory, HISTORY_SLOTS};

/// Store in which each append becomes one history entry.
///
/// Once the history wraps, the oldest entries fall off and the logical
/// content shrinks accordingly; offsets are always relative to the retained
/// content.
#[derive(Debug, Default)]
pub struct HistoryStore<const N: usize = HISTORY_SLOTS> {
    history: CircularHistory<N>,
}

impl<const N: usize> HistoryStore<N> {
    pub fn new() -> Self {
        Self {
            history: CircularHistory::new(),
        }
    }

    /// Read access to the underlying history.
    pub fn history(&self) -> &CircularHistory<N> {
        &self.history
    }
}

#[async_trait]
impl<const N: usize> BackingStore for HistoryStore<N> {
    async fn append(&mut self, bytes: Bytes) -> Result<usize, StoreError> {
        let delta = bytes.len();
        // Eviction hands the oldest buffer back to us; it is released here.
        drop(self.history.append(bytes));
        Ok(delta)
    }

    async fn stream_to(
        &mut self,
        offset: u64,
        max_len: u64,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StoreError> {
        let mut cursor = offset;
        let mut remaining = max_len;
        let mut delivered = 0u64;

        // Re-query after each entry until the request is satisfied or the
        // history runs out.
        while remaining > 0 {
            let Some((entry, skip)) = self.history.find_by_offset(cursor) else {
                break;
            };
            let available = entry.len() - skip;
            let take = available.min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let chunk = entry.slice(skip..skip + take);

            sink.write_all(&chunk).await.context(StreamSnafu)?;

            cursor += take as u64;
            remaining -= take as u64;
            delivered += take as u64;
        }

        sink.flush().await.context(StreamSnafu)?;
        Ok(delivered)
    }

    fn total_size(&self) -> u64 {
        self.history.total_bytes()
    }
}
