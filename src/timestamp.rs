//! Periodic timestamp injector.
//!
//! A background writer that appends a wall-clock marker to the shared store
//! at a fixed interval, under the same lock as client commits. Clients see
//! the markers interleaved with packets in commit order.

use std::time::Duration;

use bytes::Bytes;
use chrono::Local;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::shutdown::ShutdownSignal;
use crate::store::SharedStore;

/// Format of the injected marker's time field.
pub const TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %T %z";

/// Renders one marker line, trailing newline included.
pub fn timestamp_line(now: chrono::DateTime<Local>) -> String {
    format!("timestamp:{}\n", now.format(TIMESTAMP_FORMAT))
}

/// Appends a timestamp line to `store` every `period` until shutdown.
///
/// Append failures are logged and the injector keeps ticking; a broken store
/// will surface through the client path as well.
pub async fn run_injector(store: SharedStore, period: Duration, mut shutdown: ShutdownSignal) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so the first marker lands
    // one full period after startup.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let line = timestamp_line(Local::now());
                let mut store = store.lock().await;
                match store.append(Bytes::from(line)).await {
                    Ok(delta) => debug!(message = "Appended timestamp.", bytes = delta),
                    Err(error) => warn!(message = "Failed to append timestamp.", %error),
                }
            }
            _ = shutdown.wait() => break,
        }
    }
}
