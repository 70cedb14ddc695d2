//! Background writer for deferred table changes

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::rpc::emulator::SleepFn;
use crate::store::Store;

/// Flusher options
#[derive(Debug, Clone)]
pub struct Options {
    /// How often dirty tables are written
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Write dirty tables every `interval` until `shutdown_signal` resolves.
/// A failed write keeps the table dirty, so the next tick retries it.
pub async fn run(
    options: Options,
    store: Arc<Store>,
    sleep_fn: SleepFn,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!("Store flusher starting...");

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_signal => {
                info!("Store flusher shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        match store.flush_dirty().await {
            Ok(0) => {}
            Ok(written) => debug!(tables = written, "Flushed deferred changes"),
            Err(e) => warn!("Deferred flush failed, retrying next tick: {}", e),
        }
    }
}
