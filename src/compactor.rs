use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::EngineError;
use crate::store::WalStore;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the store's WAL once `threshold` appends have piled up since the
/// last compaction. Returns whether a compaction ran.
pub async fn compact_if_needed(store: &WalStore, threshold: u64) -> Result<bool, EngineError> {
    let appends = store.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    store.compact_wal().await?;
    info!("compacted {} after {appends} appends", store.path().display());
    Ok(true)
}

/// Background task: periodically compact one tenant's WAL.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&store, threshold).await {
            warn!("compaction of {} failed: {e}", store.path().display());
        }
    }
}
