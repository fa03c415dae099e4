use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Compact once `threshold` appends have piled up since the last compaction.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("WAL compacted after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewRankedItem, RankedKind};
    use crate::notify::NotifyHub;
    use crate::ranking;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rosterd_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn insert(engine: &Engine, name: &str) {
        let mut tx = engine.begin_ranks(RankedKind::Group).await;
        ranking::insert_at_head(&mut tx, NewRankedItem { name: name.into() }).unwrap();
        engine.commit_ranks(tx).await.unwrap();
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();

        insert(&engine, "A").await;
        insert(&engine, "B").await;
        assert!(!compact_if_needed(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 2);

        insert(&engine, "C").await;
        assert!(compact_if_needed(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        let before = engine.list_ranked(RankedKind::Group).await;
        drop(engine);
        let reopened = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
        assert_eq!(reopened.list_ranked(RankedKind::Group).await, before);
    }
}
