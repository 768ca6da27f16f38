//! Replication of player state to a shared key/value cache.
//!
//! Formatters hand serialized blobs to a [`CacheReplicator`]; a [`CacheWorker`]
//! on the tokio runtime writes them to the [`CacheStore`], keeping store latency
//! off the simulation thread.

use crate::commands::PlayerId;
use crate::error::CacheError;
use dashmap::DashMap;
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub fn player_state_key(player_id: PlayerId) -> String {
    format!("player:{}:state", player_id)
}

pub trait CacheStore: Send + Sync {
    fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn is_connected(&self) -> bool;
}

/// Process-local store, used by the binary when no external cache is configured.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: DashMap<String, Vec<u8>>,
    connected: AtomicBool,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            connected: AtomicBool::new(true),
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for InMemoryCache {
    fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        if !self.is_connected() {
            return Err(CacheError::Disconnected);
        }
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        if !self.is_connected() {
            return Err(CacheError::Disconnected);
        }
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct CacheWrite {
    key: String,
    value: Vec<u8>,
}

/// Cloneable producer side. Enqueueing never blocks.
#[derive(Clone)]
pub struct CacheReplicator {
    store: Arc<dyn CacheStore>,
    tx: mpsc::UnboundedSender<CacheWrite>,
    reported_disconnect: Arc<AtomicBool>,
}

impl CacheReplicator {
    pub fn new(store: Arc<dyn CacheStore>) -> (Self, CacheWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let replicator = Self {
            store: Arc::clone(&store),
            tx,
            reported_disconnect: Arc::new(AtomicBool::new(false)),
        };
        (replicator, CacheWorker { store, rx })
    }

    /// Queues `blob` as the cached state of `player_id`. Dropped when the store is
    /// disconnected; that is logged once until the store comes back.
    pub fn enqueue(&self, player_id: PlayerId, blob: Vec<u8>) -> bool {
        if !self.store.is_connected() {
            if !self.reported_disconnect.swap(true, Ordering::Relaxed) {
                error!("Cache store disconnected; player state replication paused");
            }
            return false;
        }
        self.reported_disconnect.store(false, Ordering::Relaxed);

        let write = CacheWrite {
            key: player_state_key(player_id),
            value: blob,
        };
        if let Err(e) = self.tx.send(write) {
            warn!("Cache worker has stopped: {}", e);
            return false;
        }
        true
    }
}

/// Consumer side; owns the queue receiver.
pub struct CacheWorker {
    store: Arc<dyn CacheStore>,
    rx: mpsc::UnboundedReceiver<CacheWrite>,
}

impl CacheWorker {
    fn write(&self, write: CacheWrite) -> bool {
        match self.store.set(&write.key, &write.value) {
            Ok(()) => {
                debug!("Cached {} ({} bytes)", write.key, write.value.len());
                true
            }
            Err(e) => {
                warn!("Cache write for {} failed: {}", write.key, e);
                false
            }
        }
    }

    /// Writes until every replicator handle has been dropped.
    pub async fn run(mut self) {
        while let Some(write) = self.rx.recv().await {
            self.write(write);
        }
        debug!("Cache worker stopped");
    }

    /// Writes whatever is queued right now. Returns how many writes succeeded.
    pub fn drain_pending(&mut self) -> usize {
        let mut written = 0;
        while let Ok(write) = self.rx.try_recv() {
            if self.write(write) {
                written += 1;
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(player_state_key(42), "player:42:state");
    }

    #[test]
    fn test_replicated_writes_reach_store() {
        let store = Arc::new(InMemoryCache::new());
        let (replicator, mut worker) = CacheReplicator::new(store.clone());

        assert!(replicator.enqueue(7, vec![1, 2, 3]));
        assert!(replicator.enqueue(7, vec![4]));
        assert_eq!(worker.drain_pending(), 2);

        assert_eq!(store.get("player:7:state").unwrap(), Some(vec![4]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_disconnected_store_drops_writes() {
        let store = Arc::new(InMemoryCache::new());
        store.set_connected(false);
        let (replicator, mut worker) = CacheReplicator::new(store.clone());

        assert!(!replicator.enqueue(1, vec![1]));
        assert!(!replicator.enqueue(1, vec![1]));
        assert_eq!(worker.drain_pending(), 0);

        store.set_connected(true);
        assert!(replicator.enqueue(1, vec![9]));
        assert_eq!(worker.drain_pending(), 1);
        assert_eq!(store.get("player:1:state").unwrap(), Some(vec![9]));
    }

    #[test]
    fn test_worker_run_stops_when_replicators_drop() {
        let store = Arc::new(InMemoryCache::new());
        let (replicator, worker) = CacheReplicator::new(store.clone());
        replicator.enqueue(3, vec![3]);
        drop(replicator);

        tokio_test::block_on(worker.run());
        assert_eq!(store.get("player:3:state").unwrap(), Some(vec![3]));
    }
}
