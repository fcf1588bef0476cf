//! Per-ID lock manager.
//!
//! Mutations are serialized per touched profile/filter ID through a sharded
//! map of named mutexes, so concurrent writes to different profiles never
//! block each other while writes to the same ID are strictly ordered. Every
//! acquire carries a bounded wait; expiry surfaces as
//! [`EngineError::LockTimeout`].

use crate::config::LockConfig;
use crate::error::{EngineError, Result};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

type NamedLock = Arc<Mutex<()>>;

/// Sharded map of named mutexes with bounded-wait acquisition.
pub struct LockManager {
    shards: Vec<Mutex<HashMap<String, NamedLock>>>,
    timeout: Duration,
}

/// Guard over one or more named locks; released on drop.
pub struct IdGuard {
    _guards: Vec<ArcMutexGuard<RawMutex, ()>>,
}

impl LockManager {
    pub fn new(cfg: &LockConfig) -> Self {
        let shards = cfg.shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            timeout: cfg.timeout,
        }
    }

    fn named_lock(&self, id: &str) -> NamedLock {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let shard = &self.shards[(hasher.finish() as usize) % self.shards.len()];
        shard
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire all named locks, or fail with the first ID that timed out.
    ///
    /// IDs are sorted and deduplicated before acquisition so two writers
    /// touching overlapping ID sets cannot deadlock each other.
    pub fn guard(&self, ids: &[&str]) -> Result<IdGuard> {
        let mut sorted: Vec<&str> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            let lock = self.named_lock(id);
            match lock.try_lock_arc_for(self.timeout) {
                Some(guard) => guards.push(guard),
                None => return Err(EngineError::LockTimeout(id.to_string())),
            }
        }
        Ok(IdGuard { _guards: guards })
    }
}

impl std::fmt::Debug for IdGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGuard")
            .field("held", &self._guards.len())
            .finish()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("shards", &self.shards.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(timeout: Duration) -> LockManager {
        LockManager::new(&LockConfig { timeout, shards: 4 })
    }

    #[test]
    fn test_same_id_serialized() {
        let mgr = manager(Duration::from_millis(50));
        let g1 = mgr.guard(&["TH1"]).unwrap();
        // Second acquire on the same ID must time out while g1 is held.
        assert_eq!(
            mgr.guard(&["TH1"]).unwrap_err(),
            EngineError::LockTimeout("TH1".to_string())
        );
        drop(g1);
        assert!(mgr.guard(&["TH1"]).is_ok());
    }

    #[test]
    fn test_different_ids_independent() {
        let mgr = manager(Duration::from_millis(50));
        let _g1 = mgr.guard(&["TH1"]).unwrap();
        let _g2 = mgr.guard(&["TH2"]).unwrap();
    }

    #[test]
    fn test_multi_id_guard_dedups() {
        let mgr = manager(Duration::from_millis(50));
        let _g = mgr.guard(&["TH2", "TH1", "TH2"]).unwrap();
        assert!(mgr.guard(&["TH1"]).is_err());
        assert!(mgr.guard(&["TH2"]).is_err());
    }

    #[test]
    fn test_concurrent_writers_ordered() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mgr = Arc::new(manager(Duration::from_secs(5)));
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let _g = mgr.guard(&["shared"]).unwrap();
                    let v = counter.load(Ordering::SeqCst);
                    counter.store(v + 1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // Non-atomic read-modify-write stays exact only if the lock held.
        assert_eq!(counter.load(Ordering::SeqCst), 800);
    }
}
