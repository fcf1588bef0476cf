//! Persistence collaborators: the `DataStore` trait, an in-memory
//! implementation and a read-through filter cache.
//!
//! Index writes may be staged under an opaque transaction token. Staged
//! changes are invisible to plain readers until committed; commit swaps the
//! affected scopes in one atomic step so nobody observes a half-written
//! index.

use crate::error::{EngineError, Result};
use crate::filter::Filter;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which side of the inverted index a call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// fingerprint -> profile-ID set
    Forward,
    /// profile-ID -> fingerprint set
    Reverse,
}

/// One scope's worth of index entries. Ordered sets keep enumeration stable.
pub type IndexMap = HashMap<String, BTreeSet<String>>;

/// Opaque handle for a staged index transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnToken(u64);

/// Storage surface the engine consumes. NotFound is a first-class return:
/// aggregate index reads treat it as "empty", single-entity reads propagate
/// it.
pub trait DataStore: Send + Sync {
    fn get_filter(&self, tenant: &str, id: &str) -> Result<Filter>;
    fn set_filter(&self, filter: &Filter) -> Result<()>;
    fn remove_filter(&self, tenant: &str, id: &str) -> Result<()>;

    /// Full index map for a scope. NotFound when the scope has no entries.
    fn get_indexes(&self, kind: IndexKind, scope: &str, txn: Option<TxnToken>)
        -> Result<IndexMap>;

    /// Merge `entries` into the scope: non-empty sets replace the stored set
    /// for their key, empty sets delete the key.
    fn set_indexes(
        &self,
        kind: IndexKind,
        scope: &str,
        entries: IndexMap,
        txn: Option<TxnToken>,
    ) -> Result<()>;

    /// Drop a whole scope.
    fn remove_indexes(&self, kind: IndexKind, scope: &str, txn: Option<TxnToken>) -> Result<()>;

    /// Open a staging transaction for index writes.
    fn index_txn(&self) -> TxnToken;

    /// Atomically merge a transaction's staged scopes into the live index.
    fn commit_txn(&self, txn: TxnToken) -> Result<()>;

    /// Throw away a transaction's staged scopes.
    fn discard_txn(&self, txn: TxnToken);
}

type ScopeKey = (IndexKind, String);

/// Staged view of the scopes a transaction has touched. Each entry is a full
/// replacement map for its scope.
type Staged = HashMap<ScopeKey, IndexMap>;

/// In-memory `DataStore`. The reference implementation and the test double.
#[derive(Default)]
pub struct MemStore {
    filters: RwLock<HashMap<String, Filter>>,
    indexes: RwLock<HashMap<ScopeKey, IndexMap>>,
    staged: Mutex<HashMap<u64, Staged>>,
    next_txn: AtomicU64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter_key(tenant: &str, id: &str) -> String {
        format!("{tenant}:{id}")
    }

    /// Apply the merge semantics of `set_indexes` onto a scope map in place.
    fn merge_entries(scope_map: &mut IndexMap, entries: IndexMap) {
        for (key, set) in entries {
            if set.is_empty() {
                scope_map.remove(&key);
            } else {
                scope_map.insert(key, set);
            }
        }
    }
}

impl DataStore for MemStore {
    fn get_filter(&self, tenant: &str, id: &str) -> Result<Filter> {
        self.filters
            .read()
            .get(&Self::filter_key(tenant, id))
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    fn set_filter(&self, filter: &Filter) -> Result<()> {
        self.filters
            .write()
            .insert(filter.tenant_id(), filter.clone());
        Ok(())
    }

    fn remove_filter(&self, tenant: &str, id: &str) -> Result<()> {
        self.filters.write().remove(&Self::filter_key(tenant, id));
        Ok(())
    }

    fn get_indexes(
        &self,
        kind: IndexKind,
        scope: &str,
        txn: Option<TxnToken>,
    ) -> Result<IndexMap> {
        let key = (kind, scope.to_string());
        if let Some(TxnToken(id)) = txn {
            if let Some(staged) = self.staged.lock().get(&id) {
                if let Some(map) = staged.get(&key) {
                    return if map.is_empty() {
                        Err(EngineError::NotFound)
                    } else {
                        Ok(map.clone())
                    };
                }
            }
        }
        self.indexes
            .read()
            .get(&key)
            .filter(|m| !m.is_empty())
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    fn set_indexes(
        &self,
        kind: IndexKind,
        scope: &str,
        entries: IndexMap,
        txn: Option<TxnToken>,
    ) -> Result<()> {
        let key = (kind, scope.to_string());
        match txn {
            Some(TxnToken(id)) => {
                let mut staged = self.staged.lock();
                let txn_scopes = staged
                    .get_mut(&id)
                    .ok_or_else(|| EngineError::Backend(format!("unknown index txn {id}")))?;
                let scope_map = txn_scopes.entry(key.clone()).or_insert_with(|| {
                    // First touch snapshots the live scope into the overlay.
                    self.indexes.read().get(&key).cloned().unwrap_or_default()
                });
                Self::merge_entries(scope_map, entries);
            }
            None => {
                let mut live = self.indexes.write();
                let scope_map = live.entry(key).or_default();
                Self::merge_entries(scope_map, entries);
            }
        }
        Ok(())
    }

    fn remove_indexes(&self, kind: IndexKind, scope: &str, txn: Option<TxnToken>) -> Result<()> {
        let key = (kind, scope.to_string());
        match txn {
            Some(TxnToken(id)) => {
                let mut staged = self.staged.lock();
                let txn_scopes = staged
                    .get_mut(&id)
                    .ok_or_else(|| EngineError::Backend(format!("unknown index txn {id}")))?;
                txn_scopes.insert(key, IndexMap::new());
            }
            None => {
                self.indexes.write().remove(&key);
            }
        }
        Ok(())
    }

    fn index_txn(&self) -> TxnToken {
        let id = self.next_txn.fetch_add(1, Ordering::Relaxed);
        self.staged.lock().insert(id, Staged::new());
        TxnToken(id)
    }

    fn commit_txn(&self, txn: TxnToken) -> Result<()> {
        let staged = self
            .staged
            .lock()
            .remove(&txn.0)
            .ok_or_else(|| EngineError::Backend(format!("unknown index txn {}", txn.0)))?;
        let mut live = self.indexes.write();
        for (key, map) in staged {
            if map.is_empty() {
                live.remove(&key);
            } else {
                live.insert(key, map);
            }
        }
        Ok(())
    }

    fn discard_txn(&self, txn: TxnToken) {
        self.staged.lock().remove(&txn.0);
    }
}

/// Read-through filter cache in front of another store. Correctness never
/// depends on it: every miss falls through, every write invalidates.
pub struct CachingStore {
    inner: Arc<dyn DataStore>,
    filters: RwLock<HashMap<String, Filter>>,
}

impl CachingStore {
    pub fn new(inner: Arc<dyn DataStore>) -> Self {
        Self {
            inner,
            filters: RwLock::new(HashMap::new()),
        }
    }
}

impl DataStore for CachingStore {
    fn get_filter(&self, tenant: &str, id: &str) -> Result<Filter> {
        let key = MemStore::filter_key(tenant, id);
        if let Some(hit) = self.filters.read().get(&key) {
            return Ok(hit.clone());
        }
        let filter = self.inner.get_filter(tenant, id)?;
        self.filters.write().insert(key, filter.clone());
        Ok(filter)
    }

    fn set_filter(&self, filter: &Filter) -> Result<()> {
        self.inner.set_filter(filter)?;
        self.filters.write().remove(&filter.tenant_id());
        Ok(())
    }

    fn remove_filter(&self, tenant: &str, id: &str) -> Result<()> {
        self.inner.remove_filter(tenant, id)?;
        self.filters
            .write()
            .remove(&MemStore::filter_key(tenant, id));
        Ok(())
    }

    fn get_indexes(
        &self,
        kind: IndexKind,
        scope: &str,
        txn: Option<TxnToken>,
    ) -> Result<IndexMap> {
        self.inner.get_indexes(kind, scope, txn)
    }

    fn set_indexes(
        &self,
        kind: IndexKind,
        scope: &str,
        entries: IndexMap,
        txn: Option<TxnToken>,
    ) -> Result<()> {
        self.inner.set_indexes(kind, scope, entries, txn)
    }

    fn remove_indexes(&self, kind: IndexKind, scope: &str, txn: Option<TxnToken>) -> Result<()> {
        self.inner.remove_indexes(kind, scope, txn)
    }

    fn index_txn(&self) -> TxnToken {
        self.inner.index_txn()
    }

    fn commit_txn(&self, txn: TxnToken) -> Result<()> {
        self.inner.commit_txn(txn)
    }

    fn discard_txn(&self, txn: TxnToken) {
        self.inner.discard_txn(txn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterRule;

    fn set_of(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn sample_filter() -> Filter {
        Filter::new(
            "cgrates.org",
            "FLTR_1",
            vec![FilterRule::new("*string", "Account", vec!["1001".into()]).unwrap()],
        )
    }

    #[test]
    fn test_filter_round_trip() {
        let store = MemStore::new();
        let f = sample_filter();
        store.set_filter(&f).unwrap();
        assert_eq!(store.get_filter("cgrates.org", "FLTR_1").unwrap(), f);
        store.remove_filter("cgrates.org", "FLTR_1").unwrap();
        assert!(store
            .get_filter("cgrates.org", "FLTR_1")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_index_merge_and_delete_semantics() {
        let store = MemStore::new();
        let scope = "*threshold:cgrates.org";
        let mut entries = IndexMap::new();
        entries.insert("*string:Account:1001".into(), set_of(&["TH1", "TH2"]));
        store
            .set_indexes(IndexKind::Forward, scope, entries, None)
            .unwrap();

        let got = store.get_indexes(IndexKind::Forward, scope, None).unwrap();
        assert_eq!(got["*string:Account:1001"], set_of(&["TH1", "TH2"]));

        // Empty set deletes the key; an emptied scope reads as NotFound.
        let mut del = IndexMap::new();
        del.insert("*string:Account:1001".into(), BTreeSet::new());
        store
            .set_indexes(IndexKind::Forward, scope, del, None)
            .unwrap();
        assert!(store
            .get_indexes(IndexKind::Forward, scope, None)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_staged_txn_invisible_until_commit() {
        let store = MemStore::new();
        let scope = "*threshold:cgrates.org";
        let txn = store.index_txn();

        let mut entries = IndexMap::new();
        entries.insert("*string:Account:1001".into(), set_of(&["TH1"]));
        store
            .set_indexes(IndexKind::Forward, scope, entries, Some(txn))
            .unwrap();

        // Plain readers see nothing, the transaction sees its own writes.
        assert!(store
            .get_indexes(IndexKind::Forward, scope, None)
            .unwrap_err()
            .is_not_found());
        assert!(store
            .get_indexes(IndexKind::Forward, scope, Some(txn))
            .is_ok());

        store.commit_txn(txn).unwrap();
        let got = store.get_indexes(IndexKind::Forward, scope, None).unwrap();
        assert_eq!(got["*string:Account:1001"], set_of(&["TH1"]));
    }

    #[test]
    fn test_discarded_txn_leaves_live_untouched() {
        let store = MemStore::new();
        let scope = "*threshold:cgrates.org";
        let mut live = IndexMap::new();
        live.insert("*string:Account:1001".into(), set_of(&["TH1"]));
        store
            .set_indexes(IndexKind::Forward, scope, live, None)
            .unwrap();

        let txn = store.index_txn();
        store
            .remove_indexes(IndexKind::Forward, scope, Some(txn))
            .unwrap();
        store.discard_txn(txn);

        assert!(store.get_indexes(IndexKind::Forward, scope, None).is_ok());
        // The token is dead after discard.
        assert!(store.commit_txn(txn).is_err());
    }

    #[test]
    fn test_caching_store_reads_through_and_invalidates() {
        let inner = Arc::new(MemStore::new());
        let cached = CachingStore::new(inner.clone());
        let f = sample_filter();
        inner.set_filter(&f).unwrap();

        assert_eq!(cached.get_filter("cgrates.org", "FLTR_1").unwrap(), f);
        // Mutate behind the cache, then write through it to invalidate.
        let mut f2 = f.clone();
        f2.rules.clear();
        cached.set_filter(&f2).unwrap();
        assert_eq!(cached.get_filter("cgrates.org", "FLTR_1").unwrap(), f2);
    }
}
