//! Typed access to the persisted forward/reverse index, plus the two-phase
//! rebuild builder.

use crate::error::{EngineError, Result};
use crate::index::keys::IndexScope;
use crate::storage::{DataStore, IndexKind, IndexMap, TxnToken};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Index reads and writes for one storage backend. Cheap to clone.
#[derive(Clone)]
pub struct IndexStore {
    store: Arc<dyn DataStore>,
}

impl IndexStore {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Profile IDs filed under one fingerprint. NotFound when the
    /// fingerprint has no entry; the matching path treats that as "no
    /// candidates from this probe".
    pub fn match_key(&self, scope: &IndexScope, fingerprint: &str) -> Result<BTreeSet<String>> {
        let map = self
            .store
            .get_indexes(IndexKind::Forward, &scope.key(), None)?;
        map.get(fingerprint).cloned().ok_or(EngineError::NotFound)
    }

    /// Whole index map for a scope, with NotFound flattened to empty. The
    /// aggregate read is optional by design: an absent scope is an empty
    /// index, not a failure.
    pub fn get_or_empty(
        &self,
        kind: IndexKind,
        scope: &IndexScope,
        txn: Option<TxnToken>,
    ) -> Result<IndexMap> {
        match self.store.get_indexes(kind, &scope.key(), txn) {
            Ok(map) => Ok(map),
            Err(EngineError::NotFound) => Ok(IndexMap::new()),
            Err(e) => Err(e),
        }
    }

    /// One profile's reverse entry, empty when absent.
    pub fn reverse_entry(
        &self,
        scope: &IndexScope,
        profile_id: &str,
        txn: Option<TxnToken>,
    ) -> Result<BTreeSet<String>> {
        Ok(self
            .get_or_empty(IndexKind::Reverse, scope, txn)?
            .remove(profile_id)
            .unwrap_or_default())
    }

    pub fn set(
        &self,
        kind: IndexKind,
        scope: &IndexScope,
        entries: IndexMap,
        txn: Option<TxnToken>,
    ) -> Result<()> {
        self.store.set_indexes(kind, &scope.key(), entries, txn)
    }

    /// Drop both sides of a scope.
    pub fn remove_scope(&self, scope: &IndexScope, txn: Option<TxnToken>) -> Result<()> {
        self.store
            .remove_indexes(IndexKind::Forward, &scope.key(), txn)?;
        self.store
            .remove_indexes(IndexKind::Reverse, &scope.key(), txn)
    }

    /// Begin a staged rebuild: writes go through the returned builder and
    /// stay invisible to readers until `commit`.
    pub fn staged_rebuild(&self, scope: IndexScope) -> StagedRebuild {
        let txn = self.store.index_txn();
        debug!(scope = %scope, txn = ?txn, "staged index rebuild opened");
        StagedRebuild {
            index: self.clone(),
            scope,
            txn,
            open: true,
        }
    }
}

/// Two-phase rebuild handle. Dropping an uncommitted builder discards its
/// staged writes.
pub struct StagedRebuild {
    index: IndexStore,
    scope: IndexScope,
    txn: TxnToken,
    open: bool,
}

impl StagedRebuild {
    pub fn scope(&self) -> &IndexScope {
        &self.scope
    }

    pub fn txn(&self) -> TxnToken {
        self.txn
    }

    /// Clear both sides of the scope inside the stage.
    pub fn clear(&self) -> Result<()> {
        self.index.remove_scope(&self.scope, Some(self.txn))
    }

    pub fn set(&self, kind: IndexKind, entries: IndexMap) -> Result<()> {
        self.index.set(kind, &self.scope, entries, Some(self.txn))
    }

    /// Atomically publish the staged scope.
    pub fn commit(mut self) -> Result<()> {
        self.open = false;
        debug!(scope = %self.scope, "staged index rebuild committed");
        self.index.store.commit_txn(self.txn)
    }

    /// Drop the staged writes explicitly.
    pub fn discard(mut self) {
        self.open = false;
        self.index.store.discard_txn(self.txn);
    }
}

impl Drop for StagedRebuild {
    fn drop(&mut self) {
        if self.open {
            self.index.store.discard_txn(self.txn);
        }
    }
}
