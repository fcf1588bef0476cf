//! Keeps the forward/reverse index exactly consistent with profile writes.
//!
//! Every mutation is a diff against the profile's reverse entry, applied
//! under a per-scope lock so concurrent writes to the same scope are
//! strictly ordered. The forward and reverse maps must remain exact
//! inverses at every commit point.

use crate::error::{EngineError, Result};
use crate::filter::FilterEngine;
use crate::index::keys::{rule_fingerprints, IndexScope, CATCH_ALL};
use crate::index::store::IndexStore;
use crate::lock::LockManager;
use crate::storage::{IndexKind, IndexMap, TxnToken};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Indexer {
    index: IndexStore,
    filters: FilterEngine,
    locks: Arc<LockManager>,
}

impl Indexer {
    pub fn new(index: IndexStore, filters: FilterEngine, locks: Arc<LockManager>) -> Self {
        Self {
            index,
            filters,
            locks,
        }
    }

    /// Fingerprint set a profile contributes, from its current filter IDs.
    /// Empty filter lists and fully non-indexable rule sets fall back to the
    /// catch-all so the profile never disappears from matching.
    pub fn fingerprints(&self, tenant: &str, filter_ids: &[String]) -> Result<BTreeSet<String>> {
        let mut set = BTreeSet::new();
        for filter_id in filter_ids {
            let filter = self.filters.filter(tenant, filter_id)?;
            for rule in &filter.rules {
                set.extend(rule_fingerprints(rule));
            }
        }
        if set.is_empty() {
            set.insert(CATCH_ALL.to_string());
        }
        Ok(set)
    }

    /// Create or update one profile's index contribution.
    pub fn index_profile(
        &self,
        scope: &IndexScope,
        profile_id: &str,
        filter_ids: &[String],
        txn: Option<TxnToken>,
    ) -> Result<()> {
        let scope_key = scope.key();
        let _guard = self.locks.guard(&[&scope_key])?;
        self.apply_profile(scope, profile_id, filter_ids, txn)
    }

    /// Diff-and-write body of [`Self::index_profile`]. Callers must already
    /// hold the scope lock.
    fn apply_profile(
        &self,
        scope: &IndexScope,
        profile_id: &str,
        filter_ids: &[String],
        txn: Option<TxnToken>,
    ) -> Result<()> {
        let new = self.fingerprints(&scope.tenant, filter_ids)?;
        let old = self.index.reverse_entry(scope, profile_id, txn)?;
        if old == new {
            return Ok(());
        }
        debug!(scope = %scope, profile = %profile_id, added = new.difference(&old).count(),
               removed = old.difference(&new).count(), "reindexing profile");

        let mut forward = self.index.get_or_empty(IndexKind::Forward, scope, txn)?;
        let mut changed = IndexMap::new();
        for gone in old.difference(&new) {
            if let Some(set) = forward.get_mut(gone) {
                set.remove(profile_id);
                changed.insert(gone.clone(), set.clone());
            }
        }
        for fresh in new.difference(&old) {
            let set = forward.entry(fresh.clone()).or_default();
            set.insert(profile_id.to_string());
            changed.insert(fresh.clone(), set.clone());
        }
        self.index.set(IndexKind::Forward, scope, changed, txn)?;

        let mut reverse = IndexMap::new();
        reverse.insert(profile_id.to_string(), new);
        self.index.set(IndexKind::Reverse, scope, reverse, txn)
    }

    /// Remove one profile's contribution entirely. Reverse entries go first
    /// so a crash never leaves a dangling forward reference without its
    /// reverse bookkeeping.
    pub fn remove_profile(
        &self,
        scope: &IndexScope,
        profile_id: &str,
        txn: Option<TxnToken>,
    ) -> Result<()> {
        let scope_key = scope.key();
        let _guard = self.locks.guard(&[&scope_key])?;

        let old = self.index.reverse_entry(scope, profile_id, txn)?;
        if old.is_empty() {
            return Ok(());
        }
        let mut reverse = IndexMap::new();
        reverse.insert(profile_id.to_string(), BTreeSet::new());
        self.index.set(IndexKind::Reverse, scope, reverse, txn)?;

        let forward = self.index.get_or_empty(IndexKind::Forward, scope, txn)?;
        let mut changed = IndexMap::new();
        for key in &old {
            if let Some(set) = forward.get(key) {
                let mut set = set.clone();
                set.remove(profile_id);
                changed.insert(key.clone(), set);
            }
        }
        self.index.set(IndexKind::Forward, scope, changed, txn)
    }

    /// Rebuild a whole scope from scratch in one atomic publish. Readers
    /// keep seeing the old index until the staged copy commits. The scope
    /// lock is held from first stage write through commit, so a concurrent
    /// profile write waits and then lands on the published index instead of
    /// being erased by the scope swap.
    pub fn rebuild(
        &self,
        scope: &IndexScope,
        profiles: &[(String, Vec<String>)],
    ) -> Result<()> {
        let scope_key = scope.key();
        let _guard = self.locks.guard(&[&scope_key])?;

        let stage = self.index.staged_rebuild(scope.clone());
        stage.clear()?;
        for (profile_id, filter_ids) in profiles {
            self.apply_profile(scope, profile_id, filter_ids, Some(stage.txn()))?;
        }
        stage.commit()
    }

    /// Check the inverse invariant across a scope. Returns Consistency
    /// naming the first disagreement found.
    pub fn verify(&self, scope: &IndexScope) -> Result<()> {
        let forward = self.index.get_or_empty(IndexKind::Forward, scope, None)?;
        let reverse = self.index.get_or_empty(IndexKind::Reverse, scope, None)?;

        for (fingerprint, ids) in &forward {
            for id in ids {
                if !reverse.get(id).is_some_and(|fps| fps.contains(fingerprint)) {
                    return Err(EngineError::Consistency(format!(
                        "forward entry <{fingerprint}> lists <{id}> missing from reverse index"
                    )));
                }
            }
        }
        for (id, fingerprints) in &reverse {
            for fingerprint in fingerprints {
                if !forward
                    .get(fingerprint)
                    .is_some_and(|ids| ids.contains(id))
                {
                    return Err(EngineError::Consistency(format!(
                        "reverse entry <{id}> claims <{fingerprint}> missing from forward index"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Repair one profile's contribution by recomputing it from its current
    /// filters, trusting neither stale side of the index.
    pub fn repair(
        &self,
        scope: &IndexScope,
        profile_id: &str,
        filter_ids: &[String],
    ) -> Result<()> {
        warn!(scope = %scope, profile = %profile_id, "repairing index contribution");
        let scope_key = scope.key();
        let _guard = self.locks.guard(&[&scope_key])?;

        // Strip the ID from every forward entry, referenced or not.
        let forward = self.index.get_or_empty(IndexKind::Forward, scope, None)?;
        let mut changed = IndexMap::new();
        for (key, set) in &forward {
            if set.contains(profile_id) {
                let mut set = set.clone();
                set.remove(profile_id);
                changed.insert(key.clone(), set);
            }
        }
        self.index.set(IndexKind::Forward, scope, changed, None)?;
        let mut reverse = IndexMap::new();
        reverse.insert(profile_id.to_string(), BTreeSet::new());
        self.index.set(IndexKind::Reverse, scope, reverse, None)?;

        // Recompute under the same guard; releasing here would let another
        // writer interleave between the strip and the re-index.
        self.apply_profile(scope, profile_id, filter_ids, None)
    }
}
