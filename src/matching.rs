//! `MatchingService`: the facade every business service calls to turn an
//! event into an ordered list of applicable profiles.
//!
//! Index probes only narrow the candidate set; every candidate is re-run
//! through its complete filter list, because non-indexable rule types are
//! invisible to the index. Survivors are sorted by descending weight with ID
//! order breaking ties; the first blocker cuts the tail.

use crate::config::MatchingConfig;
use crate::error::{EngineError, Result};
use crate::event::{stringify, Event};
use crate::filter::FilterEngine;
use crate::index::{IndexScope, IndexStore, CATCH_ALL};
use crate::index::keys::fingerprint;
use crate::profile::{ItemType, Profile, ProfileRepository};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, trace};

pub struct MatchingService<P: Profile> {
    item_type: ItemType,
    /// Context partition of the index scope, for item types whose profiles
    /// are indexed per processing context (attributes under `*sessions`,
    /// `*cdrs`, ...).
    context: Option<String>,
    repo: Arc<dyn ProfileRepository<P>>,
    index: IndexStore,
    filters: FilterEngine,
    cfg: MatchingConfig,
}

impl<P: Profile> MatchingService<P> {
    pub fn new(
        item_type: ItemType,
        repo: Arc<dyn ProfileRepository<P>>,
        index: IndexStore,
        filters: FilterEngine,
        cfg: MatchingConfig,
    ) -> Self {
        Self {
            item_type,
            context: None,
            repo,
            index,
            filters,
            cfg,
        }
    }

    /// Probe the `tenant:context` index partition instead of the plain
    /// tenant one.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn scope(&self, tenant: &str) -> IndexScope {
        let scope = IndexScope::new(self.item_type, tenant);
        match &self.context {
            Some(ctx) => scope.with_context(ctx.clone()),
            None => scope,
        }
    }

    /// Candidate IDs from index probes: one per event field/value pair plus
    /// the unconditional catch-all probe. A NotFound probe contributes
    /// nothing.
    fn indexed_candidates(&self, tenant: &str, event: &Event) -> Result<BTreeSet<String>> {
        let scope = self.scope(tenant);
        let mut candidates = BTreeSet::new();
        for (field, value) in &event.fields {
            if let Some(allowed) = &self.cfg.string_indexed_fields {
                if !allowed.iter().any(|f| f == field) {
                    continue;
                }
            }
            let key = fingerprint("*string", field, &stringify(value));
            match self.index.match_key(&scope, &key) {
                Ok(ids) => {
                    trace!(key = %key, hits = ids.len(), "index probe");
                    candidates.extend(ids);
                }
                Err(EngineError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        match self.index.match_key(&scope, CATCH_ALL) {
            Ok(ids) => candidates.extend(ids),
            Err(EngineError::NotFound) => {}
            Err(e) => return Err(e),
        }
        Ok(candidates)
    }

    /// Ordered matching profiles for an event. `explicit_ids` bypasses the
    /// index entirely; NotFound means nothing matched.
    pub fn matching_profiles_for_event(
        &self,
        tenant: &str,
        event: &Event,
        explicit_ids: Option<&[String]>,
    ) -> Result<Vec<P>> {
        // Callers pinning profiles by ID may also opt out of filter
        // verification entirely (administrative paths, forced processing).
        let ignore_filters = explicit_ids.is_some()
            && event
                .opts
                .get("IgnoreFilters")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
        let candidates: BTreeSet<String> = match explicit_ids {
            Some(ids) => ids.iter().cloned().collect(),
            None if !self.cfg.indexed_selects => {
                // Escape hatch: enumerate everything in the scope.
                self.repo
                    .profile_ids(tenant)
                    .map_err(|e| e.contextualize(&format!("{} enumeration", self.item_type)))?
                    .into_iter()
                    .collect()
            }
            None => self.indexed_candidates(tenant, event)?,
        };
        debug!(item_type = %self.item_type, tenant, event = %event.id,
               candidates = candidates.len(), "matching candidates gathered");

        let at = event.match_time();
        let mut matched: Vec<P> = Vec::new();
        for id in candidates {
            let profile = match self.repo.profile(tenant, &id) {
                Ok(p) => p,
                // Vanished between probe and load.
                Err(EngineError::NotFound) => continue,
                Err(e) => return Err(e.contextualize(&format!("{} load", self.item_type))),
            };
            if let Some(ival) = profile.activation_interval() {
                if !ival.contains(at) {
                    continue;
                }
            }
            if ignore_filters {
                matched.push(profile);
                continue;
            }
            match self.filters.pass(tenant, profile.filter_ids(), event) {
                Ok(true) => matched.push(profile),
                Ok(false) => {}
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) => {
                    return Err(
                        e.contextualize(&format!("{} filter verification", self.item_type)),
                    )
                }
            }
        }
        if matched.is_empty() {
            return Err(EngineError::NotFound);
        }

        // Candidates arrive in ID order, so the stable sort keeps ID as the
        // tie-break within equal weights.
        matched.sort_by(|a, b| {
            b.weight()
                .partial_cmp(&a.weight())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(cut) = matched.iter().position(|p| p.blocker()) {
            matched.truncate(cut + 1);
        }
        Ok(matched)
    }
}
