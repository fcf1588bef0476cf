//! Top-level wiring: one [`Engine`] owns the shared filter, lock, and index
//! machinery built from a single [`EngineConfig`], and hands out the
//! per-service facades that use them.

use crate::clients::DomainClients;
use crate::config::EngineConfig;
use crate::filter::FilterEngine;
use crate::index::{IndexStore, Indexer};
use crate::lock::LockManager;
use crate::matching::MatchingService;
use crate::profile::{ItemType, Profile, ProfileRepository};
use crate::storage::DataStore;
use std::sync::Arc;

pub struct Engine {
    cfg: EngineConfig,
    filters: FilterEngine,
    index: IndexStore,
    locks: Arc<LockManager>,
}

impl Engine {
    pub fn new(store: Arc<dyn DataStore>, clients: DomainClients, cfg: EngineConfig) -> Self {
        let filters = FilterEngine::new(store.clone(), clients, cfg.resolver.clone());
        let index = IndexStore::new(store);
        let locks = Arc::new(LockManager::new(&cfg.locking));
        Self {
            cfg,
            filters,
            index,
            locks,
        }
    }

    pub fn filters(&self) -> FilterEngine {
        self.filters.clone()
    }

    pub fn index(&self) -> IndexStore {
        self.index.clone()
    }

    pub fn locks(&self) -> Arc<LockManager> {
        self.locks.clone()
    }

    /// Index maintainer sharing this engine's lock table, so profile writes
    /// and bulk rebuilds serialize with each other.
    pub fn indexer(&self) -> Indexer {
        Indexer::new(self.index.clone(), self.filters.clone(), self.locks.clone())
    }

    /// Matching facade for one profile kind. Context-partitioned kinds chain
    /// [`MatchingService::with_context`] on the result.
    pub fn matching<P: Profile>(
        &self,
        item_type: ItemType,
        repo: Arc<dyn ProfileRepository<P>>,
    ) -> MatchingService<P> {
        MatchingService::new(
            item_type,
            repo,
            self.index.clone(),
            self.filters.clone(),
            self.cfg.matching.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::index::IndexScope;
    use crate::profile::{MemProfiles, ThresholdProfile};
    use crate::storage::MemStore;

    #[test]
    fn test_engine_wires_indexing_and_matching() {
        let engine = Engine::new(
            Arc::new(MemStore::new()),
            DomainClients::new(),
            EngineConfig::default(),
        );
        let repo = Arc::new(MemProfiles::new());
        repo.set(ThresholdProfile {
            tenant: "cgrates.org".into(),
            id: "TH1".into(),
            filter_ids: vec!["*string:Account:1001".into()],
            activation_interval: None,
            max_hits: -1,
            weight: 10.0,
            blocker: false,
        });

        let scope = IndexScope::new(ItemType::Thresholds, "cgrates.org");
        engine
            .indexer()
            .index_profile(&scope, "TH1", &["*string:Account:1001".to_string()], None)
            .unwrap();

        let service = engine.matching(ItemType::Thresholds, repo);
        let ev = Event::new("cgrates.org", "ev1").with_field("Account", "1001");
        let got = service
            .matching_profiles_for_event("cgrates.org", &ev, None)
            .unwrap();
        assert_eq!(got[0].id, "TH1");
    }
}
