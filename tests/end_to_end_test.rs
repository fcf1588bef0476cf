//! End-to-end tests for the matching pipeline: profile writes through the
//! indexer, index-narrowed candidate selection, full filter re-verification,
//! ordering and truncation.

use profile_engine::{
    DomainClients, Engine, EngineConfig, Event, IndexKind, IndexScope, IndexStore, Indexer,
    ItemType, MatchingService, MemProfiles, MemStore, ThresholdProfile, CATCH_ALL,
};
use std::sync::Arc;
use std::thread;

struct Harness {
    store: Arc<MemStore>,
    index: IndexStore,
    indexer: Arc<Indexer>,
    repo: Arc<MemProfiles<ThresholdProfile>>,
    service: MatchingService<ThresholdProfile>,
    scope: IndexScope,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let store = Arc::new(MemStore::new());
    let engine = Engine::new(store.clone(), DomainClients::new(), EngineConfig::default());
    let repo = Arc::new(MemProfiles::new());
    Harness {
        store,
        index: engine.index(),
        indexer: Arc::new(engine.indexer()),
        service: engine.matching(ItemType::Thresholds, repo.clone()),
        repo,
        scope: IndexScope::new(ItemType::Thresholds, "cgrates.org"),
    }
}

fn threshold(id: &str, filter_ids: &[&str], weight: f64, blocker: bool) -> ThresholdProfile {
    ThresholdProfile {
        tenant: "cgrates.org".into(),
        id: id.into(),
        filter_ids: filter_ids.iter().map(|s| s.to_string()).collect(),
        activation_interval: None,
        max_hits: -1,
        weight,
        blocker,
    }
}

fn install(h: &Harness, profile: ThresholdProfile) {
    let id = profile.id.clone();
    let fids = profile.filter_ids.clone();
    h.repo.set(profile);
    h.indexer.index_profile(&h.scope, &id, &fids, None).unwrap();
}

fn account_event(account: &str, balance: i64) -> Event {
    Event::new("cgrates.org", "event1")
        .with_field("Account", account)
        .with_field("Balance", balance)
}

#[test]
fn test_threshold_scenario_end_to_end() {
    let h = harness();
    install(
        &h,
        threshold(
            "TH1",
            &["*string:Account:1001", "*gt:Balance:1000"],
            20.0,
            false,
        ),
    );
    install(
        &h,
        threshold(
            "TH2",
            &["*string:Account:1001", "*gt:Balance:1000"],
            10.0,
            false,
        ),
    );
    install(
        &h,
        threshold(
            "TH3",
            &["*string:Account:1002", "*lt:Balance:1000"],
            10.0,
            false,
        ),
    );

    // Forward index shape: the comparison rules pin everything under the
    // catch-all, the string rules get their own fingerprints.
    let catch_all = h.index.match_key(&h.scope, CATCH_ALL).unwrap();
    assert_eq!(catch_all.len(), 3);
    assert_eq!(
        h.index
            .match_key(&h.scope, "*string:Account:1001")
            .unwrap()
            .len(),
        2
    );

    // 1001 with high balance matches TH1 and TH2, weight order.
    let got = h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1001", 1500), None)
        .unwrap();
    let ids: Vec<&str> = got.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["TH1", "TH2"]);

    // 1001 with low balance survives the index probe but fails Pass.
    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1001", 500), None)
        .unwrap_err()
        .is_not_found());

    // 1002 with low balance matches only TH3.
    let got = h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1002", 200), None)
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id, "TH3");
}

#[test]
fn test_profile_update_moves_index_contribution() {
    let h = harness();
    install(&h, threshold("TH1", &["*string:Account:1001"], 10.0, false));
    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1001", 0), None)
        .is_ok());

    // Repoint the profile at another account; the old fingerprint must die.
    install(&h, threshold("TH1", &["*string:Account:1002"], 10.0, false));
    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1001", 0), None)
        .unwrap_err()
        .is_not_found());
    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1002", 0), None)
        .is_ok());
}

#[test]
fn test_delete_profile_removes_it_from_matching() {
    let h = harness();
    install(&h, threshold("TH1", &["*string:Account:1001"], 10.0, false));
    h.indexer.remove_profile(&h.scope, "TH1", None).unwrap();
    h.repo.remove("cgrates.org", "TH1");

    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1001", 0), None)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_persisted_filter_shared_by_profiles() {
    use profile_engine::{DataStore, Filter, FilterRule};
    let h = harness();
    let shared = Filter::new(
        "cgrates.org",
        "FLTR_GOLD",
        vec![
            FilterRule::new("*string", "~*req.Account", vec!["1001".into()]).unwrap(),
            FilterRule::new("*prefix", "Destination", vec!["+49".into()]).unwrap(),
        ],
    );
    h.store.set_filter(&shared).unwrap();
    install(&h, threshold("TH_DE", &["FLTR_GOLD"], 10.0, false));

    let ev = Event::new("cgrates.org", "e1")
        .with_field("Account", "1001")
        .with_field("Destination", "+4915117");
    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &ev, None)
        .is_ok());

    let ev = Event::new("cgrates.org", "e2")
        .with_field("Account", "1001")
        .with_field("Destination", "+3315117");
    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &ev, None)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_staged_rebuild_never_shows_half_state() {
    let h = harness();
    install(&h, threshold("TH1", &["*string:Account:1001"], 10.0, false));

    let stage = h.index.staged_rebuild(h.scope.clone());
    stage.clear().unwrap();
    // Mid-rebuild, matching still works off the old index.
    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1001", 0), None)
        .is_ok());
    h.indexer
        .index_profile(
            &h.scope,
            "TH1",
            &["*string:Account:1002".to_string()],
            Some(stage.txn()),
        )
        .unwrap();
    stage.commit().unwrap();

    assert!(h
        .service
        .matching_profiles_for_event("cgrates.org", &account_event("1001", 0), None)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_concurrent_writes_keep_inverse_invariant() {
    let h = harness();
    let mut handles = Vec::new();
    for worker in 0..4 {
        let indexer = h.indexer.clone();
        let scope = h.scope.clone();
        handles.push(thread::spawn(move || {
            for round in 0..20 {
                let id = format!("TH_{worker}");
                let account = format!("10{:02}", (worker + round) % 7);
                let fids = vec![format!("*string:Account:{account}")];
                indexer.index_profile(&scope, &id, &fids, None).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every forward entry must be mirrored in reverse and vice versa.
    let forward = h
        .index
        .get_or_empty(IndexKind::Forward, &h.scope, None)
        .unwrap();
    let reverse = h
        .index
        .get_or_empty(IndexKind::Reverse, &h.scope, None)
        .unwrap();
    for (fp, ids) in &forward {
        for id in ids {
            assert!(reverse[id].contains(fp), "dangling forward {fp} -> {id}");
        }
    }
    for (id, fps) in &reverse {
        for fp in fps {
            assert!(forward[fp].contains(id), "dangling reverse {id} -> {fp}");
        }
    }
}
