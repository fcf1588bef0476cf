//! `FilterEngine`: resolves filter IDs (persisted or inline) and runs the
//! pass/fail verdict for an event.

use crate::clients::DomainClients;
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::event::Event;
use crate::filter::{is_inline, predicate, Filter};
use crate::resolver::FieldResolver;
use crate::storage::DataStore;
use std::sync::Arc;
use tracing::trace;

/// Evaluates filter ID lists against events. Cheap to clone per service.
#[derive(Clone)]
pub struct FilterEngine {
    store: Arc<dyn DataStore>,
    clients: DomainClients,
    resolver_cfg: ResolverConfig,
}

impl FilterEngine {
    pub fn new(
        store: Arc<dyn DataStore>,
        clients: DomainClients,
        resolver_cfg: ResolverConfig,
    ) -> Self {
        Self {
            store,
            clients,
            resolver_cfg,
        }
    }

    /// Resolve a filter ID: inline literals parse in place, anything else is
    /// fetched from the store. Callers never branch on which.
    pub fn filter(&self, tenant: &str, filter_id: &str) -> Result<Filter> {
        if is_inline(filter_id) {
            Filter::from_inline(tenant, filter_id)
        } else {
            self.store.get_filter(tenant, filter_id)
        }
    }

    /// AND across filters, AND across each filter's rules. Filters whose
    /// activation interval excludes the event time are skipped. An empty ID
    /// list passes: absent filters mean "applies to everything".
    pub fn pass(&self, tenant: &str, filter_ids: &[String], event: &Event) -> Result<bool> {
        if filter_ids.is_empty() {
            return Ok(true);
        }
        let at = event.match_time();
        let resolver = FieldResolver::new(tenant, event, &self.clients, &self.resolver_cfg);
        for filter_id in filter_ids {
            let filter = self.filter(tenant, filter_id)?;
            if !filter.active_at(at) {
                trace!(filter = %filter_id, "skipping inactive filter");
                continue;
            }
            for rule in &filter.rules {
                if !predicate::evaluate(rule, &resolver)? {
                    trace!(filter = %filter_id, event = %event.id, "rule failed");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ActivationInterval, FilterRule};
    use crate::storage::MemStore;
    use chrono::{DateTime, Utc};

    fn engine_with(filters: Vec<Filter>) -> FilterEngine {
        let store = Arc::new(MemStore::new());
        for f in filters {
            store.set_filter(&f).unwrap();
        }
        FilterEngine::new(store, DomainClients::new(), ResolverConfig::default())
    }

    fn event() -> Event {
        Event::new("cgrates.org", "ev1")
            .with_field("Account", "1001")
            .with_field("Balance", 1500)
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_filter_ids_pass() {
        let eng = engine_with(vec![]);
        assert!(eng.pass("cgrates.org", &[], &event()).unwrap());
    }

    #[test]
    fn test_inline_pass_and_fail() {
        let eng = engine_with(vec![]);
        let ev = event();
        assert!(eng
            .pass("cgrates.org", &ids(&["*string:Account:1001"]), &ev)
            .unwrap());
        assert!(!eng
            .pass("cgrates.org", &ids(&["*string:Account:1002"]), &ev)
            .unwrap());
    }

    #[test]
    fn test_and_across_filters_and_rules() {
        let multi = Filter::new(
            "cgrates.org",
            "FLTR_BOTH",
            vec![
                FilterRule::new("*string", "Account", vec!["1001".into()]).unwrap(),
                FilterRule::new("*gt", "Balance", vec!["1000".into()]).unwrap(),
            ],
        );
        let eng = engine_with(vec![multi]);
        let ev = event();
        assert!(eng.pass("cgrates.org", &ids(&["FLTR_BOTH"]), &ev).unwrap());
        assert!(eng
            .pass(
                "cgrates.org",
                &ids(&["FLTR_BOTH", "*lt:Balance:2000"]),
                &ev
            )
            .unwrap());
        // One failing rule anywhere short-circuits.
        assert!(!eng
            .pass(
                "cgrates.org",
                &ids(&["FLTR_BOTH", "*string:Account:1002"]),
                &ev
            )
            .unwrap());
    }

    #[test]
    fn test_missing_persisted_filter_propagates() {
        let eng = engine_with(vec![]);
        let err = eng
            .pass("cgrates.org", &ids(&["FLTR_GHOST"]), &event())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_inactive_filter_is_skipped_not_failed() {
        let mk = |s: &str| s.parse::<DateTime<Utc>>().unwrap();
        let mut expired = Filter::new(
            "cgrates.org",
            "FLTR_OLD",
            vec![FilterRule::new("*string", "Account", vec!["1002".into()]).unwrap()],
        );
        expired.activation_interval = Some(ActivationInterval {
            activation_time: Some(mk("2000-01-01T00:00:00Z")),
            expiry_time: Some(mk("2001-01-01T00:00:00Z")),
        });
        let eng = engine_with(vec![expired]);
        // The would-fail rule never runs because its window is closed.
        assert!(eng.pass("cgrates.org", &ids(&["FLTR_OLD"]), &event()).unwrap());
    }
}
