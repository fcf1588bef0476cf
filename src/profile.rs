//! Profiles: the filterable, weighted, optionally-blocking units every
//! business service configures, plus the repository surface that loads them.

use crate::error::{EngineError, Result};
use crate::filter::ActivationInterval;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Business-service family a profile (and its index scope) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Attributes,
    Chargers,
    Thresholds,
    StatQueues,
    Resources,
    Routes,
}

impl ItemType {
    /// Canonical literal used in index scope keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Attributes => "*attributes",
            ItemType::Chargers => "*chargers",
            ItemType::Thresholds => "*thresholds",
            ItemType::StatQueues => "*statqueues",
            ItemType::Resources => "*resources",
            ItemType::Routes => "*routes",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the matching engine needs to know about any profile kind.
pub trait Profile: Clone + Send + Sync {
    fn tenant(&self) -> &str;
    fn id(&self) -> &str;
    fn filter_ids(&self) -> &[String];
    fn activation_interval(&self) -> Option<&ActivationInterval>;
    fn weight(&self) -> f64;
    /// A matched blocker suppresses every lower-weight candidate.
    fn blocker(&self) -> bool {
        false
    }
}

/// Loads profiles of one kind for one scope. NotFound from `profile` means
/// the candidate vanished between index probe and load; callers skip it.
pub trait ProfileRepository<P: Profile>: Send + Sync {
    fn profile(&self, tenant: &str, id: &str) -> Result<P>;
    /// Every stored profile ID in the tenant, for non-indexed full scans.
    fn profile_ids(&self, tenant: &str) -> Result<Vec<String>>;
}

/// Threshold profile: fires an action when a monitored metric crosses a
/// bound. Only the matching-relevant fields live here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    #[serde(rename = "Tenant")]
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "FilterIDs", default)]
    pub filter_ids: Vec<String>,
    #[serde(rename = "ActivationInterval", default)]
    pub activation_interval: Option<ActivationInterval>,
    #[serde(rename = "MaxHits", default)]
    pub max_hits: i64,
    #[serde(rename = "Weight", default)]
    pub weight: f64,
    #[serde(rename = "Blocker", default)]
    pub blocker: bool,
}

impl Profile for ThresholdProfile {
    fn tenant(&self) -> &str {
        &self.tenant
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn filter_ids(&self) -> &[String] {
        &self.filter_ids
    }
    fn activation_interval(&self) -> Option<&ActivationInterval> {
        self.activation_interval.as_ref()
    }
    fn weight(&self) -> f64 {
        self.weight
    }
    fn blocker(&self) -> bool {
        self.blocker
    }
}

/// Charger profile: selects the charging run applied to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargerProfile {
    #[serde(rename = "Tenant")]
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "FilterIDs", default)]
    pub filter_ids: Vec<String>,
    #[serde(rename = "ActivationInterval", default)]
    pub activation_interval: Option<ActivationInterval>,
    #[serde(rename = "RunID", default)]
    pub run_id: String,
    #[serde(rename = "AttributeIDs", default)]
    pub attribute_ids: Vec<String>,
    #[serde(rename = "Weight", default)]
    pub weight: f64,
}

impl Profile for ChargerProfile {
    fn tenant(&self) -> &str {
        &self.tenant
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn filter_ids(&self) -> &[String] {
        &self.filter_ids
    }
    fn activation_interval(&self) -> Option<&ActivationInterval> {
        self.activation_interval.as_ref()
    }
    fn weight(&self) -> f64 {
        self.weight
    }
}

/// Attribute profile: rewrites event fields before further processing.
/// Scoped to processing contexts, which become part of its index scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeProfile {
    #[serde(rename = "Tenant")]
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Contexts", default)]
    pub contexts: Vec<String>,
    #[serde(rename = "FilterIDs", default)]
    pub filter_ids: Vec<String>,
    #[serde(rename = "ActivationInterval", default)]
    pub activation_interval: Option<ActivationInterval>,
    #[serde(rename = "Weight", default)]
    pub weight: f64,
    #[serde(rename = "Blocker", default)]
    pub blocker: bool,
}

impl Profile for AttributeProfile {
    fn tenant(&self) -> &str {
        &self.tenant
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn filter_ids(&self) -> &[String] {
        &self.filter_ids
    }
    fn activation_interval(&self) -> Option<&ActivationInterval> {
        self.activation_interval.as_ref()
    }
    fn weight(&self) -> f64 {
        self.weight
    }
    fn blocker(&self) -> bool {
        self.blocker
    }
}

/// Route profile: orders routing candidates for a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteProfile {
    #[serde(rename = "Tenant")]
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "FilterIDs", default)]
    pub filter_ids: Vec<String>,
    #[serde(rename = "ActivationInterval", default)]
    pub activation_interval: Option<ActivationInterval>,
    #[serde(rename = "Sorting", default)]
    pub sorting: String,
    #[serde(rename = "Weight", default)]
    pub weight: f64,
    #[serde(rename = "Blocker", default)]
    pub blocker: bool,
}

impl Profile for RouteProfile {
    fn tenant(&self) -> &str {
        &self.tenant
    }
    fn id(&self) -> &str {
        &self.id
    }
    fn filter_ids(&self) -> &[String] {
        &self.filter_ids
    }
    fn activation_interval(&self) -> Option<&ActivationInterval> {
        self.activation_interval.as_ref()
    }
    fn weight(&self) -> f64 {
        self.weight
    }
    fn blocker(&self) -> bool {
        self.blocker
    }
}

/// In-memory repository, generic over the profile kind. Doubles as the test
/// fixture store.
pub struct MemProfiles<P: Profile> {
    items: RwLock<HashMap<String, P>>,
}

impl<P: Profile> Default for MemProfiles<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Profile> MemProfiles<P> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, profile: P) {
        let key = format!("{}:{}", profile.tenant(), profile.id());
        self.items.write().insert(key, profile);
    }

    pub fn remove(&self, tenant: &str, id: &str) {
        self.items.write().remove(&format!("{tenant}:{id}"));
    }
}

impl<P: Profile> ProfileRepository<P> for MemProfiles<P> {
    fn profile(&self, tenant: &str, id: &str) -> Result<P> {
        self.items
            .read()
            .get(&format!("{tenant}:{id}"))
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    fn profile_ids(&self, tenant: &str) -> Result<Vec<String>> {
        let prefix = format!("{tenant}:");
        let mut ids: Vec<String> = self
            .items
            .read()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold(id: &str, weight: f64) -> ThresholdProfile {
        ThresholdProfile {
            tenant: "cgrates.org".into(),
            id: id.into(),
            filter_ids: vec![],
            activation_interval: None,
            max_hits: -1,
            weight,
            blocker: false,
        }
    }

    #[test]
    fn test_mem_profiles_round_trip() {
        let repo = MemProfiles::new();
        repo.set(threshold("TH1", 10.0));
        repo.set(threshold("TH2", 20.0));

        assert_eq!(repo.profile("cgrates.org", "TH1").unwrap().weight, 10.0);
        assert!(repo.profile("cgrates.org", "TH9").unwrap_err().is_not_found());
        assert_eq!(repo.profile_ids("cgrates.org").unwrap(), vec!["TH1", "TH2"]);
        assert!(repo.profile_ids("other.org").unwrap().is_empty());
    }

    #[test]
    fn test_item_type_literals() {
        assert_eq!(ItemType::Thresholds.as_str(), "*thresholds");
        assert_eq!(ItemType::Routes.to_string(), "*routes");
    }

    #[test]
    fn test_threshold_profile_deserializes_from_api_shape() {
        let p: ThresholdProfile = serde_json::from_str(
            r#"{
                "Tenant": "cgrates.org",
                "ID": "TH1",
                "FilterIDs": ["*string:Account:1001"],
                "MaxHits": 3,
                "Weight": 30,
                "Blocker": true
            }"#,
        )
        .unwrap();
        assert_eq!(p.id, "TH1");
        assert!(p.blocker());
        assert_eq!(p.weight(), 30.0);
    }
}
