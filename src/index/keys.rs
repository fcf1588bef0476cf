//! Index scopes and fingerprint computation.
//!
//! A fingerprint is the canonical `type:element:value` forward-index key.
//! Only non-negated `*string` rules over event fields with literal values
//! are indexable; every other rule pins its profile under the catch-all
//! fingerprint so a full-verification pass still sees it.

use crate::filter::rule::RuleOp;
use crate::filter::FilterRule;
use crate::profile::ItemType;
use crate::resolver::{PathDomain, DYNAMIC_PREFIX};
use std::fmt;

/// Reserved fingerprint for "no indexable rule".
pub const CATCH_ALL: &str = "*default:*any:*any";

/// Partition an index lives in: item type + tenant, optionally + context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexScope {
    pub item_type: ItemType,
    pub tenant: String,
    pub context: Option<String>,
}

impl IndexScope {
    pub fn new(item_type: ItemType, tenant: impl Into<String>) -> Self {
        Self {
            item_type,
            tenant: tenant.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Storage key, e.g. `*thresholds:cgrates.org` or
    /// `*attributes:cgrates.org:*sessions`.
    pub fn key(&self) -> String {
        match &self.context {
            Some(ctx) => format!("{}:{}:{}", self.item_type, self.tenant, ctx),
            None => format!("{}:{}", self.item_type, self.tenant),
        }
    }
}

impl fmt::Display for IndexScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Canonical element form inside a fingerprint, or None when the element
/// addresses state the index cannot see. Bare field names stay as-is; a
/// `~*req.` path strips to the field name; any other dynamic domain is
/// invisible to the index.
pub fn index_element(element: &str) -> Option<&str> {
    if !element.starts_with(DYNAMIC_PREFIX) {
        if element.is_empty() {
            return None;
        }
        return Some(element);
    }
    let rest = &element[DYNAMIC_PREFIX.len_utf8()..];
    let (prefix, path) = match rest.split_once('.') {
        Some(split) => split,
        None => return None,
    };
    match PathDomain::parse(prefix) {
        Ok(PathDomain::Req) if !path.is_empty() => Some(path),
        _ => None,
    }
}

/// Build the fingerprint string for one (element, value) pair.
pub fn fingerprint(rule_type: &str, element: &str, value: &str) -> String {
    format!("{rule_type}:{element}:{value}")
}

/// Fingerprints one rule contributes. Non-indexable rules yield exactly the
/// catch-all; indexable rules yield one fingerprint per literal value.
pub fn rule_fingerprints(rule: &FilterRule) -> Vec<String> {
    if rule.op() != RuleOp::String || rule.negated() {
        return vec![CATCH_ALL.to_string()];
    }
    let Some(element) = index_element(&rule.element) else {
        return vec![CATCH_ALL.to_string()];
    };
    let keys: Vec<String> = rule
        .values
        .iter()
        .filter(|v| !v.starts_with(DYNAMIC_PREFIX))
        .map(|v| fingerprint(rule.rule_type.to_string().as_str(), element, v))
        .collect();
    if keys.is_empty() {
        // All values dynamic: nothing the index can precompute.
        return vec![CATCH_ALL.to_string()];
    }
    keys
}
