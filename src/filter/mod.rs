//! Filters: named, tenant-scoped bundles of predicate rules.

pub mod engine;
pub mod predicate;
pub mod rule;

pub use engine::FilterEngine;
pub use rule::{FilterRule, RuleOp, RuleType};

use crate::error::{EngineError, Result};
use crate::filter::rule::META_PREFIX;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open-ended activity window. Either bound may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationInterval {
    #[serde(rename = "ActivationTime", default)]
    pub activation_time: Option<DateTime<Utc>>,
    #[serde(rename = "ExpiryTime", default)]
    pub expiry_time: Option<DateTime<Utc>>,
}

impl ActivationInterval {
    /// Whether `at` falls inside the window. Missing bounds are open.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(start) = self.activation_time {
            if at < start {
                return false;
            }
        }
        if let Some(end) = self.expiry_time {
            if at > end {
                return false;
            }
        }
        true
    }
}

/// A named conjunction of rules; an event passes only if every rule does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "Tenant")]
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Rules")]
    pub rules: Vec<FilterRule>,
    #[serde(rename = "ActivationInterval", default)]
    pub activation_interval: Option<ActivationInterval>,
}

/// Value separator inside an inline filter literal.
pub const INLINE_VALUE_SEP: char = '&';
/// Segment separator inside an inline filter literal.
pub const INLINE_FIELD_SEP: char = ':';

/// Whether a filter ID denotes an inline literal rather than a stored filter.
pub fn is_inline(filter_id: &str) -> bool {
    filter_id.starts_with(META_PREFIX)
}

impl Filter {
    pub fn new(
        tenant: impl Into<String>,
        id: impl Into<String>,
        rules: Vec<FilterRule>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            id: id.into(),
            rules,
            activation_interval: None,
        }
    }

    /// Parse an inline literal `Type:Element:V1&V2&...` into a one-rule filter.
    ///
    /// The literal keeps its full text as the filter ID so index fingerprints
    /// and error messages can refer back to it verbatim. Colons past the
    /// second are part of the value list, so `*string:~*req.Dst:09:30` keeps
    /// `09:30` intact.
    pub fn from_inline(tenant: &str, literal: &str) -> Result<Self> {
        let parts: Vec<&str> = literal.split(INLINE_FIELD_SEP).collect();
        if parts.len() < 3 {
            return Err(EngineError::Validation(format!(
                "inline filter <{literal}> needs at least 3 fields"
            )));
        }
        let tail = parts[2..].join(&INLINE_FIELD_SEP.to_string());
        let values = if tail.is_empty() {
            Vec::new()
        } else {
            tail.split(INLINE_VALUE_SEP).map(str::to_string).collect()
        };
        let rule = FilterRule::new(parts[0], parts[1], values)?;
        Ok(Self {
            tenant: tenant.to_string(),
            id: literal.to_string(),
            rules: vec![rule],
            activation_interval: None,
        })
    }

    /// Whether the filter is active at `at`. No interval means always active.
    pub fn active_at(&self, at: DateTime<Utc>) -> bool {
        self.activation_interval
            .as_ref()
            .map_or(true, |ival| ival.contains(at))
    }

    /// Storage key: `tenant:id`.
    pub fn tenant_id(&self) -> String {
        format!("{}:{}", self.tenant, self.id)
    }
}
