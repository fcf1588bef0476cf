//! Business events and the value-source capability they expose.
//!
//! Every decision in the engine is taken against an [`Event`]: a set of named
//! business fields plus per-request options, addressed through
//! [`Event::section_path`]. Remote domain snapshots reuse the same traversal
//! through the [`ValueSource`] capability, so predicate code reads local and
//! fetched state identically.

use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Nesting separator inside a path expression, e.g. `Account.Owner.ID`.
pub const NESTING_SEP: char = '.';

/// Capability interface for anything a rule can read values out of.
///
/// Implementations return [`EngineError::NotFound`] for an absent path; that
/// is the only error the predicate layer absorbs, everything else aborts the
/// evaluation.
pub trait ValueSource {
    /// Resolve a path (already split on [`NESTING_SEP`]) to the raw value.
    fn get_path(&self, path: &[&str]) -> Result<Value>;

    /// Resolve a path to its canonical string form.
    fn get_path_string(&self, path: &[&str]) -> Result<String> {
        Ok(stringify(&self.get_path(path)?))
    }
}

/// Canonical string form of a JSON value: strings unquoted, scalars via
/// display, null empty, containers as compact JSON.
pub fn stringify(val: &Value) -> String {
    match val {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn traverse<'a>(mut cur: &'a Value, path: &[&str]) -> Result<&'a Value> {
    for seg in path {
        cur = match cur {
            Value::Object(map) => map.get(*seg).ok_or(EngineError::NotFound)?,
            Value::Array(items) => {
                let idx: usize = seg.parse().map_err(|_| EngineError::NotFound)?;
                items.get(idx).ok_or(EngineError::NotFound)?
            }
            _ => return Err(EngineError::NotFound),
        };
    }
    Ok(cur)
}

/// A borrowed JSON document exposed as a [`ValueSource`].
///
/// Used for remote domain snapshots: the resolver fetches the snapshot once
/// and scopes rule sub-paths into it through this wrapper.
pub struct JsonSource<'a> {
    root: &'a Value,
}

impl<'a> JsonSource<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }
}

impl ValueSource for JsonSource<'_> {
    fn get_path(&self, path: &[&str]) -> Result<Value> {
        traverse(self.root, path).cloned()
    }
}

/// An incoming business event: named fields plus request options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    pub tenant: String,
    pub id: String,
    /// Event time; matching falls back to "now" when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Business payload, addressed as `~*req.<path>`.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Per-request options, addressed as `~*opts.<path>`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub opts: Map<String, Value>,
}

impl Event {
    pub fn new(tenant: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, val: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), val.into());
        self
    }

    pub fn with_opt(mut self, key: impl Into<String>, val: impl Into<Value>) -> Self {
        self.opts.insert(key.into(), val.into());
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Matching reference time: explicit event time or now.
    pub fn match_time(&self) -> DateTime<Utc> {
        self.time.unwrap_or_else(Utc::now)
    }

    fn section(&self, name: &str) -> Option<&Map<String, Value>> {
        match name {
            "fields" => Some(&self.fields),
            "opts" => Some(&self.opts),
            _ => None,
        }
    }

    /// Resolve a path inside a named section (`fields` or `opts`).
    pub fn section_path(&self, section: &str, path: &[&str]) -> Result<Value> {
        let map = self.section(section).ok_or(EngineError::NotFound)?;
        let (head, rest) = path.split_first().ok_or(EngineError::NotFound)?;
        let root = map.get(*head).ok_or(EngineError::NotFound)?;
        traverse(root, rest).cloned()
    }
}
