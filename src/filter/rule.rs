//! Filter rules: operator kinds, validation and the compiled matcher cache.

use crate::error::{EngineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Marker prefix shared by all rule-type literals.
pub const META_PREFIX: char = '*';
/// Negation marker inside a rule-type literal, e.g. `*notstring`.
pub const NOT_MARKER: &str = "*not";

/// Operator kind of a rule, without the negation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOp {
    /// Exact string equality against any value.
    String,
    /// Element has any value as prefix.
    Prefix,
    /// Element has any value as suffix.
    Suffix,
    /// Element resolves at all.
    Exists,
    /// Element missing, null or zero-length string/collection.
    Empty,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Structural equality: numeric when both sides parse, else string.
    Equal,
    /// Regex capture expressions, each value carrying its own subject path.
    Rsr,
    /// Longest-prefix reverse destination lookup.
    Destinations,
    /// Always raw-false; parks a profile without deleting it.
    Never,
}

impl RuleOp {
    fn name(self) -> &'static str {
        match self {
            RuleOp::String => "string",
            RuleOp::Prefix => "prefix",
            RuleOp::Suffix => "suffix",
            RuleOp::Exists => "exists",
            RuleOp::Empty => "empty",
            RuleOp::GreaterThan => "gt",
            RuleOp::GreaterOrEqual => "gte",
            RuleOp::LessThan => "lt",
            RuleOp::LessOrEqual => "lte",
            RuleOp::Equal => "eq",
            RuleOp::Rsr => "rsr",
            RuleOp::Destinations => "destinations",
            RuleOp::Never => "never",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => RuleOp::String,
            "prefix" => RuleOp::Prefix,
            "suffix" => RuleOp::Suffix,
            "exists" => RuleOp::Exists,
            "empty" => RuleOp::Empty,
            "gt" => RuleOp::GreaterThan,
            "gte" => RuleOp::GreaterOrEqual,
            "lt" => RuleOp::LessThan,
            "lte" => RuleOp::LessOrEqual,
            "eq" => RuleOp::Equal,
            "rsr" => RuleOp::Rsr,
            "destinations" => RuleOp::Destinations,
            "never" => RuleOp::Never,
            _ => return None,
        })
    }

    /// Subject path is mandatory for every operator that reads one.
    fn needs_element(self) -> bool {
        !matches!(self, RuleOp::Rsr | RuleOp::Never)
    }

    fn needs_values(self) -> bool {
        !matches!(self, RuleOp::Exists | RuleOp::Empty | RuleOp::Never)
    }
}

/// Operator plus its derived negation flag.
///
/// The negation is read once from the `*not` marker of the literal form;
/// evaluation XORs the raw operator result with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RuleType {
    pub op: RuleOp,
    pub negated: bool,
}

impl RuleType {
    pub fn new(op: RuleOp, negated: bool) -> Self {
        Self { op, negated }
    }
}

impl FromStr for RuleType {
    type Err = EngineError;

    fn from_str(literal: &str) -> Result<Self> {
        let (name, negated) = match literal.strip_prefix(NOT_MARKER) {
            Some(rest) => (rest, true),
            None => match literal.strip_prefix(META_PREFIX) {
                Some(rest) => (rest, false),
                None => {
                    return Err(EngineError::Validation(format!(
                        "unsupported rule type: <{literal}>"
                    )))
                }
            },
        };
        let op = RuleOp::from_name(name).ok_or_else(|| {
            EngineError::Validation(format!("unsupported rule type: <{literal}>"))
        })?;
        Ok(RuleType { op, negated })
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "{NOT_MARKER}{}", self.op.name())
        } else {
            write!(f, "{META_PREFIX}{}", self.op.name())
        }
    }
}

impl From<RuleType> for String {
    fn from(rt: RuleType) -> Self {
        rt.to_string()
    }
}

impl TryFrom<String> for RuleType {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A compiled `*rsr` value: subject path plus capture pattern.
#[derive(Debug)]
pub(crate) struct RsrExpr {
    pub path: String,
    pub pattern: Regex,
}

/// One predicate inside a filter.
#[derive(Debug, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(rename = "Type")]
    pub rule_type: RuleType,
    /// Subject path: a bare event field name or a dynamic `~*domain` path.
    #[serde(rename = "Element", default)]
    pub element: String,
    /// Literal values or dynamic paths resolved at evaluation time.
    #[serde(rename = "Values", default)]
    pub values: Vec<String>,
    /// Memoized `*rsr` compilation, filled on first evaluation.
    #[serde(skip)]
    rsr_cache: OnceLock<std::result::Result<Vec<RsrExpr>, String>>,
}

impl FilterRule {
    /// Build and validate a rule from its literal type form.
    pub fn new(rule_type: &str, element: &str, values: Vec<String>) -> Result<Self> {
        let parsed: RuleType = rule_type.parse()?;
        if element.is_empty() && parsed.op.needs_element() {
            return Err(EngineError::Validation(format!(
                "Element is mandatory for type: {rule_type}"
            )));
        }
        if values.is_empty() && parsed.op.needs_values() {
            return Err(EngineError::Validation(format!(
                "Values is mandatory for type: {rule_type}"
            )));
        }
        Ok(Self {
            rule_type: parsed,
            element: element.to_string(),
            values,
            rsr_cache: OnceLock::new(),
        })
    }

    pub fn op(&self) -> RuleOp {
        self.rule_type.op
    }

    pub fn negated(&self) -> bool {
        self.rule_type.negated
    }

    /// Compiled `*rsr` expressions, parsing and compiling on first use.
    ///
    /// Value syntax: `<path>(<regex>)`, e.g. `~*req.Destination(^\+49)`.
    pub(crate) fn rsr_exprs(&self) -> Result<&[RsrExpr]> {
        let compiled = self.rsr_cache.get_or_init(|| {
            let mut exprs = Vec::with_capacity(self.values.len());
            for val in &self.values {
                let open = val
                    .find('(')
                    .ok_or_else(|| format!("malformed rsr expression: <{val}>"))?;
                if !val.ends_with(')') {
                    return Err(format!("malformed rsr expression: <{val}>"));
                }
                let pattern = Regex::new(&val[open + 1..val.len() - 1])
                    .map_err(|e| format!("invalid rsr pattern in <{val}>: {e}"))?;
                exprs.push(RsrExpr {
                    path: val[..open].to_string(),
                    pattern,
                });
            }
            Ok(exprs)
        });
        match compiled {
            Ok(exprs) => Ok(exprs),
            Err(msg) => Err(EngineError::Validation(msg.clone())),
        }
    }
}

impl Clone for FilterRule {
    fn clone(&self) -> Self {
        // The compiled cache is cheap to rebuild; a clone starts cold.
        Self {
            rule_type: self.rule_type,
            element: self.element.clone(),
            values: self.values.clone(),
            rsr_cache: OnceLock::new(),
        }
    }
}

impl PartialEq for FilterRule {
    fn eq(&self, other: &Self) -> bool {
        self.rule_type == other.rule_type
            && self.element == other.element
            && self.values == other.values
    }
}

impl Eq for FilterRule {}
