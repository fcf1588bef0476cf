//! The predicate engine: one rule evaluated against resolved values.
//!
//! Operator semantics are OR across the rule's values, then XOR with the
//! type's negation flag. A NotFound while resolving the subject collapses to
//! raw `false` and is never an error; any other resolution failure aborts and
//! propagates.

use crate::error::{EngineError, Result};
use crate::filter::rule::{FilterRule, RuleOp};
use crate::resolver::FieldResolver;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Evaluate a single rule. The only public entry of this module.
pub fn evaluate(rule: &FilterRule, resolver: &FieldResolver) -> Result<bool> {
    let raw = match rule.op() {
        RuleOp::String => pass_string(rule, resolver)?,
        RuleOp::Prefix => pass_affix(rule, resolver, |s, v| s.starts_with(v))?,
        RuleOp::Suffix => pass_affix(rule, resolver, |s, v| s.ends_with(v))?,
        RuleOp::Exists => pass_exists(rule, resolver)?,
        RuleOp::Empty => pass_empty(rule, resolver)?,
        RuleOp::GreaterThan | RuleOp::GreaterOrEqual | RuleOp::LessThan | RuleOp::LessOrEqual => {
            pass_compare(rule, resolver)?
        }
        RuleOp::Equal => pass_equal(rule, resolver)?,
        RuleOp::Rsr => pass_rsr(rule, resolver)?,
        RuleOp::Destinations => pass_destinations(rule, resolver)?,
        RuleOp::Never => false,
    };
    Ok(raw != rule.negated())
}

/// Absorb NotFound into raw-false, propagate everything else.
fn subject_string(rule: &FilterRule, resolver: &FieldResolver) -> Result<Option<String>> {
    match resolver.element_string(&rule.element) {
        Ok(s) => Ok(Some(s)),
        Err(EngineError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

fn pass_string(rule: &FilterRule, resolver: &FieldResolver) -> Result<bool> {
    let Some(subject) = subject_string(rule, resolver)? else {
        return Ok(false);
    };
    for val in &rule.values {
        // A dynamic value that fails to resolve only disqualifies itself.
        match resolver.resolve_string(val) {
            Ok(resolved) if subject == resolved => return Ok(true),
            _ => continue,
        }
    }
    Ok(false)
}

fn pass_affix(
    rule: &FilterRule,
    resolver: &FieldResolver,
    matches: fn(&str, &str) -> bool,
) -> Result<bool> {
    let Some(subject) = subject_string(rule, resolver)? else {
        return Ok(false);
    };
    for val in &rule.values {
        match resolver.resolve_string(val) {
            Ok(resolved) if matches(&subject, &resolved) => return Ok(true),
            _ => continue,
        }
    }
    Ok(false)
}

fn pass_exists(rule: &FilterRule, resolver: &FieldResolver) -> Result<bool> {
    match resolver.element_value(&rule.element) {
        Ok(_) => Ok(true),
        Err(EngineError::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

fn pass_empty(rule: &FilterRule, resolver: &FieldResolver) -> Result<bool> {
    match resolver.element_value(&rule.element) {
        Err(EngineError::NotFound) => Ok(true),
        Err(e) => Err(e),
        Ok(Value::Null) => Ok(true),
        Ok(Value::String(s)) => Ok(s.is_empty()),
        Ok(Value::Array(items)) => Ok(items.is_empty()),
        Ok(Value::Object(map)) => Ok(map.is_empty()),
        Ok(_) => Ok(false),
    }
}

/// Comparable scalar: number or RFC 3339 time. Different kinds never compare.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar {
    Num(f64),
    Time(DateTime<Utc>),
}

fn parse_scalar(s: &str) -> Option<Scalar> {
    if let Ok(n) = s.parse::<f64>() {
        return Some(Scalar::Num(n));
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| Scalar::Time(t.with_timezone(&Utc)))
}

fn pass_compare(rule: &FilterRule, resolver: &FieldResolver) -> Result<bool> {
    let Some(subject) = subject_string(rule, resolver)? else {
        return Ok(false);
    };
    let Some(lhs) = parse_scalar(&subject) else {
        return Ok(false);
    };
    for val in &rule.values {
        let Ok(resolved) = resolver.resolve_string(val) else {
            continue;
        };
        // An unparseable value is skipped, never a whole-rule failure.
        let Some(rhs) = parse_scalar(&resolved) else {
            continue;
        };
        let ord = match (lhs, rhs) {
            (Scalar::Num(a), Scalar::Num(b)) => a.partial_cmp(&b),
            (Scalar::Time(a), Scalar::Time(b)) => Some(a.cmp(&b)),
            _ => None,
        };
        let Some(ord) = ord else { continue };
        let hit = match rule.op() {
            RuleOp::GreaterThan => ord.is_gt(),
            RuleOp::GreaterOrEqual => ord.is_ge(),
            RuleOp::LessThan => ord.is_lt(),
            RuleOp::LessOrEqual => ord.is_le(),
            _ => unreachable!("pass_compare on non-comparison op"),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

fn pass_equal(rule: &FilterRule, resolver: &FieldResolver) -> Result<bool> {
    let Some(subject) = subject_string(rule, resolver)? else {
        return Ok(false);
    };
    for val in &rule.values {
        let Ok(resolved) = resolver.resolve_string(val) else {
            continue;
        };
        // Numeric when both sides parse, so "20" equals "20.0".
        let eq = match (subject.parse::<f64>(), resolved.parse::<f64>()) {
            (Ok(a), Ok(b)) => a == b,
            _ => subject == resolved,
        };
        if eq {
            return Ok(true);
        }
    }
    Ok(false)
}

fn pass_rsr(rule: &FilterRule, resolver: &FieldResolver) -> Result<bool> {
    for expr in rule.rsr_exprs()? {
        let field = match resolver.resolve_string(&expr.path) {
            Ok(s) => s,
            // Missing subject is tested as empty so `^$` style guards can hit.
            Err(EngineError::NotFound) => String::new(),
            Err(e) => return Err(e),
        };
        if expr.pattern.is_match(&field) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn pass_destinations(rule: &FilterRule, resolver: &FieldResolver) -> Result<bool> {
    let Some(number) = subject_string(rule, resolver)? else {
        return Ok(false);
    };
    let min_len = resolver.min_destination_prefix().max(1);
    let mut len = number.len();
    while len >= min_len {
        if number.is_char_boundary(len) {
            let prefix = &number[..len];
            match resolver.reverse_destinations(prefix) {
                Ok(groups) => {
                    // First prefix whose groups intersect the values wins.
                    if groups.iter().any(|g| rule.values.iter().any(|v| v == g)) {
                        return Ok(true);
                    }
                }
                Err(EngineError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        len -= 1;
    }
    Ok(false)
}
