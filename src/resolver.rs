//! Dynamic path resolution across heterogeneous value domains.
//!
//! A rule element or value like `~*req.Account` or
//! `~*accounts.1001.Balance.Monetary` names a domain plus a path inside it.
//! Local domains are zero-cost views over the event; external domains fetch a
//! snapshot from the owning collaborator once per evaluation (deadline
//! bounded, memoized) and scope the remaining sub-path into it.

use crate::clients::DomainClients;
use crate::config::ResolverConfig;
use crate::error::{EngineError, Result};
use crate::event::{stringify, Event, JsonSource, ValueSource, NESTING_SEP};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;

/// Marker for a dynamic path expression.
pub const DYNAMIC_PREFIX: char = '~';

/// Closed set of value domains a path can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathDomain {
    /// Current event fields (`~*req`).
    Req,
    /// Event options (`~*opts`).
    Opts,
    /// Computed variables supplied by the embedding service (`~*vars`).
    Vars,
    /// Account snapshot owned by the accounts service (`~*accounts`).
    Accounts,
    /// Resource snapshot owned by the resources service (`~*resources`).
    Resources,
    /// Aggregated stat metrics owned by the stats service (`~*stats`).
    Stats,
}

impl PathDomain {
    pub(crate) fn parse(prefix: &str) -> Result<Self> {
        match prefix {
            "*req" => Ok(PathDomain::Req),
            "*opts" => Ok(PathDomain::Opts),
            "*vars" => Ok(PathDomain::Vars),
            "*accounts" => Ok(PathDomain::Accounts),
            "*resources" => Ok(PathDomain::Resources),
            "*stats" => Ok(PathDomain::Stats),
            other => Err(EngineError::Resolution(format!(
                "unknown path domain prefix: <{other}>"
            ))),
        }
    }

    fn is_external(self) -> bool {
        matches!(
            self,
            PathDomain::Accounts | PathDomain::Resources | PathDomain::Stats
        )
    }
}

/// True for element/value strings that resolve against live state.
pub fn is_dynamic(expr: &str) -> bool {
    expr.starts_with(DYNAMIC_PREFIX)
}

/// True for paths that touch externally-owned domains. Rules over those are
/// never indexable: the index only sees event-local state.
pub fn is_external_path(expr: &str) -> bool {
    let Some(stripped) = expr.strip_prefix(DYNAMIC_PREFIX) else {
        return false;
    };
    let prefix = stripped.split(NESTING_SEP).next().unwrap_or_default();
    matches!(PathDomain::parse(prefix), Ok(d) if d.is_external())
}

/// Per-event resolver over all value domains.
///
/// Holds the event by reference plus a memo of external snapshots, so a rule
/// bundle re-reading `~*accounts.1001.*` pays for a single collaborator call.
pub struct FieldResolver<'a> {
    tenant: &'a str,
    event: &'a Event,
    vars: Map<String, Value>,
    clients: &'a DomainClients,
    cfg: &'a ResolverConfig,
    snapshots: RefCell<HashMap<(PathDomain, String), Value>>,
}

impl<'a> FieldResolver<'a> {
    pub fn new(
        tenant: &'a str,
        event: &'a Event,
        clients: &'a DomainClients,
        cfg: &'a ResolverConfig,
    ) -> Self {
        Self {
            tenant,
            event,
            vars: Map::new(),
            clients,
            cfg,
            snapshots: RefCell::new(HashMap::new()),
        }
    }

    /// Inject a computed variable addressable as `~*vars.<key>`.
    pub fn with_var(mut self, key: impl Into<String>, val: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), val.into());
        self
    }

    /// Resolve a dynamic expression to its raw value.
    /// [`EngineError::NotFound`] means the path is absent in its domain.
    pub fn resolve_value(&self, expr: &str) -> Result<Value> {
        let Some(stripped) = expr.strip_prefix(DYNAMIC_PREFIX) else {
            return Err(EngineError::Resolution(format!(
                "not a dynamic path: <{expr}>"
            )));
        };
        let segs: Vec<&str> = stripped.split(NESTING_SEP).collect();
        let (prefix, path) = segs.split_first().ok_or_else(|| {
            EngineError::Resolution(format!("empty dynamic path: <{expr}>"))
        })?;
        let domain = PathDomain::parse(prefix)?;
        match domain {
            PathDomain::Req => self.event.section_path("fields", path),
            PathDomain::Opts => self.event.section_path("opts", path),
            PathDomain::Vars => {
                let (head, rest) = path
                    .split_first()
                    .ok_or_else(|| EngineError::Resolution(format!("empty vars path: <{expr}>")))?;
                let root = self.vars.get(*head).ok_or(EngineError::NotFound)?;
                JsonSource::new(root).get_path(rest)
            }
            PathDomain::Accounts | PathDomain::Resources | PathDomain::Stats => {
                // External domains need an ID head segment plus a sub-path.
                if path.len() < 2 {
                    return Err(EngineError::Resolution(format!(
                        "path <{expr}> needs an ID segment and a field for domain *{domain:?}",
                    )));
                }
                let snapshot = self.snapshot(domain, path[0])?;
                JsonSource::new(&snapshot).get_path(&path[1..])
            }
        }
    }

    /// Resolve an element or value expression to a string: dynamic paths are
    /// looked up, everything else is its own literal value.
    pub fn resolve_string(&self, expr: &str) -> Result<String> {
        if is_dynamic(expr) {
            Ok(stringify(&self.resolve_value(expr)?))
        } else {
            Ok(expr.to_string())
        }
    }

    /// Resolve a rule element. Bare names address event fields directly;
    /// dynamic expressions go through the full domain grammar.
    pub fn element_value(&self, element: &str) -> Result<Value> {
        if is_dynamic(element) {
            self.resolve_value(element)
        } else {
            let segs: Vec<&str> = element.split(NESTING_SEP).collect();
            self.event.section_path("fields", &segs)
        }
    }

    /// String form of [`Self::element_value`].
    pub fn element_string(&self, element: &str) -> Result<String> {
        Ok(stringify(&self.element_value(element)?))
    }

    /// Reverse-destination groups for a dialed-number prefix.
    pub fn reverse_destinations(&self, prefix: &str) -> Result<Vec<String>> {
        let client = self.clients.destinations.as_ref().ok_or_else(|| {
            EngineError::Resolution("no destinations collaborator configured".to_string())
        })?;
        client.reverse_destinations(prefix, self.cfg.deadline)
    }

    /// Shortest prefix tried by `*destinations` rules.
    pub fn min_destination_prefix(&self) -> usize {
        self.cfg.min_destination_prefix
    }

    fn snapshot(&self, domain: PathDomain, id: &str) -> Result<Value> {
        let key = (domain, id.to_string());
        if let Some(cached) = self.snapshots.borrow().get(&key) {
            return Ok(cached.clone());
        }
        let fetched = match domain {
            PathDomain::Accounts => self
                .clients
                .accounts
                .as_ref()
                .ok_or_else(|| {
                    EngineError::Resolution("no accounts collaborator configured".to_string())
                })?
                .account_snapshot(self.tenant, id, self.cfg.deadline)?,
            PathDomain::Resources => self
                .clients
                .resources
                .as_ref()
                .ok_or_else(|| {
                    EngineError::Resolution("no resources collaborator configured".to_string())
                })?
                .resource_snapshot(self.tenant, id, self.cfg.deadline)?,
            PathDomain::Stats => self
                .clients
                .stats
                .as_ref()
                .ok_or_else(|| {
                    EngineError::Resolution("no stats collaborator configured".to_string())
                })?
                .stat_metrics(self.tenant, id, self.cfg.deadline)?,
            _ => unreachable!("snapshot called for local domain"),
        };
        self.snapshots.borrow_mut().insert(key, fetched.clone());
        Ok(fetched)
    }
}
