//! Configuration for the matching engine.
//!
//! Plain value structs with sensible defaults; loading them from files or
//! flags is the embedding service's concern.

use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub matching: MatchingConfig,
    pub locking: LockConfig,
    pub resolver: ResolverConfig,
}

/// Candidate-derivation switches for the matching service.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// When false, candidate derivation enumerates every persisted profile in
    /// the scope instead of consulting the index. Explicit escape hatch for
    /// deployments that cannot trust the index yet.
    pub indexed_selects: bool,
    /// Restrict index probes to these event fields. `None` probes every
    /// scalar field present in the event.
    pub string_indexed_fields: Option<Vec<String>>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            indexed_selects: true,
            string_indexed_fields: None,
        }
    }
}

/// Per-ID lock manager tuning.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Bounded wait for acquiring a named lock.
    pub timeout: Duration,
    /// Shard count of the lock table. Must be non-zero.
    pub shards: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            shards: 16,
        }
    }
}

/// Field resolution and remote-collaborator tuning.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Deadline handed to every remote domain-state call.
    pub deadline: Duration,
    /// Shortest dialed-number prefix tried by `*destinations` rules.
    pub min_destination_prefix: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(2),
            min_destination_prefix: 1,
        }
    }
}
