//! # Profile Matching Engine
//!
//! The matching core of a real-time charging platform: given an incoming
//! business event, decide which configured profiles (thresholds, chargers,
//! routes, ...) apply, in what order, and whether lower-priority candidates
//! are suppressed.
//!
//! Three layers cooperate:
//!
//! - a **filter predicate engine**: a small query language (`*string`,
//!   `*prefix`, `*gt`, `*rsr`, `*destinations`, ... with `*not` twins) whose
//!   elements resolve against the event or against live remote state;
//! - an **inverted index** mapping `type:element:value` fingerprints to
//!   profile IDs, kept exactly consistent across profile writes and
//!   rebuildable atomically;
//! - a **matching service** that narrows candidates through the index,
//!   re-verifies each one with its full filter list, then orders by weight
//!   and applies blocker truncation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use profile_engine::{
//!     DomainClients, Engine, EngineConfig, Event, IndexScope, ItemType,
//!     MemProfiles, MemStore,
//! };
//! use std::sync::Arc;
//!
//! let engine = Engine::new(
//!     Arc::new(MemStore::new()),
//!     DomainClients::new(),
//!     EngineConfig::default(),
//! );
//! let repo = Arc::new(MemProfiles::new());
//!
//! // Index a profile, then match events against it.
//! let scope = IndexScope::new(ItemType::Thresholds, "cgrates.org");
//! engine.indexer().index_profile(&scope, "TH1", &profile.filter_ids, None)?;
//!
//! let service = engine.matching(ItemType::Thresholds, repo);
//! let event = Event::new("cgrates.org", "ev1").with_field("Account", "1001");
//! let ordered = service.matching_profiles_for_event("cgrates.org", &event, None)?;
//! ```

pub mod clients;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod filter;
pub mod index;
pub mod lock;
pub mod matching;
pub mod profile;
pub mod resolver;
pub mod storage;

// Core types and errors
pub use error::{EngineError, Result};
pub use event::{stringify, Event, JsonSource, ValueSource};

// Filter language
pub use filter::{
    ActivationInterval, Filter, FilterEngine, FilterRule, RuleOp, RuleType,
};
pub use resolver::{FieldResolver, PathDomain};

// Index machinery
pub use index::{IndexScope, IndexStore, Indexer, StagedRebuild, CATCH_ALL};
pub use storage::{CachingStore, DataStore, IndexKind, IndexMap, MemStore, TxnToken};

// Matching facade and profile surface
pub use config::{EngineConfig, LockConfig, MatchingConfig, ResolverConfig};
pub use engine::Engine;
pub use matching::MatchingService;
pub use profile::{
    AttributeProfile, ChargerProfile, ItemType, MemProfiles, Profile, ProfileRepository,
    RouteProfile, ThresholdProfile,
};

// Collaborators
pub use clients::{
    AccountsClient, DestinationsClient, DomainClients, ResourcesClient, StatsClient,
};
pub use lock::{IdGuard, LockManager};
