//! The inverted profile index: fingerprints, store access and the indexer.

pub mod indexer;
pub mod keys;
pub mod store;

pub use indexer::Indexer;
pub use keys::{rule_fingerprints, IndexScope, CATCH_ALL};
pub use store::{IndexStore, StagedRebuild};
