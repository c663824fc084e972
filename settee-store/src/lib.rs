//! Settee Store
//!
//! The in-memory backend: per-document revision trees, a synchronous store
//! keeping an id index next to a sequence-indexed change log, and the async
//! [`Database`](settee_model::Database) adapter over it.

pub mod db;
pub mod memory;
pub mod revtree;

pub use db::InMemoryDb;
pub use memory::MemoryStore;
pub use revtree::{Branch, RevisionTree};
