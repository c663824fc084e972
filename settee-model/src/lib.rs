//! Settee Model
//!
//! Pure data types and traits for the settee document database, decoupled
//! from concrete storage backends and the replication driver.

pub mod change;
pub mod database;
pub mod document;
pub mod error;
pub mod revision;

// Re-exports from dependencies
pub use uuid::Uuid;

pub use change::{Change, Missing};
pub use database::{BoxStream, Database, RevsSpec};
pub use document::{is_local_id, DocBody, Document};
pub use error::DbError;
pub use revision::RevId;
