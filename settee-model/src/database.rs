//! The backend contract shared by in-memory, remote and wrapper databases.

use crate::change::{Change, Missing};
use crate::document::Document;
use crate::error::DbError;
use crate::revision::RevId;
use async_trait::async_trait;
use std::pin::Pin;

/// Type alias for boxed async streams.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Which revisions of a document a read should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevsSpec {
    /// Just the winning branch.
    Winner,
    /// Every leaf, tombstones included.
    All,
    /// The branches reachable through these specific revisions.
    These(Vec<RevId>),
}

/// A replication peer: six operations over lazy, back-pressured streams.
///
/// Streams advance only as the consumer pulls. Per-document failures are
/// in-band items, never control-flow aborts: `read` yields one `Err` per
/// unknown id, `write` yields one error per failed input and stays silent
/// on success. Batching is a backend's internal concern.
#[async_trait]
pub trait Database: Send + Sync {
    /// Stable identity of this database, chosen at creation. Feeds the
    /// replication id.
    async fn id(&self) -> Result<String, DbError>;

    /// Current update sequence. `NotFound` if the backend does not exist.
    async fn update_seq(&self) -> Result<u64, DbError>;

    async fn revs_limit(&self) -> Result<usize, DbError>;

    async fn set_revs_limit(&self, limit: usize) -> Result<(), DbError>;

    /// Create the backend on demand, for backends that can.
    async fn create(&self) -> Result<(), DbError>;

    /// Durability barrier. A no-op for volatile backends.
    async fn ensure_full_commit(&self) -> Result<(), DbError>;

    /// All changes with a sequence strictly greater than `since` (from the
    /// beginning when absent), in ascending sequence order. In continuous
    /// mode the stream then suspends until new writes land and resumes.
    fn changes<'a>(&'a self, since: Option<u64>, continuous: bool) -> BoxStream<'a, Change>;

    /// For each `(id, revs)` input, the subset of `revs` missing from the
    /// document's revision tree.
    fn revs_diff<'a>(
        &'a self,
        requested: BoxStream<'a, (String, Vec<RevId>)>,
    ) -> BoxStream<'a, Missing>;

    /// For each `(id, revs)` input, the matching documents in input order;
    /// one `NotFound` item per unknown id. `include_path` asks for the full
    /// known ancestor path on each document.
    fn read<'a>(
        &'a self,
        requested: BoxStream<'a, (String, RevsSpec)>,
        include_path: bool,
    ) -> BoxStream<'a, Result<Document, DbError>>;

    /// Write every input document; yields one error per failed write.
    fn write<'a>(&'a self, docs: BoxStream<'a, Document>) -> BoxStream<'a, DbError>;
}
