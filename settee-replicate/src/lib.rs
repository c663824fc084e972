//! Settee Replicate
//!
//! The streaming replication driver: converges one database toward another
//! over the six-operation backend contract, recording resumable checkpoints
//! as `_local/` documents on both peers. Wire-compatible with the CouchDB
//! replication protocol.

pub mod checkpoint;
pub mod replicate;

pub use checkpoint::{HistoryEntry, ReplicationLog, REPLICATION_ID_VERSION};
pub use replicate::{replicate, ReplicationError, ReplicationResult};
