//! Replication checkpoint logs.
//!
//! Progress is persisted as an ordinary `_local/<replication_id>` document
//! on both peers, so any backend that stores local documents can resume a
//! replication. A log carries the last synchronized source sequence plus a
//! short session history used to find common ancestry when the two peers'
//! logs diverge.

use crate::replicate::ReplicationError;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use settee_model::{Database, Document, RevsSpec};
use std::collections::HashSet;

/// Bumped when the checkpoint semantics change; a log written under a
/// different version is ignored.
pub const REPLICATION_ID_VERSION: u64 = 1;

/// One completed replication run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: String,
    pub start_time: String,
    pub end_time: String,
    pub start_last_seq: u64,
    pub end_last_seq: Option<u64>,
    pub recorded_seq: Option<u64>,
    pub docs_read: u64,
    pub docs_written: u64,
    pub doc_write_failures: u64,
}

/// The stored checkpoint document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationLog {
    pub replication_id_version: u64,
    pub session_id: String,
    pub source_last_seq: u64,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// Pick the sequence to resume from, given the logs stored on both peers.
///
/// No log on either side, or a version mismatch, means starting over. When
/// the two logs end on the same session the source's `source_last_seq` is
/// the answer; otherwise the histories are searched for the most recent
/// session both sides remember.
pub fn compare_replication_logs(
    source: Option<&ReplicationLog>,
    target: Option<&ReplicationLog>,
) -> Option<u64> {
    let (source, target) = match (source, target) {
        (Some(source), Some(target)) => (source, target),
        _ => return None,
    };
    if source.replication_id_version != REPLICATION_ID_VERSION
        || target.replication_id_version != REPLICATION_ID_VERSION
    {
        return None;
    }
    if source.session_id == target.session_id {
        // shortcut: both logs describe the same run
        return Some(source.source_last_seq);
    }

    let target_sessions: HashSet<&str> = target
        .history
        .iter()
        .map(|entry| entry.session_id.as_str())
        .collect();
    source
        .history
        .iter()
        .find(|entry| target_sessions.contains(entry.session_id.as_str()))
        .and_then(|entry| entry.recorded_seq)
}

/// Prepend `entry` to a peer's existing history, keeping five entries.
pub fn build_history(existing: Option<&ReplicationLog>, entry: HistoryEntry) -> Vec<HistoryEntry> {
    let mut history = vec![entry];
    if let Some(log) = existing {
        history.extend(log.history.iter().take(4).cloned());
    }
    history
}

/// Read a peer's replication log through the ordinary read stream.
///
/// A missing document or one that does not decode both mean "no
/// checkpoint": replication falls back to the beginning rather than fail.
pub async fn read_log<D: Database>(
    db: &D,
    replication_id: &str,
) -> Result<Option<ReplicationLog>, ReplicationError> {
    let request = (format!("_local/{replication_id}"), RevsSpec::Winner);
    let mut docs = db.read(Box::pin(stream::iter([request])), false);
    match docs.next().await {
        Some(Ok(doc)) => Ok(decode_log(doc)),
        Some(Err(error)) if error.is_not_found() => Ok(None),
        Some(Err(error)) => Err(error.into()),
        None => Ok(None),
    }
}

fn decode_log(doc: Document) -> Option<ReplicationLog> {
    let body = doc.body?;
    serde_json::from_value(Value::Object(body)).ok()
}

/// Store a peer's replication log.
pub async fn write_log<D: Database>(
    db: &D,
    replication_id: &str,
    log: &ReplicationLog,
) -> Result<(), ReplicationError> {
    let value = serde_json::to_value(log)
        .map_err(|error| ReplicationError::Checkpoint(error.to_string()))?;
    let Value::Object(body) = value else {
        return Err(ReplicationError::Checkpoint("log did not encode to an object".into()));
    };

    let doc = Document::local(format!("_local/{replication_id}"), Some(body));
    let mut errors = db.write(Box::pin(stream::iter([doc])));
    match errors.next().await {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}
