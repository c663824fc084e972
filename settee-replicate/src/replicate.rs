//! The replication driver.
//!
//! One call to [`replicate`] walks the CouchDB replication protocol:
//! verify both peers, derive the replication id, find the common
//! checkpoint, stream changed documents from source to target through a
//! lazy pipeline, and record a fresh checkpoint on both peers. The
//! pipeline is pulled from the sink one document at a time, so every stage
//! is back-pressured and dropping the returned future cancels all of them.

use crate::checkpoint::{
    build_history, compare_replication_logs, read_log, write_log, HistoryEntry, ReplicationLog,
    REPLICATION_ID_VERSION,
};
use async_stream::stream;
use chrono::Local;
use futures_util::StreamExt;
use serde::Serialize;
use settee_model::{BoxStream, Database, DbError, Document, RevId, RevsSpec, Uuid};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("checkpoint document could not be encoded: {0}")]
    Checkpoint(String),
}

/// What a finished (one-shot) replication reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationResult {
    pub ok: bool,
    pub history: Vec<HistoryEntry>,
    pub replication_id_version: u64,
    pub session_id: String,
    pub source_last_seq: Option<u64>,
}

/// Counters shared by the pipeline stages.
#[derive(Debug)]
struct Progress {
    recorded_seq: Option<u64>,
    docs_read: u64,
    error: Option<DbError>,
}

fn lock(progress: &Mutex<Progress>) -> MutexGuard<'_, Progress> {
    progress.lock().expect("progress mutex poisoned")
}

/// Replicate `source` to `target`.
///
/// At-least-once and convergent: every revision the source knows at query
/// time ends up in the target or is tallied as a write failure. Running it
/// again with no new source writes is a no-op thanks to the checkpoint.
/// With `continuous` the pipeline follows the source's change feed
/// indefinitely and never checkpoints; cancel it by dropping the future.
pub async fn replicate<'a, S, T>(
    source: &'a S,
    target: &'a T,
    create_target: bool,
    continuous: bool,
) -> Result<ReplicationResult, ReplicationError>
where
    S: Database,
    T: Database,
{
    let session_id = Uuid::new_v4().simple().to_string();
    let start_time = timestamp();

    // verify peers
    source.update_seq().await?;
    let start_last_seq = target_seq(target, create_target).await?;

    // generate the replication id
    let replication_id = gen_replication_id(source, target, create_target, continuous).await?;
    debug!(%replication_id, %session_id, "replication starting");

    // find the common checkpoint
    let source_log = read_log(source, &replication_id).await?;
    let target_log = read_log(target, &replication_id).await?;
    let startup_checkpoint = compare_replication_logs(source_log.as_ref(), target_log.as_ref());
    debug!(?startup_checkpoint, "compared replication logs");

    // locate and transfer changed documents
    let progress = Arc::new(Mutex::new(Progress {
        recorded_seq: startup_checkpoint,
        docs_read: 0,
        error: None,
    }));

    let diff_input: BoxStream<'a, (String, Vec<RevId>)> = {
        let progress = progress.clone();
        let changes = source.changes(startup_checkpoint, continuous);
        Box::pin(changes.map(move |change| {
            lock(&progress).recorded_seq = Some(change.seq);
            (change.id, change.leaf_revs)
        }))
    };

    let missing = target.revs_diff(diff_input);
    let read_input: BoxStream<'a, (String, RevsSpec)> = Box::pin(stream! {
        let mut missing = missing;
        while let Some(diff) = missing.next().await {
            if diff.missing.is_empty() {
                // the target already has every leaf of this document
                continue;
            }
            let mut revs: Vec<RevId> = diff.missing.into_iter().collect();
            revs.sort();
            yield (diff.id, RevsSpec::These(revs));
        }
    });

    let docs = source.read(read_input, true);
    let write_input: BoxStream<'a, Document> = {
        let progress = progress.clone();
        Box::pin(stream! {
            let mut docs = docs;
            while let Some(result) = docs.next().await {
                match result {
                    Ok(doc) => {
                        lock(&progress).docs_read += 1;
                        yield doc;
                    }
                    // a concurrent rewrite can drop a leaf between the
                    // revs-diff and the read
                    Err(error) if error.is_not_found() => continue,
                    Err(error) => {
                        lock(&progress).error = Some(error);
                        break;
                    }
                }
            }
        })
    };

    // drive the whole chain from the sink
    let mut doc_write_failures = 0u64;
    {
        let mut errors = target.write(write_input);
        while let Some(error) = errors.next().await {
            warn!(%error, "document write failed");
            doc_write_failures += 1;
        }
    }

    let (recorded_seq, docs_read) = {
        let progress = lock(&progress);
        if let Some(error) = progress.error.clone() {
            return Err(error.into());
        }
        (progress.recorded_seq, progress.docs_read)
    };

    // commit barrier before the checkpoint may claim the work durable
    target.ensure_full_commit().await?;

    let entry = HistoryEntry {
        session_id: session_id.clone(),
        start_time,
        end_time: timestamp(),
        start_last_seq,
        end_last_seq: recorded_seq,
        recorded_seq,
        docs_read,
        docs_written: docs_read.saturating_sub(doc_write_failures),
        doc_write_failures,
    };

    // record the checkpoint, on both peers, only when progress was made
    if recorded_seq != startup_checkpoint {
        if let Some(recorded) = recorded_seq {
            let new_source_log = ReplicationLog {
                replication_id_version: REPLICATION_ID_VERSION,
                session_id: session_id.clone(),
                source_last_seq: recorded,
                history: build_history(source_log.as_ref(), entry.clone()),
            };
            let new_target_log = ReplicationLog {
                history: build_history(target_log.as_ref(), entry.clone()),
                ..new_source_log.clone()
            };
            write_log(source, &replication_id, &new_source_log).await?;
            write_log(target, &replication_id, &new_target_log).await?;
            debug!(recorded, docs_read, doc_write_failures, "recorded checkpoint");
        }
    }

    Ok(ReplicationResult {
        ok: true,
        history: vec![entry],
        replication_id_version: REPLICATION_ID_VERSION,
        session_id,
        source_last_seq: recorded_seq,
    })
}

fn timestamp() -> String {
    Local::now().to_rfc2822()
}

async fn target_seq<T: Database>(
    target: &T,
    create_target: bool,
) -> Result<u64, ReplicationError> {
    match target.update_seq().await {
        Ok(seq) => Ok(seq),
        Err(error) if error.is_not_found() && create_target => {
            target.create().await?;
            // second chance
            Ok(target.update_seq().await?)
        }
        Err(error) => Err(error.into()),
    }
}

/// The stable name of this directed source/target relationship: an md5 of
/// both identities and the replication options, in lowercase hex.
async fn gen_replication_id<S: Database, T: Database>(
    source: &S,
    target: &T,
    create_target: bool,
    continuous: bool,
) -> Result<String, ReplicationError> {
    let values = format!(
        "{}{}{}{}",
        source.id().await?,
        target.id().await?,
        create_target,
        continuous,
    );
    Ok(format!("{:x}", md5::compute(values)))
}
