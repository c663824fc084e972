//! The async [`Database`] facade over [`MemoryStore`].
//!
//! An in-memory store is (obviously) synchronous, but backends reached over
//! a network are not, and the replicator must treat both alike. This
//! adapter implements the async interface directly over the synchronous
//! store; the synchronous methods stay available and are preferable when
//! the caller can use them.
//!
//! Continuous change feeds wait on a coalescing latch: a `watch` channel
//! carrying the last committed sequence. Waiters that missed several writes
//! wake once and re-query the log.

use crate::memory::MemoryStore;
use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use settee_model::{
    BoxStream, Change, Database, DbError, Document, Missing, RevId, RevsSpec,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// A cheaply clonable handle to one in-memory database.
#[derive(Debug, Clone)]
pub struct InMemoryDb {
    store: Arc<Mutex<MemoryStore>>,
    seq_tx: Arc<watch::Sender<u64>>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::from_store(MemoryStore::new())
    }

    /// A database with a caller-chosen identity, for stable replication
    /// ids.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::from_store(MemoryStore::with_id(id))
    }

    pub fn from_store(store: MemoryStore) -> Self {
        let (seq_tx, _) = watch::channel(store.update_seq());
        Self {
            store: Arc::new(Mutex::new(store)),
            seq_tx: Arc::new(seq_tx),
        }
    }

    fn store(&self) -> MutexGuard<'_, MemoryStore> {
        // mutations are non-suspending; the guard never crosses an await
        self.store.lock().expect("store mutex poisoned")
    }

    /// Synchronous write. Signals the change-feed latch after every
    /// non-local commit.
    pub fn write_sync(&self, doc: Document) -> Result<(), DbError> {
        let mut store = self.store();
        let local = doc.is_local();
        store.write(doc)?;
        if !local {
            self.seq_tx.send_replace(store.update_seq());
        }
        Ok(())
    }

    pub fn read_sync(
        &self,
        id: &str,
        revs: &RevsSpec,
        include_path: bool,
    ) -> Result<Vec<Document>, DbError> {
        self.store().read(id, revs, include_path)
    }

    pub fn changes_sync(&self, since: Option<u64>) -> Vec<Change> {
        self.store().changes(since).collect()
    }

    pub fn revs_diff_sync(&self, id: &str, revs: Vec<RevId>) -> Missing {
        self.store().revs_diff(id, revs)
    }

    pub fn update_seq_sync(&self) -> u64 {
        self.store().update_seq()
    }
}

impl Default for InMemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for InMemoryDb {
    async fn id(&self) -> Result<String, DbError> {
        Ok(self.store().id().to_string())
    }

    async fn update_seq(&self) -> Result<u64, DbError> {
        Ok(self.store().update_seq())
    }

    async fn revs_limit(&self) -> Result<usize, DbError> {
        Ok(self.store().revs_limit())
    }

    async fn set_revs_limit(&self, limit: usize) -> Result<(), DbError> {
        self.store().set_revs_limit(limit);
        Ok(())
    }

    async fn create(&self) -> Result<(), DbError> {
        // an in-memory database exists from construction
        Ok(())
    }

    async fn ensure_full_commit(&self) -> Result<(), DbError> {
        Ok(())
    }

    fn changes<'a>(&'a self, since: Option<u64>, continuous: bool) -> BoxStream<'a, Change> {
        Box::pin(stream! {
            let mut rx = self.seq_tx.subscribe();
            let mut cursor = since;
            loop {
                // bind before yielding so the store lock never outlives a poll
                let next = self.store().next_change(cursor);
                match next {
                    Some(change) => {
                        cursor = Some(change.seq);
                        yield change;
                    }
                    None if !continuous => break,
                    None => {
                        // wait for the next non-local commit, then re-query
                        if rx.changed().await.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn revs_diff<'a>(
        &'a self,
        requested: BoxStream<'a, (String, Vec<RevId>)>,
    ) -> BoxStream<'a, Missing> {
        Box::pin(stream! {
            let mut requested = requested;
            while let Some((id, revs)) = requested.next().await {
                let diff = self.store().revs_diff(&id, revs);
                yield diff;
            }
        })
    }

    fn read<'a>(
        &'a self,
        requested: BoxStream<'a, (String, RevsSpec)>,
        include_path: bool,
    ) -> BoxStream<'a, Result<Document, DbError>> {
        Box::pin(stream! {
            let mut requested = requested;
            while let Some((id, revs)) = requested.next().await {
                let result = self.store().read(&id, &revs, include_path);
                match result {
                    Ok(docs) => {
                        for doc in docs {
                            yield Ok(doc);
                        }
                    }
                    Err(error) => yield Err(error),
                }
            }
        })
    }

    fn write<'a>(&'a self, docs: BoxStream<'a, Document>) -> BoxStream<'a, DbError> {
        Box::pin(stream! {
            let mut docs = docs;
            while let Some(doc) = docs.next().await {
                if let Err(error) = self.write_sync(doc) {
                    yield error;
                }
            }
        })
    }
}
