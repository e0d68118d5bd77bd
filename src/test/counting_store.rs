use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{DEFAULT_COLLECTION_NAME, DEFAULT_DATABASE_NAME};
use crate::projection::{PROJECTION_TYPE, Projection};
use crate::store::{
    DocumentStore, Memory, MemoryCollection, MemorySession, ProjectionCollection, StoreSession,
};

#[derive(thiserror::Error, Debug)]
pub(crate) enum Error {
    #[error("Simulated error")]
    Simulated,
}

/// A memory store that counts reads, can be slowed down, and can be told to fail.
#[derive(Clone, Default)]
pub(crate) struct CountingStore {
    inner: Memory,
    query_delay: Duration,
    write_delay: Duration,
    queries: Arc<AtomicUsize>,
    writes_started: Arc<AtomicUsize>,
    fail_queries: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl CountingStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub(crate) fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub(crate) fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub(crate) fn writes_started(&self) -> usize {
        self.writes_started.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Write a row straight into the default collection, bypassing any provider.
    pub(crate) async fn seed(&self, projection: Projection) {
        self.default_collection()
            .await
            .replace_one(projection, None)
            .await
            .unwrap();
    }

    /// What the default collection holds right now.
    pub(crate) async fn persisted(&self) -> Vec<Projection> {
        self.default_collection()
            .await
            .find_by_type(PROJECTION_TYPE)
            .await
            .unwrap()
    }

    async fn default_collection(&self) -> MemoryCollection {
        let Ok(collection) = self
            .inner
            .collection(DEFAULT_DATABASE_NAME, DEFAULT_COLLECTION_NAME)
            .await;
        collection
    }
}

#[derive(Clone)]
pub(crate) struct CountingCollection {
    inner: MemoryCollection,
    store: CountingStore,
}

/// A memory session reporting errors in the counting store's error type.
pub(crate) struct CountingSession(MemorySession);

impl StoreSession for CountingSession {
    type Error = Error;

    fn id(&self) -> uuid::Uuid {
        self.0.id()
    }

    async fn commit(self) -> Result<(), Error> {
        let Ok(()) = self.0.commit().await;
        Ok(())
    }

    async fn abort(self) -> Result<(), Error> {
        let Ok(()) = self.0.abort().await;
        Ok(())
    }
}

impl DocumentStore for CountingStore {
    type Error = Error;
    type Session = CountingSession;
    type Collection = CountingCollection;

    async fn collection(&self, database: &str, name: &str) -> Result<CountingCollection, Error> {
        let Ok(inner) = self.inner.collection(database, name).await;
        Ok(CountingCollection {
            inner,
            store: self.clone(),
        })
    }

    async fn start_session(&self) -> Result<CountingSession, Error> {
        let Ok(session) = self.inner.start_session().await;
        Ok(CountingSession(session))
    }
}

impl ProjectionCollection for CountingCollection {
    type Error = Error;
    type Session = CountingSession;

    async fn find_by_type(&self, projection_type: &str) -> Result<Vec<Projection>, Error> {
        self.store.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.store.query_delay).await;

        if self.store.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::Simulated);
        }

        let Ok(found) = self.inner.find_by_type(projection_type).await;
        Ok(found)
    }

    async fn replace_one(
        &self,
        projection: Projection,
        session: Option<&mut CountingSession>,
    ) -> Result<(), Error> {
        self.store.writes_started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.store.write_delay).await;

        if self.store.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Simulated);
        }

        let session = session.map(|session| &mut session.0);
        let Ok(()) = self.inner.replace_one(projection, session).await;
        Ok(())
    }
}
