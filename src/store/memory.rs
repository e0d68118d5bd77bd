use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::projection::Projection;

use super::{DocumentStore, ProjectionCollection, StoreSession};

type Documents = Arc<RwLock<Vec<Projection>>>;

/// A process-local document store. Clones share the same collections.
#[derive(Clone, Default)]
pub struct Memory {
    collections: Arc<Mutex<HashMap<(String, String), Documents>>>,
}

#[derive(Clone)]
pub struct MemoryCollection {
    documents: Documents,
}

pub struct MemorySession {
    id: uuid::Uuid,
    staged: Vec<(Documents, Projection)>,
}

impl DocumentStore for Memory {
    type Error = Infallible;
    type Session = MemorySession;
    type Collection = MemoryCollection;

    async fn collection(&self, database: &str, name: &str) -> Result<MemoryCollection, Infallible> {
        let mut collections = self.collections.lock().await;
        let documents = collections
            .entry((database.to_string(), name.to_string()))
            .or_default()
            .clone();

        Ok(MemoryCollection { documents })
    }

    async fn start_session(&self) -> Result<MemorySession, Infallible> {
        Ok(MemorySession {
            id: uuid::Uuid::now_v7(),
            staged: vec![],
        })
    }
}

impl ProjectionCollection for MemoryCollection {
    type Error = Infallible;
    type Session = MemorySession;

    async fn find_by_type(&self, projection_type: &str) -> Result<Vec<Projection>, Infallible> {
        let documents = self.documents.read().await;
        Ok(super::select(&documents, projection_type))
    }

    async fn replace_one(
        &self,
        projection: Projection,
        session: Option<&mut MemorySession>,
    ) -> Result<(), Infallible> {
        if let Some(session) = session {
            tracing::trace!(session = %session.id, feature = %projection.feature_name, "Staging write");
            session.staged.push((self.documents.clone(), projection));
            return Ok(());
        }

        let mut documents = self.documents.write().await;
        super::upsert(&mut documents, projection);
        Ok(())
    }
}

impl StoreSession for MemorySession {
    type Error = Infallible;

    fn id(&self) -> uuid::Uuid {
        self.id
    }

    async fn commit(mut self) -> Result<(), Infallible> {
        tracing::trace!(session = %self.id, writes = self.staged.len(), "Committing");

        while let Some((target, _)) = self.staged.first() {
            let target = target.clone();
            let (batch, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.staged)
                .into_iter()
                .partition(|(docs, _)| Arc::ptr_eq(docs, &target));
            self.staged = rest;

            // One lock per collection so readers see the whole batch or none of it.
            let mut documents = target.write().await;
            for (_, projection) in batch {
                super::upsert(&mut documents, projection);
            }
        }

        Ok(())
    }

    async fn abort(self) -> Result<(), Infallible> {
        tracing::trace!(session = %self.id, discarded = self.staged.len(), "Aborting");
        Ok(())
    }
}
