use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OnceCell};

use crate::cache::FeatureCache;
use crate::config::ProviderOptions;
use crate::error::Error;
use crate::feature::{Feature, Flag};
use crate::projection::{PROJECTION_TYPE, Projection};
use crate::registry::Registry;
use crate::store::{DocumentStore, ProjectionCollection, StoreSession};

/// Read and override feature flags.
pub trait FeatureProvider: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Prepare the provider for use. Safe to call more than once, and concurrently.
    fn initialize(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn get(&self, name: &str) -> impl Future<Output = Result<Arc<Feature>, Self::Error>> + Send;

    fn set(&self, feature: Feature) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn is_enabled(&self, name: &str) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        async move { Ok(self.get(name).await?.value) }
    }

    fn is_flag_enabled<F: Flag>(&self) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        self.is_enabled(F::NAME)
    }
}

/// Group several writes into one store transaction.
pub trait UseTransaction {
    type Error: std::error::Error + Send + Sync + 'static;

    fn start_transaction(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn commit_transaction(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn abort_transaction(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

pub struct Builder<S: DocumentStore> {
    registry: Registry,
    store: S,
    options: ProviderOptions,
}

impl<S: DocumentStore> Builder<S> {
    pub fn options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn database_name(mut self, database_name: impl Into<String>) -> Self {
        self.options.database_name = database_name.into();
        self
    }

    pub fn collection_name(mut self, collection_name: impl Into<String>) -> Self {
        self.options.collection_name = collection_name.into();
        self
    }

    pub fn cache_lifetime(mut self, cache_lifetime: Duration) -> Self {
        self.options.cache_lifetime = cache_lifetime;
        self
    }

    #[tracing::instrument(skip(self), fields(options = ?self.options))]
    pub fn build(self) -> Result<CachedFeatureProvider<S>, Error<S::Error>> {
        if self.options.database_name.is_empty() {
            return Err(Error::InvalidArgument {
                argument: "database_name",
                reason: "must not be empty",
            });
        }

        if self.options.collection_name.is_empty() {
            return Err(Error::InvalidArgument {
                argument: "collection_name",
                reason: "must not be empty",
            });
        }

        Ok(CachedFeatureProvider {
            registry: Arc::new(self.registry),
            store: self.store,
            collection: OnceCell::new(),
            cache: FeatureCache::new(self.options.cache_lifetime),
            session: Mutex::new(None),
            options: self.options,
        })
    }
}

/// A provider that serves flags from memory and persists overrides to a document store.
///
/// Build one per process and share it behind an `Arc`.
pub struct CachedFeatureProvider<S: DocumentStore> {
    registry: Arc<Registry>,
    store: S,
    collection: OnceCell<S::Collection>,
    cache: FeatureCache,
    session: Mutex<Option<S::Session>>,
    options: ProviderOptions,
}

impl<S: DocumentStore> CachedFeatureProvider<S> {
    pub fn builder(registry: Registry, store: S) -> Builder<S> {
        Builder {
            registry,
            store,
            options: ProviderOptions::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    async fn collection(&self) -> Result<&S::Collection, Error<S::Error>> {
        self.collection
            .get_or_try_init(|| async {
                tracing::debug!(
                    database = %self.options.database_name,
                    collection = %self.options.collection_name,
                    "Resolving the projection collection"
                );
                self.store
                    .collection(&self.options.database_name, &self.options.collection_name)
                    .await
            })
            .await
            .map_err(Error::Store)
    }

    async fn hydrate_if_needed(&self) -> Result<(), Error<S::Error>> {
        if !self.cache.is_stale() {
            return Ok(());
        }

        let collection = self.collection().await?;

        self.cache
            .hydrate_if_needed(&self.registry, || collection.find_by_type(PROJECTION_TYPE))
            .await
            .inspect_err(|e| tracing::debug!(%e, "Hydrating the feature cache failed"))
            .map_err(Error::Store)?;

        Ok(())
    }

    /// Every registered feature with its current value, ordered by name.
    #[tracing::instrument(skip(self))]
    pub async fn all(&self) -> Result<Vec<Arc<Feature>>, Error<S::Error>> {
        self.hydrate_if_needed().await?;
        Ok(self.cache.snapshot())
    }

    /// Make the next read reconcile with the store regardless of the cache lifetime.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    pub fn last_hydrated_at(&self) -> Option<DateTime<Utc>> {
        self.cache.last_hydrated_at()
    }

    pub async fn in_transaction(&self) -> bool {
        self.session.lock().await.is_some()
    }
}

impl<S: DocumentStore> FeatureProvider for CachedFeatureProvider<S> {
    type Error = Error<S::Error>;

    #[tracing::instrument(skip(self))]
    async fn initialize(&self) -> Result<(), Self::Error> {
        self.collection().await?;
        self.hydrate_if_needed().await
    }

    #[cfg_attr(feature = "tracing-instrument", tracing::instrument(skip(self)))]
    async fn get(&self, name: &str) -> Result<Arc<Feature>, Self::Error> {
        self.hydrate_if_needed().await?;

        self.cache
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Cache first, then the store. A failed store write is returned but the
    /// cached value stays until the next hydration, or until the transaction
    /// ends when one is open.
    #[cfg_attr(feature = "tracing-instrument", tracing::instrument(skip(self)))]
    async fn set(&self, feature: Feature) -> Result<(), Self::Error> {
        if feature.name.is_empty() {
            return Err(Error::InvalidArgument {
                argument: "feature.name",
                reason: "must not be empty",
            });
        }

        if !self.registry.contains(&feature.name) {
            return Err(Error::NotFound(feature.name));
        }

        let projection = Projection::from_feature(&feature);
        let collection = self.collection().await?;
        let mut session = self.session.lock().await;

        if session.is_some() {
            self.cache.stage(feature);
        } else {
            self.cache.put(feature);
        }

        tracing::trace!(
            feature = %projection.feature_name,
            value = projection.value,
            transaction = ?session.as_ref().map(|s| s.id()),
            "Persisting feature"
        );

        collection
            .replace_one(projection, session.as_mut())
            .await
            .inspect_err(|e| tracing::debug!(%e, "Persisting the feature failed"))
            .map_err(Error::Store)
    }
}

impl<S: DocumentStore> UseTransaction for CachedFeatureProvider<S> {
    type Error = Error<S::Error>;

    #[tracing::instrument(skip(self))]
    async fn start_transaction(&self) -> Result<(), Self::Error> {
        let mut session = self.session.lock().await;

        if session.is_some() {
            tracing::trace!("A transaction is already active");
            return Ok(());
        }

        let started = self.store.start_session().await.map_err(Error::Store)?;
        tracing::debug!(transaction = %started.id(), "Started a transaction");
        *session = Some(started);

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn commit_transaction(&self) -> Result<(), Self::Error> {
        let Some(session) = self.session.lock().await.take() else {
            return Err(Error::InvalidState("commit without an active transaction"));
        };

        let id = session.id();
        let committed = session.commit().await;

        // Committed or not, the staged values no longer need protecting from
        // hydration, and the next read should see what the store holds.
        self.cache.clear_staged();
        self.cache.invalidate();

        committed.map_err(Error::Store)?;
        tracing::debug!(transaction = %id, "Committed the transaction");

        Ok(())
    }

    /// Discards staged writes and forces the next read to reload from the store,
    /// so values set inside the transaction do not linger in the cache.
    #[tracing::instrument(skip(self))]
    async fn abort_transaction(&self) -> Result<(), Self::Error> {
        let Some(session) = self.session.lock().await.take() else {
            return Err(Error::InvalidState("abort without an active transaction"));
        };

        let id = session.id();
        self.cache.clear_staged();
        self.cache.invalidate();
        session.abort().await.map_err(Error::Store)?;
        tracing::debug!(transaction = %id, "Aborted the transaction");

        Ok(())
    }
}

impl<S: DocumentStore> Drop for CachedFeatureProvider<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut() {
            tracing::warn!(
                transaction = %session.id(),
                "Dropping a feature provider with an open transaction, its writes are discarded"
            );
        }
    }
}
