use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::feature::Feature;
use crate::projection::Projection;
use crate::registry::Registry;

#[derive(Clone, Copy, Debug)]
struct Hydrated {
    at: Instant,
    wall: DateTime<Utc>,
}

/// Flag values served from memory, refreshed from the store once they go stale.
///
/// Staleness is cache-wide rather than per entry. Values written inside an open
/// transaction are not in the store yet, so they are kept aside and laid over
/// the persisted overrides on every hydration until the transaction ends.
pub(crate) struct FeatureCache {
    entries: DashMap<String, Arc<Feature>>,
    staged: parking_lot::Mutex<BTreeMap<String, bool>>,
    hydrated: parking_lot::RwLock<Option<Hydrated>>,
    invalidations: AtomicU64,
    reconciled: AtomicU64,
    lifetime: Duration,
    hydration: Mutex<()>,
}

impl FeatureCache {
    pub(crate) fn new(lifetime: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            staged: parking_lot::Mutex::new(BTreeMap::new()),
            hydrated: parking_lot::RwLock::new(None),
            invalidations: AtomicU64::new(0),
            reconciled: AtomicU64::new(0),
            lifetime,
            hydration: Mutex::new(()),
        }
    }

    #[cfg_attr(feature = "tracing-instrument", tracing::instrument(skip(self), ret(level = tracing::Level::TRACE)))]
    pub(crate) fn is_stale(&self) -> bool {
        if self.invalidations.load(Ordering::Acquire) != self.reconciled.load(Ordering::Acquire) {
            return true;
        }

        match *self.hydrated.read() {
            None => true,
            Some(hydrated) => Instant::now().duration_since(hydrated.at) > self.lifetime,
        }
    }

    /// Reconcile registry defaults with persisted overrides if the cache is stale.
    ///
    /// At most one caller runs `load` at a time; callers that queued behind it
    /// find the cache fresh and return without reading the store. Returns
    /// whether this call performed the reconciliation.
    pub(crate) async fn hydrate_if_needed<F, Fut, E>(
        &self,
        registry: &Registry,
        load: F,
    ) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Projection>, E>>,
    {
        if !self.is_stale() {
            return Ok(false);
        }

        let _guard = self.hydration.lock().await;

        if !self.is_stale() {
            tracing::trace!("Cache was hydrated while waiting for the lock");
            return Ok(false);
        }

        // An invalidation that lands while the store is being read must survive
        // this hydration.
        let generation = self.invalidations.load(Ordering::Acquire);
        let persisted = load().await?;

        let mut overrides: BTreeMap<String, bool> = BTreeMap::new();
        for projection in persisted {
            if registry.contains(&projection.feature_name) {
                overrides.insert(projection.feature_name, projection.value);
            } else {
                tracing::debug!(
                    feature = %projection.feature_name,
                    "Dropping a persisted override for an unregistered feature"
                );
            }
        }

        // Defaults and overrides are merged before anything is written, so a
        // concurrent reader never sees an overridden flag at its default.
        {
            let staged = self.staged.lock();
            for definition in registry.list() {
                let value = staged
                    .get(definition.name())
                    .or_else(|| overrides.get(definition.name()))
                    .copied()
                    .unwrap_or(definition.default());
                self.entries.insert(
                    definition.name().to_string(),
                    Arc::new(definition.with_value(value)),
                );
            }
        }

        let now = Hydrated {
            at: Instant::now(),
            wall: Utc::now(),
        };
        {
            let mut hydrated = self.hydrated.write();
            match *hydrated {
                Some(prev) if prev.at > now.at => {}
                _ => *hydrated = Some(now),
            }
        }
        self.reconciled.store(generation, Ordering::Release);

        tracing::debug!(
            features = registry.len(),
            overrides = overrides.len(),
            "Hydrated the feature cache"
        );

        Ok(true)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<Feature>> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub(crate) fn put(&self, feature: Feature) {
        self.entries.insert(feature.name.clone(), Arc::new(feature));
    }

    /// Like [`put`](Self::put), but the value also outlives hydrations until
    /// [`clear_staged`](Self::clear_staged).
    pub(crate) fn stage(&self, feature: Feature) {
        let mut staged = self.staged.lock();
        staged.insert(feature.name.clone(), feature.value);
        self.entries.insert(feature.name.clone(), Arc::new(feature));
    }

    pub(crate) fn clear_staged(&self) {
        self.staged.lock().clear();
    }

    /// Every cached feature, ordered by name.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Feature>> {
        let mut features: Vec<Arc<Feature>> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        features.sort_by(|a, b| a.name.cmp(&b.name));
        features
    }

    /// Force the next hydration check to go to the store.
    pub(crate) fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn last_hydrated_at(&self) -> Option<DateTime<Utc>> {
        (*self.hydrated.read()).map(|hydrated| hydrated.wall)
    }
}
