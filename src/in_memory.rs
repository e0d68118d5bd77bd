use std::sync::{Arc, Once};

use dashmap::DashMap;

use crate::error::Error;
use crate::feature::Feature;
use crate::provider::FeatureProvider;
use crate::registry::Registry;

/// A provider without persistence, for tests and local development.
pub struct InMemoryFeatureProvider {
    registry: Arc<Registry>,
    data: DashMap<String, Arc<Feature>>,
    seeded: Once,
}

impl InMemoryFeatureProvider {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
            data: DashMap::new(),
            seeded: Once::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Every feature set so far, ordered by name.
    pub fn all(&self) -> Vec<Arc<Feature>> {
        let mut features: Vec<Arc<Feature>> =
            self.data.iter().map(|entry| entry.value().clone()).collect();
        features.sort_by(|a, b| a.name.cmp(&b.name));
        features
    }
}

impl FeatureProvider for InMemoryFeatureProvider {
    type Error = Error;

    async fn initialize(&self) -> Result<(), Error> {
        self.seeded.call_once(|| {
            for definition in self.registry.list() {
                self.data
                    .insert(definition.name().to_string(), Arc::new(definition.instantiate()));
            }
            tracing::debug!(features = self.registry.len(), "Seeded in-memory features");
        });

        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Arc<Feature>, Error> {
        self.data
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn set(&self, feature: Feature) -> Result<(), Error> {
        if feature.name.is_empty() {
            return Err(Error::InvalidArgument {
                argument: "feature.name",
                reason: "must not be empty",
            });
        }

        if !self.registry.contains(&feature.name) {
            return Err(Error::NotFound(feature.name));
        }

        self.data.insert(feature.name.clone(), Arc::new(feature));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::feature::FeatureDefinition;

    fn provider() -> InMemoryFeatureProvider {
        InMemoryFeatureProvider::new(
            Registry::builder()
                .feature(FeatureDefinition::new("A", "a"))
                .feature(FeatureDefinition::new("B", "b").default_value(true))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn unknown_before_initialize() {
        let provider = provider();

        assert!(provider.get("A").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn scenario() {
        let provider = provider();
        provider.initialize().await.unwrap();

        assert!(!provider.is_enabled("A").await.unwrap());
        assert!(provider.is_enabled("B").await.unwrap());

        let a = provider.get("A").await.unwrap();
        provider.set(a.with_value(true)).await.unwrap();
        assert!(provider.is_enabled("A").await.unwrap());

        assert!(provider.get("C").await.unwrap_err().is_not_found());
        assert!(
            provider
                .set(FeatureDefinition::new("C", "").with_value(true))
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn initialize_seeds_only_once() {
        let provider = provider();
        provider.initialize().await.unwrap();

        provider
            .set(provider.get("A").await.unwrap().with_value(true))
            .await
            .unwrap();
        provider.initialize().await.unwrap();

        assert!(provider.is_enabled("A").await.unwrap());
        assert_eq!(provider.all().len(), 2);
    }
}
