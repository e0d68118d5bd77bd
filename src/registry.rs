use std::collections::BTreeMap;

use crate::feature::{FeatureDefinition, Flag};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A feature definition has an empty name")]
    EmptyName,

    #[error("The feature `{0}` is registered more than once")]
    Duplicate(String),
}

/// The set of flags that exist, independent of any persisted override.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    definitions: BTreeMap<String, FeatureDefinition>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Every definition, ordered by name.
    pub fn list(&self) -> impl Iterator<Item = &FeatureDefinition> {
        self.definitions.values()
    }

    pub fn find(&self, name: &str) -> Option<&FeatureDefinition> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    definitions: Vec<FeatureDefinition>,
}

impl RegistryBuilder {
    pub fn feature(mut self, definition: FeatureDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn flag<F: Flag>(self) -> Self {
        self.feature(F::definition())
    }

    #[tracing::instrument(skip(self), fields(count = self.definitions.len()))]
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut definitions = BTreeMap::new();

        for definition in self.definitions {
            if definition.name().is_empty() {
                return Err(RegistryError::EmptyName);
            }

            let name = definition.name().to_string();
            if definitions.insert(name.clone(), definition).is_some() {
                return Err(RegistryError::Duplicate(name));
            }
        }

        Ok(Registry { definitions })
    }
}
