use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_DATABASE_NAME: &str = "FeatureToggler";
pub const DEFAULT_COLLECTION_NAME: &str = "RimDevAspNetCoreFeatureFlags";
pub const DEFAULT_CACHE_LIFETIME: Duration = Duration::from_secs(60);

const DATABASE_ENV: &str = "FEATURE_TOGGLER_DATABASE";
const COLLECTION_ENV: &str = "FEATURE_TOGGLER_COLLECTION";
const CACHE_LIFETIME_ENV: &str = "FEATURE_TOGGLER_CACHE_LIFETIME_SECS";

/// Where flag overrides live and how long a hydrated cache stays fresh.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderOptions {
    pub database_name: String,
    pub collection_name: String,
    #[serde(rename = "cacheLifetimeSecs", deserialize_with = "seconds::deserialize")]
    pub cache_lifetime: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            cache_lifetime: DEFAULT_CACHE_LIFETIME,
        }
    }
}

impl ProviderOptions {
    /// Defaults, overridden by any of the `FEATURE_TOGGLER_*` variables that are set.
    ///
    /// An unparseable cache lifetime is ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(database_name) = lookup(DATABASE_ENV) {
            options.database_name = database_name;
        }

        if let Some(collection_name) = lookup(COLLECTION_ENV) {
            options.collection_name = collection_name;
        }

        if let Some(raw) = lookup(CACHE_LIFETIME_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => options.cache_lifetime = Duration::from_secs(secs),
                Err(e) => {
                    tracing::warn!(%e, value = %raw, "Ignoring an invalid {CACHE_LIFETIME_ENV}");
                }
            }
        }

        options
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
