use serde::{Deserialize, Serialize};

/// How the host application is expected to scope a feature when injecting it.
///
/// Informational only: nothing in this crate changes behavior based on it.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServiceLifetime {
    Singleton,
    #[default]
    Scoped,
    Transient,
}

impl std::fmt::Display for ServiceLifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        let name = match self {
            ServiceLifetime::Singleton => "Singleton",
            ServiceLifetime::Scoped => "Scoped",
            ServiceLifetime::Transient => "Transient",
        };
        write!(f, "{name}")
    }
}

/// A named boolean toggle and its metadata.
///
/// Two features with the same `name` are the same logical flag.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub service_lifetime: ServiceLifetime,
    pub value: bool,
}

impl Feature {
    /// A copy of this feature carrying `value`, ready to hand to a provider's `set`.
    pub fn with_value(&self, value: bool) -> Feature {
        Feature {
            value,
            ..self.clone()
        }
    }
}

/// A flag known at compile time.
///
/// ```rust
/// use feature_toggler::Flag;
///
/// struct DarkMode;
///
/// impl Flag for DarkMode {
///     const NAME: &'static str = "DarkMode";
///     const DESCRIPTION: &'static str = "Render the UI with the dark palette.";
///     const DEFAULT: bool = true;
/// }
///
/// assert!(DarkMode::definition().instantiate().value);
/// ```
pub trait Flag {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    const DEFAULT: bool = false;
    const SERVICE_LIFETIME: ServiceLifetime = ServiceLifetime::Scoped;

    fn definition() -> FeatureDefinition {
        FeatureDefinition::new(Self::NAME, Self::DESCRIPTION)
            .default_value(Self::DEFAULT)
            .service_lifetime(Self::SERVICE_LIFETIME)
    }
}

/// The registry's description of a flag: its identity and default state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureDefinition {
    name: String,
    description: String,
    service_lifetime: ServiceLifetime,
    default: bool,
}

impl FeatureDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            service_lifetime: ServiceLifetime::default(),
            default: false,
        }
    }

    pub fn default_value(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    pub fn service_lifetime(mut self, service_lifetime: ServiceLifetime) -> Self {
        self.service_lifetime = service_lifetime;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default(&self) -> bool {
        self.default
    }

    /// A fresh feature holding the default value.
    pub fn instantiate(&self) -> Feature {
        self.with_value(self.default)
    }

    pub fn with_value(&self, value: bool) -> Feature {
        Feature {
            name: self.name.clone(),
            description: self.description.clone(),
            service_lifetime: self.service_lifetime,
            value,
        }
    }
}
