//! Named boolean feature toggles, readable on every request and overridable at runtime.
//!
//! ```rust
//! use feature_toggler::{CachedFeatureProvider, FeatureDefinition, FeatureProvider, Registry};
//! use feature_toggler::store::Memory;
//!
//! # tokio_test::block_on(async {
//! let registry = Registry::builder()
//!     .feature(FeatureDefinition::new("NewCheckout", "Use the redesigned checkout"))
//!     .build()
//!     .unwrap();
//!
//! let provider = CachedFeatureProvider::builder(registry, Memory::default())
//!     .build()
//!     .unwrap();
//! provider.initialize().await.unwrap();
//!
//! let checkout = provider.get("NewCheckout").await.unwrap();
//! provider.set(checkout.with_value(true)).await.unwrap();
//!
//! assert!(provider.is_enabled("NewCheckout").await.unwrap());
//! # })
//! ```

mod cache;
pub mod config;
mod error;
mod feature;
mod in_memory;
pub mod projection;
mod provider;
mod registry;
pub mod store;

#[cfg(test)]
mod test;

pub use config::ProviderOptions;
pub use error::Error;
pub use feature::{Feature, FeatureDefinition, Flag, ServiceLifetime};
pub use in_memory::InMemoryFeatureProvider;
pub use provider::{Builder, CachedFeatureProvider, FeatureProvider, UseTransaction};
pub use registry::{Registry, RegistryBuilder, RegistryError};
