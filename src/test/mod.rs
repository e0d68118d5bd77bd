mod counting_store;
mod persistence;

use once_cell::sync::Lazy;
use tracing_subscriber::fmt;

use crate::{FeatureDefinition, Registry};

pub(crate) static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = fmt().with_test_writer().try_init();
});

pub(crate) fn init_tracing() {
    Lazy::force(&TRACING);
}

/// `A` defaults off, `B` defaults on.
pub(crate) fn registry() -> Registry {
    Registry::builder()
        .feature(FeatureDefinition::new("A", "The A flag"))
        .feature(FeatureDefinition::new("B", "The B flag").default_value(true))
        .build()
        .unwrap()
}
