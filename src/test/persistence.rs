use crate::feature::FeatureDefinition;
use crate::provider::{CachedFeatureProvider, FeatureProvider, UseTransaction};
use crate::store::{JsonFile, Stores};

#[tokio::test]
async fn overrides_survive_a_restart() {
    super::init_tracing();

    let dir = tempfile::tempdir().unwrap();

    {
        let provider =
            CachedFeatureProvider::builder(super::registry(), JsonFile::new(dir.path().into()))
                .database_name("Flags")
                .build()
                .unwrap();
        provider.initialize().await.unwrap();

        let a = provider.get("A").await.unwrap();
        provider.set(a.with_value(true)).await.unwrap();
    }

    assert!(dir.path().join("Flags").join("RimDevAspNetCoreFeatureFlags.json").exists());

    let restarted =
        CachedFeatureProvider::builder(super::registry(), JsonFile::new(dir.path().into()))
            .database_name("Flags")
            .build()
            .unwrap();
    restarted.initialize().await.unwrap();

    assert!(restarted.is_enabled("A").await.unwrap());
    assert!(restarted.is_enabled("B").await.unwrap());
}

#[tokio::test]
async fn connection_string_selects_the_backend() {
    let dir = tempfile::tempdir().unwrap();
    let connection = url::Url::from_directory_path(dir.path()).unwrap();

    let store = Stores::connect(connection.as_str()).unwrap();
    let provider = CachedFeatureProvider::builder(super::registry(), store)
        .build()
        .unwrap();

    provider.start_transaction().await.unwrap();
    provider
        .set(FeatureDefinition::new("B", "The B flag").with_value(false))
        .await
        .unwrap();
    provider.commit_transaction().await.unwrap();

    let reopened = CachedFeatureProvider::builder(
        super::registry(),
        Stores::connect(dir.path().to_str().unwrap()).unwrap(),
    )
    .build()
    .unwrap();

    assert!(!reopened.is_enabled("B").await.unwrap());
}

#[tokio::test]
async fn memory_connection_works_end_to_end() {
    let provider =
        CachedFeatureProvider::builder(super::registry(), Stores::connect("memory:").unwrap())
            .build()
            .unwrap();

    provider.initialize().await.unwrap();
    provider
        .set(FeatureDefinition::new("A", "").with_value(true))
        .await
        .unwrap();
    provider.invalidate();

    assert!(provider.is_enabled("A").await.unwrap());
}
