use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::OpenOptions;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;

use crate::projection::Projection;

use super::{DocumentStore, ProjectionCollection, StoreSession};

const XDG_PREFIX: &str = "feature-toggler";
const XDG_STORE_DIRNAME: &str = "store";
const STORE_DIR_ENV: &str = "FEATURE_TOGGLER_STORE_DIR";
const NOTES: &[&str] = &[
    "Persisted feature flag overrides.",
    "Each document overrides the registered default of the flag named by `featureName`.",
    "Documents for flags that are no longer registered are ignored.",
];

#[derive(thiserror::Error, Debug)]
pub enum JsonFileError {
    #[error("No HOME is available")]
    NoHome,

    #[error("`{0}` is not usable as a database or collection name")]
    InvalidName(String),

    #[error("Serializing / deserializing failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Loading the collection failed when opening the file `{0}`: {1}")]
    Open(PathBuf, std::io::Error),

    #[error("Creating `{0}` failed: {1}")]
    Create(PathBuf, std::io::Error),

    #[error("Reading the collection at `{0}` failed: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Writing the collection to `{0}` failed: {1}")]
    Write(PathBuf, std::io::Error),

    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct WrappedCollection {
    notes: Vec<String>,
    documents: Vec<Projection>,
}

/// A document store that keeps each collection in `<root>/<database>/<collection>.json`.
#[derive(Clone)]
pub struct JsonFile {
    root: PathBuf,
    locks: Arc<parking_lot::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl JsonFile {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            locks: Default::default(),
        }
    }

    /// Store under `$FEATURE_TOGGLER_STORE_DIR`, or the XDG data directory.
    pub fn try_default() -> Result<Self, JsonFileError> {
        if let Some(dir) = std::env::var_os(STORE_DIR_ENV) {
            return Ok(Self::new(PathBuf::from(dir)));
        }

        let xdg_dirs = xdg::BaseDirectories::with_prefix(XDG_PREFIX);

        let root = xdg_dirs
            .create_data_directory(XDG_STORE_DIRNAME)
            .map_err(|e| {
                match xdg_dirs
                    .get_data_file(XDG_STORE_DIRNAME)
                    .ok_or(JsonFileError::NoHome)
                {
                    Ok(loc) => JsonFileError::Create(loc, e),
                    Err(e) => e,
                }
            })?;

        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_for(&self, location: &Path) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(location.to_path_buf())
            .or_default()
            .clone()
    }
}

fn check_name(name: &str) -> Result<(), JsonFileError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(JsonFileError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct JsonCollection {
    location: PathBuf,
    directory: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonCollection {
    pub fn location(&self) -> &Path {
        &self.location
    }

    #[tracing::instrument(skip(self), fields(location = ?self.location))]
    async fn load(&self) -> Result<Vec<Projection>, JsonFileError> {
        let mut file = match OpenOptions::new()
            .read(true)
            .write(false)
            .create(false)
            .truncate(false)
            .open(&self.location)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::trace!("No collection file yet");
                return Ok(vec![]);
            }
            Err(e) => return Err(JsonFileError::Open(self.location.clone(), e)),
        };

        let mut contents = vec![];
        file.read_to_end(&mut contents)
            .await
            .map_err(|e| JsonFileError::Read(self.location.clone(), e))?;

        let wrapped: WrappedCollection = serde_json::from_slice(&contents)?;

        Ok(wrapped.documents)
    }

    #[tracing::instrument(skip(self, documents), fields(location = ?self.location))]
    async fn store(&self, documents: Vec<Projection>) -> Result<(), JsonFileError> {
        let wrapped = WrappedCollection {
            notes: NOTES.iter().map(|v| String::from(*v)).collect(),
            documents,
        };
        let json = serde_json::to_string_pretty(&wrapped)?;

        let directory = self.directory.clone();
        let location = self.location.clone();

        tracing::trace!("Storing collection");
        tokio::task::spawn_blocking(move || -> Result<(), JsonFileError> {
            let mut tempfile = tempfile::NamedTempFile::new_in(&directory)
                .map_err(|e| JsonFileError::Create(directory.clone(), e))?;

            tempfile
                .write_all(json.as_bytes())
                .map_err(|e| JsonFileError::Write(tempfile.path().into(), e))?;

            tempfile.persist(&location)?;

            Ok(())
        })
        .await??;

        tracing::trace!("Collection persisted");

        Ok(())
    }

    async fn apply(&self, projections: Vec<Projection>) -> Result<(), JsonFileError> {
        let _guard = self.lock.lock().await;

        let mut documents = self.load().await?;
        for projection in projections {
            super::upsert(&mut documents, projection);
        }

        self.store(documents).await
    }
}

pub struct JsonFileSession {
    id: uuid::Uuid,
    staged: Vec<(JsonCollection, Projection)>,
}

impl DocumentStore for JsonFile {
    type Error = JsonFileError;
    type Session = JsonFileSession;
    type Collection = JsonCollection;

    #[tracing::instrument(skip(self))]
    async fn collection(&self, database: &str, name: &str) -> Result<JsonCollection, JsonFileError> {
        check_name(database)?;
        check_name(name)?;

        let directory = self.root.join(database);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| JsonFileError::Create(directory.clone(), e))?;

        let location = directory.join(format!("{name}.json"));
        let lock = self.lock_for(&location);

        Ok(JsonCollection {
            location,
            directory,
            lock,
        })
    }

    async fn start_session(&self) -> Result<JsonFileSession, JsonFileError> {
        Ok(JsonFileSession {
            id: uuid::Uuid::now_v7(),
            staged: vec![],
        })
    }
}

impl ProjectionCollection for JsonCollection {
    type Error = JsonFileError;
    type Session = JsonFileSession;

    async fn find_by_type(&self, projection_type: &str) -> Result<Vec<Projection>, JsonFileError> {
        let documents = self.load().await?;
        Ok(super::select(&documents, projection_type))
    }

    async fn replace_one(
        &self,
        projection: Projection,
        session: Option<&mut JsonFileSession>,
    ) -> Result<(), JsonFileError> {
        match session {
            Some(session) => {
                tracing::trace!(session = %session.id, feature = %projection.feature_name, "Staging write");
                session.staged.push((self.clone(), projection));
                Ok(())
            }
            None => self.apply(vec![projection]).await,
        }
    }
}

impl StoreSession for JsonFileSession {
    type Error = JsonFileError;

    fn id(&self) -> uuid::Uuid {
        self.id
    }

    #[tracing::instrument(skip(self), fields(session = %self.id, writes = self.staged.len()))]
    async fn commit(self) -> Result<(), JsonFileError> {
        let mut batches: Vec<(JsonCollection, Vec<Projection>)> = vec![];

        for (collection, projection) in self.staged {
            match batches
                .iter_mut()
                .find(|(c, _)| c.location == collection.location)
            {
                Some((_, batch)) => batch.push(projection),
                None => batches.push((collection, vec![projection])),
            }
        }

        for (collection, batch) in batches {
            collection.apply(batch).await?;
        }

        Ok(())
    }

    async fn abort(self) -> Result<(), JsonFileError> {
        tracing::trace!(session = %self.id, discarded = self.staged.len(), "Aborting");
        Ok(())
    }
}
