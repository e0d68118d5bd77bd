use std::future::Future;
use std::path::PathBuf;

use url::Url;

use crate::projection::Projection;

mod json_file;
mod memory;

pub use json_file::{JsonCollection, JsonFile, JsonFileError, JsonFileSession};
pub use memory::{Memory, MemoryCollection, MemorySession};

/// A document-database connection.
pub trait DocumentStore: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;
    type Session: StoreSession<Error = Self::Error>;
    type Collection: ProjectionCollection<Error = Self::Error, Session = Self::Session>;

    /// Resolve a handle to `name` inside `database`, creating it if needed.
    fn collection(
        &self,
        database: &str,
        name: &str,
    ) -> impl Future<Output = Result<Self::Collection, Self::Error>> + Send;

    fn start_session(&self) -> impl Future<Output = Result<Self::Session, Self::Error>> + Send;
}

pub trait ProjectionCollection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;
    type Session: Send;

    /// Every row with the given discriminator, sorted by feature name.
    fn find_by_type(
        &self,
        projection_type: &str,
    ) -> impl Future<Output = Result<Vec<Projection>, Self::Error>> + Send;

    /// Replace the row keyed on (`projection_type`, `feature_name`), inserting it if absent.
    ///
    /// With a session the write is staged and only lands on commit.
    fn replace_one(
        &self,
        projection: Projection,
        session: Option<&mut Self::Session>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// An open store transaction. Dropping it without committing discards its writes.
pub trait StoreSession: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn id(&self) -> uuid::Uuid;

    fn commit(self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn abort(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

pub(crate) fn upsert(documents: &mut Vec<Projection>, projection: Projection) {
    match documents.iter_mut().find(|doc| doc.same_key(&projection)) {
        Some(existing) => *existing = projection,
        None => documents.push(projection),
    }
}

pub(crate) fn select(documents: &[Projection], projection_type: &str) -> Vec<Projection> {
    let mut selected: Vec<Projection> = documents
        .iter()
        .filter(|doc| doc.projection_type == projection_type)
        .cloned()
        .collect();
    selected.sort_by(|a, b| a.feature_name.cmp(&b.feature_name));
    selected
}

/// A store picked at runtime from a connection string.
#[derive(Clone)]
pub enum Stores {
    Memory(Memory),
    JsonFile(JsonFile),
}

impl Stores {
    /// Connect to `memory:`, `file:///some/dir`, or a bare directory path.
    #[tracing::instrument(err(level = tracing::Level::DEBUG))]
    pub fn connect(connection: &str) -> Result<Self, StoresError> {
        let url = match Url::parse(connection) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                tracing::debug!("Treating the connection string as a directory path");
                return Ok(Stores::JsonFile(JsonFile::new(PathBuf::from(connection))));
            }
            Err(e) => return Err(e.into()),
        };

        match url.scheme() {
            "memory" => Ok(Stores::Memory(Memory::default())),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| StoresError::InvalidPath(connection.to_string()))?;
                Ok(Stores::JsonFile(JsonFile::new(path)))
            }
            _ => Err(StoresError::UnknownUrlScheme),
        }
    }
}

#[derive(Clone)]
pub enum StoresCollection {
    Memory(MemoryCollection),
    JsonFile(JsonCollection),
}

pub enum StoresSession {
    Memory(MemorySession),
    JsonFile(JsonFileSession),
}

impl DocumentStore for Stores {
    type Error = StoresError;
    type Session = StoresSession;
    type Collection = StoresCollection;

    async fn collection(&self, database: &str, name: &str) -> Result<StoresCollection, StoresError> {
        match self {
            Self::Memory(s) => {
                let Ok(c) = s.collection(database, name).await;
                Ok(StoresCollection::Memory(c))
            }
            Self::JsonFile(s) => Ok(StoresCollection::JsonFile(
                s.collection(database, name).await?,
            )),
        }
    }

    async fn start_session(&self) -> Result<StoresSession, StoresError> {
        match self {
            Self::Memory(s) => {
                let Ok(session) = s.start_session().await;
                Ok(StoresSession::Memory(session))
            }
            Self::JsonFile(s) => Ok(StoresSession::JsonFile(s.start_session().await?)),
        }
    }
}

impl ProjectionCollection for StoresCollection {
    type Error = StoresError;
    type Session = StoresSession;

    async fn find_by_type(&self, projection_type: &str) -> Result<Vec<Projection>, StoresError> {
        match self {
            Self::Memory(c) => {
                let Ok(docs) = c.find_by_type(projection_type).await;
                Ok(docs)
            }
            Self::JsonFile(c) => Ok(c.find_by_type(projection_type).await?),
        }
    }

    async fn replace_one(
        &self,
        projection: Projection,
        session: Option<&mut StoresSession>,
    ) -> Result<(), StoresError> {
        match (self, session) {
            (Self::Memory(c), None) => {
                let Ok(()) = c.replace_one(projection, None).await;
                Ok(())
            }
            (Self::Memory(c), Some(StoresSession::Memory(s))) => {
                let Ok(()) = c.replace_one(projection, Some(s)).await;
                Ok(())
            }
            (Self::JsonFile(c), None) => Ok(c.replace_one(projection, None).await?),
            (Self::JsonFile(c), Some(StoresSession::JsonFile(s))) => {
                Ok(c.replace_one(projection, Some(s)).await?)
            }
            _ => Err(StoresError::SessionMismatch),
        }
    }
}

impl StoreSession for StoresSession {
    type Error = StoresError;

    fn id(&self) -> uuid::Uuid {
        match self {
            Self::Memory(s) => s.id(),
            Self::JsonFile(s) => s.id(),
        }
    }

    async fn commit(self) -> Result<(), StoresError> {
        match self {
            Self::Memory(s) => {
                let Ok(()) = s.commit().await;
                Ok(())
            }
            Self::JsonFile(s) => Ok(s.commit().await?),
        }
    }

    async fn abort(self) -> Result<(), StoresError> {
        match self {
            Self::Memory(s) => {
                let Ok(()) = s.abort().await;
                Ok(())
            }
            Self::JsonFile(s) => Ok(s.abort().await?),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoresError {
    #[error(transparent)]
    JsonFile(#[from] JsonFileError),

    #[error("Only memory and file URL schemes are supported.")]
    UnknownUrlScheme,

    #[error(transparent)]
    Parse(#[from] url::ParseError),

    #[error("The connection `{0}` does not name a local path")]
    InvalidPath(String),

    #[error("The session belongs to a different store backend")]
    SessionMismatch,
}
