use thiserror::Error;

use crate::index::BackendError;
use crate::registry::RegistryError;
use crate::storage::StoreError;
use crate::writer::WriterError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("Index backend failure: {0}")]
    Backend(#[from] BackendError),

    /// The caller asked for something the engine cannot do.
    #[error("{0}")]
    Contract(String),

    #[error("Indexing was stopped")]
    Aborted,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("State store failure: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
