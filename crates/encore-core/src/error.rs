use crate::remote::RemoteError;
use crate::types::EntityId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncoreError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("toggle for '{entity}' exhausted {attempts} attempts")]
    RetriesExhausted { entity: EntityId, attempts: u32 },
}

pub type Result<T> = std::result::Result<T, EncoreError>;
