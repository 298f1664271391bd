pub mod manager;
pub mod models;

pub use manager::NodeManager;
pub use models::*;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("{0}")]
    Validation(String),

    #[error("Radio link error: {0}")]
    Serial(#[from] crate::serial::SerialError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

pub type Result<T> = std::result::Result<T, NodeError>;
