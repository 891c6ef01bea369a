use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Resource control not found: {0}")]
    ResourceControlNotFound(String),

    #[error("Invalid endpoint configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Signing key unavailable: {0}")]
    SigningKeyUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
