use thiserror::Error;

pub type CadenceResult<T> = Result<T, CadenceError>;

#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CadenceError {
    /// True for conditions the caller caused (bad id, bad input) as opposed
    /// to faults inside the engine or its store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Validation(_))
    }
}
