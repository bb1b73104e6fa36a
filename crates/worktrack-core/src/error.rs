use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorktrackError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("entry is locked: {0}")]
    Locked(String),
}
