use gvault_types::TypeError;
use thiserror::Error;

/// Errors from canonical hashing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("unsupported quantization policy version {0}")]
    UnsupportedQuantization(u8),

    #[error(transparent)]
    Type(#[from] TypeError),
}

pub type HashResult<T> = Result<T, HashError>;
