use std::path::PathBuf;

use thiserror::Error;

use super::codec::{DecodeError, EncodeError};

/// Operation failures surfaced by the content store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The post does not exist, or exists but is not visible to the caller.
    /// The two causes are deliberately indistinguishable so unauthenticated
    /// callers cannot probe for unpublished content.
    #[error("post not found")]
    NotFound,
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("failed to decode document `{path}`")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, source: DecodeError) -> Self {
        Self::Decode {
            path: path.into(),
            source,
        }
    }
}
