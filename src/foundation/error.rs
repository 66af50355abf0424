use std::path::PathBuf;

use crate::transfer::remote::RemoteError;

/// Convenience result type used across layerforge.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum ForgeError {
    /// Invalid configuration or input data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A single item failed to composite or encode.
    #[error("render error for item {index}: {message}")]
    ItemRender {
        /// 1-based item index.
        index: u64,
        /// Human-readable cause.
        message: String,
    },

    /// A batch directory has no metadata file.
    #[error("metadata missing: {}", .0.display())]
    MetadataMissing(PathBuf),

    /// A remote call failed; see [`RemoteError::is_retryable`] for the transient/terminal split.
    #[error("transfer error: {0}")]
    Transfer(#[from] RemoteError),

    /// Reading or writing a progress file failed.
    #[error("checkpoint io error: {0}")]
    CheckpointIo(String),

    /// A stage could not start at all (output root unreadable, remote root unresolvable, ...).
    #[error("setup error: {0}")]
    Setup(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ForgeError {
    /// Build a [`ForgeError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ForgeError::ItemRender`] value.
    pub fn item_render(index: u64, msg: impl Into<String>) -> Self {
        Self::ItemRender {
            index,
            message: msg.into(),
        }
    }

    /// Build a [`ForgeError::CheckpointIo`] value.
    pub fn checkpoint_io(msg: impl Into<String>) -> Self {
        Self::CheckpointIo(msg.into())
    }

    /// Build a [`ForgeError::Setup`] value.
    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup(msg.into())
    }

    /// Whether retrying the failed operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transfer(e) if e.is_retryable())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
