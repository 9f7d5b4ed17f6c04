//! Wire-level error type.

use thiserror::Error;

/// A frame that could not be decoded or encoded as a game message.
#[derive(Debug, Error)]
pub enum WireError {
    /// The frame was not valid JSON, or did not match the expected shape.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame was JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The frame has no usable `kind` tag.
    #[error("message has no kind")]
    MissingKind,

    /// The `kind` tag is present but empty or not a string.
    #[error("message kind must be a non-empty string")]
    InvalidKind,
}
