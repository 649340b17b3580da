//! Error types for faces-player
//!
//! Every variant is handled at the boundary where it occurs: the play loop
//! degrades to "no guess", "skip teach" or "skip round" instead of aborting.

use crate::types::ImageHash;
use std::time::Duration;
use thiserror::Error;

/// Main error type for faces-player
#[derive(Error, Debug)]
pub enum Error {
    /// Lookup on a hash the observation pipeline never registered
    #[error("{0} not in hash table")]
    HashNotFound(ImageHash),

    /// Teach attempted on a hash that was never seen
    #[error("Unknown hash {0}, refusing to teach")]
    UnknownHashOnTeach(ImageHash),

    /// No photo arrived for the question within the bound
    #[error("No image observed for question {index} within {timeout:?}")]
    CorrelationTimeout { index: u32, timeout: Duration },

    /// Hash computation failed (empty or undecodable image)
    #[error("Identifier error: {0}")]
    Identifier(String),

    /// Declared content type is not an accepted image kind
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// The quiz offered nothing to choose from
    #[error("Question {0} has no candidate answers")]
    NoCandidates(u32),

    /// Browser automation / quiz driver failure
    #[error("Driver error: {0}")]
    Driver(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hash table or manifest (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from faces-common
    #[error(transparent)]
    Common(#[from] faces_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using faces-player Error
pub type Result<T> = std::result::Result<T, Error>;
