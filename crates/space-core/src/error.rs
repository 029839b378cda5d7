//! Error types for space-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Low-level errors: canonical encoding, cryptography, malformed wire data.
///
/// This is distinct from [`crate::acceptance::RejectReason`], which is the
/// higher-level taxonomy returned by the acceptance pipeline and sync layer.
#[derive(Debug, Error)]
pub enum Error {
    /// JSON (de)serialization error, including JCS canonicalization.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A computed content-address didn't match the transmitted one.
    #[error("id mismatch: computed {computed} != transmitted {transmitted}")]
    IdMismatch { computed: String, transmitted: String },

    /// Ed25519 signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// A public key was the wrong length or otherwise malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// A signature was the wrong length or otherwise malformed.
    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    /// An identifier string didn't parse (wrong prefix, bad base64, wrong length).
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A float destined for JCS was NaN or infinite.
    #[error("non-finite float in canonical payload")]
    NonFiniteFloat,

    /// A netstring was truncated or had a malformed length prefix.
    #[error("malformed netstring: {0}")]
    MalformedNetstring(String),

    /// A required field was absent.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(String),

    /// A `RoomLog` implementation failed to read or write its backing store.
    #[error("storage error: {0}")]
    Storage(String),
}
