use thiserror::Error;

/// Error types for the KDBX container engine
#[derive(Debug, Error)]
pub enum KdbxError {
    /// Malformed call input (e.g. wrong buffer size, missing engine state)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// File format error (signature mismatch, unknown header field, truncation)
    #[error("Database format error: {0}")]
    Format(String),

    /// Credential store misuse (e.g. composite hash over an empty store)
    #[error("Credential error: {0}")]
    Credential(String),

    /// Integrity check failure. Deliberately does not distinguish wrong
    /// credentials from a corrupt file.
    #[error("Integrity verification failed: {0}")]
    Integrity(String),

    /// Payload decompression failure
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// Document tree parse/serialize failure
    #[error("Could not parse database document: {0}")]
    Parse(String),

    /// Underlying cryptographic primitive failure
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KdbxError>;
