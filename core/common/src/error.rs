//! Common error types for kryptr.

use thiserror::Error;

/// Top-level error type for kryptr operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required key material or input is missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed PEM, base64 or blob layout.
    #[error("Format error: {0}")]
    Format(String),

    /// Key could not be parsed or unlocked.
    #[error("Key error: {0}")]
    Key(String),

    /// Private key does not belong to the key pair that wrapped the salt.
    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    /// Key generation or cipher construction failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Wrapped key material could not be decrypted.
    #[error("Decryption error: {0}")]
    Decrypt(String),

    /// AEAD tag verification failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A long-running operation was cancelled before it completed.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
