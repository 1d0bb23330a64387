//! Error types for the sigil CLI

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SigilError>;

#[derive(Error, Debug)]
pub enum SigilError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("interactive input failed: {0}")]
    Input(String),

    #[error("empty passphrase rejected by user")]
    PassphraseRejected,

    #[error("{0}")]
    Validation(String),

    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("could not unlock secret key: {0}")]
    KeyUnlock(String),

    #[error("keystore push failed: {0}")]
    Publish(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
