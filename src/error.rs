//! Error types shared by every module of the crate.

use crate::exchange::Party;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the key-exchange core, the room relay and the narration schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// `mod_pow` was asked to reduce modulo zero, or a modulus is too small to draw a key from.
    #[error("Invalid modulus: {0}")]
    InvalidModulus(String),

    /// No catalog entry carries the requested name.
    #[error("Parameter set not found: {0}")]
    ParameterSetNotFound(String),

    /// The party already holds a private key for the current parameters.
    #[error("Private key already generated for {0}")]
    PrivateKeyAlreadyGenerated(Party),

    /// A supplied private key lies outside `[1, p - 2]`.
    #[error("Private key out of range: {0}")]
    PrivateKeyOutOfRange(String),

    /// Text could not be encoded or decoded as JSON.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A decoded record is well-formed JSON but violates the session schema.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// No room is stored under the identifier.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// The room already has two participants.
    #[error("Room is full: {0}")]
    RoomFull(String),

    /// The participant may not perform this action in the current room state.
    #[error("Not permitted: {0}")]
    NotPermitted(String),

    /// The replication store failed.
    #[error("Relay error: {0}")]
    Relay(String),

    /// An attack scenario failed input validation.
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    /// The text-generation service failed or returned an unusable answer.
    #[error("Narration error: {0}")]
    Narration(String),
}

impl Error {
    /// Check if the failure belongs to an external collaborator and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Relay(_) | Error::Narration(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(err.to_string())
    }
}
