//! Error types for stage-advance.
//!
//! Errors split into two families: transient ones that should make the
//! trigger transport redeliver, and permanent ones that redelivery cannot
//! fix. [`Error::is_retryable`] is the single place that decides which is which.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed trigger: {0}")]
    Decode(String),

    #[error("work item not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("lost the claim race {attempts} times in a row")]
    Contended { attempts: u32 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("publish of {item_id} to {channel} failed: {reason}")]
    Publish {
        channel: String,
        item_id: String,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the trigger that produced this error should be redelivered.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Contended { .. }
                | Error::StoreUnavailable(_)
                | Error::Database(_)
                | Error::Publish { .. }
                | Error::Io(_)
                | Error::Other(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
