//! Error types for the cache and concurrency control layer

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the shared store or the record store.
///
/// Business rejections on the seckill path (out of stock, duplicate order, ...)
/// are not errors; see [`crate::seckill::Rejection`].
#[derive(Error, Debug)]
pub enum Error {
    /// Shared key-value store unreachable or refusing commands
    #[error("Shared store unavailable: {0}")]
    StoreUnavailable(String),

    /// Value stored under a key has the wrong type for the command
    #[error("Wrong value type for key {key}: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// Stored counter could not be parsed as an integer
    #[error("Value at key {key} is not an integer")]
    NotAnInteger { key: String },

    /// Durable record store failure
    #[error("Record store error: {0}")]
    RecordStore(String),

    /// Serialization error for cached payloads and events
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The daily sequence counter no longer fits into the counter bits
    #[error("Sequence counter overflow for partition {partition}: {count}")]
    SequenceOverflow { partition: String, count: i64 },

    /// The clock reports a time before the ID epoch
    #[error("Clock is before the ID epoch: {0}")]
    ClockBeforeEpoch(i64),

    /// Invalid argument supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true when retrying the whole operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::RecordStore(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::StoreUnavailable("down".into()).is_transient());
        assert!(Error::RecordStore("timeout".into()).is_transient());
        assert!(!Error::InvalidArgument("id".into()).is_transient());
        assert!(!Error::SequenceOverflow {
            partition: "order".into(),
            count: 1 << 33
        }
        .is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = Error::WrongType {
            key: "bloom:shop".into(),
            expected: "bitmap",
        };
        assert_eq!(
            err.to_string(),
            "Wrong value type for key bloom:shop: expected bitmap"
        );
    }
}
