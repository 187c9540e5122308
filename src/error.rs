use thiserror::Error;

/// Library result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to callers of the dispatch queue.
///
/// Only contract violations and explicit limits surface here. Failures inside
/// handlers are reported through the queue's failure channel instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("queue is shut down")]
    Closed,

    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("config: {0}")]
    Config(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Event store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("append failed: {0}")]
    Append(String),

    #[error("load failed: {0}")]
    Load(String),

    #[error("clear failed: {0}")]
    Clear(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(Error::Closed.to_string(), "queue is shut down");
        assert_eq!(
            Error::QueueFull { capacity: 8 }.to_string(),
            "queue is full (capacity 8)"
        );
        let err: Error = StoreError::Append("poisoned".into()).into();
        assert_eq!(err.to_string(), "store: append failed: poisoned");
        let err: Error = StoreError::Clear("poisoned".into()).into();
        assert_eq!(err.to_string(), "store: clear failed: poisoned");
    }
}
