//! Queue configuration.

use crate::error::Error;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pending length at which the backpressure signal fires by default.
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024;

/// What [`shutdown`](crate::EventDispatchQueue::shutdown) does with events
/// that have not started processing yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownMode {
    /// Process everything already queued, then stop.
    #[default]
    Drain,
    /// Drop everything not yet started; the in-flight event still completes.
    Discard,
}

/// Configuration for one [`EventDispatchQueue`](crate::EventDispatchQueue).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Hard limit on pending events. `None` means unbounded.
    pub capacity: Option<usize>,
    /// Pending length that triggers the backpressure signal. `None` disables it.
    pub high_water_mark: Option<usize>,
    /// Limit for a single handler invocation; exceeding it counts as a failure.
    #[serde(skip_serializing_if = "Option::is_none", with = "millis")]
    pub handler_timeout: Option<Duration>,
    /// Default behaviour of `shutdown()`.
    pub shutdown: ShutdownMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            high_water_mark: Some(DEFAULT_HIGH_WATER_MARK),
            handler_timeout: None,
            shutdown: ShutdownMode::Drain,
        }
    }
}

impl QueueConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_high_water_mark(mut self, mark: usize) -> Self {
        self.high_water_mark = Some(mark);
        self
    }

    pub fn without_high_water_mark(mut self) -> Self {
        self.high_water_mark = None;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    pub fn with_shutdown(mut self, mode: ShutdownMode) -> Self {
        self.shutdown = mode;
        self
    }

    /// Reject settings the queue cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == Some(0) {
            return Err(Error::Config("capacity must be greater than zero".into()));
        }
        if self.high_water_mark == Some(0) {
            return Err(Error::Config(
                "high water mark must be greater than zero".into(),
            ));
        }
        if let (Some(cap), Some(mark)) = (self.capacity, self.high_water_mark) {
            if mark > cap {
                return Err(Error::Config(format!(
                    "high water mark {mark} exceeds capacity {cap}"
                )));
            }
        }
        if self.handler_timeout == Some(Duration::ZERO) {
            return Err(Error::Config("handler timeout must be non-zero".into()));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_u64(d.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms: Option<u64> = Option::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
