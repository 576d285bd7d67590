//! Queue configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, QueueError};

/// Describes how to build a [`BoundedBlockingQueue`](crate::core::BoundedBlockingQueue).
///
/// The configuration is plain data so it can be loaded from JSON alongside the rest of an
/// application's settings.
///
/// # Examples
///
/// ```
/// use blockq_lib::{BoundedBlockingQueue, QueueConfig};
///
/// let config = QueueConfig::from_json_str(r#"{ "capacity": 16 }"#).unwrap();
/// let queue = BoundedBlockingQueue::<String>::from_config(&config).unwrap();
/// assert_eq!(queue.capacity(), 16);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum number of queued elements. `None` means unbounded.
    pub capacity: Option<usize>,
}

impl QueueConfig {
    /// A configuration for an unbounded queue.
    pub fn unbounded() -> Self {
        QueueConfig { capacity: None }
    }

    /// A configuration for a queue holding at most `capacity` elements.
    pub fn bounded(capacity: usize) -> Self {
        QueueConfig {
            capacity: Some(capacity),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: QueueConfig = serde_json::from_str(json)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks that the configuration describes a usable queue.
    pub fn validate(&self) -> Result<(), QueueError> {
        match self.capacity {
            Some(0) => Err(QueueError::InvalidArgument("capacity must be positive")),
            _ => Ok(()),
        }
    }
}
