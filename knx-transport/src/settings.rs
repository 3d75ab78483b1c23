//! Transport layer configuration

use knx_core::{KnxError, KnxResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default inactivity timeout of an open connection
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(6000);

/// Default time to wait for the acknowledgement of a connected response
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default number of retransmissions before the connection is dropped
pub const DEFAULT_MAX_REPETITIONS: u8 = 3;

/// Transport layer timing parameters
///
/// Durations are (de)serialized as integer milliseconds:
///
/// ```json
/// { "connection_timeout": 6000, "ack_timeout": 3000, "max_repetitions": 3 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Idle time after which an open connection is closed
    #[serde(with = "duration_ms")]
    pub connection_timeout: Duration,
    /// Time to wait for the ack of a sent response before repeating it
    #[serde(with = "duration_ms")]
    pub ack_timeout: Duration,
    /// Repetitions of an unacknowledged response before disconnecting
    pub max_repetitions: u8,
    /// Attempts a non-blocking caller makes to acquire the control slot
    ///
    /// Only matters for links whose sending flag can change between two
    /// reads without a call into the link.
    pub control_slot_poll_limit: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_repetitions: DEFAULT_MAX_REPETITIONS,
            control_slot_poll_limit: 1,
        }
    }
}

impl TransportSettings {
    /// Check that the settings describe a working configuration
    ///
    /// # Errors
    /// Returns `KnxError::InvalidData` if a timeout or the poll limit is zero
    pub fn validate(&self) -> KnxResult<()> {
        if self.connection_timeout.is_zero() {
            return Err(KnxError::InvalidData(
                "connection_timeout must be greater than zero".to_string(),
            ));
        }
        if self.ack_timeout.is_zero() {
            return Err(KnxError::InvalidData(
                "ack_timeout must be greater than zero".to_string(),
            ));
        }
        if self.control_slot_poll_limit == 0 {
            return Err(KnxError::InvalidData(
                "control_slot_poll_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate settings from JSON text
    ///
    /// Missing fields take their default value.
    ///
    /// # Errors
    /// Returns `KnxError::Serialization` for malformed JSON, or the
    /// validation error
    pub fn from_json(text: &str) -> KnxResult<Self> {
        let settings: Self = serde_json::from_str(text)
            .map_err(|e| KnxError::Serialization(format!("Invalid transport settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Serialize a `Duration` as whole milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
