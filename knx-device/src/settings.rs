//! Device configuration

use knx_core::{IndividualAddress, KnxError, KnxResult};
use knx_transport::settings::duration_ms;
use knx_transport::TransportSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between two transport layer polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Settings of a device run loop
///
/// ```json
/// {
///   "own_address": "1.1.10",
///   "poll_interval": 5,
///   "transport": { "connection_timeout": 6000, "ack_timeout": 3000 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Individual address, written as `area.line.device`
    pub own_address: IndividualAddress,
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    pub transport: TransportSettings,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            // 15.15.255, the address of an unprogrammed device
            own_address: IndividualAddress::new(0xFFFF),
            poll_interval: DEFAULT_POLL_INTERVAL,
            transport: TransportSettings::default(),
        }
    }
}

impl DeviceSettings {
    /// # Errors
    /// Returns `KnxError::InvalidData` for a zero poll interval or invalid
    /// transport settings
    pub fn validate(&self) -> KnxResult<()> {
        if self.poll_interval.is_zero() {
            return Err(KnxError::InvalidData(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        self.transport.validate()
    }

    /// Parse and validate settings from JSON text
    ///
    /// # Errors
    /// Returns `KnxError::Serialization` for malformed JSON or a bad address,
    /// or the validation error
    pub fn from_json(text: &str) -> KnxResult<Self> {
        let settings: Self = serde_json::from_str(text)
            .map_err(|e| KnxError::Serialization(format!("Invalid device settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }
}
