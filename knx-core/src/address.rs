//! KNX individual addresses

use crate::error::{KnxError, KnxResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Textual form "area.line.device", e.g. "1.1.5"
static ADDRESS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,2})\.(\d{1,2})\.(\d{1,3})\s*$").expect("address pattern is valid")
});

/// Individual (physical) address of a device on the bus
///
/// A 16-bit value split into a 4-bit area, a 4-bit line and an 8-bit device
/// number. Point-to-point traffic is always addressed with an individual
/// address, multicast traffic uses group addresses which this stack routes
/// to the application without interpreting them.
///
/// # Wire Format
/// ```text
/// | area (4) | line (4) | device (8) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IndividualAddress(u16);

impl IndividualAddress {
    /// Create an address from its raw 16-bit value
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Create an address from its area, line and device parts
    ///
    /// # Errors
    /// Returns `KnxError::InvalidData` if area or line exceed 15
    pub fn from_parts(area: u8, line: u8, device: u8) -> KnxResult<Self> {
        if area > 0x0F || line > 0x0F {
            return Err(KnxError::InvalidData(format!(
                "Address part out of range: area={}, line={} (max 15)",
                area, line
            )));
        }
        Ok(Self(((area as u16) << 12) | ((line as u16) << 8) | device as u16))
    }

    /// Decode an address from two big-endian bytes
    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }

    /// Encode the address as two big-endian bytes
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Raw 16-bit value
    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn area(self) -> u8 {
        ((self.0 >> 12) & 0x0F) as u8
    }

    pub fn line(self) -> u8 {
        ((self.0 >> 8) & 0x0F) as u8
    }

    pub fn device(self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> KnxResult<Self> {
        let captures = ADDRESS_PATTERN
            .captures(s)
            .ok_or_else(|| KnxError::InvalidData(format!("Invalid individual address: {}", s)))?;

        let part = |index: usize| -> KnxResult<u8> {
            captures[index]
                .parse::<u8>()
                .map_err(|_| KnxError::InvalidData(format!("Invalid address part in: {}", s)))
        };

        Self::from_parts(part(1)?, part(2)?, part(3)?)
    }
}

impl From<u16> for IndividualAddress {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl TryFrom<String> for IndividualAddress {
    type Error = KnxError;

    fn try_from(value: String) -> KnxResult<Self> {
        value.parse()
    }
}

impl From<IndividualAddress> for String {
    fn from(address: IndividualAddress) -> Self {
        address.to_string()
    }
}
