//! Checksum calculation for standard frames

use knx_core::{KnxError, KnxResult};

const INITIAL_CHECKSUM: u8 = 0xFF;

/// Telegram checksum calculator
///
/// The checksum octet closing every standard frame is the inverted XOR
/// ("odd parity") of all preceding octets.
pub struct ChecksumCalc {
    value: u8,
}

impl ChecksumCalc {
    /// Create a new checksum calculator
    pub fn new() -> Self {
        Self {
            value: INITIAL_CHECKSUM,
        }
    }

    /// Reset to the initial value
    pub fn reset(&mut self) {
        self.value = INITIAL_CHECKSUM;
    }

    /// Update the checksum with a single byte
    pub fn update(&mut self, data: u8) {
        self.value ^= data;
    }

    /// Update the checksum with multiple bytes
    pub fn update_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.update(byte);
        }
    }

    /// Current checksum value
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Compute the checksum of a complete byte slice
    pub fn compute(data: &[u8]) -> u8 {
        let mut calc = Self::new();
        calc.update_bytes(data);
        calc.value()
    }

    /// Validate a frame whose last byte is the checksum
    ///
    /// # Errors
    /// Returns `KnxError::FrameInvalid` if the frame is empty or the
    /// checksum does not match
    pub fn validate(frame: &[u8]) -> KnxResult<()> {
        let (checksum, body) = frame
            .split_last()
            .ok_or_else(|| KnxError::FrameInvalid("Empty frame".to_string()))?;
        let expected = Self::compute(body);
        if *checksum != expected {
            return Err(KnxError::FrameInvalid(format!(
                "Checksum mismatch: expected 0x{:02X}, got 0x{:02X}",
                expected, checksum
            )));
        }
        Ok(())
    }
}

impl Default for ChecksumCalc {
    fn default() -> Self {
        Self::new()
    }
}
