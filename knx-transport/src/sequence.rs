//! Sequence numbers and acknowledgement windows

use std::fmt;

/// Sequence numbers are 4-bit and wrap from 15 to 0
const SEQUENCE_MODULUS: u8 = 16;

/// 4-bit rolling sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    pub const ZERO: SequenceNumber = SequenceNumber(0);

    /// Create a sequence number, keeping only the low four bits
    pub const fn new(value: u8) -> Self {
        Self(value & 0x0F)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The following sequence number (15 wraps to 0)
    pub fn next(self) -> Self {
        Self((self.0 + 1) % SEQUENCE_MODULUS)
    }

    /// The preceding sequence number (0 wraps to 15)
    pub fn previous(self) -> Self {
        Self((self.0 + SEQUENCE_MODULUS - 1) % SEQUENCE_MODULUS)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of a received sequence number relative to the receive window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// New in-order frame
    Expected,
    /// Repetition of the last accepted frame
    Duplicate,
    /// Neither of the above; the peer is out of sync
    OutOfWindow,
}

/// Receive window
///
/// Tracks the next expected sequence number. The duplicate-detection window
/// is exactly one frame wide: only the expected number and its predecessor
/// are distinguishable.
#[derive(Debug, Clone, Default)]
pub struct ReceiveWindow {
    expected: SequenceNumber,
}

impl ReceiveWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a received sequence number
    pub fn check(&self, sequence: SequenceNumber) -> SequenceCheck {
        if sequence == self.expected {
            SequenceCheck::Expected
        } else if sequence == self.expected.previous() {
            SequenceCheck::Duplicate
        } else {
            SequenceCheck::OutOfWindow
        }
    }

    /// Accept the expected frame and advance the window
    ///
    /// # Returns
    /// `true` if `sequence` was the expected one and the window moved,
    /// `false` otherwise (window unchanged)
    pub fn accept(&mut self, sequence: SequenceNumber) -> bool {
        if sequence != self.expected {
            return false;
        }
        self.expected = self.expected.next();
        true
    }

    /// Next expected sequence number
    pub fn expected(&self) -> SequenceNumber {
        self.expected
    }

    pub fn reset(&mut self) {
        self.expected = SequenceNumber::ZERO;
    }
}

/// Send window
///
/// Holds the sequence number attached to the outstanding (or next)
/// sequenced response. It only advances on a positive acknowledgement that
/// carries exactly this number.
#[derive(Debug, Clone, Default)]
pub struct SendWindow {
    current: SequenceNumber,
}

impl SendWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number for the outstanding response
    pub fn current(&self) -> SequenceNumber {
        self.current
    }

    /// Whether an acknowledgement carries the outstanding number
    pub fn matches(&self, sequence: SequenceNumber) -> bool {
        sequence == self.current
    }

    /// Apply a positive acknowledgement
    ///
    /// # Returns
    /// `true` if the acknowledgement matched and the window advanced
    pub fn acknowledge(&mut self, sequence: SequenceNumber) -> bool {
        if !self.matches(sequence) {
            return false;
        }
        self.current = self.current.next();
        true
    }

    pub fn reset(&mut self) {
        self.current = SequenceNumber::ZERO;
    }
}
