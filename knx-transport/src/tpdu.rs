//! Transport control field (TPCI) encoding/decoding

use crate::sequence::SequenceNumber;
use knx_core::{KnxError, KnxResult};
use std::fmt;

/// Bit 7: connection control frame
const CONTROL_FLAG: u8 = 0b1000_0000;
/// Bit 6: frame carries a sequence number
const SEQUENCED_FLAG: u8 = 0b0100_0000;
/// Bits 2-5: sequence number
const SEQUENCE_MASK: u8 = 0b0011_1100;
const SEQUENCE_SHIFT: u8 = 2;
/// Bits 0-1: control code, or the top APCI bits of a data frame
const CODE_MASK: u8 = 0b0000_0011;

pub const T_CONNECT: u8 = 0x80;
pub const T_DISCONNECT: u8 = 0x81;
pub const T_ACK: u8 = 0xC2;
pub const T_NACK: u8 = 0xC3;

/// Decoded transport protocol data unit header
///
/// # Control Octet
/// ```text
/// | ctrl | seqd | seq (4) | code (2) |
/// ```
/// - `ctrl=1, seqd=0`: connect (code 00) or disconnect (code 01), sequence 0
/// - `ctrl=1, seqd=1`: ack (code 10) or nack (code 11) carrying a sequence
/// - `ctrl=0, seqd=1`: connected data, code holds the APCI high bits
/// - `ctrl=0, seqd=0`: unconnected data, code holds the APCI high bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tpdu {
    Connect,
    Disconnect,
    Ack(SequenceNumber),
    Nack(SequenceNumber),
    DataConnected {
        sequence: SequenceNumber,
        apci_high: u8,
    },
    DataUnconnected {
        apci_high: u8,
    },
}

impl Tpdu {
    /// Decode a TPCI octet
    ///
    /// # Errors
    /// Returns `KnxError::Protocol` for control octets that are not exactly
    /// connect, disconnect, ack or nack
    pub fn decode(tpci: u8) -> KnxResult<Self> {
        let sequence = SequenceNumber::new((tpci & SEQUENCE_MASK) >> SEQUENCE_SHIFT);
        let code = tpci & CODE_MASK;

        if (tpci & CONTROL_FLAG) == 0 {
            return Ok(if (tpci & SEQUENCED_FLAG) != 0 {
                Tpdu::DataConnected {
                    sequence,
                    apci_high: code,
                }
            } else {
                Tpdu::DataUnconnected { apci_high: code }
            });
        }

        match tpci {
            T_CONNECT => Ok(Tpdu::Connect),
            T_DISCONNECT => Ok(Tpdu::Disconnect),
            _ if (tpci & !SEQUENCE_MASK) == T_ACK => Ok(Tpdu::Ack(sequence)),
            _ if (tpci & !SEQUENCE_MASK) == T_NACK => Ok(Tpdu::Nack(sequence)),
            _ => Err(KnxError::Protocol(format!(
                "Unknown transport control field: 0x{:02X}",
                tpci
            ))),
        }
    }

    /// Encode to a TPCI octet
    pub fn encode(&self) -> u8 {
        let sequence_bits = |sequence: SequenceNumber| sequence.value() << SEQUENCE_SHIFT;
        match *self {
            Tpdu::Connect => T_CONNECT,
            Tpdu::Disconnect => T_DISCONNECT,
            Tpdu::Ack(sequence) => T_ACK | sequence_bits(sequence),
            Tpdu::Nack(sequence) => T_NACK | sequence_bits(sequence),
            Tpdu::DataConnected {
                sequence,
                apci_high,
            } => SEQUENCED_FLAG | sequence_bits(sequence) | (apci_high & CODE_MASK),
            Tpdu::DataUnconnected { apci_high } => apci_high & CODE_MASK,
        }
    }

    /// Whether this is a connection control frame
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Tpdu::Connect | Tpdu::Disconnect | Tpdu::Ack(_) | Tpdu::Nack(_)
        )
    }
}

impl fmt::Display for Tpdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tpdu::Connect => write!(f, "T_CONNECT"),
            Tpdu::Disconnect => write!(f, "T_DISCONNECT"),
            Tpdu::Ack(sequence) => write!(f, "T_ACK {}", sequence),
            Tpdu::Nack(sequence) => write!(f, "T_NACK {}", sequence),
            Tpdu::DataConnected { sequence, .. } => write!(f, "T_DATA_CONNECTED {}", sequence),
            Tpdu::DataUnconnected { .. } => write!(f, "T_DATA_INDIVIDUAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_control_frames() {
        assert_eq!(Tpdu::decode(0x80).unwrap(), Tpdu::Connect);
        assert_eq!(Tpdu::decode(0x81).unwrap(), Tpdu::Disconnect);
        assert_eq!(Tpdu::decode(0xC2).unwrap(), Tpdu::Ack(SequenceNumber::new(0)));
        assert_eq!(Tpdu::decode(0xC6).unwrap(), Tpdu::Ack(SequenceNumber::new(1)));
        assert_eq!(Tpdu::decode(0xFE).unwrap(), Tpdu::Ack(SequenceNumber::new(15)));
        assert_eq!(Tpdu::decode(0xC3).unwrap(), Tpdu::Nack(SequenceNumber::new(0)));
        assert_eq!(Tpdu::decode(0xFF).unwrap(), Tpdu::Nack(SequenceNumber::new(15)));
    }

    #[test]
    fn test_decode_unknown_control_frames() {
        for tpci in [0x82, 0x83, 0x84, 0xC0, 0xC1, 0xBC] {
            assert!(Tpdu::decode(tpci).is_err(), "0x{:02X} should be rejected", tpci);
        }
    }

    #[test]
    fn test_decode_data_frames() {
        assert_eq!(
            Tpdu::decode(0x43).unwrap(),
            Tpdu::DataConnected {
                sequence: SequenceNumber::new(0),
                apci_high: 3
            }
        );
        assert_eq!(
            Tpdu::decode(0x46).unwrap(),
            Tpdu::DataConnected {
                sequence: SequenceNumber::new(1),
                apci_high: 2
            }
        );
        assert_eq!(Tpdu::decode(0x01).unwrap(), Tpdu::DataUnconnected { apci_high: 1 });
    }

    #[test]
    fn test_encode_acknowledgements() {
        assert_eq!(Tpdu::Ack(SequenceNumber::new(1)).encode(), 0xC6);
        assert_eq!(Tpdu::Nack(SequenceNumber::new(2)).encode(), 0xCB);
        assert_eq!(Tpdu::Disconnect.encode(), 0x81);
        assert!(Tpdu::Nack(SequenceNumber::new(2)).is_control());
        assert!(!Tpdu::DataUnconnected { apci_high: 0 }.is_control());
    }
}
