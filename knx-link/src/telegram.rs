//! Standard-frame telegram structure and encoding/decoding

use crate::checksum::ChecksumCalc;
use bytes::{BufMut, Bytes, BytesMut};
use knx_core::{IndividualAddress, KnxError, KnxResult, Priority};
use std::fmt;

/// Smallest valid frame: header (6) + TPCI (1) + checksum (1)
pub const MIN_TELEGRAM_SIZE: usize = 8;

/// Maximum number of octets following the TPCI octet
pub const MAX_PAYLOAD_LENGTH: usize = 15;

/// Largest standard frame including the checksum
pub const MAX_TELEGRAM_SIZE: usize = MIN_TELEGRAM_SIZE + MAX_PAYLOAD_LENGTH;

/// Routing counter used for telegrams originated by this device
pub const DEFAULT_ROUTING_COUNTER: u8 = 6;

const CONTROL_FIXED_MASK: u8 = 0b1101_0011;
const CONTROL_FIXED_BITS: u8 = 0b1001_0000;
const CONTROL_NOT_REPEATED: u8 = 0b0010_0000;
const NPCI_GROUP_FLAG: u8 = 0b1000_0000;

/// Destination of a telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Point-to-point traffic to one device
    Individual(IndividualAddress),
    /// Multicast traffic to a group address
    Group(u16),
    /// Destination address 0
    Broadcast,
}

/// A standard frame as exchanged with the link collaborator
///
/// # Frame Layout
/// ```text
/// octet 0     control       bit 5 clear = repeated, bits 2-3 priority
/// octet 1-2   source        individual address
/// octet 3-4   destination   individual or group address
/// octet 5     NPCI          bit 7 group flag, bits 4-6 routing counter, bits 0-3 length
/// octet 6     TPCI          transport control field
/// octet 7..   payload       APCI and data, `length` octets
/// last        checksum
/// ```
///
/// The TPCI octet is carried opaquely here; the transport layer interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    priority: Priority,
    repeated: bool,
    source: IndividualAddress,
    destination: Destination,
    routing_counter: u8,
    tpci: u8,
    payload: Vec<u8>,
}

impl Telegram {
    /// Create a new telegram with the default routing counter
    ///
    /// # Errors
    /// Returns `KnxError::FrameInvalid` if the payload exceeds
    /// [`MAX_PAYLOAD_LENGTH`]
    pub fn new(
        priority: Priority,
        source: IndividualAddress,
        destination: Destination,
        tpci: u8,
        payload: Vec<u8>,
    ) -> KnxResult<Self> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(KnxError::FrameInvalid(format!(
                "Payload too long: {} octets (max {})",
                payload.len(),
                MAX_PAYLOAD_LENGTH
            )));
        }
        Ok(Self {
            priority,
            repeated: false,
            source,
            destination,
            routing_counter: DEFAULT_ROUTING_COUNTER,
            tpci,
            payload,
        })
    }

    /// Decode a telegram from bytes, checksum included
    ///
    /// # Errors
    /// Returns `KnxError::FrameInvalid` if the frame is too short, the
    /// control octet is not a standard frame, the declared length does not
    /// match or the checksum is wrong
    pub fn decode(frame: &[u8]) -> KnxResult<Self> {
        if frame.len() < MIN_TELEGRAM_SIZE {
            return Err(KnxError::FrameInvalid(format!(
                "Frame too short: {} octets",
                frame.len()
            )));
        }

        let control = frame[0];
        if (control & CONTROL_FIXED_MASK) != CONTROL_FIXED_BITS {
            return Err(KnxError::FrameInvalid(format!(
                "Not a standard frame: control 0x{:02X}",
                control
            )));
        }

        let npci = frame[5];
        let length = (npci & 0x0F) as usize;
        let expected = MIN_TELEGRAM_SIZE + length;
        if frame.len() != expected {
            return Err(KnxError::FrameInvalid(format!(
                "Length mismatch: header declares {} octets, got {}",
                expected,
                frame.len()
            )));
        }

        ChecksumCalc::validate(frame)?;

        let source = IndividualAddress::from_bytes([frame[1], frame[2]]);
        let raw_destination = u16::from_be_bytes([frame[3], frame[4]]);
        let destination = if raw_destination == 0 {
            Destination::Broadcast
        } else if (npci & NPCI_GROUP_FLAG) != 0 {
            Destination::Group(raw_destination)
        } else {
            Destination::Individual(IndividualAddress::new(raw_destination))
        };

        Ok(Self {
            priority: Priority::from_bits(control >> 2),
            repeated: (control & CONTROL_NOT_REPEATED) == 0,
            source,
            destination,
            routing_counter: (npci >> 4) & 0x07,
            tpci: frame[6],
            payload: frame[7..frame.len() - 1].to_vec(),
        })
    }

    /// Encode the telegram to bytes, checksum included
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MIN_TELEGRAM_SIZE + self.payload.len());

        let mut control = CONTROL_FIXED_BITS | (self.priority.to_bits() << 2);
        if !self.repeated {
            control |= CONTROL_NOT_REPEATED;
        }
        buf.put_u8(control);
        buf.put_slice(&self.source.to_bytes());

        let (raw_destination, group_flag) = match self.destination {
            Destination::Individual(address) => (address.raw(), 0),
            Destination::Group(address) => (address, NPCI_GROUP_FLAG),
            Destination::Broadcast => (0, NPCI_GROUP_FLAG),
        };
        buf.put_u16(raw_destination);
        buf.put_u8(group_flag | ((self.routing_counter & 0x07) << 4) | self.payload.len() as u8);
        buf.put_u8(self.tpci);
        buf.put_slice(&self.payload);

        let checksum = ChecksumCalc::compute(&buf);
        buf.put_u8(checksum);
        buf.freeze()
    }

    /// Compare with another telegram ignoring the repeat flag
    ///
    /// Used to recognise a link-layer repetition of a telegram that was
    /// already processed.
    pub fn same_content(&self, other: &Telegram) -> bool {
        self.priority == other.priority
            && self.source == other.source
            && self.destination == other.destination
            && self.routing_counter == other.routing_counter
            && self.tpci == other.tpci
            && self.payload == other.payload
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Whether the control octet marks this frame as a repetition
    pub fn is_repeated(&self) -> bool {
        self.repeated
    }

    pub fn set_repeated(&mut self, repeated: bool) {
        self.repeated = repeated;
    }

    pub fn source(&self) -> IndividualAddress {
        self.source
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn routing_counter(&self) -> u8 {
        self.routing_counter
    }

    /// Transport control octet
    pub fn tpci(&self) -> u8 {
        self.tpci
    }

    /// Octets following the TPCI
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encoded length including the checksum
    pub fn length(&self) -> usize {
        MIN_TELEGRAM_SIZE + self.payload.len()
    }
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let destination = match self.destination {
            Destination::Individual(address) => address.to_string(),
            Destination::Group(address) => {
                format!("{}/{}/{}", (address >> 11) & 0x1F, (address >> 8) & 0x07, address & 0xFF)
            }
            Destination::Broadcast => "broadcast".to_string(),
        };
        write!(
            f,
            "Telegram: src={}, dst={}, prio={:?}, tpci=0x{:02X}, len={}",
            self.source,
            destination,
            self.priority,
            self.tpci,
            self.length()
        )
    }
}
