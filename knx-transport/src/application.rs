//! Contract exposed to the application layer

use crate::sequence::SequenceNumber;
use knx_core::{IndividualAddress, Priority};
use knx_link::Telegram;

/// An accepted request handed to the application layer
///
/// `command` is the 10-bit APCI: the two low bits of the TPCI octet
/// followed by the first payload octet. `data` holds the remaining octets,
/// including the low six bits of the first octet for short services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRequest {
    pub command: u16,
    pub source: IndividualAddress,
    /// Sequence number of connected data, `None` for unconnected data
    pub sequence: Option<SequenceNumber>,
    pub priority: Priority,
    pub data: Vec<u8>,
}

impl ApplicationRequest {
    /// Build a request from the TPCI octet and the octets that follow it
    ///
    /// Returns `None` if the payload is empty (a data frame without APCI).
    pub fn from_frame(
        telegram: &Telegram,
        sequence: Option<SequenceNumber>,
    ) -> Option<Self> {
        let (first, rest) = telegram.payload().split_first()?;
        let command = (((telegram.tpci() & 0x03) as u16) << 8) | *first as u16;
        Some(Self {
            command,
            source: telegram.source(),
            sequence,
            priority: telegram.priority(),
            data: rest.to_vec(),
        })
    }
}

/// Response produced by the application layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationResponse {
    /// 10-bit APCI of the response
    pub command: u16,
    pub data: Vec<u8>,
}

impl ApplicationResponse {
    pub fn new(command: u16, data: Vec<u8>) -> Self {
        Self {
            command: command & 0x03FF,
            data,
        }
    }

    /// High two APCI bits, carried in the TPCI octet
    pub fn apci_high(&self) -> u8 {
        ((self.command >> 8) & 0x03) as u8
    }

    /// Octets following the TPCI: low APCI octet, then data
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + self.data.len());
        payload.push((self.command & 0xFF) as u8);
        payload.extend_from_slice(&self.data);
        payload
    }
}

/// Application layer collaborator
///
/// `process_application_command` is invoked once per accepted request.
/// Duplicates that are only re-acknowledged never reach it. Returning
/// `Some` asks the transport layer to answer the requester.
#[cfg_attr(test, mockall::automock)]
pub trait ApplicationLayer {
    fn process_application_command(
        &mut self,
        request: &ApplicationRequest,
    ) -> Option<ApplicationResponse>;

    /// Group-addressed telegram
    fn process_group(&mut self, _telegram: &Telegram) {}

    /// Broadcast telegram
    fn process_broadcast(&mut self, _telegram: &Telegram) {}

    /// The connection to `peer` was closed locally or by the peer
    fn connection_closed(&mut self, _peer: IndividualAddress) {}
}
