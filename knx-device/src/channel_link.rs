//! Link backed by tokio channels

use bytes::Bytes;
use knx_core::{IndividualAddress, KnxError, KnxResult};
use knx_link::BusLink;
use tokio::sync::mpsc;

/// Bus link that exchanges frames with the rest of the process over channels
///
/// Outbound frames are pushed to an unbounded channel, so a transmission
/// completes as soon as [`BusLink::send`] returns. The receive buffer holds
/// one frame at a time, filled by [`ChannelLink::deliver`] and released by
/// the transport layer.
#[derive(Debug)]
pub struct ChannelLink {
    own_address: IndividualAddress,
    outbound: mpsc::UnboundedSender<Bytes>,
    current: Option<Vec<u8>>,
}

impl ChannelLink {
    pub fn new(own_address: IndividualAddress, outbound: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            own_address,
            outbound,
            current: None,
        }
    }

    /// Put a frame into the receive buffer
    ///
    /// # Errors
    /// Returns `KnxError::SlotBusy` if the previous frame was not released yet
    pub fn deliver(&mut self, frame: Vec<u8>) -> KnxResult<()> {
        if self.current.is_some() {
            return Err(KnxError::SlotBusy("receive buffer occupied".to_string()));
        }
        self.current = Some(frame);
        Ok(())
    }

    /// Whether the receive buffer holds a frame
    pub fn has_frame(&self) -> bool {
        self.current.is_some()
    }
}

impl BusLink for ChannelLink {
    fn own_address(&self) -> IndividualAddress {
        self.own_address
    }

    fn is_idle(&self) -> bool {
        true
    }

    fn is_sending(&self) -> bool {
        false
    }

    fn send(&mut self, frame: &[u8]) -> KnxResult<()> {
        log::trace!("TX {:02X?}", frame);
        self.outbound
            .send(Bytes::copy_from_slice(frame))
            .map_err(|_| KnxError::Link("outbound channel closed".to_string()))
    }

    fn received(&self) -> Option<&[u8]> {
        self.current.as_deref()
    }

    fn discard_received(&mut self) {
        self.current = None;
    }
}
