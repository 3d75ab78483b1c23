//! In-memory link implementation

use crate::link::BusLink;
use crate::telegram::Telegram;
use bytes::Bytes;
use knx_core::{IndividualAddress, KnxError, KnxResult};
use std::collections::VecDeque;

/// In-memory bus link
///
/// Keeps inbound frames in a FIFO and records every transmitted frame.
/// Transmissions either complete immediately (`auto_complete`) or stay
/// pending until [`MemoryLink::complete_transmission`] is called, which
/// models the interrupt-driven link finishing a frame.
#[derive(Debug)]
pub struct MemoryLink {
    own_address: IndividualAddress,
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Bytes>,
    sending: bool,
    bus_busy: bool,
    auto_complete: bool,
}

impl MemoryLink {
    /// Create a link whose transmissions complete immediately
    pub fn new(own_address: IndividualAddress) -> Self {
        Self {
            own_address,
            inbound: VecDeque::new(),
            sent: Vec::new(),
            sending: false,
            bus_busy: false,
            auto_complete: true,
        }
    }

    /// Create a link whose transmissions stay pending until completed
    pub fn with_manual_completion(own_address: IndividualAddress) -> Self {
        let mut link = Self::new(own_address);
        link.auto_complete = false;
        link
    }

    /// Queue a raw inbound frame
    pub fn inject(&mut self, frame: impl Into<Vec<u8>>) {
        self.inbound.push_back(frame.into());
    }

    /// Number of inbound frames not yet discarded
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Finish the running transmission
    pub fn complete_transmission(&mut self) {
        self.sending = false;
    }

    /// Mark the bus as occupied by foreign traffic
    pub fn set_bus_busy(&mut self, busy: bool) {
        self.bus_busy = busy;
    }

    /// All frames transmitted so far
    pub fn sent_frames(&self) -> &[Bytes] {
        &self.sent
    }

    /// Remove and return the transmitted frames
    pub fn take_sent(&mut self) -> Vec<Bytes> {
        std::mem::take(&mut self.sent)
    }

    /// Remove and decode the transmitted frames
    ///
    /// # Errors
    /// Returns the first decoding error
    pub fn take_sent_telegrams(&mut self) -> KnxResult<Vec<Telegram>> {
        self.take_sent()
            .iter()
            .map(|frame| Telegram::decode(frame))
            .collect()
    }
}

impl BusLink for MemoryLink {
    fn own_address(&self) -> IndividualAddress {
        self.own_address
    }

    fn is_idle(&self) -> bool {
        !self.sending && !self.bus_busy
    }

    fn is_sending(&self) -> bool {
        self.sending
    }

    fn send(&mut self, frame: &[u8]) -> KnxResult<()> {
        if self.sending {
            return Err(KnxError::SlotBusy(
                "A transmission is still running".to_string(),
            ));
        }
        log::trace!("MemoryLink TX {:02X?}", frame);
        self.sent.push(Bytes::copy_from_slice(frame));
        self.sending = !self.auto_complete;
        Ok(())
    }

    fn received(&self) -> Option<&[u8]> {
        self.inbound.front().map(|frame| frame.as_slice())
    }

    fn discard_received(&mut self) {
        self.inbound.pop_front();
    }
}
