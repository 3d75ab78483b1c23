//! The single outbound control-frame slot

use bytes::Bytes;
use knx_core::{KnxError, KnxResult};
use knx_link::BusLink;

/// Control slot state
///
/// ```text
/// Free -> Acquired (try_acquire) -> Sending (transmit) -> Free (link done)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlSlotState {
    #[default]
    Free,
    Acquired,
    Sending,
}

/// Exclusive right to write the control slot
///
/// Only [`ControlSlot::try_acquire`] creates a token and it is consumed by
/// [`ControlSlot::transmit`], so at most one control frame can be in flight
/// at a time.
#[derive(Debug)]
#[must_use = "an acquired control slot must be transmitted"]
pub struct SlotToken {
    _private: (),
}

/// Single-frame buffer for connect, disconnect, ack and nack frames
#[derive(Debug, Default)]
pub struct ControlSlot {
    state: ControlSlotState,
}

impl ControlSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ControlSlotState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == ControlSlotState::Free
    }

    /// Free the slot once the link has finished transmitting its frame
    pub fn refresh<L: BusLink + ?Sized>(&mut self, link: &L) {
        if self.state == ControlSlotState::Sending && !link.is_sending() {
            self.state = ControlSlotState::Free;
        }
    }

    /// Acquire the slot without blocking
    ///
    /// Checks the slot and the link at most `poll_limit` times. The checks
    /// run back to back without yielding, so a limit above 1 only helps with
    /// links whose sending flag is updated behind `&self`, such as a flag
    /// cleared from an interrupt or another thread.
    ///
    /// # Errors
    /// Returns `KnxError::SlotBusy` if the slot or the link stayed occupied
    pub fn try_acquire<L: BusLink + ?Sized>(
        &mut self,
        link: &L,
        poll_limit: u32,
    ) -> KnxResult<SlotToken> {
        let mut link_sending = false;
        for _ in 0..poll_limit.max(1) {
            self.refresh(link);
            link_sending = link.is_sending();
            if self.is_free() && !link_sending {
                self.state = ControlSlotState::Acquired;
                return Ok(SlotToken { _private: () });
            }
        }
        Err(KnxError::SlotBusy(format!(
            "control slot is {:?}, link sending: {}",
            self.state, link_sending
        )))
    }

    /// Hand the frame to the link and keep it until the link is done
    ///
    /// # Errors
    /// Returns the link error; the slot is freed in that case
    pub fn transmit<L: BusLink + ?Sized>(
        &mut self,
        _token: SlotToken,
        link: &mut L,
        frame: Bytes,
    ) -> KnxResult<()> {
        if let Err(e) = link.send(&frame) {
            self.state = ControlSlotState::Free;
            return Err(e);
        }
        self.state = ControlSlotState::Sending;
        Ok(())
    }
}
