//! Contract consumed from the data link layer

use knx_core::{IndividualAddress, KnxResult};

/// Link collaborator interface
///
/// The data link layer turns frames into bus signals, performs collision
/// detection and offers exactly one outbound transmission slot. The
/// transport layer drives it cooperatively from a single run loop:
///
/// - `send` starts an asynchronous transmission. Only one frame may be
///   outstanding; callers must check [`BusLink::is_sending`] first.
/// - Inbound frames are exposed one at a time through
///   [`BusLink::received`]. The receive buffer stays owned by the link
///   until [`BusLink::discard_received`] releases it, so callers copy the
///   frame before discarding.
pub trait BusLink {
    /// Individual address of this device
    fn own_address(&self) -> IndividualAddress;

    /// Whether the bus is idle (nothing being received or transmitted)
    fn is_idle(&self) -> bool;

    /// Whether a transmission started by [`BusLink::send`] is still running
    fn is_sending(&self) -> bool;

    /// Start transmitting a complete frame (checksum included)
    ///
    /// # Errors
    /// Returns `KnxError::SlotBusy` if a transmission is still running, or
    /// `KnxError::Link` if the link cannot accept the frame
    fn send(&mut self, frame: &[u8]) -> KnxResult<()>;

    /// The validated frame waiting in the receive buffer, if any
    fn received(&self) -> Option<&[u8]>;

    /// Release the receive buffer after the frame has been consumed
    fn discard_received(&mut self);
}
