//! Connection state and the connection record

use crate::sequence::{ReceiveWindow, SendWindow, SequenceNumber};
use crate::settings::TransportSettings;
use crate::timers::{RepeatCounter, Timer};
use knx_core::IndividualAddress;
use std::fmt;
use std::time::Instant;

/// Transport connection state
///
/// # State Transitions
/// ```text
/// Closed   -> OpenIdle (connect request accepted)
/// OpenIdle -> OpenWait (queued response sent)
/// OpenWait -> OpenIdle (matching ack received)
/// OpenIdle/OpenWait -> Closed (disconnect, protocol violation or timeout)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection (initial state)
    #[default]
    Closed,
    /// Connected, no response outstanding
    OpenIdle,
    /// Connected, one sequenced response sent and awaiting its ack
    OpenWait,
}

impl ConnectionState {
    /// Whether a connection to a peer exists
    pub fn is_open(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Closed => "CLOSED",
            ConnectionState::OpenIdle => "OPEN_IDLE",
            ConnectionState::OpenWait => "OPEN_WAIT",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single point-to-point connection of this device
///
/// Apart from `state`, every field is meaningless while closed and is
/// reinitialised by [`Connection::open`].
#[derive(Debug, Clone)]
pub struct Connection {
    pub(crate) state: ConnectionState,
    pub(crate) peer: Option<IndividualAddress>,
    pub(crate) send_window: SendWindow,
    pub(crate) receive_window: ReceiveWindow,
    pub(crate) connection_timer: Timer,
    pub(crate) ack_timer: Timer,
    pub(crate) repeats: RepeatCounter,
}

impl Connection {
    pub fn new(settings: &TransportSettings) -> Self {
        Self {
            state: ConnectionState::Closed,
            peer: None,
            send_window: SendWindow::new(),
            receive_window: ReceiveWindow::new(),
            connection_timer: Timer::new(settings.connection_timeout),
            ack_timer: Timer::new(settings.ack_timeout),
            repeats: RepeatCounter::new(settings.max_repetitions),
        }
    }

    /// Open a connection to `peer` with both sequence counters at zero
    pub fn open(&mut self, peer: IndividualAddress, now: Instant) {
        self.state = ConnectionState::OpenIdle;
        self.peer = Some(peer);
        self.send_window.reset();
        self.receive_window.reset();
        self.connection_timer.start(now);
        self.ack_timer.stop();
        self.repeats.reset();
    }

    /// Return to `Closed`, invalidating all timers
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.peer = None;
        self.connection_timer.stop();
        self.ack_timer.stop();
        self.repeats.reset();
    }

    /// Record connection activity
    pub fn touch(&mut self, now: Instant) {
        self.connection_timer.start(now);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connected peer, `None` while closed
    pub fn peer(&self) -> Option<IndividualAddress> {
        if self.state.is_open() { self.peer } else { None }
    }

    /// Whether `address` is the connected peer
    pub fn is_peer(&self, address: IndividualAddress) -> bool {
        self.peer() == Some(address)
    }

    pub fn send_sequence(&self) -> SequenceNumber {
        self.send_window.current()
    }

    pub fn receive_sequence(&self) -> SequenceNumber {
        self.receive_window.expected()
    }

    pub fn receive_window(&self) -> &ReceiveWindow {
        &self.receive_window
    }

    pub fn send_window(&self) -> &SendWindow {
        &self.send_window
    }

    /// Whether another repetition of the outstanding response is allowed
    pub fn can_repeat(&self) -> bool {
        self.repeats.can_repeat()
    }

    pub fn repeat_count(&self) -> u8 {
        self.repeats.count()
    }

    pub fn is_idle_expired(&self, now: Instant) -> bool {
        self.state.is_open() && self.connection_timer.is_expired(now)
    }

    pub fn is_ack_expired(&self, now: Instant) -> bool {
        self.state == ConnectionState::OpenWait && self.ack_timer.is_expired(now)
    }
}
