//! Connection state machine
//!
//! [`decide`] is the complete `(state, event) -> (state, action)` table of
//! the connection-oriented transport layer. It performs no I/O and does not
//! mutate anything; [`crate::TransportLayer4`] executes the returned
//! [`Action`] and then moves to [`Decision::next_state`].
//!
//! | Event | Condition | Action | Next |
//! |---|---|---|---|
//! | connect | closed | A01 | OpenIdle |
//! | connect | open, from peer | A00 | unchanged |
//! | connect | open, other sender | A10 | unchanged |
//! | disconnect | from peer | A05 | Closed |
//! | ack | OpenWait, peer, expected seq | A08 | OpenIdle |
//! | ack | OpenWait, peer, other seq | A06 | Closed |
//! | nack | OpenWait, peer, expected seq, repeats left | A09 | OpenWait |
//! | nack | OpenWait, peer, expected seq, no repeats left | A06 | Closed |
//! | data | open, peer, seq == recv, OpenIdle, queue has room | A02 | unchanged |
//! | data | open, peer, seq == recv - 1 | A03 | unchanged |
//! | data | open, peer, any other seq | A04 | unchanged |
//! | idle timeout | open | A06 | Closed |
//! | response ready | OpenIdle | A07 | OpenWait |
//! | ack timeout | OpenWait, repeats left | A09 | OpenWait |
//! | ack timeout | OpenWait, no repeats left | A06 | Closed |
//! | user disconnect | open | A06 | Closed |
//!
//! Every other combination is A00 with the state unchanged.

use crate::sequence::{SequenceCheck, SequenceNumber};
use crate::state::{Connection, ConnectionState};
use knx_core::IndividualAddress;
use std::fmt;

/// Input to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Connect { from: IndividualAddress },
    Disconnect { from: IndividualAddress },
    Ack { from: IndividualAddress, sequence: SequenceNumber },
    Nack { from: IndividualAddress, sequence: SequenceNumber },
    Data { from: IndividualAddress, sequence: SequenceNumber },
    /// The connection timer expired
    IdleTimeout,
    /// The primary response is ready to be sent
    ResponseReady,
    /// The ack timer of the outstanding response expired
    AckTimeout,
    /// The local user requested a disconnect
    UserDisconnect,
}

/// Action to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A00: ignore the event
    Nothing,
    /// A01: open the connection to `peer`
    Connect { peer: IndividualAddress },
    /// A02: ack `sequence`, advance the receive window, dispatch the request
    AckAndDispatch { sequence: SequenceNumber },
    /// A03: ack a duplicate again without dispatching it
    ReAck { sequence: SequenceNumber },
    /// A04: nack an out-of-window frame
    SendNack { sequence: SequenceNumber },
    /// A05: close without sending anything (peer disconnected)
    DisconnectLocal,
    /// A06: send a disconnect to the peer and close
    DisconnectAndClose,
    /// A07: send the primary queued response
    SendQueuedResponse,
    /// A08: advance the send window and release the acknowledged response
    AdvanceSendSeq,
    /// A09: repeat the outstanding response unchanged
    RepeatLast,
    /// A10: send a disconnect to `address`, leaving the connection untouched
    DisconnectOther { address: IndividualAddress },
}

impl Action {
    /// Action number as used in the KNX transport layer tables
    pub fn code(&self) -> &'static str {
        match self {
            Action::Nothing => "A00",
            Action::Connect { .. } => "A01",
            Action::AckAndDispatch { .. } => "A02",
            Action::ReAck { .. } => "A03",
            Action::SendNack { .. } => "A04",
            Action::DisconnectLocal => "A05",
            Action::DisconnectAndClose => "A06",
            Action::SendQueuedResponse => "A07",
            Action::AdvanceSendSeq => "A08",
            Action::RepeatLast => "A09",
            Action::DisconnectOther { .. } => "A10",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.code(), self)
    }
}

/// Facts outside the connection record that influence a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionContext {
    /// Whether the response queue can take another response
    pub queue_has_room: bool,
}

impl Default for DecisionContext {
    fn default() -> Self {
        Self {
            queue_has_room: true,
        }
    }
}

/// Result of [`decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub next_state: ConnectionState,
    pub action: Action,
}

impl Decision {
    fn stay(connection: &Connection, action: Action) -> Self {
        Self {
            next_state: connection.state(),
            action,
        }
    }

    fn nothing(connection: &Connection) -> Self {
        Self::stay(connection, Action::Nothing)
    }

    fn to(next_state: ConnectionState, action: Action) -> Self {
        Self { next_state, action }
    }
}

/// Resolve an event against the current connection
pub fn decide(connection: &Connection, context: DecisionContext, event: &Event) -> Decision {
    use ConnectionState::{Closed, OpenIdle, OpenWait};

    let state = connection.state();
    match *event {
        Event::Connect { from } => match state {
            Closed => Decision::to(OpenIdle, Action::Connect { peer: from }),
            _ if connection.is_peer(from) => Decision::nothing(connection),
            _ => Decision::stay(connection, Action::DisconnectOther { address: from }),
        },

        Event::Disconnect { from } => {
            if state.is_open() && connection.is_peer(from) {
                Decision::to(Closed, Action::DisconnectLocal)
            } else {
                Decision::nothing(connection)
            }
        }

        Event::Ack { from, sequence } => {
            if state != OpenWait || !connection.is_peer(from) {
                Decision::nothing(connection)
            } else if connection.send_window().matches(sequence) {
                Decision::to(OpenIdle, Action::AdvanceSendSeq)
            } else {
                Decision::to(Closed, Action::DisconnectAndClose)
            }
        }

        Event::Nack { from, sequence } => {
            if state != OpenWait
                || !connection.is_peer(from)
                || !connection.send_window().matches(sequence)
            {
                Decision::nothing(connection)
            } else if connection.can_repeat() {
                Decision::stay(connection, Action::RepeatLast)
            } else {
                Decision::to(Closed, Action::DisconnectAndClose)
            }
        }

        Event::Data { from, sequence } => {
            if !state.is_open() || !connection.is_peer(from) {
                return Decision::nothing(connection);
            }
            match connection.receive_window().check(sequence) {
                SequenceCheck::Expected if state == OpenIdle && context.queue_has_room => {
                    Decision::stay(connection, Action::AckAndDispatch { sequence })
                }
                SequenceCheck::Expected => Decision::nothing(connection),
                SequenceCheck::Duplicate => Decision::stay(connection, Action::ReAck { sequence }),
                SequenceCheck::OutOfWindow => {
                    Decision::stay(connection, Action::SendNack { sequence })
                }
            }
        }

        Event::IdleTimeout | Event::UserDisconnect if state.is_open() => {
            Decision::to(Closed, Action::DisconnectAndClose)
        }

        Event::ResponseReady if state == OpenIdle => {
            Decision::to(OpenWait, Action::SendQueuedResponse)
        }

        Event::AckTimeout if state == OpenWait => {
            if connection.can_repeat() {
                Decision::stay(connection, Action::RepeatLast)
            } else {
                Decision::to(Closed, Action::DisconnectAndClose)
            }
        }

        Event::IdleTimeout | Event::UserDisconnect | Event::ResponseReady | Event::AckTimeout => {
            Decision::nothing(connection)
        }
    }
}
