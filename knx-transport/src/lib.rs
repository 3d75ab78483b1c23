//! Transport layer 4 for the KNX twisted-pair stack
//!
//! This crate implements the connection-oriented transport layer: one
//! point-to-point connection to a single peer at a time, 4-bit sequence
//! numbers with positive/negative acknowledgement, a single outbound
//! control slot, a two-deep response queue and the inactivity and
//! acknowledgement timers.
//!
//! - [`sequence`]: sequence numbers and the send/receive windows
//! - [`tpdu`]: transport control field (TPCI) codec
//! - [`control_slot`]: the single outbound control-frame slot
//! - [`response_queue`]: pipelined connected responses
//! - [`timers`]: inactivity and acknowledgement timers
//! - [`state`]: connection state and the connection record
//! - [`machine`]: the pure `(state, event) -> (state, action)` table
//! - [`layer`]: the driver tying everything to the link and application

pub mod application;
pub mod control_slot;
pub mod layer;
pub mod machine;
pub mod response_queue;
pub mod sequence;
pub mod settings;
pub mod state;
pub mod statistics;
pub mod timers;
pub mod tpdu;

pub use application::{ApplicationLayer, ApplicationRequest, ApplicationResponse};
pub use control_slot::{ControlSlot, ControlSlotState, SlotToken};
pub use knx_core::{KnxError, KnxResult};
pub use layer::{FrameDisposition, TransportLayer4};
pub use machine::{decide, Action, Decision, DecisionContext, Event};
pub use response_queue::{ResponseQueue, ResponseSlotState, RESPONSE_QUEUE_CAPACITY};
pub use sequence::{ReceiveWindow, SendWindow, SequenceCheck, SequenceNumber};
pub use settings::TransportSettings;
pub use state::{Connection, ConnectionState};
pub use statistics::TransportStatistics;
pub use timers::{RepeatCounter, Timer};
pub use tpdu::Tpdu;
