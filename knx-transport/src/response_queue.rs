//! Pipelined connected responses

use bytes::Bytes;
use knx_core::{IndividualAddress, KnxError, KnxResult, Priority};
use std::collections::VecDeque;

use crate::application::ApplicationResponse;

/// Number of responses that can be pending at once
pub const RESPONSE_QUEUE_CAPACITY: usize = 2;

/// State of a response slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseSlotState {
    #[default]
    Free,
    /// Staged; the ack for its request has not left the control slot yet
    WaitingForAckSent,
    /// Ready to be sent by the poll loop
    WaitingForLoop,
    /// Sent, waiting for the peer's ack
    Sending,
}

#[derive(Debug, Clone)]
struct PendingResponse {
    state: ResponseSlotState,
    destination: IndividualAddress,
    priority: Priority,
    response: ApplicationResponse,
    /// Encoded frame, kept for repetitions once sent
    frame: Option<Bytes>,
}

/// Two-deep queue of connected responses
///
/// The front entry is the primary response: the one attached to the send
/// sequence number. A second response can be staged while the primary is
/// still in flight and is promoted when the primary completes.
#[derive(Debug, Default)]
pub struct ResponseQueue {
    entries: VecDeque<PendingResponse>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(RESPONSE_QUEUE_CAPACITY),
        }
    }

    /// Stage a response produced by an accepted request
    ///
    /// # Errors
    /// Returns `KnxError::SlotBusy` if both slots are occupied
    pub fn stage(
        &mut self,
        destination: IndividualAddress,
        priority: Priority,
        response: ApplicationResponse,
    ) -> KnxResult<()> {
        if self.is_full() {
            return Err(KnxError::SlotBusy("response queue is full".to_string()));
        }
        self.entries.push_back(PendingResponse {
            state: ResponseSlotState::WaitingForAckSent,
            destination,
            priority,
            response,
            frame: None,
        });
        Ok(())
    }

    /// The ack preceding every staged response has been sent
    pub fn ack_sent(&mut self) {
        for entry in self.entries.iter_mut() {
            if entry.state == ResponseSlotState::WaitingForAckSent {
                entry.state = ResponseSlotState::WaitingForLoop;
            }
        }
    }

    /// Whether the primary response is ready to be sent
    pub fn primary_ready(&self) -> bool {
        self.primary_state() == ResponseSlotState::WaitingForLoop
    }

    /// Destination, priority and content of the primary response
    pub fn primary(&self) -> Option<(IndividualAddress, Priority, &ApplicationResponse)> {
        self.entries
            .front()
            .map(|entry| (entry.destination, entry.priority, &entry.response))
    }

    /// Record that the primary response was handed to the link
    pub fn mark_primary_sending(&mut self, frame: Bytes) {
        if let Some(entry) = self.entries.front_mut() {
            entry.state = ResponseSlotState::Sending;
            entry.frame = Some(frame);
        }
    }

    /// Encoded frame of the primary response, once sent
    pub fn primary_frame(&self) -> Option<&Bytes> {
        self.entries.front().and_then(|entry| entry.frame.as_ref())
    }

    /// Drop the acknowledged primary response, promoting the secondary
    pub fn complete_primary(&mut self) {
        self.entries.pop_front();
    }

    /// Drop every pending response
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= RESPONSE_QUEUE_CAPACITY
    }

    pub fn has_room(&self) -> bool {
        !self.is_full()
    }

    pub fn primary_state(&self) -> ResponseSlotState {
        self.entries
            .front()
            .map_or(ResponseSlotState::Free, |entry| entry.state)
    }

    pub fn secondary_state(&self) -> ResponseSlotState {
        self.entries
            .get(1)
            .map_or(ResponseSlotState::Free, |entry| entry.state)
    }
}
