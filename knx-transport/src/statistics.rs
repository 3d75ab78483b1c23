//! Transport layer statistics collection

/// Transport layer counters
///
/// Updated by [`crate::TransportLayer4`] while it processes frames and
/// polls. Useful for diagnosing a noisy bus or a misbehaving peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStatistics {
    /// Frames addressed to this device that were processed
    pub frames_received: u64,
    /// All frames handed to the link
    pub frames_sent: u64,
    /// Connect/disconnect/ack/nack frames sent
    pub control_frames_sent: u64,
    /// Connected and unconnected responses sent (first transmission only)
    pub responses_sent: u64,
    /// Retransmissions of an unacknowledged response
    pub repetitions: u64,
    /// Duplicate data frames that were re-acknowledged
    pub duplicates: u64,
    /// Nacks sent for out-of-window data
    pub naks_sent: u64,
    /// Malformed frames and unknown control fields
    pub frames_rejected: u64,
    /// Connect attempts from an address other than the peer
    pub intrusions: u64,
    /// Connections closed for any reason
    pub disconnects: u64,
    /// Inactivity and acknowledgement timeouts
    pub timeouts: u64,
    /// Link-layer repetitions of an already processed frame
    pub link_repeats_ignored: u64,
}

impl TransportStatistics {
    /// Create a statistics record with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Count a processed inbound frame
    pub fn increment_frames_received(&mut self) {
        self.frames_received += 1;
    }

    /// Count a control frame handed to the link
    pub fn increment_control_frames_sent(&mut self) {
        self.frames_sent += 1;
        self.control_frames_sent += 1;
    }

    /// Count the first transmission of a response
    pub fn increment_responses_sent(&mut self) {
        self.frames_sent += 1;
        self.responses_sent += 1;
    }

    /// Count a retransmitted response
    pub fn increment_repetitions(&mut self) {
        self.frames_sent += 1;
        self.repetitions += 1;
    }

    /// Count a re-acknowledged duplicate
    pub fn increment_duplicates(&mut self) {
        self.duplicates += 1;
    }

    /// Count a nack sent for an out-of-window frame
    pub fn increment_naks_sent(&mut self) {
        self.naks_sent += 1;
    }

    /// Count a malformed or unknown frame
    pub fn increment_frames_rejected(&mut self) {
        self.frames_rejected += 1;
    }

    /// Count a connect attempt from a foreign address
    pub fn increment_intrusions(&mut self) {
        self.intrusions += 1;
    }

    /// Count a closed connection
    pub fn increment_disconnects(&mut self) {
        self.disconnects += 1;
    }

    /// Count an inactivity or ack timeout
    pub fn increment_timeouts(&mut self) {
        self.timeouts += 1;
    }

    /// Count an ignored link-layer repetition
    pub fn increment_link_repeats_ignored(&mut self) {
        self.link_repeats_ignored += 1;
    }

    /// Percentage of received frames that were rejected
    ///
    /// Returns 0.0 if nothing has been received.
    pub fn error_rate(&self) -> f64 {
        let total = self.frames_received + self.frames_rejected;
        if total == 0 {
            0.0
        } else {
            (self.frames_rejected as f64 / total as f64) * 100.0
        }
    }
}
