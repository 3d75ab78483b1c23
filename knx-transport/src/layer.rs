//! Transport layer driver
//!
//! [`TransportLayer4`] owns the connection record, the control slot and the
//! response queue. It is driven from a single cooperative run loop through
//! two entry points:
//!
//! - [`TransportLayer4::process_received`] handles the frame waiting in the
//!   link's receive buffer
//! - [`TransportLayer4::poll`] fires timeouts and sends queued responses
//!
//! Neither entry point blocks. When an outbound frame cannot be built
//! because the control slot or the link is occupied, inbound frames are
//! left in the receive buffer and poll duties are postponed to the next
//! call.

use crate::application::{ApplicationLayer, ApplicationRequest};
use crate::control_slot::ControlSlot;
use crate::machine::{decide, Action, Decision, DecisionContext, Event};
use crate::response_queue::ResponseQueue;
use crate::sequence::SequenceNumber;
use crate::settings::TransportSettings;
use crate::state::{Connection, ConnectionState};
use crate::statistics::TransportStatistics;
use crate::tpdu::Tpdu;
use knx_core::{IndividualAddress, KnxError, KnxResult, Priority};
use knx_link::{BusLink, Destination, Telegram};
use std::time::Instant;

/// What happened to an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Processed or dropped; the receive buffer can be released
    Consumed,
    /// Not processed because the outbound path is occupied; retry later
    Deferred,
}

/// Connection-oriented transport layer
pub struct TransportLayer4<L: BusLink, A: ApplicationLayer> {
    link: L,
    application: A,
    settings: TransportSettings,
    connection: Connection,
    control_slot: ControlSlot,
    responses: ResponseQueue,
    statistics: TransportStatistics,
    /// Last processed telegram, for the link-layer repeat filter
    last_telegram: Option<Telegram>,
}

impl<L: BusLink, A: ApplicationLayer> TransportLayer4<L, A> {
    /// Create a transport layer in the `Closed` state
    ///
    /// # Errors
    /// Returns `KnxError::InvalidData` if the settings are invalid
    pub fn new(link: L, application: A, settings: TransportSettings) -> KnxResult<Self> {
        settings.validate()?;
        Ok(Self {
            link,
            application,
            connection: Connection::new(&settings),
            settings,
            control_slot: ControlSlot::new(),
            responses: ResponseQueue::new(),
            statistics: TransportStatistics::new(),
            last_telegram: None,
        })
    }

    /// Handle the frame waiting in the link's receive buffer
    ///
    /// The frame is copied before processing. The receive buffer is released
    /// unless the frame was deferred.
    ///
    /// # Returns
    /// `None` if no frame was waiting
    ///
    /// # Errors
    /// Returns the link error if an outbound frame could not be sent; the
    /// inbound frame is released in that case
    pub fn process_received(&mut self, now: Instant) -> KnxResult<Option<FrameDisposition>> {
        let frame = match self.link.received() {
            Some(frame) => frame.to_vec(),
            None => return Ok(None),
        };

        match self.handle_frame(&frame, now) {
            Ok(FrameDisposition::Deferred) => Ok(Some(FrameDisposition::Deferred)),
            Ok(FrameDisposition::Consumed) => {
                self.link.discard_received();
                Ok(Some(FrameDisposition::Consumed))
            }
            Err(e) => {
                self.link.discard_received();
                Err(e)
            }
        }
    }

    /// Handle one inbound frame (checksum included)
    ///
    /// Malformed frames and unknown control fields are logged, counted and
    /// consumed without touching the connection.
    ///
    /// # Errors
    /// Returns the link error if an outbound frame could not be sent
    pub fn handle_frame(&mut self, frame: &[u8], now: Instant) -> KnxResult<FrameDisposition> {
        let telegram = match Telegram::decode(frame) {
            Ok(telegram) => telegram,
            Err(e) => {
                log::warn!("Dropping malformed frame {:02X?}: {}", frame, e);
                self.statistics.increment_frames_rejected();
                return Ok(FrameDisposition::Consumed);
            }
        };

        if telegram.is_repeated()
            && self
                .last_telegram
                .as_ref()
                .is_some_and(|last| last.same_content(&telegram))
        {
            log::trace!("Ignoring link repetition: {}", telegram);
            self.statistics.increment_link_repeats_ignored();
            return Ok(FrameDisposition::Consumed);
        }

        match telegram.destination() {
            Destination::Broadcast => {
                self.application.process_broadcast(&telegram);
                self.last_telegram = Some(telegram);
                return Ok(FrameDisposition::Consumed);
            }
            Destination::Group(_) => {
                self.application.process_group(&telegram);
                self.last_telegram = Some(telegram);
                return Ok(FrameDisposition::Consumed);
            }
            Destination::Individual(address) if address != self.link.own_address() => {
                log::trace!("Frame for {} is not for us", address);
                return Ok(FrameDisposition::Consumed);
            }
            Destination::Individual(_) => {}
        }

        let tpdu = match Tpdu::decode(telegram.tpci()) {
            Ok(tpdu) => tpdu,
            Err(e) => {
                log::warn!("Dropping frame from {}: {}", telegram.source(), e);
                self.statistics.increment_frames_rejected();
                return Ok(FrameDisposition::Consumed);
            }
        };
        if !tpdu.is_control() && telegram.payload().is_empty() {
            log::warn!("Dropping {} from {} without APCI", tpdu, telegram.source());
            self.statistics.increment_frames_rejected();
            return Ok(FrameDisposition::Consumed);
        }

        self.control_slot.refresh(&self.link);
        if !self.outbound_ready() {
            log::trace!("Outbound path busy, deferring {}", tpdu);
            return Ok(FrameDisposition::Deferred);
        }

        log::debug!("RX {} from {} in {}", tpdu, telegram.source(), self.connection.state());
        self.statistics.increment_frames_received();
        self.last_telegram = Some(telegram.clone());

        let from = telegram.source();
        let event = match tpdu {
            Tpdu::DataUnconnected { .. } => {
                self.handle_unconnected(&telegram)?;
                return Ok(FrameDisposition::Consumed);
            }
            Tpdu::Connect => Event::Connect { from },
            Tpdu::Disconnect => Event::Disconnect { from },
            Tpdu::Ack(sequence) => Event::Ack { from, sequence },
            Tpdu::Nack(sequence) => Event::Nack { from, sequence },
            Tpdu::DataConnected { sequence, .. } => Event::Data { from, sequence },
        };
        self.dispatch(event, Some(&telegram), now)?;
        Ok(FrameDisposition::Consumed)
    }

    /// Periodic duties: inactivity timeout, queued responses, ack timeout
    ///
    /// Does nothing while the control slot or the link is occupied.
    ///
    /// # Errors
    /// Returns the link error if an outbound frame could not be sent
    pub fn poll(&mut self, now: Instant) -> KnxResult<()> {
        self.control_slot.refresh(&self.link);
        if self.control_slot.is_free() {
            self.responses.ack_sent();
        }
        if !self.outbound_ready() {
            return Ok(());
        }

        if self.connection.is_idle_expired(now) {
            log::warn!(
                "Connection to {:?} idle for {:?}, closing",
                self.connection.peer(),
                self.settings.connection_timeout
            );
            self.statistics.increment_timeouts();
            return self.dispatch(Event::IdleTimeout, None, now);
        }

        if self.connection.state() == ConnectionState::OpenIdle
            && self.responses.primary_ready()
            && self.link.is_idle()
        {
            return self.dispatch(Event::ResponseReady, None, now);
        }

        if self.connection.is_ack_expired(now) {
            log::debug!(
                "No ack for response {} (repetition {})",
                self.connection.send_sequence(),
                self.connection.repeat_count()
            );
            self.statistics.increment_timeouts();
            return self.dispatch(Event::AckTimeout, None, now);
        }

        Ok(())
    }

    /// Close the connection and send a disconnect to the peer
    ///
    /// # Errors
    /// Returns `KnxError::NotConnected` if there is no connection, or
    /// `KnxError::SlotBusy` if the control slot or the link is occupied
    pub fn disconnect(&mut self, now: Instant) -> KnxResult<()> {
        if !self.connection.state().is_open() {
            return Err(KnxError::NotConnected);
        }
        self.control_slot.refresh(&self.link);
        if !self.outbound_ready() {
            return Err(KnxError::SlotBusy(
                "cannot send disconnect while the link is sending".to_string(),
            ));
        }
        log::debug!("User disconnect from {:?}", self.connection.peer());
        self.dispatch(Event::UserDisconnect, None, now)
    }

    fn outbound_ready(&self) -> bool {
        self.control_slot.is_free() && !self.link.is_sending()
    }

    fn dispatch(
        &mut self,
        event: Event,
        telegram: Option<&Telegram>,
        now: Instant,
    ) -> KnxResult<()> {
        let context = DecisionContext {
            queue_has_room: self.responses.has_room(),
        };
        let Decision { next_state, action } = decide(&self.connection, context, &event);
        let previous = self.connection.state();

        log::trace!("{:?} in {} -> {}", event, previous, action);
        self.execute(action, telegram, now)?;
        self.connection.state = next_state;

        if previous != next_state {
            log::debug!("Transport state {} -> {} ({})", previous, next_state, action.code());
        }
        Ok(())
    }

    fn execute(
        &mut self,
        action: Action,
        telegram: Option<&Telegram>,
        now: Instant,
    ) -> KnxResult<()> {
        match action {
            Action::Nothing => Ok(()),

            Action::Connect { peer } => {
                self.responses.clear();
                self.connection.open(peer, now);
                log::debug!("Connected to {}", peer);
                Ok(())
            }

            Action::AckAndDispatch { sequence } => {
                let telegram = telegram.ok_or_else(|| {
                    KnxError::Protocol("data event without a telegram".to_string())
                })?;
                let request = ApplicationRequest::from_frame(telegram, Some(sequence))
                    .ok_or_else(|| KnxError::FrameInvalid("data frame without APCI".to_string()))?;
                let peer = telegram.source();

                self.send_control(peer, Tpdu::Ack(sequence))?;
                self.connection.receive_window.accept(sequence);
                self.connection.touch(now);

                if let Some(response) = self.application.process_application_command(&request) {
                    self.responses.stage(peer, telegram.priority(), response)?;
                }
                Ok(())
            }

            Action::ReAck { sequence } => {
                log::debug!("Duplicate {}, acknowledging again", sequence);
                let peer = self.peer()?;
                self.send_control(peer, Tpdu::Ack(sequence))?;
                self.statistics.increment_duplicates();
                self.connection.touch(now);
                Ok(())
            }

            Action::SendNack { sequence } => {
                log::warn!(
                    "Sequence {} out of window (expected {})",
                    sequence,
                    self.connection.receive_sequence()
                );
                let peer = self.peer()?;
                self.send_control(peer, Tpdu::Nack(sequence))?;
                self.statistics.increment_naks_sent();
                Ok(())
            }

            Action::DisconnectLocal => {
                let peer = self.peer()?;
                log::debug!("Disconnected by {}", peer);
                self.close_connection(peer);
                Ok(())
            }

            Action::DisconnectAndClose => {
                let peer = self.peer()?;
                log::warn!("Closing connection to {}", peer);
                self.close_connection(peer);
                self.send_control(peer, Tpdu::Disconnect)
            }

            Action::SendQueuedResponse => self.send_queued_response(now),

            Action::AdvanceSendSeq => {
                let sequence = self.connection.send_sequence();
                self.connection.send_window.acknowledge(sequence);
                self.connection.ack_timer.stop();
                self.connection.repeats.reset();
                self.connection.touch(now);
                self.responses.complete_primary();
                log::debug!("Response {} acknowledged", sequence);
                Ok(())
            }

            Action::RepeatLast => {
                let frame = self.responses.primary_frame().cloned().ok_or_else(|| {
                    KnxError::Protocol("no outstanding response to repeat".to_string())
                })?;
                self.link.send(&frame)?;
                self.connection.repeats.increment();
                self.connection.ack_timer.start(now);
                self.connection.touch(now);
                self.statistics.increment_repetitions();
                log::debug!(
                    "Repeated response {} ({} of {})",
                    self.connection.send_sequence(),
                    self.connection.repeat_count(),
                    self.settings.max_repetitions
                );
                Ok(())
            }

            Action::DisconnectOther { address } => {
                log::warn!(
                    "Rejecting {} while connected to {:?}",
                    address,
                    self.connection.peer()
                );
                self.statistics.increment_intrusions();
                self.send_control(address, Tpdu::Disconnect)
            }
        }
    }

    fn peer(&self) -> KnxResult<IndividualAddress> {
        self.connection.peer().ok_or(KnxError::NotConnected)
    }

    fn close_connection(&mut self, peer: IndividualAddress) {
        self.responses.clear();
        self.connection.close();
        self.statistics.increment_disconnects();
        self.application.connection_closed(peer);
    }

    /// Send a connect/disconnect/ack/nack frame through the control slot
    fn send_control(&mut self, destination: IndividualAddress, tpdu: Tpdu) -> KnxResult<()> {
        let telegram = Telegram::new(
            Priority::System,
            self.link.own_address(),
            Destination::Individual(destination),
            tpdu.encode(),
            Vec::new(),
        )?;
        let token = self
            .control_slot
            .try_acquire(&self.link, self.settings.control_slot_poll_limit)?;
        log::trace!("TX {} to {}", tpdu, destination);
        self.control_slot
            .transmit(token, &mut self.link, telegram.encode())?;
        self.statistics.increment_control_frames_sent();
        Ok(())
    }

    fn send_queued_response(&mut self, now: Instant) -> KnxResult<()> {
        let sequence = self.connection.send_sequence();
        let (destination, priority, response) = self
            .responses
            .primary()
            .ok_or_else(|| KnxError::Protocol("no queued response".to_string()))?;
        let tpci = Tpdu::DataConnected {
            sequence,
            apci_high: response.apci_high(),
        }
        .encode();

        let telegram = match Telegram::new(
            priority,
            self.link.own_address(),
            Destination::Individual(destination),
            tpci,
            response.payload(),
        ) {
            Ok(telegram) => telegram,
            Err(e) => {
                log::warn!("Discarding response {:03X}: {}", response.command, e);
                self.responses.complete_primary();
                return Err(e);
            }
        };

        let frame = telegram.encode();
        self.link.send(&frame)?;
        self.responses.mark_primary_sending(frame);
        self.connection.ack_timer.start(now);
        self.connection.repeats.reset();
        self.connection.touch(now);
        self.statistics.increment_responses_sent();
        log::trace!("TX response {} to {}", sequence, destination);
        Ok(())
    }

    /// Answer unconnected data directly, bypassing the connection
    fn handle_unconnected(&mut self, telegram: &Telegram) -> KnxResult<()> {
        let request = ApplicationRequest::from_frame(telegram, None)
            .ok_or_else(|| KnxError::FrameInvalid("data frame without APCI".to_string()))?;
        let Some(response) = self.application.process_application_command(&request) else {
            return Ok(());
        };

        let reply = Telegram::new(
            telegram.priority(),
            self.link.own_address(),
            Destination::Individual(telegram.source()),
            Tpdu::DataUnconnected {
                apci_high: response.apci_high(),
            }
            .encode(),
            response.payload(),
        )?;
        self.link.send(&reply.encode())?;
        self.statistics.increment_responses_sent();
        Ok(())
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether a connection to a peer is open
    pub fn is_connected(&self) -> bool {
        self.connection.state().is_open()
    }

    /// Connected peer, `None` while closed
    pub fn connected_to(&self) -> Option<IndividualAddress> {
        self.connection.peer()
    }

    /// Sequence number of the next or outstanding response
    pub fn send_sequence(&self) -> SequenceNumber {
        self.connection.send_sequence()
    }

    /// Sequence number expected from the peer
    pub fn receive_sequence(&self) -> SequenceNumber {
        self.connection.receive_sequence()
    }

    /// Connection record with windows and timers
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Outbound control-frame slot
    pub fn control_slot(&self) -> &ControlSlot {
        &self.control_slot
    }

    /// Responses waiting for transmission or acknowledgement
    pub fn response_queue(&self) -> &ResponseQueue {
        &self.responses
    }

    /// Counters collected since creation or the last clear
    pub fn statistics(&self) -> &TransportStatistics {
        &self.statistics
    }

    /// Mutable counters, e.g. to clear them
    pub fn statistics_mut(&mut self) -> &mut TransportStatistics {
        &mut self.statistics
    }

    /// Settings the layer was created with
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// The underlying link
    pub fn link(&self) -> &L {
        &self.link
    }

    /// The underlying link, mutably
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// The application layer receiving requests
    pub fn application(&self) -> &A {
        &self.application
    }

    /// The application layer, mutably
    pub fn application_mut(&mut self) -> &mut A {
        &mut self.application
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{ApplicationResponse, MockApplicationLayer};
    use crate::response_queue::ResponseSlotState;
    use knx_link::{ChecksumCalc, MemoryLink};
    use std::time::Duration;

    const OWN: IndividualAddress = IndividualAddress::new(0xA000);
    const PEER: IndividualAddress = IndividualAddress::new(0xA001);
    const OTHER: IndividualAddress = IndividualAddress::new(0xA002);

    /// Records requests and answers with a fixed response
    #[derive(Default)]
    struct RecordingApplication {
        requests: Vec<ApplicationRequest>,
        response: Option<ApplicationResponse>,
        closed: Vec<IndividualAddress>,
        group: usize,
        broadcast: usize,
    }

    impl ApplicationLayer for RecordingApplication {
        fn process_application_command(
            &mut self,
            request: &ApplicationRequest,
        ) -> Option<ApplicationResponse> {
            self.requests.push(request.clone());
            self.response.clone()
        }

        fn process_group(&mut self, _telegram: &Telegram) {
            self.group += 1;
        }

        fn process_broadcast(&mut self, _telegram: &Telegram) {
            self.broadcast += 1;
        }

        fn connection_closed(&mut self, peer: IndividualAddress) {
            self.closed.push(peer);
        }
    }

    type Layer = TransportLayer4<MemoryLink, RecordingApplication>;

    fn layer() -> Layer {
        TransportLayer4::new(
            MemoryLink::new(OWN),
            RecordingApplication::default(),
            TransportSettings::default(),
        )
        .unwrap()
    }

    fn answering_layer() -> Layer {
        let mut layer = layer();
        layer.application_mut().response =
            Some(ApplicationResponse::new(0x340, vec![0x00, 0x12]));
        layer
    }

    fn control(from: IndividualAddress, tpdu: Tpdu) -> Vec<u8> {
        Telegram::new(
            Priority::System,
            from,
            Destination::Individual(OWN),
            tpdu.encode(),
            Vec::new(),
        )
        .unwrap()
        .encode()
        .to_vec()
    }

    fn data(from: IndividualAddress, sequence: u8, priority: Priority) -> Vec<u8> {
        let tpdu = Tpdu::DataConnected {
            sequence: SequenceNumber::new(sequence),
            apci_high: 3,
        };
        Telegram::new(
            priority,
            from,
            Destination::Individual(OWN),
            tpdu.encode(),
            vec![0x00],
        )
        .unwrap()
        .encode()
        .to_vec()
    }

    fn sent(layer: &mut Layer) -> Vec<Telegram> {
        layer.link_mut().take_sent_telegrams().unwrap()
    }

    fn connected(now: Instant) -> Layer {
        let mut layer = answering_layer();
        layer.handle_frame(&control(PEER, Tpdu::Connect), now).unwrap();
        layer
    }

    #[test]
    fn test_connect() {
        let now = Instant::now();
        let mut layer = layer();
        let disposition = layer.handle_frame(&control(PEER, Tpdu::Connect), now).unwrap();
        assert_eq!(disposition, FrameDisposition::Consumed);
        assert_eq!(layer.state(), ConnectionState::OpenIdle);
        assert_eq!(layer.connected_to(), Some(PEER));
        assert_eq!(layer.send_sequence(), SequenceNumber::ZERO);
        assert_eq!(layer.receive_sequence(), SequenceNumber::ZERO);
        assert!(layer.link().sent_frames().is_empty());
    }

    #[test]
    fn test_accept_and_ack() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();

        let expected = {
            let body = [0xB0, 0xA0, 0x00, 0xA0, 0x01, 0x60, 0xC2];
            let mut frame = body.to_vec();
            frame.push(ChecksumCalc::compute(&body));
            frame
        };
        assert_eq!(layer.link().sent_frames().len(), 1);
        assert_eq!(layer.link().sent_frames()[0].as_ref(), expected.as_slice());
        assert_eq!(layer.receive_sequence(), SequenceNumber::new(1));
        assert_eq!(layer.application().requests.len(), 1);

        let request = &layer.application().requests[0];
        assert_eq!(request.command, 0x300);
        assert_eq!(request.source, PEER);
        assert_eq!(request.sequence, Some(SequenceNumber::ZERO));
    }

    #[test]
    fn test_duplicate_is_acknowledged_but_not_dispatched() {
        let now = Instant::now();
        let mut layer = connected(now);
        for _ in 0..4 {
            layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        }

        let acks = sent(&mut layer);
        assert_eq!(acks.len(), 4);
        assert!(acks.iter().all(|t| t.tpci() == 0xC2));
        assert_eq!(layer.receive_sequence(), SequenceNumber::new(1));
        assert_eq!(layer.application().requests.len(), 1);
        assert_eq!(layer.statistics().duplicates, 3);
    }

    #[test]
    fn test_out_of_window_sends_nack() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&data(PEER, 5, Priority::Low), now).unwrap();

        let frames = sent(&mut layer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tpci(), Tpdu::Nack(SequenceNumber::new(5)).encode());
        assert_eq!(frames[0].destination(), Destination::Individual(PEER));
        assert_eq!(layer.state(), ConnectionState::OpenIdle);
        assert_eq!(layer.receive_sequence(), SequenceNumber::ZERO);
        assert!(layer.application().requests.is_empty());
    }

    #[test]
    fn test_ack_timeout_exhaustion() {
        let t0 = Instant::now();
        let mut layer = connected(t0);
        layer.handle_frame(&data(PEER, 0, Priority::Low), t0).unwrap();
        layer.poll(t0).unwrap();
        assert_eq!(layer.state(), ConnectionState::OpenWait);

        let frames = sent(&mut layer);
        assert_eq!(frames.len(), 2);
        let response = frames[1].clone();
        assert_eq!(response.tpci(), 0x43);
        assert_eq!(response.payload(), &[0x40, 0x00, 0x12]);

        let ack_timeout = layer.settings().ack_timeout;
        let mut now = t0;
        for _ in 0..layer.settings().max_repetitions {
            now += ack_timeout;
            layer.poll(now).unwrap();
            let frames = sent(&mut layer);
            assert_eq!(frames, vec![response.clone()]);
            assert_eq!(layer.state(), ConnectionState::OpenWait);
        }

        now += ack_timeout;
        layer.poll(now).unwrap();
        let frames = sent(&mut layer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tpci(), 0x81);
        assert_eq!(frames[0].destination(), Destination::Individual(PEER));
        assert_eq!(layer.state(), ConnectionState::Closed);
        assert_eq!(layer.connected_to(), None);
        assert_eq!(layer.application().closed, vec![PEER]);
        assert_eq!(layer.statistics().repetitions, 3);
    }

    #[test]
    fn test_idle_timeout() {
        let t0 = Instant::now();
        let mut layer = connected(t0);
        layer.poll(t0 + Duration::from_millis(5999)).unwrap();
        assert_eq!(layer.state(), ConnectionState::OpenIdle);

        layer.poll(t0 + Duration::from_secs(6)).unwrap();
        assert_eq!(layer.state(), ConnectionState::Closed);
        let frames = sent(&mut layer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tpci(), 0x81);
        assert_eq!(layer.statistics().timeouts, 1);
    }

    #[test]
    fn test_round_trip_resets_sequences() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        layer.poll(now).unwrap();
        layer
            .handle_frame(&control(PEER, Tpdu::Ack(SequenceNumber::ZERO)), now)
            .unwrap();
        assert_eq!(layer.state(), ConnectionState::OpenIdle);
        assert_eq!(layer.send_sequence(), SequenceNumber::new(1));
        assert_eq!(layer.receive_sequence(), SequenceNumber::new(1));
        assert!(layer.response_queue().is_empty());

        layer.handle_frame(&control(PEER, Tpdu::Disconnect), now).unwrap();
        assert_eq!(layer.state(), ConnectionState::Closed);

        layer.handle_frame(&control(PEER, Tpdu::Connect), now).unwrap();
        assert_eq!(layer.send_sequence(), SequenceNumber::ZERO);
        assert_eq!(layer.receive_sequence(), SequenceNumber::ZERO);
    }

    #[test]
    fn test_sequences_wrap() {
        let now = Instant::now();
        let mut layer = connected(now);
        for round in 0..17u8 {
            let sequence = round % 16;
            layer.handle_frame(&data(PEER, sequence, Priority::Low), now).unwrap();
            layer.poll(now).unwrap();
            layer
                .handle_frame(&control(PEER, Tpdu::Ack(SequenceNumber::new(sequence))), now)
                .unwrap();
        }
        assert_eq!(layer.receive_sequence(), SequenceNumber::new(1));
        assert_eq!(layer.send_sequence(), SequenceNumber::new(1));
        assert_eq!(layer.application().requests.len(), 17);
        assert_eq!(layer.state(), ConnectionState::OpenIdle);
    }

    #[test]
    fn test_wrong_ack_closes_connection() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        layer.poll(now).unwrap();
        sent(&mut layer);

        layer
            .handle_frame(&control(PEER, Tpdu::Ack(SequenceNumber::new(4))), now)
            .unwrap();
        assert_eq!(layer.state(), ConnectionState::Closed);
        assert_eq!(sent(&mut layer)[0].tpci(), 0x81);
        assert!(layer.response_queue().is_empty());
    }

    #[test]
    fn test_nack_repeats_response() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        layer.poll(now).unwrap();
        let response = sent(&mut layer).pop().unwrap();

        layer
            .handle_frame(&control(PEER, Tpdu::Nack(SequenceNumber::ZERO)), now)
            .unwrap();
        assert_eq!(sent(&mut layer), vec![response]);
        assert_eq!(layer.state(), ConnectionState::OpenWait);
    }

    #[test]
    fn test_foreign_connect_is_rejected() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&control(OTHER, Tpdu::Connect), now).unwrap();

        let frames = sent(&mut layer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tpci(), 0x81);
        assert_eq!(frames[0].destination(), Destination::Individual(OTHER));
        assert_eq!(layer.connected_to(), Some(PEER));
        assert_eq!(layer.statistics().intrusions, 1);

        layer.handle_frame(&data(OTHER, 0, Priority::Low), now).unwrap();
        assert!(sent(&mut layer).is_empty());
        assert!(layer.application().requests.is_empty());
    }

    #[test]
    fn test_response_keeps_request_priority() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&data(PEER, 0, Priority::Normal), now).unwrap();
        layer.poll(now).unwrap();

        let frames = sent(&mut layer);
        assert_eq!(frames[0].priority(), Priority::System);
        assert_eq!(frames[1].priority(), Priority::Normal);
        assert_eq!(frames[1].source(), OWN);
    }

    #[test]
    fn test_second_request_is_pipelined() {
        let now = Instant::now();
        let mut layer = TransportLayer4::new(
            MemoryLink::with_manual_completion(OWN),
            RecordingApplication {
                response: Some(ApplicationResponse::new(0x340, vec![0x00])),
                ..Default::default()
            },
            TransportSettings::default(),
        )
        .unwrap();
        layer.handle_frame(&control(PEER, Tpdu::Connect), now).unwrap();

        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        assert_eq!(
            layer.response_queue().primary_state(),
            ResponseSlotState::WaitingForAckSent
        );

        // the ack is still on the wire
        let disposition = layer.handle_frame(&data(PEER, 1, Priority::Low), now).unwrap();
        assert_eq!(disposition, FrameDisposition::Deferred);
        layer.poll(now).unwrap();
        assert_eq!(layer.state(), ConnectionState::OpenIdle);

        layer.link_mut().complete_transmission();
        layer.handle_frame(&data(PEER, 1, Priority::Low), now).unwrap();
        assert_eq!(layer.response_queue().len(), 2);
        assert_eq!(layer.application().requests.len(), 2);

        layer.link_mut().complete_transmission();
        layer.poll(now).unwrap();
        assert_eq!(layer.state(), ConnectionState::OpenWait);
        assert_eq!(layer.response_queue().primary_state(), ResponseSlotState::Sending);

        layer.link_mut().complete_transmission();
        layer
            .handle_frame(&control(PEER, Tpdu::Ack(SequenceNumber::ZERO)), now)
            .unwrap();
        assert_eq!(layer.response_queue().len(), 1);

        layer.poll(now).unwrap();
        let frames = sent(&mut layer);
        let last = frames.last().unwrap();
        assert_eq!(last.tpci(), 0x47);
        assert_eq!(layer.state(), ConnectionState::OpenWait);
    }

    #[test]
    fn test_process_received_keeps_deferred_frame() {
        let now = Instant::now();
        let mut layer = TransportLayer4::new(
            MemoryLink::with_manual_completion(OWN),
            RecordingApplication::default(),
            TransportSettings::default(),
        )
        .unwrap();
        layer.link_mut().inject(control(PEER, Tpdu::Connect));
        layer.link_mut().inject(data(PEER, 0, Priority::Low));
        layer.link_mut().inject(data(PEER, 1, Priority::Low));

        assert_eq!(layer.process_received(now).unwrap(), Some(FrameDisposition::Consumed));
        assert_eq!(layer.process_received(now).unwrap(), Some(FrameDisposition::Consumed));
        assert_eq!(layer.process_received(now).unwrap(), Some(FrameDisposition::Deferred));
        assert_eq!(layer.link().pending_inbound(), 1);

        layer.link_mut().complete_transmission();
        assert_eq!(layer.process_received(now).unwrap(), Some(FrameDisposition::Consumed));
        assert_eq!(layer.process_received(now).unwrap(), None);
        assert_eq!(layer.receive_sequence(), SequenceNumber::new(2));
    }

    #[test]
    fn test_malformed_and_unknown_frames_are_dropped() {
        let now = Instant::now();
        let mut layer = connected(now);

        let mut corrupt = data(PEER, 0, Priority::Low);
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        layer.handle_frame(&corrupt, now).unwrap();

        let unknown = Telegram::new(
            Priority::System,
            PEER,
            Destination::Individual(OWN),
            0x82,
            Vec::new(),
        )
        .unwrap();
        layer.handle_frame(&unknown.encode(), now).unwrap();

        assert_eq!(layer.statistics().frames_rejected, 2);
        assert_eq!(layer.state(), ConnectionState::OpenIdle);
        assert!(layer.link().sent_frames().is_empty());
    }

    #[test]
    fn test_link_repetition_is_ignored() {
        let now = Instant::now();
        let mut layer = connected(now);
        let original = Telegram::decode(&data(PEER, 0, Priority::Low)).unwrap();
        layer.handle_frame(&original.encode(), now).unwrap();

        let mut repeated = original.clone();
        repeated.set_repeated(true);
        layer.handle_frame(&repeated.encode(), now).unwrap();

        assert_eq!(sent(&mut layer).len(), 1);
        assert_eq!(layer.statistics().link_repeats_ignored, 1);
    }

    #[test]
    fn test_unconnected_data_is_answered_directly() {
        let now = Instant::now();
        let mut layer = answering_layer();
        let request = Telegram::new(
            Priority::Low,
            PEER,
            Destination::Individual(OWN),
            Tpdu::DataUnconnected { apci_high: 3 }.encode(),
            vec![0x00],
        )
        .unwrap();
        layer.handle_frame(&request.encode(), now).unwrap();

        assert_eq!(layer.state(), ConnectionState::Closed);
        assert_eq!(layer.application().requests[0].sequence, None);
        let frames = sent(&mut layer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tpci(), 0x03);
        assert_eq!(frames[0].payload(), &[0x40, 0x00, 0x12]);
        assert_eq!(frames[0].destination(), Destination::Individual(PEER));
    }

    #[test]
    fn test_unconnected_data_waits_for_link() {
        let now = Instant::now();
        let mut layer = TransportLayer4::new(
            MemoryLink::with_manual_completion(OWN),
            RecordingApplication {
                response: Some(ApplicationResponse::new(0x340, vec![0x00])),
                ..Default::default()
            },
            TransportSettings::default(),
        )
        .unwrap();
        layer.handle_frame(&control(PEER, Tpdu::Connect), now).unwrap();
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();

        let request = Telegram::new(
            Priority::Low,
            OTHER,
            Destination::Individual(OWN),
            Tpdu::DataUnconnected { apci_high: 3 }.encode(),
            vec![0x00],
        )
        .unwrap();
        layer.link_mut().inject(request.encode().to_vec());

        // the ack for sequence 0 is still on the wire
        assert_eq!(layer.process_received(now).unwrap(), Some(FrameDisposition::Deferred));
        assert_eq!(layer.link().pending_inbound(), 1);
        assert_eq!(layer.application().requests.len(), 1);

        layer.link_mut().complete_transmission();
        assert_eq!(layer.process_received(now).unwrap(), Some(FrameDisposition::Consumed));
        assert_eq!(layer.link().pending_inbound(), 0);
        assert_eq!(layer.application().requests.len(), 2);
        assert_eq!(layer.application().requests[1].sequence, None);

        let frames = sent(&mut layer);
        let reply = frames.last().unwrap();
        assert_eq!(reply.tpci(), 0x03);
        assert_eq!(reply.destination(), Destination::Individual(OTHER));
        assert_eq!(layer.connected_to(), Some(PEER));
        assert_eq!(layer.receive_sequence(), SequenceNumber::new(1));
    }

    #[test]
    fn test_peer_disconnect_drops_queued_responses() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        layer.handle_frame(&data(PEER, 1, Priority::Low), now).unwrap();
        layer.poll(now).unwrap();
        assert_eq!(layer.state(), ConnectionState::OpenWait);
        assert_eq!(layer.response_queue().len(), 2);
        assert!(layer.connection().ack_timer.is_running());
        sent(&mut layer);

        layer.handle_frame(&control(PEER, Tpdu::Disconnect), now).unwrap();
        assert_eq!(layer.state(), ConnectionState::Closed);
        assert!(layer.response_queue().is_empty());
        assert!(!layer.connection().ack_timer.is_running());
        assert_eq!(layer.application().closed, vec![PEER]);

        layer.poll(now + layer.settings().ack_timeout).unwrap();
        assert!(sent(&mut layer).is_empty());
    }

    #[test]
    fn test_queued_response_waits_for_idle_bus() {
        let now = Instant::now();
        let mut layer = connected(now);
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        assert_eq!(sent(&mut layer).len(), 1);

        layer.link_mut().set_bus_busy(true);
        layer.poll(now).unwrap();
        assert_eq!(layer.state(), ConnectionState::OpenIdle);
        assert!(sent(&mut layer).is_empty());
        assert!(layer.response_queue().primary_ready());

        layer.link_mut().set_bus_busy(false);
        layer.poll(now).unwrap();
        assert_eq!(layer.state(), ConnectionState::OpenWait);
        let frames = sent(&mut layer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tpci(), 0x43);
    }

    #[test]
    fn test_group_broadcast_and_foreign_traffic() {
        let now = Instant::now();
        let mut layer = layer();
        let group =
            Telegram::new(Priority::Low, PEER, Destination::Group(0x0801), 0x00, vec![0x81])
                .unwrap();
        let broadcast =
            Telegram::new(Priority::System, PEER, Destination::Broadcast, 0x01, vec![0x00])
                .unwrap();
        let foreign = Telegram::new(
            Priority::System,
            PEER,
            Destination::Individual(OTHER),
            0x80,
            Vec::new(),
        )
        .unwrap();

        layer.handle_frame(&group.encode(), now).unwrap();
        layer.handle_frame(&broadcast.encode(), now).unwrap();
        layer.handle_frame(&foreign.encode(), now).unwrap();

        assert_eq!(layer.application().group, 1);
        assert_eq!(layer.application().broadcast, 1);
        assert_eq!(layer.state(), ConnectionState::Closed);
        assert!(layer.link().sent_frames().is_empty());
    }

    #[test]
    fn test_user_disconnect() {
        let now = Instant::now();
        let mut layer = layer();
        assert!(matches!(layer.disconnect(now), Err(KnxError::NotConnected)));

        layer.handle_frame(&control(PEER, Tpdu::Connect), now).unwrap();
        layer.disconnect(now).unwrap();
        assert_eq!(layer.state(), ConnectionState::Closed);
        assert_eq!(sent(&mut layer)[0].tpci(), 0x81);
        assert_eq!(layer.statistics().disconnects, 1);
    }

    #[test]
    fn test_user_disconnect_while_link_busy() {
        let now = Instant::now();
        let mut layer = TransportLayer4::new(
            MemoryLink::with_manual_completion(OWN),
            RecordingApplication::default(),
            TransportSettings::default(),
        )
        .unwrap();
        layer.handle_frame(&control(PEER, Tpdu::Connect), now).unwrap();
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();

        assert!(matches!(layer.disconnect(now), Err(KnxError::SlotBusy(_))));
        assert!(layer.is_connected());
    }

    #[test]
    fn test_application_called_once_per_request() {
        let now = Instant::now();
        let mut application = MockApplicationLayer::new();
        application
            .expect_process_application_command()
            .withf(|request| request.command == 0x300 && request.source == PEER)
            .times(1)
            .returning(|_| None);

        let mut layer =
            TransportLayer4::new(MemoryLink::new(OWN), application, TransportSettings::default())
                .unwrap();
        layer.handle_frame(&control(PEER, Tpdu::Connect), now).unwrap();
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        layer.handle_frame(&data(PEER, 0, Priority::Low), now).unwrap();
        layer.poll(now).unwrap();

        assert_eq!(layer.state(), ConnectionState::OpenIdle);
        assert!(layer.response_queue().is_empty());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = TransportSettings {
            ack_timeout: Duration::ZERO,
            ..Default::default()
        };
        let result = TransportLayer4::new(
            MemoryLink::new(OWN),
            RecordingApplication::default(),
            settings,
        );
        assert!(result.is_err());
    }
}
