//! Cooperative run loop

use crate::channel_link::ChannelLink;
use crate::settings::DeviceSettings;
use bytes::Bytes;
use knx_core::{IndividualAddress, KnxError, KnxResult};
use knx_link::BusLink;
use knx_transport::{ApplicationLayer, FrameDisposition, TransportLayer4};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Depth of the inbound frame channel
const INBOUND_CHANNEL_CAPACITY: usize = 16;

/// Channel ends handed to the code that talks to the bus
pub struct DeviceChannels {
    /// Frames received from the bus, checksum included
    pub inbound: mpsc::Sender<Vec<u8>>,
    /// Frames to put on the bus
    pub outbound: mpsc::UnboundedReceiver<Bytes>,
}

/// Runs one transport layer instance
///
/// Inbound frames and poll ticks are handled on the same task, one at a
/// time, so the transport layer never sees concurrent calls. A new inbound
/// frame is only taken from the channel once the link's receive buffer is
/// free; deferred frames are retried on every tick.
pub struct DeviceRunner<A: ApplicationLayer> {
    layer: TransportLayer4<ChannelLink, A>,
    inbound: mpsc::Receiver<Vec<u8>>,
    poll_interval: Duration,
}

impl<A: ApplicationLayer> DeviceRunner<A> {
    /// Create a runner and the channels that connect it to the bus
    ///
    /// # Errors
    /// Returns `KnxError::InvalidData` if the settings are invalid
    pub fn new(settings: DeviceSettings, application: A) -> KnxResult<(Self, DeviceChannels)> {
        settings.validate()?;
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let link = ChannelLink::new(settings.own_address, outbound_tx);
        let layer = TransportLayer4::new(link, application, settings.transport)?;

        let runner = Self {
            layer,
            inbound: inbound_rx,
            poll_interval: settings.poll_interval,
        };
        let channels = DeviceChannels {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        Ok((runner, channels))
    }

    /// Run until `shutdown` completes or the inbound channel is closed
    ///
    /// Transport errors are logged and do not stop the loop.
    pub async fn run<F>(&mut self, shutdown: F) -> KnxResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        log::info!("KNX device {} running", self.own_address());

        loop {
            let buffer_free = !self.layer.link().has_frame();
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("KNX device {} shutting down", self.own_address());
                    break;
                }
                frame = self.inbound.recv(), if buffer_free => {
                    match frame {
                        Some(frame) => {
                            if let Err(e) = self.layer.link_mut().deliver(frame) {
                                log::error!("Dropping inbound frame: {}", e);
                                continue;
                            }
                            self.process_inbound();
                        }
                        None => {
                            log::info!(
                                "Inbound channel closed, stopping KNX device {}",
                                self.own_address()
                            );
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.process_inbound();
                    if let Err(e) = self.layer.poll(now()) {
                        log::error!("Transport poll failed: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    /// Disconnect the current peer, waiting for the control slot if needed
    ///
    /// # Errors
    /// Returns `KnxError::NotConnected` without a connection, or
    /// `KnxError::Timeout` if the slot did not become free within the ack
    /// timeout
    pub async fn disconnect(&mut self) -> KnxResult<()> {
        let limit = self.layer.settings().ack_timeout;
        let poll_interval = self.poll_interval;
        let wait = async {
            loop {
                match self.layer.disconnect(now()) {
                    Err(KnxError::SlotBusy(_)) => tokio::time::sleep(poll_interval).await,
                    result => return result,
                }
            }
        };
        tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| KnxError::Timeout)?
    }

    fn process_inbound(&mut self) {
        match self.layer.process_received(now()) {
            Ok(Some(FrameDisposition::Deferred)) => log::trace!("Inbound frame deferred"),
            Ok(_) => {}
            Err(e) => log::error!("Inbound frame failed: {}", e),
        }
    }

    /// Individual address of this device
    pub fn own_address(&self) -> IndividualAddress {
        self.layer.link().own_address()
    }

    /// The transport layer driven by this runner
    pub fn layer(&self) -> &TransportLayer4<ChannelLink, A> {
        &self.layer
    }

    /// The transport layer, mutably
    pub fn layer_mut(&mut self) -> &mut TransportLayer4<ChannelLink, A> {
        &mut self.layer
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}
