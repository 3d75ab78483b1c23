//! KNX device run loop
//!
//! Drives [`knx_transport::TransportLayer4`] from a tokio task: inbound
//! frames arrive through an mpsc channel, outbound frames leave through
//! another, and a fixed-interval tick runs the transport layer's poll.
//!
//! # Example
//! ```rust,no_run
//! use knx_device::{DeviceRunner, DeviceSettings};
//! # use knx_transport::{ApplicationLayer, ApplicationRequest, ApplicationResponse};
//! # struct Echo;
//! # impl ApplicationLayer for Echo {
//! #     fn process_application_command(
//! #         &mut self,
//! #         _: &ApplicationRequest,
//! #     ) -> Option<ApplicationResponse> {
//! #         None
//! #     }
//! # }
//! # async fn example() -> knx_core::KnxResult<()> {
//! let settings = DeviceSettings::from_json(r#"{ "own_address": "1.1.10" }"#)?;
//! let (mut runner, _channels) = DeviceRunner::new(settings, Echo)?;
//! runner
//!     .run(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod channel_link;
pub mod runner;
pub mod settings;

pub use channel_link::ChannelLink;
pub use knx_core::{KnxError, KnxResult};
pub use runner::{DeviceChannels, DeviceRunner};
pub use settings::DeviceSettings;
