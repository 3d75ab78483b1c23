//! KNX twisted-pair transport layer stack
//!
//! # Architecture
//!
//! The stack is organized as a workspace with one crate per layer:
//!
//! - `knx-core`: error handling, individual addresses, priorities
//! - `knx-link`: link layer contract, telegram codec, in-memory link
//! - `knx-transport`: connection-oriented transport layer (layer 4)
//! - `knx-device`: tokio run loop driving the transport layer
//!
//! # Usage
//!
//! ```no_run
//! use knx::transport::{TransportLayer4, TransportSettings};
//! use knx::link::MemoryLink;
//! ```

// Re-export core types
pub use knx_core::{IndividualAddress, KnxError, KnxResult, Priority};

// Re-export link layer API
pub mod link {
    pub use knx_link::*;
}

// Re-export transport layer API
pub mod transport {
    pub use knx_transport::*;
}

// Re-export device run loop
pub mod device {
    pub use knx_device::*;
}
