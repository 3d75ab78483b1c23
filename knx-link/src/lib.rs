//! Link layer module for the KNX transport stack
//!
//! This crate provides the contract the transport layer consumes from the
//! data link layer, the standard-frame telegram codec and an in-memory link
//! implementation.

pub mod checksum;
pub mod link;
pub mod memory;
pub mod telegram;

pub use checksum::ChecksumCalc;
pub use knx_core::{KnxError, KnxResult};
pub use link::BusLink;
pub use memory::MemoryLink;
pub use telegram::{Destination, Telegram, MAX_PAYLOAD_LENGTH, MAX_TELEGRAM_SIZE, MIN_TELEGRAM_SIZE};
