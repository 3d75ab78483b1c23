//! Core types and utilities for the KNX transport stack
//!
//! This crate provides the fundamental types shared by every layer of the
//! stack: the error type, individual addresses and telegram priorities.

pub mod address;
pub mod error;
pub mod priority;

pub use address::IndividualAddress;
pub use error::{KnxError, KnxResult};
pub use priority::Priority;
