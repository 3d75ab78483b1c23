//! Telegram priority

use serde::{Deserialize, Serialize};

/// Priority class of a telegram
///
/// Carried in bits 2-3 of the link control octet. Connection control
/// telegrams always use `System`, connected responses reuse the priority of
/// the request that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    System,
    Normal,
    Urgent,
    #[default]
    Low,
}

impl Priority {
    /// Decode from the two priority bits (already shifted to bits 0-1)
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Priority::System,
            1 => Priority::Normal,
            2 => Priority::Urgent,
            _ => Priority::Low,
        }
    }

    /// Encode to the two priority bits (bits 0-1)
    pub fn to_bits(self) -> u8 {
        match self {
            Priority::System => 0,
            Priority::Normal => 1,
            Priority::Urgent => 2,
            Priority::Low => 3,
        }
    }
}
