//! Bitfield telemetry values

use serde::{Deserialize, Serialize};

/// Raw 32-bit flag word, e.g. `SessionFlags` or `EngineWarnings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct BitField(pub u32);

impl BitField {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Check if bit number `bit` is set. Bits past 31 are never set.
    pub fn is_set(&self, bit: u32) -> bool {
        bit < 32 && (self.0 & (1 << bit)) != 0
    }

    /// Check if any bit of `mask` is set.
    pub fn has_flag(&self, mask: u32) -> bool {
        (self.0 & mask) != 0
    }

    /// Check if every bit of `mask` is set.
    pub fn has_all(&self, mask: u32) -> bool {
        (self.0 & mask) == mask
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for BitField {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
