//! Update rate control for frame streams

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delivery rate requested by a stream subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum UpdateRate {
    /// Every frame the source produces
    Native,

    /// At most this many frames per second, latest wins.
    /// Rates at or above the source rate behave like `Native`.
    Max(u32),
}

impl UpdateRate {
    /// Resolve against the source frequency.
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if f64::from(hz) >= source_hz => UpdateRate::Native,
            rate => rate,
        }
    }

    /// Minimum spacing between delivered frames, `None` when unthrottled.
    pub fn throttle_interval(self, source_hz: f64) -> Option<Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / f64::from(hz))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_at_or_above_source_are_native() {
        assert_eq!(UpdateRate::Max(60).normalize(60.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(120).normalize(60.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(0).normalize(60.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(10).normalize(60.0), UpdateRate::Max(10));
    }

    #[test]
    fn throttle_interval_matches_rate() {
        assert_eq!(UpdateRate::Native.throttle_interval(60.0), None);
        assert_eq!(UpdateRate::Max(4).throttle_interval(60.0), Some(Duration::from_millis(250)));
    }
}
