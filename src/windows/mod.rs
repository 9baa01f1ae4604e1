//! Simulator shared memory and command broadcast on Windows.
//!
//! [`MappedRegion`] maps the simulator's telemetry region read-only and
//! exposes it as a [`TelemetrySource`](crate::source::TelemetrySource), so
//! the platform-independent [`LiveTelemetry`](crate::live::LiveTelemetry)
//! does all the decoding. [`MessageSink`] sends packed
//! [`BroadcastCommand`](crate::broadcast::BroadcastCommand)s to the
//! simulator window.
//!
//! ```rust,ignore
//! use pitlane::live::LiveTelemetry;
//! use pitlane::windows::MappedRegion;
//!
//! let mut live = LiveTelemetry::open(MappedRegion::open()?)?;
//! if live.is_connected() {
//!     println!("{:?}", live.get("Speed"));
//! }
//! ```

mod broadcast;
mod region;

pub use broadcast::{BROADCAST_MESSAGE_NAME, MessageSink};
pub use region::{DATA_VALID_EVENT_NAME, MEMORY_MAP_NAME, MEMORY_MAP_SIZE, MappedRegion};

/// Null-terminated UTF-16 copy of `value` for wide Win32 calls.
pub(crate) fn wide_string(value: &str) -> Vec<u16> {
    value.encode_utf16().chain(std::iter::once(0)).collect()
}
