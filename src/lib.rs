//! Tear-free decoder for simulator telemetry.
//!
//! Pitlane reads the simulator's telemetry layout from two kinds of source:
//! the live shared memory region the simulator rewrites every tick, and
//! recorded replay files that use the same layout with records laid end to
//! end.
//!
//! # Features
//!
//! - **Live decoding**: rotating tick buffers read without torn values,
//!   with optional freezing of a whole tick
//! - **Replay files**: random access by record index and whole columns
//! - **Session info**: the embedded YAML block, repaired, parsed per section
//!   and cached per update counter
//! - **Streams**: async frame and session streams over either source
//! - **Commands**: packing of the simulator's broadcast commands
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pitlane::Pitlane;
//!
//! fn main() -> pitlane::Result<()> {
//!     let mut replay = Pitlane::open("session.ibt")?;
//!     println!("{} records at {} Hz", replay.record_count(), replay.tick_rate());
//!
//!     let speeds = replay.get_all_as::<f32>("Speed").unwrap_or_default();
//!     println!("top speed {:?}", speeds.iter().copied().reduce(f32::max));
//!
//!     if let Some(weekend) = replay.session_info("WeekendInfo") {
//!         println!("track: {:?}", weekend["TrackDisplayName"].as_str());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use pitlane::{Pitlane, UpdateRate};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> pitlane::Result<()> {
//!     let stream = Pitlane::replay("session.ibt").await?;
//!     let mut frames = stream.subscribe(UpdateRate::Max(10));
//!     while let Some(frame) = frames.next().await {
//!         println!("tick {} speed {:?}", frame.tick(), frame.get_as::<f32>("Speed"));
//!     }
//!     Ok(())
//! }
//! ```

mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Layout decoding
pub mod codec;
pub mod layout;
pub mod session;
pub mod source;

// Data sources
pub mod live;
pub mod replay;

// Outbound commands
pub mod broadcast;

// Stream-based telemetry architecture
pub mod connection;
pub mod driver;
pub mod provider;
pub mod providers;
pub mod stream;

// Platform-specific modules
#[cfg(windows)]
pub mod windows;

// Core exports
pub use error::*;
pub use types::*;

pub use broadcast::{BroadcastCommand, BroadcastMessage, CommandSink};
pub use connection::TelemetryStream;
pub use driver::SessionSnapshot;
pub use live::{LiveOptions, LiveTelemetry};
pub use replay::ReplayFile;
pub use session::{SessionInfoCache, SessionInfoOptions};
pub use source::{MemoryRegion, TelemetrySource};

#[cfg(windows)]
pub use windows::{MappedRegion, MessageSink};

/// Entry point for opening telemetry sources.
///
/// ```rust,no_run
/// use pitlane::{MemoryRegion, Pitlane};
///
/// # fn main() -> pitlane::Result<()> {
/// let region = MemoryRegion::from_file("region.bin")?;
/// let live = Pitlane::attach(region)?;
/// println!("{:?}", live.get("Speed"));
/// # Ok(())
/// # }
/// ```
pub struct Pitlane;

impl Pitlane {
    /// Decode an already acquired region.
    pub fn attach<S: TelemetrySource>(source: S) -> Result<LiveTelemetry<S>> {
        LiveTelemetry::open(source)
    }

    /// Map the simulator's live region.
    ///
    /// # Errors
    ///
    /// Fails when the simulator has not created the region, or when the
    /// region's header is unusable.
    #[cfg(windows)]
    pub fn connect() -> Result<LiveTelemetry<MappedRegion>> {
        LiveTelemetry::open(MappedRegion::open()?)
    }

    /// Open a replay file for random access.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<ReplayFile> {
        ReplayFile::open(path)
    }

    /// Stream the live region. Only available on Windows; elsewhere this
    /// returns [`TelemetryError::UnsupportedPlatform`].
    pub async fn stream() -> Result<TelemetryStream> {
        TelemetryStream::connect().await
    }

    /// Stream a replay file in real time.
    pub async fn replay<P: AsRef<std::path::Path>>(path: P) -> Result<TelemetryStream> {
        TelemetryStream::replay(path).await
    }
}
