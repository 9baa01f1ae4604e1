//! Subscribable telemetry streams over live and replay sources

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{Driver, SessionSnapshot};
use crate::live::LiveTelemetry;
use crate::provider::FrameProvider;
use crate::providers::{LiveProvider, ReplayPacing, ReplayProvider};
use crate::replay::ReplayFile;
use crate::source::TelemetrySource;
use crate::stream::ThrottleExt;
use crate::{Frame, Result, UpdateRate, VariableSchema};

/// How long `replay` waits for the first record before returning anyway.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// A running frame source that any number of subscribers can follow.
///
/// Frames travel through a watch channel, so a slow subscriber skips
/// frames rather than queueing them. Dropping the stream stops the source.
pub struct TelemetryStream {
    frames: watch::Receiver<Option<Arc<Frame>>>,
    sessions: watch::Receiver<Option<Arc<SessionSnapshot>>>,
    schema: Arc<VariableSchema>,
    source_hz: f64,
    cancel: CancellationToken,
}

impl TelemetryStream {
    /// Start streaming from any provider. Must be called inside a tokio
    /// runtime.
    pub fn from_provider<P: FrameProvider>(provider: P) -> Self {
        let schema = provider.schema();
        let source_hz = provider.tick_rate();
        let channels = Driver::spawn(provider);

        Self {
            frames: channels.frames,
            sessions: channels.sessions,
            schema,
            source_hz,
            cancel: channels.cancel,
        }
    }

    /// Stream every new tick of a live handle.
    ///
    /// Returns straight away; subscribers see frames once the simulator
    /// is publishing.
    pub fn live<S: TelemetrySource + Send + 'static>(telemetry: LiveTelemetry<S>) -> Result<Self> {
        let stream = Self::from_provider(LiveProvider::new(telemetry)?);
        info!(source_hz = stream.source_hz, "Live stream started");
        Ok(stream)
    }

    /// Stream the simulator's shared memory region.
    #[cfg(windows)]
    pub async fn connect() -> Result<Self> {
        let region = crate::windows::MappedRegion::open()?;
        Self::live(LiveTelemetry::open(region)?)
    }

    #[cfg(not(windows))]
    pub async fn connect() -> Result<Self> {
        Err(crate::TelemetryError::unsupported_platform("Live telemetry", "Windows"))
    }

    /// Play a replay file back in real time.
    ///
    /// Waits for the first record so subscribers start with data.
    pub async fn replay<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening replay stream");
        Self::replay_file(ReplayFile::open(path)?, ReplayPacing::Realtime).await
    }

    pub async fn replay_file(file: ReplayFile, pacing: ReplayPacing) -> Result<Self> {
        let provider = ReplayProvider::new(file)?.with_pacing(pacing);
        let stream = Self::from_provider(provider);

        if !stream.wait_for_first_frame(FIRST_FRAME_TIMEOUT).await {
            warn!("Timed out waiting for the first replay record");
        }

        info!(source_hz = stream.source_hz, ?pacing, "Replay stream started");
        Ok(stream)
    }

    /// Wait until a frame has been published or the source ended.
    pub async fn wait_for_first_frame(&self, timeout: Duration) -> bool {
        let mut frames = self.frames.clone();
        let first = tokio::time::timeout(timeout, frames.wait_for(Option::is_some)).await;
        matches!(first, Ok(Ok(_)))
    }

    /// Frames at the requested rate.
    ///
    /// Starts with the most recent frame, if any, and ends when the source
    /// ends.
    pub fn subscribe(&self, rate: UpdateRate) -> BoxStream<'static, Arc<Frame>> {
        let frames = WatchStream::new(self.frames.clone()).filter_map(|frame| async move { frame });

        match rate.throttle_interval(self.source_hz) {
            None => frames.boxed(),
            Some(period) => {
                debug!(?rate, period_ms = period.as_millis(), "Throttled subscription");
                frames.throttle(period).boxed()
            }
        }
    }

    /// Parsed session documents, one per session update counter.
    pub fn session_updates(&self) -> impl Stream<Item = Arc<SessionSnapshot>> + 'static {
        WatchStream::new(self.sessions.clone()).filter_map(|session| async move { session })
    }

    pub fn current_session(&self) -> Option<Arc<SessionSnapshot>> {
        self.sessions.borrow().clone()
    }

    /// Most recently published frame.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.frames.borrow().clone()
    }

    /// Native rate of the source in Hz.
    pub fn source_hz(&self) -> f64 {
        self.source_hz
    }

    pub fn schema(&self) -> &VariableSchema {
        &self.schema
    }

    /// Stop the source. Subscriptions end after their current frame.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for TelemetryStream {
    fn drop(&mut self) {
        debug!("Dropping telemetry stream");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests;
