//! Replay provider for recorded telemetry files

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::provider::FrameProvider;
use crate::replay::ReplayFile;
use crate::session::repair_yaml;
use crate::{Frame, Result, TelemetryError, VariableSchema};

/// How a [`ReplayProvider`] spaces its frames.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ReplayPacing {
    /// One record per tick period, scaled by the playback speed
    #[default]
    Realtime,
    /// As fast as the consumer pulls
    Unpaced,
}

/// Streams the records of a replay file in order.
pub struct ReplayProvider {
    file: ReplayFile,
    schema: Arc<VariableSchema>,
    pacing: ReplayPacing,
    speed: f64,
    interval: Option<Interval>,
    position: usize,
}

impl ReplayProvider {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(ReplayFile::open(path)?)
    }

    pub fn new(file: ReplayFile) -> Result<Self> {
        let schema = file.variables()?;
        info!(
            records = file.record_count(),
            tick_rate = file.tick_rate(),
            "Replay provider ready"
        );

        Ok(Self {
            file,
            schema,
            pacing: ReplayPacing::Realtime,
            speed: 1.0,
            interval: None,
            position: 0,
        })
    }

    pub fn with_pacing(mut self, pacing: ReplayPacing) -> Self {
        self.pacing = pacing;
        self.interval = None;
        self
    }

    pub fn pacing(&self) -> ReplayPacing {
        self.pacing
    }

    /// Playback speed multiplier, clamped to 0.1 through 10. Non-finite
    /// speeds are ignored.
    pub fn set_speed(&mut self, speed: f64) {
        if !speed.is_finite() {
            warn!(speed, "Ignoring non-finite playback speed");
            return;
        }
        self.speed = speed.clamp(0.1, 10.0);
        self.interval = None;
        debug!(speed = self.speed, "Playback speed set");
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Continue from record `index`.
    pub fn seek(&mut self, index: usize) -> Result<()> {
        let len = self.file.record_count();
        if index >= len {
            return Err(TelemetryError::IndexOutOfRange { index: index as i128, len });
        }
        debug!(index, "Seeking replay");
        self.position = index;
        Ok(())
    }

    /// Index of the next record to be emitted.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Seconds of session time already emitted.
    pub fn current_time(&self) -> f64 {
        self.position as f64 / self.file.tick_rate().max(1.0)
    }

    /// Recorded length in seconds of session time.
    pub fn duration(&self) -> f64 {
        self.file.record_count() as f64 / self.file.tick_rate().max(1.0)
    }

    pub fn file(&self) -> &ReplayFile {
        &self.file
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / (self.file.tick_rate().max(1.0) * self.speed))
    }
}

#[async_trait::async_trait]
impl FrameProvider for ReplayProvider {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let total = self.file.record_count();
        if self.position >= total {
            debug!(total, "Reached end of replay");
            return Ok(None);
        }

        if self.pacing == ReplayPacing::Realtime {
            let period = self.period();
            let ticker = self.interval.get_or_insert_with(|| {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker
            });
            ticker.tick().await;
        }

        let frame = self.file.frame(self.position)?;
        trace!(record = self.position, total, "Replay frame");
        self.position += 1;
        Ok(Some(frame))
    }

    async fn session_text(&mut self) -> Result<Option<String>> {
        let text = self.file.session_text()?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(repair_yaml(&text, &self.file.session_options().text)))
    }

    fn tick_rate(&self) -> f64 {
        self.file.tick_rate()
    }

    fn schema(&self) -> Arc<VariableSchema> {
        Arc::clone(&self.schema)
    }
}
