//! Live provider polling a telemetry region

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::live::LiveTelemetry;
use crate::provider::FrameProvider;
use crate::session::repair_yaml;
use crate::source::TelemetrySource;
use crate::{Frame, Result, VariableSchema};

/// Polling behaviour of a [`LiveProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveProviderOptions {
    /// Sleep between polls that found no new tick
    pub poll_interval: Duration,

    /// Pause between connection checks while the simulator is away
    pub reconnect_interval: Duration,

    /// End the stream after waiting this long for the simulator, or never
    pub give_up_after: Option<Duration>,
}

impl Default for LiveProviderOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(4),
            reconnect_interval: Duration::from_millis(500),
            give_up_after: Some(Duration::from_secs(300)),
        }
    }
}

/// Streams every new tick of a live region.
pub struct LiveProvider<S: TelemetrySource + Send + 'static> {
    telemetry: LiveTelemetry<S>,
    options: LiveProviderOptions,
    schema: Arc<VariableSchema>,
    last_tick: Option<i32>,
}

impl<S: TelemetrySource + Send + 'static> LiveProvider<S> {
    pub fn new(telemetry: LiveTelemetry<S>) -> Result<Self> {
        Self::with_options(telemetry, LiveProviderOptions::default())
    }

    pub fn with_options(telemetry: LiveTelemetry<S>, options: LiveProviderOptions) -> Result<Self> {
        let schema = telemetry.variables()?;
        let header = telemetry.header()?;

        info!(
            version = header.version,
            tick_rate = header.tick_rate,
            num_vars = header.num_vars,
            "Live provider attached"
        );

        Ok(Self { telemetry, options, schema, last_tick: None })
    }

    pub fn telemetry(&self) -> &LiveTelemetry<S> {
        &self.telemetry
    }

    pub fn into_inner(self) -> LiveTelemetry<S> {
        self.telemetry
    }

    async fn wait_for_connection(&mut self) -> bool {
        let mut waited = Duration::ZERO;
        let mut attempts = 0u32;

        while !self.telemetry.is_connected() {
            attempts += 1;
            if attempts == 1 {
                let sim_running = self.telemetry.source().is_sim_running();
                info!(sim_running, "Waiting for the simulator to publish telemetry");
            } else if attempts % 20 == 0 {
                debug!(waited_secs = waited.as_secs(), "Still waiting for the simulator");
            }

            if self.options.give_up_after.is_some_and(|limit| waited >= limit) {
                warn!(waited_secs = waited.as_secs(), "Giving up waiting for the simulator");
                return false;
            }

            tokio::time::sleep(self.options.reconnect_interval).await;
            waited += self.options.reconnect_interval;
        }

        if attempts > 0 {
            info!("Simulator detected, resuming telemetry");
        }
        true
    }
}

#[async_trait::async_trait]
impl<S: TelemetrySource + Send + 'static> FrameProvider for LiveProvider<S> {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if !self.wait_for_connection().await {
                return Ok(None);
            }

            let frame = self.telemetry.capture_latest()?;
            if self.last_tick != Some(frame.tick()) {
                trace!(tick = frame.tick(), session = frame.session_update(), "New tick");
                self.last_tick = Some(frame.tick());
                return Ok(Some(frame));
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    async fn session_text(&mut self) -> Result<Option<String>> {
        let text = self.telemetry.session_text()?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let repaired = repair_yaml(&text, &self.telemetry.options().session.text);
        debug!(bytes = repaired.len(), "Read session text");
        Ok(Some(repaired))
    }

    fn tick_rate(&self) -> f64 {
        self.telemetry.header().map(|header| f64::from(header.tick_rate)).unwrap_or(60.0)
    }

    fn schema(&self) -> Arc<VariableSchema> {
        Arc::clone(&self.schema)
    }
}
