//! Provider trait for async frame sources

use std::sync::Arc;

use crate::{Frame, Result, VariableSchema};

/// Source of frames for the streaming [`Driver`](crate::driver::Driver).
///
/// Implemented by [`LiveProvider`](crate::providers::LiveProvider) and
/// [`ReplayProvider`](crate::providers::ReplayProvider).
#[async_trait::async_trait]
pub trait FrameProvider: Send + 'static {
    /// Next frame, `Ok(None)` once the source has ended.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Whole session text block, repaired so it parses as one YAML
    /// document. `Ok(None)` when the source publishes no text.
    async fn session_text(&mut self) -> Result<Option<String>>;

    /// Native frame rate in Hz.
    fn tick_rate(&self) -> f64;

    fn schema(&self) -> Arc<VariableSchema>;
}
