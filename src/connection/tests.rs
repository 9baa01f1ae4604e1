//! Streaming tests over fabricated replay files and live regions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;

use super::*;
use crate::test_utils::LayoutBuilder;
use crate::{TelemetryError, Value, VariableType};

const SESSION_TEXT: &str = "---\nWeekendInfo:\n  TrackDisplayName: Okayama\n  TrackID: 166\n\n";

fn replay(records: usize, tick_rate: i32) -> Result<ReplayFile> {
    let data = LayoutBuilder::new()
        .tick_rate(tick_rate)
        .var("Speed", VariableType::Float32, 0, 1)
        .var("Lap", VariableType::Int32, 4, 1)
        .session_text(SESSION_TEXT)
        .build_replay(records, |index, w| {
            w.set("Speed", &Value::Float32(index as f32));
            w.set("Lap", &Value::Int32(1));
        });
    Ok(ReplayFile::from_bytes(data)?)
}

async fn collect_ticks(stream: BoxStream<'static, Arc<Frame>>) -> Result<Vec<i32>> {
    let frames = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>()).await?;
    Ok(frames.iter().map(|frame| frame.tick()).collect())
}

#[tokio::test]
async fn replay_stream_delivers_records_in_order() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let stream = TelemetryStream::replay_file(replay(6, 200)?, ReplayPacing::Realtime).await?;
    assert_eq!(stream.source_hz(), 200.0);
    assert!(stream.schema().has_variable("Speed"));

    let ticks = collect_ticks(stream.subscribe(UpdateRate::Native)).await?;
    assert!(ticks.windows(2).all(|pair| pair[0] < pair[1]), "ticks out of order: {ticks:?}");
    assert_eq!(ticks.last(), Some(&5));

    let latest = stream.latest().expect("last frame stays published");
    assert_eq!(latest.get_as::<f32>("Speed"), Some(5.0));
    Ok(())
}

#[tokio::test]
async fn session_document_is_published() -> Result<()> {
    let stream = TelemetryStream::replay_file(replay(3, 100)?, ReplayPacing::Realtime).await?;
    let mut sessions = Box::pin(stream.session_updates());

    let session = tokio::time::timeout(Duration::from_secs(1), sessions.next())
        .await?
        .expect("session snapshot");
    let weekend = session.section("WeekendInfo").expect("WeekendInfo");
    assert_eq!(weekend["TrackDisplayName"].as_str(), Some("Okayama"));
    assert_eq!(weekend["TrackID"].as_i64(), Some(166));
    assert!(session.section("DriverInfo").is_none());
    assert_eq!(stream.current_session().map(|s| s.update), Some(session.update));
    Ok(())
}

#[tokio::test]
async fn throttled_subscription_skips_frames() -> Result<()> {
    let stream = TelemetryStream::replay_file(replay(40, 200)?, ReplayPacing::Realtime).await?;

    let ticks = collect_ticks(stream.subscribe(UpdateRate::Max(20))).await?;
    assert!(!ticks.is_empty());
    assert!(ticks.len() < 40, "expected throttling, got {} frames", ticks.len());
    assert!(ticks.windows(2).all(|pair| pair[0] < pair[1]));
    Ok(())
}

#[tokio::test]
async fn live_stream_follows_the_writer() -> Result<()> {
    let layout = LayoutBuilder::new()
        .buffers(2)
        .var("SessionNum", VariableType::Int32, 0, 1)
        .var("Speed", VariableType::Float32, 4, 1)
        .build();
    layout.set_value(0, "Speed", &Value::Float32(30.0))?;
    layout.set_tick(0, 1)?;

    let stream = TelemetryStream::live(LiveTelemetry::open(layout.region())?)?;
    let mut frames = stream.subscribe(UpdateRate::Native);

    let first = tokio::time::timeout(Duration::from_secs(1), frames.next()).await?.expect("frame");
    assert_eq!(first.tick(), 1);

    layout.set_value(1, "Speed", &Value::Float32(31.0))?;
    layout.set_tick(1, 2)?;

    let next = tokio::time::timeout(Duration::from_secs(1), frames.next()).await?.expect("frame");
    assert_eq!(next.tick(), 2);
    assert_eq!(next.get_as::<f32>("Speed"), Some(31.0));
    Ok(())
}

/// Emits an empty frame every millisecond, forever.
struct EndlessProvider {
    schema: Arc<VariableSchema>,
    emitted: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl FrameProvider for EndlessProvider {
    async fn next_frame(&mut self) -> crate::Result<Option<Frame>> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        let tick = self.emitted.fetch_add(1, Ordering::SeqCst) as i32;
        Ok(Some(Frame::new(vec![0u8; 4], tick, 0, Arc::clone(&self.schema))))
    }

    async fn session_text(&mut self) -> crate::Result<Option<String>> {
        Ok(None)
    }

    fn tick_rate(&self) -> f64 {
        1000.0
    }

    fn schema(&self) -> Arc<VariableSchema> {
        Arc::clone(&self.schema)
    }
}

#[tokio::test]
async fn stopping_ends_subscriptions() -> Result<()> {
    let emitted = Arc::new(AtomicUsize::new(0));
    let provider =
        EndlessProvider { schema: Arc::new(VariableSchema::new(Vec::new(), 4)?), emitted };
    let stream = TelemetryStream::from_provider(provider);
    assert!(stream.wait_for_first_frame(Duration::from_secs(1)).await);
    assert!(stream.current_session().is_none());

    let frames = stream.subscribe(UpdateRate::Native);
    stream.stop();
    collect_ticks(frames).await?;
    Ok(())
}

#[tokio::test]
async fn dropping_the_stream_stops_the_provider() -> Result<()> {
    let emitted = Arc::new(AtomicUsize::new(0));
    let provider = EndlessProvider {
        schema: Arc::new(VariableSchema::new(Vec::new(), 4)?),
        emitted: Arc::clone(&emitted),
    };
    let stream = TelemetryStream::from_provider(provider);
    assert!(stream.wait_for_first_frame(Duration::from_secs(1)).await);
    drop(stream);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let after_drop = emitted.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(emitted.load(Ordering::SeqCst), after_drop);
    Ok(())
}

/// Fails on every call.
struct BrokenProvider(Arc<VariableSchema>);

#[async_trait::async_trait]
impl FrameProvider for BrokenProvider {
    async fn next_frame(&mut self) -> crate::Result<Option<Frame>> {
        Err(TelemetryError::malformed_layout("region vanished"))
    }

    async fn session_text(&mut self) -> crate::Result<Option<String>> {
        Ok(None)
    }

    fn tick_rate(&self) -> f64 {
        60.0
    }

    fn schema(&self) -> Arc<VariableSchema> {
        Arc::clone(&self.0)
    }
}

#[tokio::test]
async fn unrecoverable_provider_error_ends_the_stream() -> Result<()> {
    let schema = Arc::new(VariableSchema::new(Vec::new(), 4)?);
    let stream = TelemetryStream::from_provider(BrokenProvider(schema));
    let ticks = collect_ticks(stream.subscribe(UpdateRate::Native)).await?;
    assert!(ticks.is_empty());
    assert!(!stream.wait_for_first_frame(Duration::from_millis(50)).await);
    Ok(())
}

/// Emits one frame per scripted session text, `pause` apart, with the
/// update counter advancing each time, then idles.
struct ScriptedSessionProvider {
    schema: Arc<VariableSchema>,
    texts: Vec<String>,
    pause: Duration,
    emitted: usize,
}

impl ScriptedSessionProvider {
    fn new(texts: Vec<String>, pause: Duration) -> Result<Self> {
        let schema = Arc::new(VariableSchema::new(Vec::new(), 4)?);
        Ok(Self { schema, texts, pause, emitted: 0 })
    }
}

#[async_trait::async_trait]
impl FrameProvider for ScriptedSessionProvider {
    async fn next_frame(&mut self) -> crate::Result<Option<Frame>> {
        if self.emitted == self.texts.len() {
            std::future::pending::<()>().await;
        }
        if self.emitted > 0 {
            tokio::time::sleep(self.pause).await;
        }
        self.emitted += 1;
        let update = self.emitted as i32;
        Ok(Some(Frame::new(vec![0u8; 4], update, update, Arc::clone(&self.schema))))
    }

    async fn session_text(&mut self) -> crate::Result<Option<String>> {
        Ok(self.emitted.checked_sub(1).and_then(|index| self.texts.get(index)).cloned())
    }

    fn tick_rate(&self) -> f64 {
        60.0
    }

    fn schema(&self) -> Arc<VariableSchema> {
        Arc::clone(&self.schema)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_session_parse_never_replaces_a_newer_one() -> Result<()> {
    let mut large = String::from("---\nDriverInfo:\n  Drivers:\n");
    for idx in 0..20_000 {
        large.push_str(&format!("  - CarIdx: {idx}\n    UserName: Driver {idx}\n"));
    }
    large.push_str("\nWeekendInfo:\n  TrackDisplayName: Okayama\n\n");
    let small = String::from("---\nWeekendInfo:\n  TrackDisplayName: Fuji\n\n");

    let provider = ScriptedSessionProvider::new(vec![large, small], Duration::ZERO)?;
    let stream = TelemetryStream::from_provider(provider);
    let mut sessions = Box::pin(stream.session_updates());
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(session) = sessions.next().await {
            if session.update == 2 {
                break;
            }
        }
    })
    .await?;

    // Give the large parse time to finish and attempt its publish
    tokio::time::sleep(Duration::from_millis(500)).await;
    let current = stream.current_session().expect("session snapshot");
    assert_eq!(current.update, 2);
    let weekend = current.section("WeekendInfo").expect("WeekendInfo");
    assert_eq!(weekend["TrackDisplayName"].as_str(), Some("Fuji"));
    Ok(())
}

#[tokio::test]
async fn broken_section_keeps_the_published_value() -> Result<()> {
    let texts = vec![
        format!("{SESSION_TEXT}DriverInfo:\n  DriverCarIdx: 3\n\n"),
        String::from(concat!(
            "---\nWeekendInfo:\n  TrackDisplayName: Fuji\n\n",
            "DriverInfo:\n  DriverCarIdx: [unclosed\n\n",
        )),
    ];
    let provider = ScriptedSessionProvider::new(texts, Duration::from_millis(200))?;
    let stream = TelemetryStream::from_provider(provider);
    let mut sessions = Box::pin(stream.session_updates());

    let second = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(session) = sessions.next().await {
            if session.update == 2 {
                return Some(session);
            }
        }
        None
    })
    .await?
    .expect("second snapshot");

    let weekend = second.section("WeekendInfo").expect("WeekendInfo");
    assert_eq!(weekend["TrackDisplayName"].as_str(), Some("Fuji"));
    let drivers = second.section("DriverInfo").expect("last good DriverInfo");
    assert_eq!(drivers["DriverCarIdx"].as_i64(), Some(3));
    Ok(())
}

#[cfg(not(windows))]
#[tokio::test]
async fn connect_needs_windows() {
    let result = TelemetryStream::connect().await;
    assert!(matches!(result, Err(TelemetryError::UnsupportedPlatform { .. })));
}
