//! Driver spawns and manages telemetry processing tasks

use std::sync::Arc;
use std::time::Duration;

use serde_yaml_ng::{Mapping, Value as YamlValue};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::Frame;
use crate::provider::FrameProvider;
use crate::session::extract_section;

/// Consecutive provider errors tolerated before the stream is closed.
const MAX_ERRORS: u32 = 10;

/// Whole session document published alongside frames.
///
/// When the block does not parse as one document it is parsed section by
/// section; a section that fails keeps its value from the previously
/// published snapshot, and is left out if it never parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Session info update counter the text was read at
    pub update: i32,
    pub document: YamlValue,
    sequence: u64,
}

impl SessionSnapshot {
    /// Parse a repaired session block. `previous` supplies sections that
    /// fail to parse. `None` when no section could be recovered.
    pub fn parse(update: i32, text: &str, previous: Option<&SessionSnapshot>) -> Option<Self> {
        if let Ok(document @ YamlValue::Mapping(_)) = serde_yaml_ng::from_str::<YamlValue>(text) {
            return Some(Self { update, document, sequence: 0 });
        }

        // Sections are only found after a newline
        let block = format!("\n{text}");
        let mut sections = Mapping::new();
        for key in section_names(text) {
            let parsed = extract_section(block.as_bytes(), key)
                .map(String::from_utf8_lossy)
                .and_then(|body| {
                    serde_yaml_ng::from_str::<YamlValue>(&format!("{key}:\n{body}")).ok()
                })
                .and_then(|value| value.get(key).cloned())
                .filter(|value| !value.is_null());

            let value = match parsed {
                Some(value) => value,
                None => {
                    warn!(section = key, update, "Session section failed to parse");
                    match previous.and_then(|snapshot| snapshot.section(key)) {
                        Some(last_good) => last_good.clone(),
                        None => continue,
                    }
                }
            };
            sections.insert(YamlValue::from(key), value);
        }

        if sections.is_empty() {
            return None;
        }
        Some(Self { update, document: YamlValue::Mapping(sections), sequence: 0 })
    }

    /// Top-level section `key`, if the document has it.
    pub fn section(&self, key: &str) -> Option<&YamlValue> {
        self.document.get(key).filter(|value| !value.is_null())
    }
}

/// Top-level keys of a session block, in order.
fn section_names(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter_map(|line| {
        let name = line.strip_suffix(':')?;
        let plain = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        plain.then_some(name)
    })
}

/// Channels handed out by [`Driver::spawn`].
pub struct DriverChannels {
    /// Latest frame, `None` until the first one. The sender is dropped when
    /// the source ends, leaving the last frame in place.
    pub frames: watch::Receiver<Option<Arc<Frame>>>,
    /// Latest parsed session document
    pub sessions: watch::Receiver<Option<Arc<SessionSnapshot>>>,
    pub cancel: CancellationToken,
}

/// Runs a [`FrameProvider`] on its own task.
///
/// The task owns the provider and publishes every frame into a watch
/// channel until the provider ends or the token is cancelled. When a frame
/// carries a new session update counter the session text is fetched and
/// parsed on a short-lived task, keeping YAML parsing off the frame path.
pub struct Driver;

impl Driver {
    pub fn spawn<P: FrameProvider>(provider: P) -> DriverChannels {
        let (frame_tx, frame_rx) = watch::channel(None);
        let (session_tx, session_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            Self::frame_reader_task(provider, frame_tx, session_tx, task_cancel).await;
        });

        DriverChannels { frames: frame_rx, sessions: session_rx, cancel }
    }

    async fn frame_reader_task<P: FrameProvider>(
        mut provider: P,
        frame_tx: watch::Sender<Option<Arc<Frame>>>,
        session_tx: watch::Sender<Option<Arc<SessionSnapshot>>>,
        cancel: CancellationToken,
    ) {
        info!("Frame reader task started");
        let mut frame_count = 0u64;
        let mut error_count = 0u32;
        let mut last_session_update = None;
        let mut session_sequence = 0u64;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Frame reader cancelled");
                    break;
                }
                result = provider.next_frame() => result,
            };

            match result {
                Ok(Some(frame)) => {
                    frame_count += 1;
                    error_count = 0;
                    let update = frame.session_update();
                    trace!(frame_count, tick = frame.tick(), session = update, "Frame");

                    if last_session_update != Some(update) {
                        debug!(from = ?last_session_update, to = update, "Session update changed");
                        session_sequence += 1;
                        Self::publish_session(&mut provider, update, session_sequence, &session_tx)
                            .await;
                        last_session_update = Some(update);
                    }

                    if frame_tx.send(Some(Arc::new(frame))).is_err() {
                        debug!("Frame receivers dropped, shutting down");
                        break;
                    }
                }
                Ok(None) => {
                    info!(frame_count, "Provider stream ended");
                    break;
                }
                Err(e) => {
                    error_count += 1;
                    error!(error = %e, error_count, max = MAX_ERRORS, "Provider error");

                    if !e.is_retryable() || error_count >= MAX_ERRORS {
                        error!("Provider cannot recover, shutting down");
                        break;
                    }

                    // 100ms, 200ms, 400ms, ... capped at 3.2s
                    let backoff = Duration::from_millis(50 * (1 << error_count.min(6)));
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        info!(frame_count, "Frame reader task ended");
    }

    async fn publish_session<P: FrameProvider>(
        provider: &mut P,
        update: i32,
        sequence: u64,
        session_tx: &watch::Sender<Option<Arc<SessionSnapshot>>>,
    ) {
        let text = match provider.session_text().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!(update, "No session text");
                return;
            }
            Err(e) => {
                warn!(error = %e, update, "Failed to read session text");
                return;
            }
        };

        let session_tx = session_tx.clone();
        tokio::spawn(async move {
            let previous = session_tx.borrow().clone();
            let Some(mut snapshot) = SessionSnapshot::parse(update, &text, previous.as_deref())
            else {
                warn!(update, "Failed to parse session text");
                return;
            };
            snapshot.sequence = sequence;
            debug!(update, bytes = text.len(), "Session text parsed");

            // Parses finish in any order; never replace a newer snapshot
            let snapshot = Arc::new(snapshot);
            let published = session_tx.send_if_modified(|current| {
                if current.as_ref().is_some_and(|newer| newer.sequence > sequence) {
                    return false;
                }
                *current = Some(Arc::clone(&snapshot));
                true
            });
            if !published {
                debug!(update, "Dropped session snapshot superseded by a newer update");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: &str = concat!(
        "---\nWeekendInfo:\n  TrackDisplayName: Okayama\n\n",
        "DriverInfo:\n  DriverCarIdx: 3\n\n",
    );

    #[test]
    fn whole_document_parses_directly() {
        let snapshot = SessionSnapshot::parse(1, SESSION, None).unwrap();
        assert_eq!(snapshot.update, 1);
        let weekend = snapshot.section("WeekendInfo").unwrap();
        assert_eq!(weekend["TrackDisplayName"].as_str(), Some("Okayama"));
        assert_eq!(snapshot.section("DriverInfo").unwrap()["DriverCarIdx"].as_i64(), Some(3));
    }

    #[test]
    fn broken_section_does_not_drop_the_others() {
        let text = concat!(
            "---\nWeekendInfo:\n  TrackDisplayName: Okayama\n\n",
            "DriverInfo:\n  Drivers: [unclosed\n\n",
        );
        let snapshot = SessionSnapshot::parse(2, text, None).unwrap();
        assert!(snapshot.section("WeekendInfo").is_some());
        assert!(snapshot.section("DriverInfo").is_none());
    }

    #[test]
    fn broken_section_keeps_its_last_good_value() {
        let first = SessionSnapshot::parse(1, SESSION, None).unwrap();
        let text = concat!(
            "---\nWeekendInfo:\n  TrackDisplayName: Fuji\n\n",
            "DriverInfo:\n  DriverCarIdx: [unclosed\n\n",
        );
        let second = SessionSnapshot::parse(2, text, Some(&first)).unwrap();

        let weekend = second.section("WeekendInfo").unwrap();
        assert_eq!(weekend["TrackDisplayName"].as_str(), Some("Fuji"));
        assert_eq!(second.section("DriverInfo").unwrap()["DriverCarIdx"].as_i64(), Some(3));
    }

    #[test]
    fn unparseable_block_yields_nothing() {
        assert!(SessionSnapshot::parse(1, "WeekendInfo:\n  a: [unclosed\n\n", None).is_none());
        assert_eq!(section_names(SESSION).collect::<Vec<_>>(), vec!["WeekendInfo", "DriverInfo"]);
    }
}
