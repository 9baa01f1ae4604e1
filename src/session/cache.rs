//! Per-section session info cache.
//!
//! Parsing session text is by far the most expensive thing a poll can do,
//! so every requested top-level section is cached and only re-parsed when
//! both of these hold:
//!
//! - the header's session info update counter has changed since the value
//!   was cached, and
//! - the section's raw bytes differ from the bytes last parsed.
//!
//! When a refresh finds no section or unparseable text, the last value that
//! did parse is served instead.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value as YamlValue;
use tracing::{debug, trace, warn};

use super::text::{SessionTextOptions, decode_section, repair_yaml};
use crate::{Result, TelemetryError};

/// When section parsing happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParseMode {
    /// Parse inside the request that found changed bytes.
    #[default]
    Immediate,
    /// Queue the parse and run it at the start of the next cache access,
    /// dropping it if the update counter moved in between. Requests keep
    /// returning the previous value until the parse lands.
    Deferred,
}

/// Session info configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfoOptions {
    pub parse_mode: ParseMode,
    pub text: SessionTextOptions,
}

/// Counters describing how requests were served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Structured parser invocations
    pub parses: u64,
    /// Requests answered from the current value
    pub hits: u64,
    /// Refreshes that found identical bytes and skipped parsing
    pub reused: u64,
    /// Requests answered with the last known good value after a failed refresh
    pub fallbacks: u64,
    /// Deferred parses dropped because the update counter moved
    pub discarded: u64,
}

#[derive(Debug, Default)]
struct CacheEntry {
    current: Option<Arc<YamlValue>>,
    last_good: Option<Arc<YamlValue>>,
    raw: Option<Vec<u8>>,
    generation: Option<i32>,
}

#[derive(Debug)]
struct PendingParse {
    key: String,
    raw: Vec<u8>,
    generation: i32,
}

/// Parse one section's raw bytes and return the value under `key`.
///
/// `Ok(None)` means the text parsed but holds no value for the key.
pub fn parse_section(
    key: &str,
    raw: &[u8],
    options: &SessionTextOptions,
) -> Result<Option<YamlValue>> {
    let text = repair_yaml(&decode_section(raw, options), options);
    let document = format!("{key}:\n{text}");

    let parsed: YamlValue = serde_yaml_ng::from_str(&document).map_err(|e| {
        TelemetryError::MalformedText { section: key.to_string(), details: e.to_string() }
    })?;

    Ok(parsed.get(key).filter(|value| !value.is_null()).cloned())
}

/// Cache of parsed session sections for one open region or file.
#[derive(Debug, Default)]
pub struct SessionInfoCache {
    entries: HashMap<String, CacheEntry>,
    pending: Vec<PendingParse>,
    observed_update: Option<i32>,
    options: SessionInfoOptions,
    stats: CacheStats,
}

impl SessionInfoCache {
    pub fn new(options: SessionInfoOptions) -> Self {
        Self { options, ..Self::default() }
    }

    /// Look up section `key` given the header's current update counter.
    ///
    /// `extract` is only called when the section has to be refreshed and
    /// returns the section's raw bytes, `None` when it is missing.
    pub fn get<F>(&mut self, update_counter: i32, key: &str, extract: F) -> Option<Arc<YamlValue>>
    where
        F: FnOnce(&str) -> Option<Vec<u8>>,
    {
        self.observe(update_counter);
        self.run_pending();

        let entry = self.entries.entry(key.to_string()).or_default();
        let fresh = entry.generation == Some(update_counter);
        if let Some(current) = entry.current.as_ref().filter(|_| fresh) {
            self.stats.hits += 1;
            return Some(Arc::clone(current));
        }

        let Some(raw) = extract(key) else {
            trace!(section = key, "Section not present, using last known good");
            self.stats.fallbacks += 1;
            return entry.last_good.clone();
        };

        if entry.raw.as_deref() == Some(raw.as_slice()) {
            trace!(section = key, "Section bytes unchanged, skipping parse");
            self.stats.reused += 1;
            entry.current = entry.last_good.clone();
            entry.generation = Some(update_counter);
            return entry.last_good.clone();
        }

        match self.options.parse_mode {
            ParseMode::Immediate => self.complete_parse(key, raw, update_counter),
            ParseMode::Deferred => {
                let fallback = entry.last_good.clone();
                if !self.pending.iter().any(|job| job.key == key) {
                    trace!(section = key, "Deferring section parse");
                    self.pending.push(PendingParse {
                        key: key.to_string(),
                        raw,
                        generation: update_counter,
                    });
                }
                fallback
            }
        }
    }

    /// Run deferred parses that are still current for `update_counter`.
    /// Returns how many parses ran.
    pub fn poll_pending(&mut self, update_counter: i32) -> usize {
        self.observe(update_counter);
        self.run_pending()
    }

    /// Number of queued deferred parses.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Update counter the cached value of `key` belongs to.
    pub fn section_generation(&self, key: &str) -> Option<i32> {
        self.entries.get(key).and_then(|entry| entry.generation)
    }

    /// Update counter seen on the last access.
    pub fn observed_update(&self) -> Option<i32> {
        self.observed_update
    }

    pub fn options(&self) -> &SessionInfoOptions {
        &self.options
    }

    /// Drop every entry and queued parse.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
        self.observed_update = None;
    }

    fn observe(&mut self, update_counter: i32) {
        if self.observed_update == Some(update_counter) {
            return;
        }

        if let Some(previous) = self.observed_update {
            debug!(previous, current = update_counter, "Session info changed");
        }

        for entry in self.entries.values_mut() {
            if let Some(current) = entry.current.take() {
                entry.last_good = Some(current);
            }
        }
        self.observed_update = Some(update_counter);
    }

    fn run_pending(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let mut ran = 0;
        for job in std::mem::take(&mut self.pending) {
            if Some(job.generation) != self.observed_update {
                warn!(
                    section = %job.key,
                    generation = job.generation,
                    "Session info moved on, discarding deferred parse"
                );
                self.stats.discarded += 1;
                continue;
            }
            self.complete_parse(&job.key, job.raw, job.generation);
            ran += 1;
        }
        ran
    }

    fn complete_parse(
        &mut self,
        key: &str,
        raw: Vec<u8>,
        generation: i32,
    ) -> Option<Arc<YamlValue>> {
        self.stats.parses += 1;
        let parsed = parse_section(key, &raw, &self.options.text);

        let entry = self.entries.entry(key.to_string()).or_default();
        entry.raw = Some(raw);
        entry.generation = Some(generation);

        match parsed {
            Ok(Some(value)) => {
                debug!(section = key, generation, "Parsed session section");
                let value = Arc::new(value);
                entry.current = Some(Arc::clone(&value));
                entry.last_good = Some(Arc::clone(&value));
                Some(value)
            }
            Ok(None) => {
                debug!(section = key, "Section parsed without a value, using last known good");
                self.stats.fallbacks += 1;
                entry.last_good.clone()
            }
            Err(e) => {
                warn!(section = key, error = %e, "Failed to parse session section");
                self.stats.fallbacks += 1;
                entry.last_good.clone()
            }
        }
    }
}
