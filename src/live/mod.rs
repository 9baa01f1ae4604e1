//! Live telemetry handle over a shared region.
//!
//! [`LiveTelemetry`] bundles one open region with everything derived from
//! it: the descriptor table, the freeze snapshot, the liveness state and
//! the session info cache. Several handles can coexist in a process.
//!
//! Reads outside a freeze pick a buffer per call, so two consecutive reads
//! may come from different ticks. Bracket related reads with
//! [`LiveTelemetry::freeze`] and [`LiveTelemetry::unfreeze`] to make them
//! agree.

mod buffer;
mod liveness;


pub use buffer::{rank_buffers, select_latest_buffer, select_read_buffer};
pub use liveness::{LivenessState, is_live};

use std::io::Write;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value as YamlValue;
use tracing::{debug, info, trace};

use crate::layout::{HEADER_SIZE, LayoutHeader, parse_variable_table};
use crate::session::{
    CacheStats, SessionInfoCache, SessionInfoOptions, decode_section, extract_section,
};
use crate::source::TelemetrySource;
use crate::{Frame, Result, TelemetryError, Value, VarData, VariableSchema, codec};

/// Attempts to copy the newest buffer before giving up on a busy writer.
const CAPTURE_ATTEMPTS: usize = 3;

/// Field probed by the liveness state machine.
const SESSION_NUM_FIELD: &str = "SessionNum";

/// Live handle configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveOptions {
    /// How long `freeze` waits for a fresh-data signal before copying
    pub freeze_wait: Duration,
    pub session: SessionInfoOptions,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self { freeze_wait: Duration::from_millis(32), session: SessionInfoOptions::default() }
    }
}

/// Decoder bound to one live region.
pub struct LiveTelemetry<S: TelemetrySource> {
    source: S,
    options: LiveOptions,
    schema: OnceLock<Arc<VariableSchema>>,
    frozen: Option<Frame>,
    liveness: LivenessState,
    session: SessionInfoCache,
}

impl<S: TelemetrySource> std::fmt::Debug for LiveTelemetry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveTelemetry")
            .field("region_len", &self.source.len())
            .field("frozen_tick", &self.frozen.as_ref().map(Frame::tick))
            .field("liveness", &self.liveness)
            .finish_non_exhaustive()
    }
}

impl<S: TelemetrySource> LiveTelemetry<S> {
    /// Open a region with default options.
    pub fn open(source: S) -> Result<Self> {
        Self::open_with(source, LiveOptions::default())
    }

    /// Open a region, failing with [`TelemetryError::MalformedLayout`] when
    /// its header is unusable or points outside the region.
    pub fn open_with(source: S, options: LiveOptions) -> Result<Self> {
        let region_len = source.len();
        if region_len < HEADER_SIZE {
            return Err(TelemetryError::malformed_layout(format!(
                "region is {region_len} bytes, header needs {HEADER_SIZE}"
            )));
        }

        let header = LayoutHeader::decode(&source.read_vec(0, HEADER_SIZE)?)?;
        header.check_bounds(region_len)?;

        info!(
            version = header.version,
            tick_rate = header.tick_rate,
            num_vars = header.num_vars,
            num_buf = header.num_buf,
            status_connected = header.is_connected(),
            "Opened live telemetry region"
        );

        let session = SessionInfoCache::new(options.session.clone());
        Ok(Self {
            source,
            options,
            schema: OnceLock::new(),
            frozen: None,
            liveness: LivenessState::default(),
            session,
        })
    }

    /// Decode the header as it is right now.
    pub fn header(&self) -> Result<LayoutHeader> {
        LayoutHeader::decode(&self.source.read_vec(0, HEADER_SIZE)?)
    }

    /// Descriptor table, parsed on first use.
    pub fn variables(&self) -> Result<Arc<VariableSchema>> {
        if let Some(schema) = self.schema.get() {
            return Ok(Arc::clone(schema));
        }

        let header = self.header()?;
        let (offset, len) = header.var_table_range();
        let table = self.source.read_vec(offset, len)?;
        let schema = Arc::new(parse_variable_table(
            &table,
            usize::try_from(header.num_vars).unwrap_or(0),
            usize::try_from(header.buf_len).unwrap_or(0),
        )?);

        debug!(variables = schema.variable_count(), "Built variable schema");
        Ok(Arc::clone(self.schema.get_or_init(|| schema)))
    }

    /// Decode `name`, reporting why it is unavailable.
    ///
    /// Served from the snapshot while frozen, otherwise from the buffer
    /// with the second-highest tick.
    pub fn value(&self, name: &str) -> Result<Value> {
        if let Some(frame) = &self.frozen {
            return frame.value(name);
        }

        let schema = self.variables()?;
        let info = schema.get_variable(name).ok_or_else(|| TelemetryError::field_not_found(name))?;

        let header = self.header()?;
        let buffer = select_read_buffer(&header)
            .ok_or_else(|| TelemetryError::buffer_operation_error("no tick buffers", None))?;
        trace!(name, buffer = buffer.index, tick = buffer.tick_count, "Unfrozen read");

        let len = info
            .byte_len()
            .ok_or_else(|| TelemetryError::malformed_layout(format!("'{name}' is too large")))?;
        let offset = buffer.offset.checked_add(info.offset).ok_or_else(|| {
            TelemetryError::memory_access_error(buffer.offset, len, self.source.len())
        })?;

        let bytes = self.source.read_vec(offset, len)?;
        codec::decode_elements(&bytes, 0, info.data_type, info.count)
    }

    /// Decode `name`; absent when unknown or unreadable.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.value(name).ok()
    }

    pub fn get_as<T: VarData>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|value| T::from_value(&value).ok())
    }

    /// Snapshot the newest tick buffer and serve every read from it until
    /// [`unfreeze`](Self::unfreeze). An existing snapshot is released first.
    pub fn freeze(&mut self) -> Result<()> {
        self.unfreeze();

        if !self.source.wait_for_data(self.options.freeze_wait) {
            trace!("No fresh-data signal before freeze, copying newest buffer anyway");
        }

        let frame = self.capture_latest()?;
        debug!(tick = frame.tick(), "Froze tick buffer");
        self.frozen = Some(frame);
        Ok(())
    }

    /// Release the snapshot and return to per-read buffer selection.
    pub fn unfreeze(&mut self) {
        if let Some(frame) = self.frozen.take() {
            trace!(tick = frame.tick(), "Released frozen tick buffer");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn frozen_frame(&self) -> Option<&Frame> {
        self.frozen.as_ref()
    }

    /// Copy the buffer with the highest tick into an owned [`Frame`].
    ///
    /// The copy is retried when the buffer's tick moves while it is read.
    pub fn capture_latest(&self) -> Result<Frame> {
        let schema = self.variables()?;

        for attempt in 0..CAPTURE_ATTEMPTS {
            let header = self.header()?;
            let buffer = select_latest_buffer(&header)
                .ok_or_else(|| TelemetryError::buffer_operation_error("no tick buffers", None))?;

            let data = self.source.read_vec(buffer.offset, buffer.len)?;

            let tick_after = self.header()?.var_buf[buffer.index].tick_count;
            if tick_after == buffer.tick_count {
                return Ok(Frame::new(
                    data,
                    buffer.tick_count,
                    header.session_info_update,
                    Arc::clone(&schema),
                ));
            }

            debug!(
                attempt,
                buffer = buffer.index,
                tick_before = buffer.tick_count,
                tick_after,
                "Tick buffer changed during copy, retrying"
            );
        }

        Err(TelemetryError::buffer_operation_error(
            format!("tick buffer kept changing over {CAPTURE_ATTEMPTS} copies"),
            None,
        ))
    }

    /// Whether the simulator is publishing, with the startup dip smoothed
    /// out by [`LivenessState`].
    pub fn is_connected(&mut self) -> bool {
        let header = match self.header() {
            Ok(header) => header,
            Err(e) => {
                trace!(error = %e, "Region header unusable");
                return false;
            }
        };

        let status_connected = header.is_connected();
        let session_num_present = self.get(SESSION_NUM_FIELD).is_some();

        let previous = self.liveness;
        self.liveness = previous.advance(status_connected, session_num_present);
        if previous != self.liveness {
            debug!(from = ?previous, to = ?self.liveness, "Liveness state changed");
        }

        is_live(true, self.source.has_data_signal(), status_connected, self.liveness)
    }

    pub fn liveness(&self) -> LivenessState {
        self.liveness
    }

    /// Block for at most `timeout` until the writer signals fresh data.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        self.source.wait_for_data(timeout)
    }

    /// Current session info update counter.
    pub fn session_info_update(&self) -> Result<i32> {
        Ok(self.header()?.session_info_update)
    }

    /// Parsed session section `key`, e.g. `"WeekendInfo"`.
    ///
    /// Falls back to the last value that parsed when the section is missing
    /// or unparseable, and is absent only when nothing ever parsed.
    pub fn session_info(&mut self, key: &str) -> Option<Arc<YamlValue>> {
        let header = self.header().ok()?;
        let (offset, len) = header.session_info_range();
        let source = &self.source;

        self.session.get(header.session_info_update, key, |key| {
            let block = source.read_vec(offset, len).ok()?;
            extract_section(&block, key).map(<[u8]>::to_vec)
        })
    }

    /// Session section `key` deserialized into `T`.
    pub fn session_info_as<T: DeserializeOwned>(&mut self, key: &str) -> Result<T> {
        let value = self
            .session_info(key)
            .ok_or_else(|| TelemetryError::SectionNotFound { section: key.to_string() })?;

        serde_yaml_ng::from_value(YamlValue::clone(&value)).map_err(|e| TelemetryError::Parse {
            context: format!("session section '{key}'"),
            details: e.to_string(),
        })
    }

    /// Run deferred session parses. Returns how many ran.
    pub fn poll_session_info(&mut self) -> usize {
        match self.header() {
            Ok(header) => self.session.poll_pending(header.session_info_update),
            Err(_) => 0,
        }
    }

    pub fn session_stats(&self) -> CacheStats {
        self.session.stats()
    }

    /// The whole session text block, cleaned and decoded.
    pub fn session_text(&self) -> Result<String> {
        let header = self.header()?;
        let (offset, len) = header.session_info_range();
        let block = self.source.read_vec(offset, len)?;
        Ok(decode_section(&block, &self.options.session.text))
    }

    /// Write the session text and then every variable of one tick, sorted
    /// by name.
    ///
    /// Uses the frozen snapshot when there is one, otherwise the newest
    /// buffer.
    pub fn write_snapshot<W: Write>(&self, mut out: W) -> Result<()> {
        let frame = match &self.frozen {
            Some(frame) => frame.clone(),
            None => self.capture_latest()?,
        };

        writeln!(out, "{}", self.session_text()?)?;
        for name in frame.schema().sorted_names() {
            let value = frame.value(name)?;
            writeln!(out, "{name:32}{value}")?;
        }

        debug!(tick = frame.tick(), "Wrote telemetry snapshot");
        Ok(())
    }

    /// Write the raw region bytes; reopen them with
    /// [`MemoryRegion::from_file`](crate::source::MemoryRegion::from_file).
    pub fn dump_region<W: Write>(&self, mut out: W) -> Result<()> {
        let bytes = self.source.read_vec(0, self.source.len())?;
        out.write_all(&bytes)?;
        debug!(len = bytes.len(), "Dumped region");
        Ok(())
    }

    pub fn options(&self) -> &LiveOptions {
        &self.options
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Release the snapshot and every cached session value.
    pub fn shutdown(&mut self) {
        self.unfreeze();
        self.session.clear();
        self.liveness = LivenessState::default();
    }

    /// Shut down and release the region.
    pub fn close(mut self) {
        self.shutdown();
    }
}

impl<S: TelemetrySource> Drop for LiveTelemetry<S> {
    fn drop(&mut self) {
        debug!("Closing live telemetry handle");
    }
}
