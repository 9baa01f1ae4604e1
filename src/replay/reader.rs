//! Random-access reader for recorded telemetry files.
//!
//! A replay file uses the live layout with a single buffer descriptor. Its
//! records are laid out back to back from that buffer's offset, one buffer
//! length apart, and the disk sub-header says how many there are.
//!
//! ```rust,no_run
//! use pitlane::replay::ReplayFile;
//!
//! fn top_speed() -> pitlane::Result<f32> {
//!     let replay = ReplayFile::open("session.ibt")?;
//!     let speeds = replay.get_all_as::<f32>("Speed").unwrap_or_default();
//!     Ok(speeds.into_iter().fold(0.0, f32::max))
//! }
//! ```

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde_yaml_ng::Value as YamlValue;
use tracing::{debug, info, warn};

use crate::layout::{DiskSubHeader, LayoutHeader, parse_variable_table};
use crate::session::{
    CacheStats, SessionInfoCache, SessionInfoOptions, decode_section, extract_section_at,
};
use crate::{Frame, Result, TelemetryError, Value, VarData, VariableInfo, VariableSchema, codec};

/// A recorded telemetry file held in memory.
#[derive(Debug)]
pub struct ReplayFile {
    data: Vec<u8>,
    path: PathBuf,
    header: LayoutHeader,
    disk: DiskSubHeader,
    records: usize,
    data_offset: usize,
    stride: usize,
    schema: OnceLock<Arc<VariableSchema>>,
    session: SessionInfoCache,
}

impl ReplayFile {
    /// Read and open a replay file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, SessionInfoOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: SessionInfoOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut data = Vec::new();
        File::open(path)
            .and_then(|mut file| file.read_to_end(&mut data))
            .map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;

        Self::from_bytes_with_path(data, path.to_path_buf(), options)
    }

    /// Open a replay held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_path(data, PathBuf::from("<memory>"), SessionInfoOptions::default())
    }

    fn from_bytes_with_path(
        data: Vec<u8>,
        path: PathBuf,
        options: SessionInfoOptions,
    ) -> Result<Self> {
        let header = LayoutHeader::decode(&data)?;
        let disk = DiskSubHeader::decode(&data)?;

        let (table_offset, table_len) = header.var_table_range();
        if table_offset.saturating_add(table_len) > data.len() {
            return Err(TelemetryError::malformed_layout(format!(
                "variable table [{table_offset}, +{table_len}) exceeds file of {} bytes",
                data.len()
            )));
        }

        let data_offset = usize::try_from(header.var_buf[0].buf_offset).unwrap_or(0);
        let stride = usize::try_from(header.buf_len).unwrap_or(0).max(1);

        let declared = disk.declared_records();
        let available = data.len().saturating_sub(data_offset) / stride;
        let records = declared.min(available);
        if records < declared {
            warn!(
                declared,
                available,
                path = %path.display(),
                "Replay file is shorter than its record count, ignoring missing records"
            );
        }

        info!(
            path = %path.display(),
            records,
            tick_rate = header.tick_rate,
            num_vars = header.num_vars,
            "Opened replay file"
        );

        Ok(Self {
            data,
            path,
            header,
            disk,
            records,
            data_offset,
            stride,
            schema: OnceLock::new(),
            session: SessionInfoCache::new(options),
        })
    }

    /// Descriptor table, parsed on first use.
    pub fn variables(&self) -> Result<Arc<VariableSchema>> {
        if let Some(schema) = self.schema.get() {
            return Ok(Arc::clone(schema));
        }

        let (offset, len) = self.header.var_table_range();
        let table = codec::read_bytes(&self.data, offset, len)?;
        let schema = Arc::new(parse_variable_table(
            table,
            usize::try_from(self.header.num_vars).unwrap_or(0),
            usize::try_from(self.header.buf_len).unwrap_or(0),
        )?);

        debug!(variables = schema.variable_count(), "Built replay variable schema");
        Ok(Arc::clone(self.schema.get_or_init(|| schema)))
    }

    fn record_base(&self, index: usize) -> Result<usize> {
        if index >= self.records {
            return Err(TelemetryError::IndexOutOfRange {
                index: index as i128,
                len: self.records,
            });
        }
        Ok(self.data_offset + index * self.stride)
    }

    fn lookup(&self, name: &str) -> Result<VariableInfo> {
        self.variables()?
            .get_variable(name)
            .cloned()
            .ok_or_else(|| TelemetryError::field_not_found(name))
    }

    /// Decode `name` from record `index`, reporting why it is unavailable.
    pub fn record(&self, index: usize, name: &str) -> Result<Value> {
        let info = self.lookup(name)?;
        codec::decode_variable(&self.data, self.record_base(index)?, &info)
    }

    /// Decode `name` from record `index`; absent for unknown names and for
    /// indices outside `0..record_count()`, negative ones included.
    pub fn get<I: TryInto<usize>>(&self, index: I, name: &str) -> Option<Value> {
        let index = index.try_into().ok()?;
        self.record(index, name).ok()
    }

    pub fn get_as<T: VarData, I: TryInto<usize>>(&self, index: I, name: &str) -> Option<T> {
        self.get(index, name).and_then(|value| T::from_value(&value).ok())
    }

    /// `name` decoded from every record in order.
    pub fn values(&self, name: &str) -> Result<Vec<Value>> {
        let info = self.lookup(name)?;
        (0..self.records)
            .map(|index| {
                codec::decode_variable(&self.data, self.data_offset + index * self.stride, &info)
            })
            .collect()
    }

    /// `name` decoded from every record in order; absent for unknown names.
    pub fn get_all(&self, name: &str) -> Option<Vec<Value>> {
        self.values(name).ok()
    }

    pub fn get_all_as<T: VarData>(&self, name: &str) -> Option<Vec<T>> {
        self.get_all(name)?.iter().map(|value| T::from_value(value).ok()).collect()
    }

    /// Copy of record `index` as a [`Frame`] whose tick is the record index.
    pub fn frame(&self, index: usize) -> Result<Frame> {
        let base = self.record_base(index)?;
        let bytes = codec::read_bytes(&self.data, base, self.stride)?;
        Ok(Frame::new(
            bytes.to_vec(),
            i32::try_from(index).unwrap_or(i32::MAX),
            self.header.session_info_update,
            self.variables()?,
        ))
    }

    /// Every record as a [`Frame`], in order.
    pub fn frames(&self) -> impl Iterator<Item = Result<Frame>> + '_ {
        (0..self.records).map(|index| self.frame(index))
    }

    /// Records that can be read, never more than the disk sub-header declares.
    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn disk_header(&self) -> &DiskSubHeader {
        &self.disk
    }

    pub fn header(&self) -> &LayoutHeader {
        &self.header
    }

    /// Records per second of session time.
    pub fn tick_rate(&self) -> f64 {
        f64::from(self.header.tick_rate)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed session section `key`.
    pub fn session_info(&mut self, key: &str) -> Option<Arc<YamlValue>> {
        let (offset, len) = self.header.session_info_range();
        let data = &self.data;
        self.session.get(self.header.session_info_update, key, |key| {
            extract_section_at(data, offset, len, key).map(<[u8]>::to_vec)
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

    /// The whole session text block, cleaned and decoded.
    pub fn session_text(&self) -> Result<String> {
        let (offset, len) = self.header.session_info_range();
        let block = codec::read_bytes(&self.data, offset, len)?;
        Ok(decode_section(block, &self.session.options().text))
    }

    pub fn session_stats(&self) -> CacheStats {
        self.session.stats()
    }

    pub fn session_options(&self) -> &SessionInfoOptions {
        self.session.options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VariableType;
    use crate::test_utils::{DiskFields, LayoutBuilder};
    use anyhow::Context;

    const SESSION_TEXT: &str =
        "---\nWeekendInfo:\n  TrackDisplayName: Road Atlanta\n  TrackLength: 4.09 km\n\n";

    fn builder() -> LayoutBuilder {
        LayoutBuilder::new()
            .buf_len(24)
            .tick_rate(60)
            .var("Speed", VariableType::Float32, 0, 1)
            .var("Lap", VariableType::Int32, 4, 1)
            .var("SessionTime", VariableType::Float64, 8, 1)
            .var("CarIdxLap", VariableType::Int32, 16, 2)
            .session_text(SESSION_TEXT)
    }

    fn replay(records: usize) -> Vec<u8> {
        builder().build_replay(records, |index, w| {
            w.set("Speed", &Value::Float32(index as f32 * 2.0));
            w.set("Lap", &Value::Int32(index as i32 / 10));
            w.set("SessionTime", &Value::Float64(index as f64 / 60.0));
            w.set("CarIdxLap", &Value::Array(vec![Value::Int32(1), Value::Int32(index as i32)]));
        })
    }

    #[test]
    fn boundaries_are_absent_not_errors() -> anyhow::Result<()> {
        let file = ReplayFile::from_bytes(replay(25))?;
        assert_eq!(file.record_count(), 25);

        assert_eq!(file.get(-1, "Speed"), None);
        assert_eq!(file.get(25, "Speed"), None);
        assert_eq!(file.get(24, "Speed"), Some(Value::Float32(48.0)));
        assert_eq!(file.get(0usize, "Speed"), Some(Value::Float32(0.0)));
        assert_eq!(file.get(3, "Throttle"), None);
        Ok(())
    }

    #[test]
    fn record_reports_the_failure_kind() -> anyhow::Result<()> {
        let file = ReplayFile::from_bytes(replay(5))?;
        assert!(matches!(
            file.record(5, "Speed"),
            Err(TelemetryError::IndexOutOfRange { index: 5, len: 5 })
        ));
        assert!(matches!(file.record(0, "Throttle"), Err(TelemetryError::FieldNotFound { .. })));
        Ok(())
    }

    #[test]
    fn get_all_matches_repeated_get() -> anyhow::Result<()> {
        let file = ReplayFile::from_bytes(replay(40))?;
        let all = file.get_all("SessionTime").context("SessionTime")?;
        assert_eq!(all.len(), file.record_count());

        for (index, value) in all.iter().enumerate() {
            assert_eq!(Some(value), file.get(index, "SessionTime").as_ref());
        }
        assert_eq!(file.get_all_as::<i32>("Lap").context("Lap")?[39], 3);
        assert_eq!(file.get_all("Throttle"), None);
        Ok(())
    }

    #[test]
    fn array_records_decode() -> anyhow::Result<()> {
        let file = ReplayFile::from_bytes(replay(3))?;
        assert_eq!(file.get_as::<Vec<i32>, _>(2, "CarIdxLap"), Some(vec![1, 2]));
        Ok(())
    }

    #[test]
    fn short_files_are_clamped_to_complete_records() -> anyhow::Result<()> {
        let mut data = builder().declared_records(10).build_replay(10, |_, _| {});
        data.truncate(data.len() - 24 * 6 - 5);

        let file = ReplayFile::from_bytes(data)?;
        assert_eq!(file.disk_header().record_count, 10);
        assert_eq!(file.record_count(), 3);
        assert_eq!(file.get_all("Speed").map(|v| v.len()), Some(3));
        assert_eq!(file.get(3, "Speed"), None);
        Ok(())
    }

    #[test]
    fn declared_count_bounds_indices() -> anyhow::Result<()> {
        let data = builder().declared_records(2).build_replay(5, |_, _| {});
        let file = ReplayFile::from_bytes(data)?;
        assert_eq!(file.record_count(), 2);
        assert_eq!(file.get(2, "Speed"), None);
        Ok(())
    }

    #[test]
    fn disk_header_is_exposed() -> anyhow::Result<()> {
        let disk = DiskFields {
            start_date: 1_700_000_000,
            start_time: 12.5,
            end_time: 99.0,
            lap_count: 4,
        };
        let file = ReplayFile::from_bytes(builder().disk(disk).build_replay(2, |_, _| {}))?;

        let header = file.disk_header();
        assert_eq!(header.start_date, 1_700_000_000);
        assert_eq!(header.start_time, 12.5);
        assert_eq!(header.end_time, 99.0);
        assert_eq!(header.lap_count, 4);
        assert_eq!(file.tick_rate(), 60.0);
        Ok(())
    }

    #[test]
    fn frames_copy_single_records() -> anyhow::Result<()> {
        let file = ReplayFile::from_bytes(replay(4))?;
        let frame = file.frame(2)?;
        assert_eq!(frame.tick(), 2);
        assert_eq!(frame.get_as::<f32>("Speed"), Some(4.0));

        let speeds: Vec<f32> = file
            .frames()
            .map(|frame| frame.map(|f| f.get_as::<f32>("Speed").unwrap_or(f32::NAN)))
            .collect::<Result<_>>()?;
        assert_eq!(speeds, vec![0.0, 2.0, 4.0, 6.0]);
        assert!(file.frame(4).is_err());
        Ok(())
    }

    #[test]
    fn session_info_reads_from_the_file() -> anyhow::Result<()> {
        let mut file = ReplayFile::from_bytes(replay(1))?;
        let weekend = file.session_info("WeekendInfo").context("WeekendInfo")?;
        assert_eq!(weekend["TrackLength"].as_str(), Some("4.09 km"));
        assert!(file.session_info("DriverInfo").is_none());
        assert!(file.session_text()?.starts_with("---\nWeekendInfo:"));
        Ok(())
    }

    #[test]
    fn malformed_files_fail_to_open() {
        let data = builder().version(0).build_replay(2, |_, _| {});
        assert!(matches!(
            ReplayFile::from_bytes(data),
            Err(TelemetryError::MalformedLayout { .. })
        ));
        assert!(matches!(
            ReplayFile::from_bytes(vec![0u8; 64]),
            Err(TelemetryError::MalformedLayout { .. })
        ));
    }

    #[test]
    fn opens_from_disk() -> anyhow::Result<()> {
        let path =
            std::env::temp_dir().join(format!("pitlane-replay-{}.ibt", std::process::id()));
        std::fs::write(&path, replay(6))?;

        let file = ReplayFile::open(&path);
        std::fs::remove_file(&path)?;
        let file = file?;
        assert_eq!(file.record_count(), 6);
        assert_eq!(file.path(), path.as_path());

        assert!(matches!(
            ReplayFile::open("/definitely/not/here.ibt"),
            Err(TelemetryError::File { .. })
        ));
        Ok(())
    }
}
