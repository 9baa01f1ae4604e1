//! Fabricated telemetry regions and replay files for tests and benches.
//!
//! [`LayoutBuilder`] lays out a complete region in memory: root header, disk
//! sub-header, descriptor table, session text block and tick buffers, all at
//! the offsets a simulator would use. No binary fixtures are checked in.
//!
//! ```rust,ignore
//! let layout = LayoutBuilder::new()
//!     .buffers(2)
//!     .var("Speed", VariableType::Float32, 0, 1)
//!     .build();
//! layout.set_value(0, "Speed", &Value::Float32(10.0))?;
//! layout.set_tick(0, 5)?;
//! let live = LiveTelemetry::open(layout.region())?;
//! ```

#![cfg(any(test, feature = "benchmark"))]

use std::collections::HashMap;

use crate::codec;
use crate::layout::{
    DISK_HEADER_OFFSET, DISK_HEADER_SIZE, MAX_BUFS, VAR_BUF_OFFSET, VAR_BUF_SIZE, VAR_HEADER_SIZE,
};
use crate::source::MemoryRegion;
use crate::{Result, Value, VariableType};

const DISK_AREA_END: usize = DISK_HEADER_OFFSET + DISK_HEADER_SIZE;

fn align16(offset: usize) -> usize {
    offset.div_ceil(16) * 16
}

fn put_i32(bytes: &mut [u8], offset: usize, value: i32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_str(bytes: &mut [u8], offset: usize, max: usize, value: &str) {
    let raw = value.as_bytes();
    let len = raw.len().min(max - 1);
    bytes[offset..offset + len].copy_from_slice(&raw[..len]);
}

#[derive(Debug, Clone)]
struct VarSpec {
    name: String,
    type_tag: i32,
    offset: i32,
    count: i32,
    units: String,
    description: String,
}

/// Disk sub-header values for fabricated replay files.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFields {
    pub start_date: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub lap_count: i32,
}

/// Builder for fabricated regions.
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    version: i32,
    status: i32,
    tick_rate: i32,
    session_info_update: i32,
    num_buf: usize,
    buf_len: usize,
    vars: Vec<VarSpec>,
    session_text: String,
    session_capacity: usize,
    disk: DiskFields,
    declared_records: Option<i32>,
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self {
            version: 2,
            status: 1,
            tick_rate: 60,
            session_info_update: 1,
            num_buf: 3,
            buf_len: 64,
            vars: Vec::new(),
            session_text: String::new(),
            session_capacity: 4096,
            disk: DiskFields::default(),
            declared_records: None,
        }
    }
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    pub fn tick_rate(mut self, tick_rate: i32) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    pub fn session_info_update(mut self, counter: i32) -> Self {
        self.session_info_update = counter;
        self
    }

    /// Number of rotating buffers, 1 through 4.
    pub fn buffers(mut self, count: usize) -> Self {
        self.num_buf = count.clamp(1, MAX_BUFS);
        self
    }

    pub fn buf_len(mut self, len: usize) -> Self {
        self.buf_len = len;
        self
    }

    /// Add a descriptor.
    pub fn var(self, name: &str, data_type: VariableType, offset: usize, count: usize) -> Self {
        self.var_raw(name, data_type.raw(), offset as i32, count as i32)
    }

    /// Add a descriptor with an arbitrary type tag.
    pub fn var_raw(mut self, name: &str, type_tag: i32, offset: i32, count: i32) -> Self {
        self.vars.push(VarSpec {
            name: name.to_string(),
            type_tag,
            offset,
            count,
            units: String::new(),
            description: String::new(),
        });
        self
    }

    /// Set units and description of the last added descriptor.
    pub fn describe(mut self, units: &str, description: &str) -> Self {
        if let Some(spec) = self.vars.last_mut() {
            spec.units = units.to_string();
            spec.description = description.to_string();
        }
        self
    }

    pub fn session_text(mut self, text: &str) -> Self {
        self.session_text = text.to_string();
        self
    }

    /// Bytes reserved for the session text block.
    pub fn session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = capacity;
        self
    }

    pub fn disk(mut self, disk: DiskFields) -> Self {
        self.disk = disk;
        self
    }

    /// Record count written to the disk sub-header, when it should differ
    /// from the records actually laid out.
    pub fn declared_records(mut self, records: i32) -> Self {
        self.declared_records = Some(records);
        self
    }

    fn table_offset(&self) -> usize {
        DISK_AREA_END
    }

    fn session_offset(&self) -> usize {
        align16(self.table_offset() + self.vars.len() * VAR_HEADER_SIZE)
    }

    fn data_offset(&self) -> usize {
        align16(self.session_offset() + self.session_capacity)
    }

    fn stride(&self) -> usize {
        align16(self.buf_len.max(1))
    }

    fn offsets(&self) -> HashMap<String, (VariableType, usize)> {
        self.vars
            .iter()
            .filter_map(|spec| {
                let ty = VariableType::from_raw(spec.type_tag)?;
                Some((spec.name.clone(), (ty, usize::try_from(spec.offset).ok()?)))
            })
            .collect()
    }

    /// Header, disk sub-header, table and session block; `total` bytes.
    fn prefix(&self, num_buf: usize, buffer_offsets: &[usize], total: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; total];
        let session_offset = self.session_offset();

        put_i32(&mut bytes, 0, self.version);
        put_i32(&mut bytes, 4, self.status);
        put_i32(&mut bytes, 8, self.tick_rate);
        put_i32(&mut bytes, 12, self.session_info_update);
        put_i32(&mut bytes, 16, self.session_capacity as i32);
        put_i32(&mut bytes, 20, session_offset as i32);
        put_i32(&mut bytes, 24, self.vars.len() as i32);
        put_i32(&mut bytes, 28, self.table_offset() as i32);
        put_i32(&mut bytes, 32, num_buf as i32);
        put_i32(&mut bytes, 36, self.buf_len as i32);
        for (i, offset) in buffer_offsets.iter().enumerate() {
            put_i32(&mut bytes, VAR_BUF_OFFSET + i * VAR_BUF_SIZE + 4, *offset as i32);
        }

        for (i, spec) in self.vars.iter().enumerate() {
            let base = self.table_offset() + i * VAR_HEADER_SIZE;
            put_i32(&mut bytes, base, spec.type_tag);
            put_i32(&mut bytes, base + 4, spec.offset);
            put_i32(&mut bytes, base + 8, spec.count);
            put_str(&mut bytes, base + 16, 32, &spec.name);
            put_str(&mut bytes, base + 48, 64, &spec.description);
            put_str(&mut bytes, base + 112, 32, &spec.units);
        }

        let text = self.session_text.as_bytes();
        let len = text.len().min(self.session_capacity);
        bytes[session_offset..session_offset + len].copy_from_slice(&text[..len]);

        bytes
    }

    /// Lay out a live region.
    pub fn build(self) -> FabricatedLayout {
        let stride = self.stride();
        let buffer_offsets: Vec<usize> =
            (0..self.num_buf).map(|i| self.data_offset() + i * stride).collect();
        let total = self.data_offset() + self.num_buf * stride;
        let bytes = self.prefix(self.num_buf, &buffer_offsets, total);

        FabricatedLayout {
            region: MemoryRegion::new(bytes),
            buffer_offsets,
            buf_len: self.buf_len,
            session_offset: self.session_offset(),
            session_capacity: self.session_capacity,
            variables: self.offsets(),
        }
    }

    /// Lay out a replay file with `records` back-to-back records filled in
    /// by `fill`.
    pub fn build_replay<F>(self, records: usize, mut fill: F) -> Vec<u8>
    where
        F: FnMut(usize, &mut RecordWriter<'_>),
    {
        let data_offset = self.data_offset();
        let total = data_offset + records * self.buf_len;
        let mut bytes = self.prefix(1, &[data_offset], total);
        put_i32(&mut bytes, VAR_BUF_OFFSET, records as i32);

        let disk = DISK_HEADER_OFFSET;
        bytes[disk..disk + 8].copy_from_slice(&self.disk.start_date.to_le_bytes());
        bytes[disk + 8..disk + 16].copy_from_slice(&self.disk.start_time.to_le_bytes());
        bytes[disk + 16..disk + 24].copy_from_slice(&self.disk.end_time.to_le_bytes());
        put_i32(&mut bytes, disk + 24, self.disk.lap_count);
        put_i32(&mut bytes, disk + 28, self.declared_records.unwrap_or(records as i32));

        let variables = self.offsets();
        for index in 0..records {
            let start = data_offset + index * self.buf_len;
            let record = &mut bytes[start..start + self.buf_len];
            let mut writer = RecordWriter { bytes: record, variables: &variables };
            fill(index, &mut writer);
        }
        bytes
    }
}

/// Writes values into one tick buffer or replay record.
pub struct RecordWriter<'a> {
    bytes: &'a mut [u8],
    variables: &'a HashMap<String, (VariableType, usize)>,
}

impl RecordWriter<'_> {
    /// Encode `value` at the descriptor offset of `name`.
    ///
    /// Panics when `name` was not added to the builder.
    pub fn set(&mut self, name: &str, value: &Value) {
        let Some(&(_, offset)) = self.variables.get(name) else {
            panic!("fixture has no variable named {name}");
        };
        let mut encoded = Vec::new();
        codec::encode(value, &mut encoded);
        self.bytes[offset..offset + encoded.len()].copy_from_slice(&encoded);
    }
}

/// A fabricated live region plus handles to mutate it like a writer would.
#[derive(Debug, Clone)]
pub struct FabricatedLayout {
    region: MemoryRegion,
    buffer_offsets: Vec<usize>,
    buf_len: usize,
    session_offset: usize,
    session_capacity: usize,
    variables: HashMap<String, (VariableType, usize)>,
}

impl FabricatedLayout {
    /// Another handle to the shared region.
    pub fn region(&self) -> MemoryRegion {
        self.region.clone()
    }

    pub fn buffer_offset(&self, buffer: usize) -> usize {
        self.buffer_offsets[buffer]
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_offsets.len()
    }

    pub fn set_tick(&self, buffer: usize, tick: i32) -> Result<()> {
        self.region.write_at(VAR_BUF_OFFSET + buffer * VAR_BUF_SIZE, &tick.to_le_bytes())
    }

    pub fn set_status(&self, status: i32) -> Result<()> {
        self.region.write_at(4, &status.to_le_bytes())
    }

    pub fn set_version(&self, version: i32) -> Result<()> {
        self.region.write_at(0, &version.to_le_bytes())
    }

    /// Encode one variable into `buffer`.
    pub fn set_value(&self, buffer: usize, name: &str, value: &Value) -> Result<()> {
        let Some(&(_, offset)) = self.variables.get(name) else {
            panic!("fixture has no variable named {name}");
        };
        let mut encoded = Vec::new();
        codec::encode(value, &mut encoded);
        self.region.write_at(self.buffer_offset(buffer) + offset, &encoded)
    }

    /// A full buffer payload built by `fill`, zero elsewhere.
    pub fn payload<F>(&self, fill: F) -> Vec<u8>
    where
        F: FnOnce(&mut RecordWriter<'_>),
    {
        let mut bytes = vec![0u8; self.buf_len];
        let mut writer = RecordWriter { bytes: &mut bytes, variables: &self.variables };
        fill(&mut writer);
        bytes
    }

    /// Replace a whole buffer in one write.
    pub fn write_buffer(&self, buffer: usize, payload: &[u8]) -> Result<()> {
        self.region.write_at(self.buffer_offset(buffer), payload)
    }

    /// Replace the session text and publish `counter`.
    pub fn set_session_text(&self, text: &str, counter: i32) -> Result<()> {
        let mut block = vec![0u8; self.session_capacity];
        let len = text.len().min(self.session_capacity);
        block[..len].copy_from_slice(&text.as_bytes()[..len]);
        self.region.write_at(self.session_offset, &block)?;
        self.region.write_at(12, &counter.to_le_bytes())
    }
}
