//! Root header and disk sub-header decoding
//!
//! ```c
//! struct header {               // 112 bytes
//!     int ver;                  //  0
//!     int status;               //  4  bit 0: connected
//!     int tickRate;             //  8
//!     int sessionInfoUpdate;    // 12
//!     int sessionInfoLen;       // 16
//!     int sessionInfoOffset;    // 20
//!     int numVars;              // 24
//!     int varHeaderOffset;      // 28
//!     int numBuf;               // 32
//!     int bufLen;               // 36
//!     int pad[2];               // 40
//!     varBuf varBuf[4];         // 48, 16 bytes each: tickCount, bufOffset, pad[2]
//! };
//!
//! struct diskSubHeader {        // 32 bytes at offset 112, replay files only
//!     int64  sessionStartDate;  //  0
//!     double sessionStartTime;  //  8
//!     double sessionEndTime;    // 16
//!     int    sessionLapCount;   // 24
//!     int    sessionRecordCount;// 28
//! };
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::codec::{f64_at, i32_at, i64_at, read_bytes};
use crate::{Result, TelemetryError};

/// Size of the root header in bytes.
pub const HEADER_SIZE: usize = 112;
/// Maximum number of rotating tick buffers.
pub const MAX_BUFS: usize = 4;
/// Offset of the first rotating-buffer descriptor.
pub const VAR_BUF_OFFSET: usize = 48;
/// Stride of one rotating-buffer descriptor.
pub const VAR_BUF_SIZE: usize = 16;
/// Status bit set while the simulator is publishing.
pub const STATUS_CONNECTED: i32 = 0x1;
/// Offset of the disk sub-header in replay files.
pub const DISK_HEADER_OFFSET: usize = HEADER_SIZE;
/// Size of the disk sub-header in bytes.
pub const DISK_HEADER_SIZE: usize = 32;

/// Tick counter and byte offset of one rotating buffer, as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VarBuf {
    pub tick_count: i32,
    pub buf_offset: i32,
}

/// Decoded root header.
///
/// This is a copy taken at one instant; tick counts keep moving in a live
/// region, so callers re-decode rather than hold on to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutHeader {
    pub version: i32,
    pub status: i32,
    pub tick_rate: i32,
    /// Bumped by the writer whenever the session text changes
    pub session_info_update: i32,
    pub session_info_len: i32,
    pub session_info_offset: i32,
    pub num_vars: i32,
    pub var_header_offset: i32,
    pub num_buf: i32,
    pub buf_len: i32,
    pub var_buf: [VarBuf; MAX_BUFS],
}

/// One rotating tick buffer resolved to a byte range of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickBuffer {
    /// Position in the header's buffer list
    pub index: usize,
    pub tick_count: i32,
    pub offset: usize,
    pub len: usize,
}

impl TickBuffer {
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.len)
    }
}

impl LayoutHeader {
    /// Decode and validate the header at the start of `region`.
    pub fn decode(region: &[u8]) -> Result<Self> {
        let header = Self::decode_unchecked(region)?;
        header.validate()?;
        Ok(header)
    }

    /// Decode the header fields without checking them.
    pub fn decode_unchecked(region: &[u8]) -> Result<Self> {
        trace!(region_len = region.len(), "Decoding layout header");

        if region.len() < HEADER_SIZE {
            return Err(TelemetryError::malformed_layout(format!(
                "region is {} bytes, header needs {}",
                region.len(),
                HEADER_SIZE
            )));
        }

        let mut var_buf = [VarBuf::default(); MAX_BUFS];
        for (i, slot) in var_buf.iter_mut().enumerate() {
            let base = VAR_BUF_OFFSET + i * VAR_BUF_SIZE;
            *slot =
                VarBuf { tick_count: i32_at(region, base)?, buf_offset: i32_at(region, base + 4)? };
        }

        Ok(Self {
            version: i32_at(region, 0)?,
            status: i32_at(region, 4)?,
            tick_rate: i32_at(region, 8)?,
            session_info_update: i32_at(region, 12)?,
            session_info_len: i32_at(region, 16)?,
            session_info_offset: i32_at(region, 20)?,
            num_vars: i32_at(region, 24)?,
            var_header_offset: i32_at(region, 28)?,
            num_buf: i32_at(region, 32)?,
            buf_len: i32_at(region, 36)?,
            var_buf,
        })
    }

    /// Check the invariants that make a region usable.
    pub fn validate(&self) -> Result<()> {
        if self.version < 1 {
            return Err(TelemetryError::malformed_layout(format!(
                "unsupported layout version {}",
                self.version
            )));
        }

        if self.num_vars <= 0 {
            return Err(TelemetryError::malformed_layout(format!(
                "variable count is {}",
                self.num_vars
            )));
        }

        if self.num_buf < 1 || self.num_buf as usize > MAX_BUFS {
            return Err(TelemetryError::malformed_layout(format!(
                "expected 1-{} tick buffers, found {}",
                MAX_BUFS, self.num_buf
            )));
        }

        if self.buf_len <= 0 {
            return Err(TelemetryError::malformed_layout(format!(
                "invalid buffer length {}",
                self.buf_len
            )));
        }

        let offsets = [
            ("variable table", self.var_header_offset),
            ("session info", self.session_info_offset),
            ("session info length", self.session_info_len),
        ];
        for (what, value) in offsets {
            if value < 0 {
                return Err(TelemetryError::malformed_layout(format!("negative {what}: {value}")));
            }
        }

        for buf in self.var_buf.iter().take(self.num_buf as usize) {
            if buf.buf_offset < 0 {
                return Err(TelemetryError::malformed_layout(format!(
                    "negative tick buffer offset {}",
                    buf.buf_offset
                )));
            }
        }

        Ok(())
    }

    /// Check that the variable table and every tick buffer lie inside a
    /// region of `region_len` bytes.
    pub fn check_bounds(&self, region_len: usize) -> Result<()> {
        let (table_offset, table_len) = self.var_table_range();
        if table_offset.saturating_add(table_len) > region_len {
            return Err(TelemetryError::malformed_layout(format!(
                "variable table [{table_offset}, +{table_len}) exceeds region of {region_len} bytes"
            )));
        }

        for buffer in self.tick_buffers() {
            if buffer.end() > region_len {
                return Err(TelemetryError::malformed_layout(format!(
                    "tick buffer {} [{}, +{}) exceeds region of {region_len} bytes",
                    buffer.index, buffer.offset, buffer.len
                )));
            }
        }

        debug!(
            version = self.version,
            num_vars = self.num_vars,
            num_buf = self.num_buf,
            buf_len = self.buf_len,
            region_len,
            "Layout header fits region"
        );
        Ok(())
    }

    /// Whether the status word has the connected bit set.
    pub fn is_connected(&self) -> bool {
        self.status & STATUS_CONNECTED != 0
    }

    /// The active rotating buffers, built from the buffer count and stride.
    pub fn tick_buffers(&self) -> Vec<TickBuffer> {
        let count = usize::try_from(self.num_buf).unwrap_or(0).min(MAX_BUFS);
        let len = usize::try_from(self.buf_len).unwrap_or(0);

        self.var_buf
            .iter()
            .take(count)
            .enumerate()
            .map(|(index, buf)| TickBuffer {
                index,
                tick_count: buf.tick_count,
                offset: usize::try_from(buf.buf_offset).unwrap_or(0),
                len,
            })
            .collect()
    }

    /// Offset and length of the descriptor table.
    pub fn var_table_range(&self) -> (usize, usize) {
        let offset = usize::try_from(self.var_header_offset).unwrap_or(0);
        let count = usize::try_from(self.num_vars).unwrap_or(0);
        (offset, count.saturating_mul(super::VAR_HEADER_SIZE))
    }

    /// Offset and length of the session text block.
    pub fn session_info_range(&self) -> (usize, usize) {
        (
            usize::try_from(self.session_info_offset).unwrap_or(0),
            usize::try_from(self.session_info_len).unwrap_or(0),
        )
    }
}

/// Replay-file metadata stored right after the root header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskSubHeader {
    /// Session start as seconds since the Unix epoch
    pub start_date: i64,
    /// Session time of the first record, seconds
    pub start_time: f64,
    /// Session time of the last record, seconds
    pub end_time: f64,
    pub lap_count: i32,
    /// Number of records declared by the writer
    pub record_count: i32,
}

impl DiskSubHeader {
    /// Decode the sub-header at its fixed offset in `file`.
    pub fn decode(file: &[u8]) -> Result<Self> {
        let bytes = read_bytes(file, DISK_HEADER_OFFSET, DISK_HEADER_SIZE).map_err(|_| {
            TelemetryError::malformed_layout(format!(
                "file is {} bytes, disk header needs {}",
                file.len(),
                DISK_HEADER_OFFSET + DISK_HEADER_SIZE
            ))
        })?;

        Ok(Self {
            start_date: i64_at(bytes, 0)?,
            start_time: f64_at(bytes, 8)?,
            end_time: f64_at(bytes, 16)?,
            lap_count: i32_at(bytes, 24)?,
            record_count: i32_at(bytes, 28)?,
        })
    }

    /// Declared record count, with negative values read as zero.
    pub fn declared_records(&self) -> usize {
        usize::try_from(self.record_count).unwrap_or(0)
    }
}
