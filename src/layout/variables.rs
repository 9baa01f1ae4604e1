//! Variable descriptor table parsing
//!
//! ```c
//! struct varHeader {            // 144 bytes
//!     int  type;                //   0  element type tag
//!     int  offset;              //   4  byte offset within a tick buffer
//!     int  count;               //   8  element count
//!     bool countAsTime;         //  12
//!     char pad[3];
//!     char name[32];            //  16
//!     char desc[64];            //  48
//!     char unit[32];            // 112
//! };
//! ```

use tracing::{debug, warn};

use crate::codec::{i32_at, read_bytes};
use crate::session::decode_code_page;
use crate::{Result, TelemetryError, VariableInfo, VariableSchema, VariableType};

/// Size of one descriptor record.
pub const VAR_HEADER_SIZE: usize = 144;

const NAME_OFFSET: usize = 16;
const NAME_LEN: usize = 32;
const DESC_OFFSET: usize = 48;
const DESC_LEN: usize = 64;
const UNIT_OFFSET: usize = 112;
const UNIT_LEN: usize = 32;

/// One descriptor record as stored, before type mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDescriptor {
    pub type_tag: i32,
    pub offset: i32,
    pub count: i32,
    pub count_as_time: bool,
    pub name: String,
    pub description: String,
    pub unit: String,
}

impl RawDescriptor {
    /// Decode record `index` of a descriptor table.
    pub fn decode(table: &[u8], index: usize) -> Result<Self> {
        let base = index.checked_mul(VAR_HEADER_SIZE).ok_or_else(|| {
            TelemetryError::memory_access_error(usize::MAX, VAR_HEADER_SIZE, table.len())
        })?;
        let record = read_bytes(table, base, VAR_HEADER_SIZE)?;

        Ok(Self {
            type_tag: i32_at(record, 0)?,
            offset: i32_at(record, 4)?,
            count: i32_at(record, 8)?,
            count_as_time: record[12] != 0,
            name: fixed_string(&record[NAME_OFFSET..NAME_OFFSET + NAME_LEN]),
            description: fixed_string(&record[DESC_OFFSET..DESC_OFFSET + DESC_LEN]),
            unit: fixed_string(&record[UNIT_OFFSET..UNIT_OFFSET + UNIT_LEN]),
        })
    }

    /// Map to a [`VariableInfo`]; `None` for records that describe nothing.
    pub fn to_variable_info(&self) -> Result<Option<VariableInfo>> {
        if self.name.is_empty() || self.count == 0 {
            return Ok(None);
        }

        let Some(data_type) = VariableType::from_raw(self.type_tag) else {
            warn!(name = %self.name, type_tag = self.type_tag, "Unknown variable type, skipping");
            return Ok(None);
        };

        let (Ok(offset), Ok(count)) = (usize::try_from(self.offset), usize::try_from(self.count))
        else {
            return Err(TelemetryError::malformed_layout(format!(
                "variable '{}' has offset {} and count {}",
                self.name, self.offset, self.count
            )));
        };

        Ok(Some(VariableInfo {
            name: self.name.clone(),
            data_type,
            offset,
            count,
            count_as_time: self.count_as_time,
            units: self.unit.clone(),
            description: self.description.clone(),
        }))
    }
}

/// Null-terminated fixed-length field, decoded one byte per code point.
fn fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    decode_code_page(&bytes[..end])
}

/// Parse exactly `num_vars` descriptors from `table` into a schema whose
/// entries must fit within `buf_len` bytes.
///
/// `table` starts at the first record, i.e. at the header's variable table
/// offset.
pub fn parse_variable_table(
    table: &[u8],
    num_vars: usize,
    buf_len: usize,
) -> Result<VariableSchema> {
    debug!(num_vars, buf_len, "Parsing variable descriptor table");

    let needed = num_vars.saturating_mul(VAR_HEADER_SIZE);
    if table.len() < needed {
        return Err(TelemetryError::malformed_layout(format!(
            "descriptor table needs {needed} bytes, {} available",
            table.len()
        )));
    }

    let mut variables = Vec::with_capacity(num_vars);
    for index in 0..num_vars {
        if let Some(info) = RawDescriptor::decode(table, index)?.to_variable_info()? {
            variables.push(info);
        }
    }

    if variables.len() < num_vars {
        debug!(parsed = variables.len(), declared = num_vars, "Skipped empty descriptors");
    }

    VariableSchema::new(variables, buf_len)
}
