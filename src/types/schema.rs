//! Telemetry variable schema types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use super::VariableType;
use crate::{Result, TelemetryError};

/// Ordered variable table with O(1) lookup by name.
///
/// Built once per open region or file and immutable afterwards. The ordered
/// list keeps every descriptor in table order; the name index points at the
/// last descriptor carrying a given name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSchema {
    variables: Vec<VariableInfo>,
    index: HashMap<String, usize>,
    duplicates: Vec<String>,
    /// Size of one tick buffer in bytes
    pub frame_size: usize,
}

impl VariableSchema {
    /// Create a schema from descriptors in table order.
    ///
    /// Fails with [`TelemetryError::MalformedLayout`] when a descriptor does
    /// not fit inside `frame_size`.
    pub fn new(variables: Vec<VariableInfo>, frame_size: usize) -> Result<Self> {
        let mut index = HashMap::with_capacity(variables.len());
        let mut duplicates = Vec::new();

        for (position, info) in variables.iter().enumerate() {
            if index.insert(info.name.clone(), position).is_some() {
                warn!(name = %info.name, "Duplicate variable name, later descriptor wins");
                duplicates.push(info.name.clone());
            }
        }

        let schema = Self { variables, index, duplicates, frame_size };
        schema.validate()?;
        Ok(schema)
    }

    /// Check every descriptor against the buffer stride.
    pub fn validate(&self) -> Result<()> {
        for info in &self.variables {
            if info.count == 0 {
                return Err(TelemetryError::malformed_layout(format!(
                    "variable '{}' has an element count of 0",
                    info.name
                )));
            }

            match info.end_offset() {
                Some(end) if end <= self.frame_size => {}
                _ => {
                    return Err(TelemetryError::malformed_layout(format!(
                        "variable '{}' ({:?} x {} at offset {}) exceeds buffer length {}",
                        info.name, info.data_type, info.count, info.offset, self.frame_size
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get variable info by name (O(1) lookup).
    pub fn get_variable(&self, name: &str) -> Option<&VariableInfo> {
        self.index.get(name).and_then(|&position| self.variables.get(position))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of distinct variable names.
    pub fn variable_count(&self) -> usize {
        self.index.len()
    }

    /// Descriptors in table order, duplicates included.
    pub fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    /// Distinct names sorted alphabetically.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Names that appeared more than once in the descriptor table.
    pub fn duplicate_names(&self) -> &[String] {
        &self.duplicates
    }
}

/// Information about a specific telemetry variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct VariableInfo {
    /// Variable name as published by the simulator
    pub name: String,
    /// Element type
    pub data_type: VariableType,
    /// Byte offset within a tick buffer
    pub offset: usize,
    /// Number of elements (1 for scalar, >1 for arrays)
    pub count: usize,
    /// Whether the simulator treats the element count as a time dimension
    pub count_as_time: bool,
    /// Units of measurement (e.g., "m/s", "C", "N*m")
    pub units: String,
    /// Human-readable description
    pub description: String,
}

impl VariableInfo {
    /// Total bytes covered by all elements.
    pub fn byte_len(&self) -> Option<usize> {
        self.data_type.size().checked_mul(self.count)
    }

    /// One past the last byte of this variable within a tick buffer.
    pub fn end_offset(&self) -> Option<usize> {
        self.byte_len().and_then(|len| self.offset.checked_add(len))
    }

    pub fn is_array(&self) -> bool {
        self.count > 1
    }
}
