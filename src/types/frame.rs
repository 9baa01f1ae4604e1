//! Owned copy of one tick buffer

use std::sync::Arc;

use super::{Value, VarData, VariableSchema};
use crate::{Result, TelemetryError, codec};

/// Point-in-time copy of a single tick buffer.
///
/// The bytes start at the buffer's first byte, so every variable is decoded
/// at its descriptor offset with a base of zero. A frozen live handle, a
/// replay record and every streamed frame are all `Frame`s.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    tick: i32,
    session_update: i32,
    schema: Arc<VariableSchema>,
}

impl Frame {
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        tick: i32,
        session_update: i32,
        schema: Arc<VariableSchema>,
    ) -> Self {
        Self { data: data.into(), tick, session_update, schema }
    }

    /// Decode a variable, reporting why it is unavailable.
    pub fn value(&self, name: &str) -> Result<Value> {
        let info =
            self.schema.get_variable(name).ok_or_else(|| TelemetryError::field_not_found(name))?;
        codec::decode_variable(&self.data, 0, info)
    }

    /// Decode a variable; absent when unknown.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.value(name).ok()
    }

    pub fn get_as<T: VarData>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|value| T::from_value(&value).ok())
    }

    /// Tick counter of the buffer this frame was copied from.
    pub fn tick(&self) -> i32 {
        self.tick
    }

    /// Session info update counter observed when the frame was taken.
    pub fn session_update(&self) -> i32 {
        self.session_update
    }

    pub fn schema(&self) -> &Arc<VariableSchema> {
        &self.schema
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
