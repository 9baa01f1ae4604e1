//! Telemetry variable type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

use super::BitField;

/// Element type of a telemetry variable.
///
/// The discriminants are the raw type tags stored in each variable
/// descriptor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum VariableType {
    /// Raw 8-bit character
    Char = 0,
    /// Boolean stored in a single byte
    Bool = 1,
    /// 32-bit signed integer
    Int32 = 2,
    /// 32-bit unsigned bitfield
    BitField = 3,
    /// IEEE-754 single precision
    Float32 = 4,
    /// IEEE-754 double precision
    Float64 = 5,
}

impl VariableType {
    /// All type tags in tag order.
    pub const ALL: [VariableType; 6] = [
        VariableType::Char,
        VariableType::Bool,
        VariableType::Int32,
        VariableType::BitField,
        VariableType::Float32,
        VariableType::Float64,
    ];

    /// Returns the size in bytes of one element of this type.
    pub const fn size(&self) -> usize {
        match self {
            VariableType::Char | VariableType::Bool => 1,
            VariableType::Int32 | VariableType::BitField | VariableType::Float32 => 4,
            VariableType::Float64 => 8,
        }
    }

    /// Maps a raw descriptor tag to a type, `None` for unknown tags.
    pub const fn from_raw(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(VariableType::Char),
            1 => Some(VariableType::Bool),
            2 => Some(VariableType::Int32),
            3 => Some(VariableType::BitField),
            4 => Some(VariableType::Float32),
            5 => Some(VariableType::Float64),
            _ => None,
        }
    }

    /// The raw descriptor tag for this type.
    pub const fn raw(&self) -> i32 {
        *self as i32
    }
}

/// Decoded telemetry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum Value {
    Char(u8),
    Bool(bool),
    Int32(i32),
    BitField(BitField),
    Float32(f32),
    Float64(f64),
    /// Fixed-length array, one entry per element
    Array(Vec<Value>),
}

impl Value {
    /// Element type of a scalar value; `None` for arrays.
    pub fn variable_type(&self) -> Option<VariableType> {
        match self {
            Value::Char(_) => Some(VariableType::Char),
            Value::Bool(_) => Some(VariableType::Bool),
            Value::Int32(_) => Some(VariableType::Int32),
            Value::BitField(_) => Some(VariableType::BitField),
            Value::Float32(_) => Some(VariableType::Float32),
            Value::Float64(_) => Some(VariableType::Float64),
            Value::Array(_) => None,
        }
    }

    /// Numeric view of a scalar, widening where needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Char(v) => Some(f64::from(*v)),
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Int32(v) => Some(f64::from(*v)),
            Value::BitField(v) => Some(f64::from(v.value())),
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            Value::Array(_) => None,
        }
    }

    /// Integer view of an integral scalar.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Char(v) => Some(i64::from(*v)),
            Value::Bool(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::BitField(v) => Some(i64::from(v.value())),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Char(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::BitField(v) => write!(f, "{:#010x}", v.value()),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Array(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}
