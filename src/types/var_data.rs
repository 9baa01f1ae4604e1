//! Typed extraction from decoded values

use super::{BitField, Value};
use crate::{Result, TelemetryError};

/// Types that can be pulled out of a decoded [`Value`].
///
/// Conversions are lossless: `f64` accepts single precision values, `u32`
/// accepts bitfields, and `Vec<T>` accepts arrays (or a scalar as a
/// one-element vector). Anything else is a [`TelemetryError::TypeConversion`].
pub trait VarData: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(TelemetryError::TypeConversion { details: format!("Expected {expected}, got {value:?}") })
}

impl VarData for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float32(v) => Ok(*v),
            other => mismatch("Float32", other),
        }
    }
}

impl VarData for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float64(v) => Ok(*v),
            Value::Float32(v) => Ok(f64::from(*v)),
            other => mismatch("Float64 or Float32", other),
        }
    }
}

impl VarData for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int32(v) => Ok(*v),
            other => mismatch("Int32", other),
        }
    }
}

impl VarData for u32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::BitField(v) => Ok(v.value()),
            other => mismatch("BitField", other),
        }
    }
}

impl VarData for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(*v),
            other => mismatch("Bool", other),
        }
    }
}

impl VarData for u8 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Char(v) => Ok(*v),
            other => mismatch("Char", other),
        }
    }
}

impl VarData for BitField {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::BitField(v) => Ok(*v),
            // Some flag words are published with the int tag
            Value::Int32(v) => Ok(BitField(*v as u32)),
            other => mismatch("BitField or Int32", other),
        }
    }
}

impl VarData for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl<T: VarData> VarData for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(values) => values.iter().map(T::from_value).collect(),
            scalar => Ok(vec![T::from_value(scalar)?]),
        }
    }
}
