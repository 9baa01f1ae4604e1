//! Little-endian value codec.
//!
//! All decoding goes through [`read_bytes`], the single bounds check between
//! a descriptor and the bytes it points at. A read that would leave the
//! region is a [`TelemetryError::Memory`] error, never a read of adjacent
//! memory.

use crate::{BitField, Result, TelemetryError, Value, VariableInfo, VariableType};

/// Borrow `len` bytes at `offset`, failing when the range leaves `data`.
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| TelemetryError::memory_access_error(offset, len, data.len()))
}

fn le<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    out.copy_from_slice(read_bytes(data, offset, N)?);
    Ok(out)
}

pub(crate) fn i32_at(data: &[u8], offset: usize) -> Result<i32> {
    le(data, offset).map(i32::from_le_bytes)
}

pub(crate) fn i64_at(data: &[u8], offset: usize) -> Result<i64> {
    le(data, offset).map(i64::from_le_bytes)
}

pub(crate) fn f64_at(data: &[u8], offset: usize) -> Result<f64> {
    le(data, offset).map(f64::from_le_bytes)
}

/// Decode one element of type `ty` at `offset`.
pub fn decode_scalar(data: &[u8], offset: usize, ty: VariableType) -> Result<Value> {
    let value = match ty {
        VariableType::Char => Value::Char(le::<1>(data, offset)?[0]),
        VariableType::Bool => Value::Bool(le::<1>(data, offset)?[0] != 0),
        VariableType::Int32 => Value::Int32(i32::from_le_bytes(le(data, offset)?)),
        VariableType::BitField => Value::BitField(BitField(u32::from_le_bytes(le(data, offset)?))),
        VariableType::Float32 => Value::Float32(f32::from_le_bytes(le(data, offset)?)),
        VariableType::Float64 => Value::Float64(f64::from_le_bytes(le(data, offset)?)),
    };
    Ok(value)
}

/// Decode `count` consecutive elements starting at `offset`.
///
/// A count of one yields a scalar; anything else yields [`Value::Array`]
/// with element `i` read at `offset + i * ty.size()`.
pub fn decode_elements(
    data: &[u8],
    offset: usize,
    ty: VariableType,
    count: usize,
) -> Result<Value> {
    let size = ty.size();
    let total = size
        .checked_mul(count)
        .ok_or_else(|| TelemetryError::memory_access_error(offset, usize::MAX, data.len()))?;
    let bytes = read_bytes(data, offset, total)?;

    if count == 1 {
        return decode_scalar(bytes, 0, ty);
    }

    (0..count)
        .map(|i| decode_scalar(bytes, i * size, ty))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

/// Decode a described variable from a buffer that starts at `base`.
pub fn decode_variable(data: &[u8], base: usize, info: &VariableInfo) -> Result<Value> {
    let offset = base
        .checked_add(info.offset)
        .ok_or_else(|| TelemetryError::memory_access_error(base, info.offset, data.len()))?;
    decode_elements(data, offset, info.data_type, info.count)
}

/// Append the little-endian encoding of `value`.
///
/// Booleans encode as `0`/`1`; arrays encode their elements back to back.
pub fn encode(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Char(v) => out.push(*v),
        Value::Bool(v) => out.push(u8::from(*v)),
        Value::Int32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::BitField(v) => out.extend_from_slice(&v.value().to_le_bytes()),
        Value::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Value::Array(values) => values.iter().for_each(|v| encode(v, out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_element_bytes(ty: VariableType) -> BoxedStrategy<Vec<u8>> {
        match ty {
            // Only 0 and 1 are canonical booleans
            VariableType::Bool => prop::sample::select(vec![vec![0u8], vec![1u8]]).boxed(),
            ty => prop::collection::vec(any::<u8>(), ty.size()).boxed(),
        }
    }

    fn arb_case() -> impl Strategy<Value = (VariableType, usize, usize, Vec<u8>)> {
        (prop::sample::select(VariableType::ALL.to_vec()), 0usize..32, 1usize..6).prop_flat_map(
            |(ty, offset, count)| {
                prop::collection::vec(arb_element_bytes(ty), count).prop_map(move |elements| {
                    (ty, offset, count, elements.concat())
                })
            },
        )
    }

    proptest! {
        #[test]
        fn decode_then_encode_is_identity((ty, offset, count, payload) in arb_case()) {
            let mut region = vec![0xAAu8; offset];
            region.extend_from_slice(&payload);
            region.extend_from_slice(&[0x55; 8]);

            let value = decode_elements(&region, offset, ty, count).unwrap();
            let mut encoded = Vec::new();
            encode(&value, &mut encoded);

            prop_assert_eq!(encoded, payload);
        }

        #[test]
        fn reads_past_the_end_are_rejected(
            ty in prop::sample::select(VariableType::ALL.to_vec()),
            len in 0usize..16,
            overshoot in 1usize..8,
        ) {
            let region = vec![0u8; len];
            // Always ends past the region
            let offset = (len + overshoot).saturating_sub(ty.size());
            let result = decode_scalar(&region, offset, ty);
            let is_memory_error = matches!(result, Err(TelemetryError::Memory { .. }));
            prop_assert!(is_memory_error);
        }
    }

    #[test]
    fn scalars_decode_little_endian() {
        let mut data = Vec::new();
        data.push(b'A');
        data.push(1);
        data.extend_from_slice(&(-7i32).to_le_bytes());
        data.extend_from_slice(&0x8000_0001u32.to_le_bytes());
        data.extend_from_slice(&12.5f32.to_le_bytes());
        data.extend_from_slice(&(-0.25f64).to_le_bytes());

        assert_eq!(decode_scalar(&data, 0, VariableType::Char).unwrap(), Value::Char(b'A'));
        assert_eq!(decode_scalar(&data, 1, VariableType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(decode_scalar(&data, 2, VariableType::Int32).unwrap(), Value::Int32(-7));
        assert_eq!(
            decode_scalar(&data, 6, VariableType::BitField).unwrap(),
            Value::BitField(BitField(0x8000_0001))
        );
        assert_eq!(decode_scalar(&data, 10, VariableType::Float32).unwrap(), Value::Float32(12.5));
        assert_eq!(decode_scalar(&data, 14, VariableType::Float64).unwrap(), Value::Float64(-0.25));
    }

    #[test]
    fn nonzero_bool_bytes_are_true() {
        assert_eq!(decode_scalar(&[2], 0, VariableType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(decode_scalar(&[0], 0, VariableType::Bool).unwrap(), Value::Bool(false));
    }

    #[test]
    fn arrays_use_element_stride() {
        let data: Vec<u8> = [1.0f32, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let value = decode_elements(&data, 4, VariableType::Float32, 2).unwrap();
        assert_eq!(value, Value::Array(vec![Value::Float32(2.0), Value::Float32(3.0)]));
    }

    #[test]
    fn array_partially_outside_region_fails_whole() {
        let data = [0u8; 10];
        let err = decode_elements(&data, 4, VariableType::Int32, 2).unwrap_err();
        assert!(matches!(err, TelemetryError::Memory { offset: 4, len: 8, available: 10 }));
    }

    #[test]
    fn decode_variable_adds_base() {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&99i32.to_le_bytes());
        let info = VariableInfo {
            name: "Lap".into(),
            data_type: VariableType::Int32,
            offset: 4,
            count: 1,
            count_as_time: false,
            units: String::new(),
            description: String::new(),
        };
        assert_eq!(decode_variable(&data, 4, &info).unwrap(), Value::Int32(99));
        assert!(decode_variable(&data, usize::MAX, &info).is_err());
    }
}
