//! Value codec
//!
//! Converts between typed [`Value`]s and big-endian wire bytes. Buffers handed
//! to this module are already in wire order; register word order is handled
//! once by [`crate::wire`].

use bytes::{Buf, BufMut};
use tracing::trace;

use crate::error::{Result, SunsError};
use crate::types::{TypeSpec, TypeTag};
use crate::value::{host_string, Payload, Value};

/// Encode `value` at the write position of `out`.
///
/// Returns the number of bytes written. 16-bit tags write 2 bytes, 32-bit tags
/// 4, strings exactly their declared length (zero padded, no terminator).
pub fn encode<B: BufMut>(value: &Value, out: &mut B) -> Result<usize> {
    let spec = value.spec();
    let needed = match spec.tag {
        TypeTag::Null | TypeTag::Undefined | TypeTag::Int64 | TypeTag::UInt64 | TypeTag::Float64 => {
            return Err(SunsError::UnsupportedType(spec.tag));
        },
        _ => spec.size(),
    };

    let available = out.remaining_mut();
    if available < needed {
        return Err(SunsError::InsufficientSpace { needed, available });
    }

    match value.payload() {
        Payload::I16(v) => out.put_i16(*v),
        Payload::U16(v) => out.put_u16(*v),
        Payload::I32(v) => out.put_i32(*v),
        Payload::U32(v) => out.put_u32(*v),
        Payload::F32(v) => out.put_f32(*v),
        Payload::Str { wire, .. } => {
            let copied = wire.len().min(needed);
            out.put_slice(&wire[..copied]);
            out.put_bytes(0, needed - copied);
        },
        Payload::I64(_) | Payload::U64(_) | Payload::F64(_) | Payload::None => {
            return Err(SunsError::UnsupportedType(spec.tag));
        },
    }

    trace!("Encoded {} into {} bytes", spec, needed);
    Ok(needed)
}

/// Decode one value of type `spec` from the start of `bytes`.
///
/// Never reads past `bytes`; a short slice is a [`SunsError::Truncated`].
pub fn decode(bytes: &[u8], spec: TypeSpec) -> Result<Value> {
    if matches!(spec.tag, TypeTag::Null | TypeTag::Undefined) {
        return Err(SunsError::UnsupportedType(spec.tag));
    }

    let size = spec.size();
    if bytes.len() < size {
        return Err(SunsError::Truncated {
            needed: size,
            available: bytes.len(),
        });
    }

    let field = &bytes[..size];
    let mut buf = field;
    let payload = match spec.tag {
        TypeTag::Int16 | TypeTag::ScaleFactor => Payload::I16(buf.get_i16()),
        TypeTag::UInt16 | TypeTag::Acc16 | TypeTag::Enum16 | TypeTag::Bitfield16 => {
            Payload::U16(buf.get_u16())
        },
        TypeTag::Int32 => Payload::I32(buf.get_i32()),
        TypeTag::UInt32 | TypeTag::Acc32 | TypeTag::Bitfield32 => Payload::U32(buf.get_u32()),
        TypeTag::Float32 => Payload::F32(buf.get_f32()),
        TypeTag::Int64 => Payload::I64(buf.get_i64()),
        TypeTag::UInt64 => Payload::U64(buf.get_u64()),
        TypeTag::Float64 => Payload::F64(buf.get_f64()),
        TypeTag::String => Payload::Str {
            wire: field.to_vec(),
            text: host_string(field).into_owned(),
        },
        TypeTag::Null | TypeTag::Undefined => return Err(SunsError::UnsupportedType(spec.tag)),
    };

    let value = Value::from_parts(spec, payload, field);
    trace!(
        "Decoded {}: bytes={:02X?}, status={}",
        spec,
        value.raw(),
        value.status()
    );
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // unwrap is fine in tests
mod tests {
    use super::*;
    use crate::value::ValueStatus;
    use bytes::BytesMut;

    fn round_trip(value: Value) {
        let mut out = BytesMut::new();
        let written = encode(&value, &mut out).unwrap();
        assert_eq!(written, value.spec().size());
        let decoded = decode(&out, value.spec()).unwrap();
        assert_eq!(decoded, value, "round trip of {}", value.spec());
    }

    #[test]
    fn test_round_trip_all_encodable_types() {
        round_trip(Value::from_int16(-1234));
        round_trip(Value::from_uint16(60000));
        round_trip(Value::from_acc16(0xFFFF));
        round_trip(Value::from_enum16(4));
        round_trip(Value::from_bitfield16(0x8001));
        round_trip(Value::from_scale_factor(-2));
        round_trip(Value::from_int32(-70000));
        round_trip(Value::from_uint32(3_000_000_000));
        round_trip(Value::from_acc32(123_456_789));
        round_trip(Value::from_bitfield32(0xDEAD_BEEF));
        round_trip(Value::from_float32(230.5));
        round_trip(Value::from_string("SunSpecTest", 16));
        round_trip(Value::from_string("odd", 5));
        // Sentinels survive too
        round_trip(Value::from_int16(i16::MIN));
        round_trip(Value::from_uint32(u32::MAX));
    }

    #[test]
    fn test_decode_sentinels() {
        let v = decode(&[0x80, 0x00], TypeSpec::new(TypeTag::Int16)).unwrap();
        assert_eq!(v.status(), ValueStatus::NotImplemented);

        let v = decode(&[0xFF, 0xFF], TypeSpec::new(TypeTag::UInt16)).unwrap();
        assert_eq!(v.status(), ValueStatus::NotImplemented);

        let nan = f32::NAN.to_be_bytes();
        let v = decode(&nan, TypeSpec::new(TypeTag::Float32)).unwrap();
        assert_eq!(v.status(), ValueStatus::NotImplemented);

        let v = decode(&[0x00, 0x42], TypeSpec::new(TypeTag::Acc16)).unwrap();
        assert_eq!(v.status(), ValueStatus::Ok);
        assert_eq!(v.acc16(), Ok(0x42));

        let v = decode(&[0x80, 0x00], TypeSpec::new(TypeTag::Acc16)).unwrap();
        assert_eq!(v.status(), ValueStatus::Ok);
    }

    #[test]
    fn test_encode_into_slice_reports_insufficient_space() {
        let mut storage = [0u8; 3];
        let mut cursor: &mut [u8] = &mut storage;
        assert_eq!(encode(&Value::from_int16(7), &mut cursor), Ok(2));
        assert_eq!(
            encode(&Value::from_uint32(7), &mut cursor),
            Err(SunsError::InsufficientSpace {
                needed: 4,
                available: 1
            })
        );
        assert_eq!(storage, [0x00, 0x07, 0x00]);
    }

    #[test]
    fn test_encode_string_pads_without_terminator() {
        let mut out = Vec::new();
        let written = encode(&Value::from_string("ab", 6), &mut out).unwrap();
        assert_eq!(written, 6);
        assert_eq!(out, b"ab\0\0\0\0");

        let mut exact = Vec::new();
        encode(&Value::from_string("abcdef", 6), &mut exact).unwrap();
        assert_eq!(exact, b"abcdef");
    }

    #[test]
    fn test_string_bytes_survive_decode_encode() {
        let bytes = [0xE9, 0x41, 0x42, 0x43];
        let value = decode(&bytes, TypeSpec::string(4)).unwrap();
        assert_eq!(value.string(), Ok("\u{FFFD}ABC"));

        let mut out = Vec::new();
        assert_eq!(encode(&value, &mut out), Ok(4));
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_unsupported_types() {
        let mut out = Vec::new();
        assert_eq!(
            encode(&Value::null(), &mut out),
            Err(SunsError::UnsupportedType(TypeTag::Null))
        );
        assert_eq!(
            encode(&Value::from_int64(1), &mut out),
            Err(SunsError::UnsupportedType(TypeTag::Int64))
        );
        assert!(out.is_empty());
        assert_eq!(
            decode(&[0, 0], TypeSpec::new(TypeTag::Undefined)),
            Err(SunsError::UnsupportedType(TypeTag::Undefined))
        );
    }

    #[test]
    fn test_decode_64bit() {
        let bytes = (-5i64).to_be_bytes();
        let v = decode(&bytes, TypeSpec::new(TypeTag::Int64)).unwrap();
        assert_eq!(v.int64(), Ok(-5));
        assert_eq!(v.raw(), &bytes);
    }

    #[test]
    fn test_decode_short_slice() {
        assert_eq!(
            decode(&[0x01, 0x02], TypeSpec::new(TypeTag::UInt32)),
            Err(SunsError::Truncated {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_decode_string_stops_at_nul() {
        let v = decode(b"Fronius\0\0\0XX", TypeSpec::string(12)).unwrap();
        assert_eq!(v.string(), Ok("Fronius"));
        assert_eq!(v.raw(), b"Fronius\0\0\0XX");
    }
}
