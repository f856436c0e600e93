//! Typed register values
//!
//! A [`Value`] pairs a payload with its [`TypeSpec`], a status derived from the
//! type's "not implemented" sentinel, and the raw wire bytes it came from.

use std::borrow::Cow;
use std::fmt;

use crate::error::{Result, SunsError};
use crate::types::{TypeSpec, TypeTag};

/// Maximum number of raw wire bytes kept for diagnostics
pub const RAW_CAPACITY: usize = 16;

// ============================================================================
// Sentinel patterns
// ============================================================================

pub const INT16_NOT_IMPLEMENTED: i16 = i16::MIN; // 0x8000
pub const UINT16_NOT_IMPLEMENTED: u16 = u16::MAX; // 0xFFFF
pub const INT32_NOT_IMPLEMENTED: i32 = i32::MIN; // 0x80000000
pub const UINT32_NOT_IMPLEMENTED: u32 = u32::MAX; // 0xFFFFFFFF

/// Per-value classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueStatus {
    Ok,
    NotImplemented,
    Error,
    #[default]
    Undefined,
}

impl ValueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotImplemented => "not implemented",
            Self::Error => "error",
            Self::Undefined => "undef",
        }
    }
}

impl fmt::Display for ValueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded payload. The variant always matches the owning value's tag:
/// 16-bit unsigned tags (uint16, acc16, enum16, bitfield16) use `U16`,
/// int16 and sunssf use `I16`, and so on.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Declared-length wire bytes and their host rendering
    Str { wire: Vec<u8>, text: String },
}

/// A typed datum with status metadata and raw-byte retention
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    spec: TypeSpec,
    status: ValueStatus,
    raw: [u8; RAW_CAPACITY],
    raw_len: u8,
    payload: Payload,
}

impl Default for Value {
    fn default() -> Self {
        Self::null()
    }
}

fn classify(tag: TypeTag, payload: &Payload) -> ValueStatus {
    let not_implemented = match (tag, payload) {
        (TypeTag::Int16 | TypeTag::ScaleFactor, Payload::I16(v)) => *v == INT16_NOT_IMPLEMENTED,
        (TypeTag::UInt16, Payload::U16(v)) => *v == UINT16_NOT_IMPLEMENTED,
        (TypeTag::Int32, Payload::I32(v)) => *v == INT32_NOT_IMPLEMENTED,
        (TypeTag::UInt32, Payload::U32(v)) => *v == UINT32_NOT_IMPLEMENTED,
        (TypeTag::Float32, Payload::F32(v)) => v.is_nan(),
        _ => false,
    };

    if not_implemented {
        ValueStatus::NotImplemented
    } else {
        ValueStatus::Ok
    }
}

/// Big-endian wire image of a numeric payload
fn wire_image(payload: &Payload) -> Vec<u8> {
    match payload {
        Payload::None | Payload::Str { .. } => Vec::new(),
        Payload::I16(v) => v.to_be_bytes().to_vec(),
        Payload::U16(v) => v.to_be_bytes().to_vec(),
        Payload::I32(v) => v.to_be_bytes().to_vec(),
        Payload::U32(v) => v.to_be_bytes().to_vec(),
        Payload::I64(v) => v.to_be_bytes().to_vec(),
        Payload::U64(v) => v.to_be_bytes().to_vec(),
        Payload::F32(v) => v.to_be_bytes().to_vec(),
        Payload::F64(v) => v.to_be_bytes().to_vec(),
    }
}

/// Host rendering of wire string bytes: up to the first NUL, lossy UTF-8
pub(crate) fn host_string(bytes: &[u8]) -> Cow<'_, str> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
}

/// Longest prefix of `s` within `max` bytes that ends on a char boundary
fn char_prefix(s: &str, max: usize) -> &str {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Value {
    /// Build a value from an already matching payload, classifying its status
    pub(crate) fn from_parts(spec: TypeSpec, payload: Payload, raw: &[u8]) -> Self {
        let status = match spec.tag {
            TypeTag::Null | TypeTag::Undefined => ValueStatus::Undefined,
            tag => classify(tag, &payload),
        };
        let mut value = Self {
            spec,
            status,
            raw: [0; RAW_CAPACITY],
            raw_len: 0,
            payload,
        };
        value.set_raw(raw);
        value
    }

    fn numeric(tag: TypeTag, payload: Payload) -> Self {
        let raw = wire_image(&payload);
        Self::from_parts(TypeSpec::new(tag), payload, &raw)
    }

    fn set_raw(&mut self, raw: &[u8]) {
        let len = raw.len().min(RAW_CAPACITY);
        self.raw = [0; RAW_CAPACITY];
        self.raw[..len].copy_from_slice(&raw[..len]);
        self.raw_len = len as u8;
    }

    /// Empty value of the null type
    pub fn null() -> Self {
        Self::undefined(TypeSpec::new(TypeTag::Null))
    }

    /// Placeholder for a point whose type cannot be decoded
    pub fn undefined(spec: TypeSpec) -> Self {
        Self {
            spec,
            status: ValueStatus::Undefined,
            raw: [0; RAW_CAPACITY],
            raw_len: 0,
            payload: Payload::None,
        }
    }

    // ========================================================================
    // Typed constructors
    // ========================================================================

    pub fn from_int16(v: i16) -> Self {
        Self::numeric(TypeTag::Int16, Payload::I16(v))
    }

    pub fn from_uint16(v: u16) -> Self {
        Self::numeric(TypeTag::UInt16, Payload::U16(v))
    }

    pub fn from_acc16(v: u16) -> Self {
        Self::numeric(TypeTag::Acc16, Payload::U16(v))
    }

    pub fn from_enum16(v: u16) -> Self {
        Self::numeric(TypeTag::Enum16, Payload::U16(v))
    }

    pub fn from_bitfield16(v: u16) -> Self {
        Self::numeric(TypeTag::Bitfield16, Payload::U16(v))
    }

    pub fn from_scale_factor(v: i16) -> Self {
        Self::numeric(TypeTag::ScaleFactor, Payload::I16(v))
    }

    pub fn from_int32(v: i32) -> Self {
        Self::numeric(TypeTag::Int32, Payload::I32(v))
    }

    pub fn from_uint32(v: u32) -> Self {
        Self::numeric(TypeTag::UInt32, Payload::U32(v))
    }

    pub fn from_acc32(v: u32) -> Self {
        Self::numeric(TypeTag::Acc32, Payload::U32(v))
    }

    pub fn from_bitfield32(v: u32) -> Self {
        Self::numeric(TypeTag::Bitfield32, Payload::U32(v))
    }

    pub fn from_float32(v: f32) -> Self {
        Self::numeric(TypeTag::Float32, Payload::F32(v))
    }

    pub fn from_int64(v: i64) -> Self {
        Self::numeric(TypeTag::Int64, Payload::I64(v))
    }

    pub fn from_uint64(v: u64) -> Self {
        Self::numeric(TypeTag::UInt64, Payload::U64(v))
    }

    pub fn from_float64(v: f64) -> Self {
        Self::numeric(TypeTag::Float64, Payload::F64(v))
    }

    /// String value holding at most `len` bytes of `s`, cut on a char boundary
    pub fn from_string(s: &str, len: u16) -> Self {
        let mut value = Self::undefined(TypeSpec::string(len));
        value.set_string(s, len);
        value
    }

    /// String value over arbitrary wire bytes, zero padded or cut to `len`
    pub fn from_string_bytes(bytes: &[u8], len: u16) -> Self {
        let mut value = Self::undefined(TypeSpec::string(len));
        value.fill_string(bytes, len);
        value
    }

    /// Re-cast this value as a string of declared length `len`.
    ///
    /// Existing string storage is reused; it only grows when the declared
    /// length changes. A multi-byte char that would straddle `len` is dropped.
    pub fn set_string(&mut self, s: &str, len: u16) {
        self.fill_string(char_prefix(s, usize::from(len)).as_bytes(), len);
    }

    fn fill_string(&mut self, bytes: &[u8], len: u16) {
        let declared = usize::from(len);
        let (mut wire, mut text) = match std::mem::take(&mut self.payload) {
            Payload::Str { wire, text } if self.spec.len == Some(len) => (wire, text),
            _ => (Vec::with_capacity(declared), String::with_capacity(declared)),
        };
        wire.clear();
        wire.extend_from_slice(&bytes[..bytes.len().min(declared)]);
        wire.resize(declared, 0);
        text.clear();
        text.push_str(&host_string(&wire));

        self.spec = TypeSpec::string(len);
        self.status = ValueStatus::Ok;
        self.set_raw(&wire);
        self.payload = Payload::Str { wire, text };
    }

    /// The type's "not implemented" encoding, or zero for types without one.
    /// Strings are all zero bytes.
    pub fn sentinel(spec: TypeSpec) -> Self {
        match spec.tag {
            TypeTag::Int16 => Self::from_int16(INT16_NOT_IMPLEMENTED),
            TypeTag::ScaleFactor => Self::from_scale_factor(INT16_NOT_IMPLEMENTED),
            TypeTag::UInt16 => Self::from_uint16(UINT16_NOT_IMPLEMENTED),
            TypeTag::Acc16 => Self::from_acc16(0),
            TypeTag::Enum16 => Self::from_enum16(0),
            TypeTag::Bitfield16 => Self::from_bitfield16(0),
            TypeTag::Int32 => Self::from_int32(INT32_NOT_IMPLEMENTED),
            TypeTag::UInt32 => Self::from_uint32(UINT32_NOT_IMPLEMENTED),
            TypeTag::Acc32 => Self::from_acc32(0),
            TypeTag::Bitfield32 => Self::from_bitfield32(0),
            TypeTag::Float32 => Self::from_float32(f32::NAN),
            TypeTag::Int64 => Self::from_int64(0),
            TypeTag::UInt64 => Self::from_uint64(0),
            TypeTag::Float64 => Self::from_float64(0.0),
            TypeTag::String => Self::from_string("", spec.len.unwrap_or(0)),
            TypeTag::Null | TypeTag::Undefined => Self::undefined(spec),
        }
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub fn spec(&self) -> TypeSpec {
        self.spec
    }

    pub fn tag(&self) -> TypeTag {
        self.spec.tag
    }

    pub fn status(&self) -> ValueStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == ValueStatus::Ok
    }

    /// Raw wire bytes, at most [`RAW_CAPACITY`]
    pub fn raw(&self) -> &[u8] {
        &self.raw[..usize::from(self.raw_len)]
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    // ========================================================================
    // Checked accessors
    // ========================================================================

    fn expect_tag(&self, expected: TypeTag) -> Result<()> {
        if self.spec.tag == expected {
            Ok(())
        } else {
            Err(SunsError::TypeMismatch {
                expected,
                actual: self.spec.tag,
            })
        }
    }

    fn u16_of(&self, tag: TypeTag) -> Result<u16> {
        self.expect_tag(tag)?;
        match self.payload {
            Payload::U16(v) => Ok(v),
            _ => Err(SunsError::TypeMismatch {
                expected: tag,
                actual: self.spec.tag,
            }),
        }
    }

    fn i16_of(&self, tag: TypeTag) -> Result<i16> {
        self.expect_tag(tag)?;
        match self.payload {
            Payload::I16(v) => Ok(v),
            _ => Err(SunsError::TypeMismatch {
                expected: tag,
                actual: self.spec.tag,
            }),
        }
    }

    fn u32_of(&self, tag: TypeTag) -> Result<u32> {
        self.expect_tag(tag)?;
        match self.payload {
            Payload::U32(v) => Ok(v),
            _ => Err(SunsError::TypeMismatch {
                expected: tag,
                actual: self.spec.tag,
            }),
        }
    }

    pub fn int16(&self) -> Result<i16> {
        self.i16_of(TypeTag::Int16)
    }

    pub fn scale_factor(&self) -> Result<i16> {
        self.i16_of(TypeTag::ScaleFactor)
    }

    pub fn uint16(&self) -> Result<u16> {
        self.u16_of(TypeTag::UInt16)
    }

    pub fn acc16(&self) -> Result<u16> {
        self.u16_of(TypeTag::Acc16)
    }

    pub fn enum16(&self) -> Result<u16> {
        self.u16_of(TypeTag::Enum16)
    }

    pub fn bitfield16(&self) -> Result<u16> {
        self.u16_of(TypeTag::Bitfield16)
    }

    pub fn uint32(&self) -> Result<u32> {
        self.u32_of(TypeTag::UInt32)
    }

    pub fn acc32(&self) -> Result<u32> {
        self.u32_of(TypeTag::Acc32)
    }

    pub fn bitfield32(&self) -> Result<u32> {
        self.u32_of(TypeTag::Bitfield32)
    }

    pub fn int32(&self) -> Result<i32> {
        self.expect_tag(TypeTag::Int32)?;
        match self.payload {
            Payload::I32(v) => Ok(v),
            _ => Err(SunsError::TypeMismatch {
                expected: TypeTag::Int32,
                actual: self.spec.tag,
            }),
        }
    }

    pub fn float32(&self) -> Result<f32> {
        self.expect_tag(TypeTag::Float32)?;
        match self.payload {
            Payload::F32(v) => Ok(v),
            _ => Err(SunsError::TypeMismatch {
                expected: TypeTag::Float32,
                actual: self.spec.tag,
            }),
        }
    }

    pub fn int64(&self) -> Result<i64> {
        self.expect_tag(TypeTag::Int64)?;
        match self.payload {
            Payload::I64(v) => Ok(v),
            _ => Err(SunsError::TypeMismatch {
                expected: TypeTag::Int64,
                actual: self.spec.tag,
            }),
        }
    }

    pub fn uint64(&self) -> Result<u64> {
        self.expect_tag(TypeTag::UInt64)?;
        match self.payload {
            Payload::U64(v) => Ok(v),
            _ => Err(SunsError::TypeMismatch {
                expected: TypeTag::UInt64,
                actual: self.spec.tag,
            }),
        }
    }

    pub fn float64(&self) -> Result<f64> {
        self.expect_tag(TypeTag::Float64)?;
        match self.payload {
            Payload::F64(v) => Ok(v),
            _ => Err(SunsError::TypeMismatch {
                expected: TypeTag::Float64,
                actual: self.spec.tag,
            }),
        }
    }

    pub fn string(&self) -> Result<&str> {
        self.expect_tag(TypeTag::String)?;
        match &self.payload {
            Payload::Str { text, .. } => Ok(text.as_str()),
            _ => Err(SunsError::TypeMismatch {
                expected: TypeTag::String,
                actual: self.spec.tag,
            }),
        }
    }

    /// The declared-length wire bytes of a string, NUL padding included
    pub fn string_bytes(&self) -> Result<&[u8]> {
        self.expect_tag(TypeTag::String)?;
        match &self.payload {
            Payload::Str { wire, .. } => Ok(wire.as_slice()),
            _ => Err(SunsError::TypeMismatch {
                expected: TypeTag::String,
                actual: self.spec.tag,
            }),
        }
    }

    /// Integer view used for define lookups on enum and bitfield points
    pub fn as_u32(&self) -> Option<u32> {
        match self.payload {
            Payload::U16(v) => Some(u32::from(v)),
            Payload::U32(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.status != ValueStatus::Ok {
            return f.write_str(self.status.as_str());
        }

        match (self.spec.tag, &self.payload) {
            (TypeTag::Null, _) => f.write_str("null type"),
            (TypeTag::Undefined, _) => f.write_str("undef type"),
            (TypeTag::Bitfield16, Payload::U16(v)) => write!(f, "0x{:04x}", v),
            (TypeTag::Bitfield32, Payload::U32(v)) => write!(f, "0x{:08x}", v),
            (_, Payload::I16(v)) => write!(f, "{}", v),
            (_, Payload::U16(v)) => write!(f, "{}", v),
            (_, Payload::I32(v)) => write!(f, "{}", v),
            (_, Payload::U32(v)) => write!(f, "{}", v),
            (_, Payload::I64(v)) => write!(f, "{}", v),
            (_, Payload::U64(v)) => write!(f, "{}", v),
            (_, Payload::F32(v)) => write!(f, "{:.6}", v),
            (_, Payload::F64(v)) => write!(f, "{:.6}", v),
            (_, Payload::Str { text, .. }) => f.write_str(text),
            (tag, Payload::None) => write!(f, " unknown type {}", tag),
        }
    }
}
