//! SunSpec type catalogue
//!
//! The closed set of register-encoded types, their wire sizes and names.
//! Every table in this module is keyed by [`TypeTag`], so adding a type means
//! extending each `match` below; the compiler enforces exhaustiveness.

use std::fmt;

/// All value types a data point may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    Null,
    Int16,
    UInt16,
    /// 16-bit accumulator
    Acc16,
    Int32,
    UInt32,
    Float32,
    /// 32-bit accumulator
    Acc32,
    Int64,
    UInt64,
    Float64,
    Enum16,
    Bitfield16,
    Bitfield32,
    /// Signed 16-bit power-of-ten exponent (`sunssf`)
    ScaleFactor,
    String,
    Undefined,
}

impl TypeTag {
    /// Get all type tags in catalogue order
    pub fn all() -> &'static [TypeTag] {
        &[
            Self::Null,
            Self::Int16,
            Self::UInt16,
            Self::Acc16,
            Self::Int32,
            Self::UInt32,
            Self::Float32,
            Self::Acc32,
            Self::Int64,
            Self::UInt64,
            Self::Float64,
            Self::Enum16,
            Self::Bitfield16,
            Self::Bitfield32,
            Self::ScaleFactor,
            Self::String,
            Self::Undefined,
        ]
    }

    /// Wire size in bytes; 0 for String (declared per point), Null and Undefined
    pub fn size(&self) -> usize {
        match self {
            Self::Null | Self::String | Self::Undefined => 0,
            Self::Int16
            | Self::UInt16
            | Self::Acc16
            | Self::Enum16
            | Self::Bitfield16
            | Self::ScaleFactor => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 | Self::Acc32 | Self::Bitfield32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Canonical lowercase name used by model definitions
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Acc16 => "acc16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Float32 => "float32",
            Self::Acc32 => "acc32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float64 => "float64",
            Self::Enum16 => "enum16",
            Self::Bitfield16 => "bitfield16",
            Self::Bitfield32 => "bitfield32",
            Self::ScaleFactor => "sunssf",
            Self::String => "string",
            Self::Undefined => "undef",
        }
    }

    /// Look up a tag by its canonical name.
    ///
    /// Unrecognized names yield [`TypeTag::Undefined`]; callers treat that as
    /// "unsupported, skip" rather than a hard failure.
    pub fn from_name(name: &str) -> TypeTag {
        Self::all()
            .iter()
            .copied()
            .find(|tag| tag.name() == name)
            .unwrap_or(Self::Undefined)
    }

    /// Types whose wire form is a single register
    pub fn is_16bit(&self) -> bool {
        self.size() == 2
    }

    pub fn is_32bit(&self) -> bool {
        self.size() == 4
    }

    pub fn is_64bit(&self) -> bool {
        self.size() == 8
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Size of a tag in bytes
pub fn size_of(tag: TypeTag) -> usize {
    tag.size()
}

/// Diagnostic name of a tag
pub fn name_of(tag: TypeTag) -> &'static str {
    tag.name()
}

/// Tag for a name, [`TypeTag::Undefined`] when unknown
pub fn tag_from_name(name: &str) -> TypeTag {
    TypeTag::from_name(name)
}

/// A type tag plus the declared byte length for strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSpec {
    pub tag: TypeTag,
    /// Declared byte length, only meaningful for [`TypeTag::String`]
    pub len: Option<u16>,
}

impl TypeSpec {
    pub const fn new(tag: TypeTag) -> Self {
        Self { tag, len: None }
    }

    pub const fn string(len: u16) -> Self {
        Self {
            tag: TypeTag::String,
            len: Some(len),
        }
    }

    /// Wire size in bytes, including declared string lengths
    pub fn size(&self) -> usize {
        match self.tag {
            TypeTag::String => usize::from(self.len.unwrap_or(0)),
            tag => tag.size(),
        }
    }

    /// Size in whole registers, odd string lengths rounded up
    pub fn registers(&self) -> u16 {
        // Sizes are bounded by u16 string lengths
        self.size().div_ceil(2) as u16
    }
}

impl From<TypeTag> for TypeSpec {
    fn from(tag: TypeTag) -> Self {
        Self::new(tag)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.tag, self.len) {
            (TypeTag::String, Some(len)) => write!(f, "string({})", len),
            (tag, _) => write!(f, "{}", tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_sizes() {
        let cases = [
            (TypeTag::Null, 0),
            (TypeTag::Int16, 2),
            (TypeTag::UInt16, 2),
            (TypeTag::Acc16, 2),
            (TypeTag::Int32, 4),
            (TypeTag::UInt32, 4),
            (TypeTag::Float32, 4),
            (TypeTag::Acc32, 4),
            (TypeTag::Int64, 8),
            (TypeTag::UInt64, 8),
            (TypeTag::Float64, 8),
            (TypeTag::Enum16, 2),
            (TypeTag::Bitfield16, 2),
            (TypeTag::Bitfield32, 4),
            (TypeTag::ScaleFactor, 2),
            (TypeTag::String, 0),
            (TypeTag::Undefined, 0),
        ];
        for (tag, size) in cases {
            assert_eq!(size_of(tag), size, "size of {}", tag);
        }
    }

    #[test]
    fn test_names_round_trip() {
        for &tag in TypeTag::all() {
            assert_eq!(tag_from_name(name_of(tag)), tag);
        }
        assert_eq!(name_of(TypeTag::ScaleFactor), "sunssf");
    }

    #[test]
    fn test_unknown_name_is_undefined() {
        assert_eq!(tag_from_name("float128"), TypeTag::Undefined);
        assert_eq!(tag_from_name("INT16"), TypeTag::Undefined);
        assert_eq!(tag_from_name(""), TypeTag::Undefined);
    }

    #[test]
    fn test_type_spec_registers() {
        assert_eq!(TypeSpec::string(16).registers(), 8);
        assert_eq!(TypeSpec::string(5).registers(), 3);
        assert_eq!(TypeSpec::string(5).size(), 5);
        assert_eq!(TypeSpec::new(TypeTag::Float32).registers(), 2);
        assert_eq!(TypeSpec::new(TypeTag::Undefined).registers(), 0);
        assert_eq!(TypeSpec::string(8).to_string(), "string(8)");
    }
}
