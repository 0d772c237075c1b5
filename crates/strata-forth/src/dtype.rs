//! Primitive element types for typed reads and output buffers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a typed read or a declared output buffer.
///
/// `IntP` and `UintP` are pointer-width kinds: 4 or 8 bytes depending on the
/// host, resolved when buffers are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// One byte, zero or nonzero.
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    /// Pointer-width signed integer.
    IntP,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    /// Pointer-width unsigned integer.
    UintP,
    Float32,
    Float64,
}

impl Dtype {
    /// Parse an output-declaration keyword.
    pub fn from_keyword(word: &str) -> Option<Dtype> {
        match word {
            "bool" => Some(Dtype::Bool),
            "int8" => Some(Dtype::Int8),
            "int16" => Some(Dtype::Int16),
            "int32" => Some(Dtype::Int32),
            "int64" => Some(Dtype::Int64),
            "intp" => Some(Dtype::IntP),
            "uint8" => Some(Dtype::Uint8),
            "uint16" => Some(Dtype::Uint16),
            "uint32" => Some(Dtype::Uint32),
            "uint64" => Some(Dtype::Uint64),
            "uintp" => Some(Dtype::UintP),
            "float32" => Some(Dtype::Float32),
            "float64" => Some(Dtype::Float64),
            _ => None,
        }
    }

    /// The keyword used in `output` declarations and decompiled source.
    pub fn keyword(self) -> &'static str {
        match self {
            Dtype::Bool => "bool",
            Dtype::Int8 => "int8",
            Dtype::Int16 => "int16",
            Dtype::Int32 => "int32",
            Dtype::Int64 => "int64",
            Dtype::IntP => "intp",
            Dtype::Uint8 => "uint8",
            Dtype::Uint16 => "uint16",
            Dtype::Uint32 => "uint32",
            Dtype::Uint64 => "uint64",
            Dtype::UintP => "uintp",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
        }
    }

    /// Size of one element in bytes on this host.
    pub fn size_in_bytes(self) -> usize {
        match self {
            Dtype::Bool | Dtype::Int8 | Dtype::Uint8 => 1,
            Dtype::Int16 | Dtype::Uint16 => 2,
            Dtype::Int32 | Dtype::Uint32 | Dtype::Float32 => 4,
            Dtype::Int64 | Dtype::Uint64 | Dtype::Float64 => 8,
            Dtype::IntP => std::mem::size_of::<isize>(),
            Dtype::UintP => std::mem::size_of::<usize>(),
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip() {
        let all = [
            Dtype::Bool,
            Dtype::Int8,
            Dtype::Int16,
            Dtype::Int32,
            Dtype::Int64,
            Dtype::IntP,
            Dtype::Uint8,
            Dtype::Uint16,
            Dtype::Uint32,
            Dtype::Uint64,
            Dtype::UintP,
            Dtype::Float32,
            Dtype::Float64,
        ];
        for dtype in all {
            assert_eq!(Dtype::from_keyword(dtype.keyword()), Some(dtype));
        }
        assert_eq!(Dtype::from_keyword("complex128"), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(Dtype::Bool.size_in_bytes(), 1);
        assert_eq!(Dtype::Int16.size_in_bytes(), 2);
        assert_eq!(Dtype::Float64.size_in_bytes(), 8);
        assert_eq!(Dtype::IntP.size_in_bytes(), std::mem::size_of::<isize>());
    }
}
