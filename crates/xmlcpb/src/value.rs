//! Decoded attribute values.

use std::fmt;

use xmlcpb_common::BinaryReader;

use crate::attr::{decode_one_decimal, COMPONENT_LITERAL, COMPONENT_MINUS_ONE, COMPONENT_ONE};
use crate::format::{AttrType, INT_CONSTANTS, STRING_CONSTANTS};
use crate::string_table::StringTableReader;

/// A decoded attribute value, borrowing strings and blobs from the reader.
///
/// Every encoding collapses to one of these kinds: an attribute written as
/// `5u8` reads back as `Int32(5)` whichever of the integer encodings was used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrValue<'a> {
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Vec3([f32; 3]),
    Quat([f32; 4]),
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl fmt::Display for AttrValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int32(v) => write!(f, "{v}"),
            AttrValue::Int64(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Double(v) => write!(f, "{v}"),
            AttrValue::Vec3([x, y, z]) => write!(f, "{x},{y},{z}"),
            AttrValue::Quat([x, y, z, w]) => write!(f, "{x},{y},{z},{w}"),
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::Bytes(bytes) => {
                for b in bytes.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Number of literal floats announced by a semi-constant mask.
fn literal_count(mask: u8, components: usize) -> usize {
    (0..components)
        .filter(|i| (mask >> (2 * i)) & 3 == COMPONENT_LITERAL)
        .count()
}

/// Size of an attribute payload starting at the beginning of `data`.
pub(crate) fn payload_len(ty: AttrType, data: &[u8]) -> Option<usize> {
    if let Some(len) = ty.fixed_payload_len() {
        return Some(len);
    }
    let mut reader = BinaryReader::new(data);
    match ty {
        AttrType::Raw => {
            let len = reader.read_u32().ok()? as usize;
            Some(4 + len)
        }
        AttrType::F3SemiConstant => Some(1 + 4 * literal_count(reader.read_u8().ok()?, 3)),
        AttrType::QuatSemiConstant => Some(1 + 4 * literal_count(reader.read_u8().ok()?, 4)),
        _ => None,
    }
}

fn read_semi_constant<const N: usize>(reader: &mut BinaryReader<'_>) -> Option<[f32; N]> {
    let mask = reader.read_u8().ok()?;
    let mut out = [0.0f32; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = match (mask >> (2 * i)) & 3 {
            COMPONENT_ONE => 1.0,
            COMPONENT_MINUS_ONE => -1.0,
            COMPONENT_LITERAL => reader.read_f32().ok()?,
            _ => 0.0,
        };
    }
    Some(out)
}

fn read_floats<const N: usize>(reader: &mut BinaryReader<'_>) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    for slot in out.iter_mut() {
        *slot = reader.read_f32().ok()?;
    }
    Some(out)
}

/// Decode one attribute payload.
pub(crate) fn decode_attr<'a>(
    ty: AttrType,
    payload: &'a [u8],
    strings: &'a StringTableReader,
) -> Option<AttrValue<'a>> {
    let mut reader = BinaryReader::new(payload);
    let value = match ty {
        AttrType::Str => {
            let id = reader.read_u16().ok()?;
            AttrValue::Str(strings.get(u32::from(id))?)
        }
        AttrType::Int32 => AttrValue::Int32(reader.read_i32().ok()?),
        AttrType::F1 => AttrValue::Float(reader.read_f32().ok()?),
        AttrType::F3 => AttrValue::Vec3(read_floats(&mut reader)?),
        AttrType::Quat => AttrValue::Quat(read_floats(&mut reader)?),
        AttrType::Int64 => AttrValue::Int64(reader.read_i64().ok()?),
        AttrType::Raw => {
            let len = reader.read_u32().ok()? as usize;
            AttrValue::Bytes(reader.read_bytes(len).ok()?)
        }
        AttrType::Pos16 => AttrValue::Int32(i32::from(reader.read_u16().ok()?)),
        AttrType::Neg16 => AttrValue::Int32(-i32::from(reader.read_u16().ok()?)),
        AttrType::Pos8 => AttrValue::Int32(i32::from(reader.read_u8().ok()?)),
        AttrType::Neg8 => AttrValue::Int32(-i32::from(reader.read_u8().ok()?)),
        AttrType::F1OneDecimal => AttrValue::Float(decode_one_decimal(reader.read_i8().ok()?)),
        AttrType::F1Zero => AttrValue::Float(0.0),
        AttrType::F3Zero => AttrValue::Vec3([0.0, 0.0, 0.0]),
        AttrType::F3UnitX => AttrValue::Vec3([1.0, 0.0, 0.0]),
        AttrType::F3UnitY => AttrValue::Vec3([0.0, 1.0, 0.0]),
        AttrType::F3UnitZ => AttrValue::Vec3([0.0, 0.0, 1.0]),
        AttrType::F3SemiConstant => AttrValue::Vec3(read_semi_constant(&mut reader)?),
        AttrType::QuatSemiConstant => AttrValue::Quat(read_semi_constant(&mut reader)?),
        AttrType::F64 => AttrValue::Double(reader.read_f64().ok()?),
        AttrType::IntConstant(index) => AttrValue::Int32(*INT_CONSTANTS.get(index as usize)?),
        AttrType::StrConstant(index) => AttrValue::Str(*STRING_CONSTANTS.get(index as usize)?),
    };
    Some(value)
}

/// Conversion from a decoded attribute into a typed Rust value.
///
/// Conversions between integer widths check the range; a value that does not
/// fit returns `None`. Unsigned 32/64-bit values are reinterpreted by bit
/// pattern, matching how they are written.
pub trait FromAttrValue<'a>: Sized {
    fn from_attr_value(value: AttrValue<'a>) -> Option<Self>;
}

impl<'a> FromAttrValue<'a> for AttrValue<'a> {
    fn from_attr_value(value: AttrValue<'a>) -> Option<Self> {
        Some(value)
    }
}

impl FromAttrValue<'_> for i64 {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        match value {
            AttrValue::Int32(v) => Some(i64::from(v)),
            AttrValue::Int64(v) => Some(v),
            _ => None,
        }
    }
}

impl FromAttrValue<'_> for u64 {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        i64::from_attr_value(value).map(|v| v as u64)
    }
}

impl FromAttrValue<'_> for i32 {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        i32::try_from(i64::from_attr_value(value)?).ok()
    }
}

impl FromAttrValue<'_> for u32 {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        match value {
            AttrValue::Int32(v) => Some(v as u32),
            AttrValue::Int64(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }
}

macro_rules! impl_from_attr_narrow {
    ($($ty:ty),*) => {$(
        impl FromAttrValue<'_> for $ty {
            fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
                <$ty>::try_from(i64::from_attr_value(value)?).ok()
            }
        }
    )*};
}

impl_from_attr_narrow!(i8, u8, i16, u16);

impl FromAttrValue<'_> for bool {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        i64::from_attr_value(value).map(|v| v != 0)
    }
}

impl FromAttrValue<'_> for f32 {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        match value {
            AttrValue::Float(v) => Some(v),
            AttrValue::Double(v) => Some(v as f32),
            AttrValue::Int32(v) => Some(v as f32),
            _ => None,
        }
    }
}

impl FromAttrValue<'_> for f64 {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        match value {
            AttrValue::Float(v) => Some(f64::from(v)),
            AttrValue::Double(v) => Some(v),
            AttrValue::Int32(v) => Some(f64::from(v)),
            _ => None,
        }
    }
}

impl FromAttrValue<'_> for [f32; 3] {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        match value {
            AttrValue::Vec3(v) => Some(v),
            _ => None,
        }
    }
}

impl FromAttrValue<'_> for [f32; 4] {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        match value {
            AttrValue::Quat(v) => Some(v),
            _ => None,
        }
    }
}

impl<'a> FromAttrValue<'a> for &'a str {
    fn from_attr_value(value: AttrValue<'a>) -> Option<Self> {
        match value {
            AttrValue::Str(s) => Some(s),
            // Long strings are stored as blobs with their terminator
            AttrValue::Bytes(bytes) => {
                let text = bytes.strip_suffix(&[0]).unwrap_or(bytes);
                std::str::from_utf8(text).ok()
            }
            _ => None,
        }
    }
}

impl FromAttrValue<'_> for String {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        <&str>::from_attr_value(value).map(str::to_owned)
    }
}

impl<'a> FromAttrValue<'a> for &'a [u8] {
    fn from_attr_value(value: AttrValue<'a>) -> Option<Self> {
        match value {
            AttrValue::Bytes(bytes) => Some(bytes),
            AttrValue::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl FromAttrValue<'_> for Vec<u8> {
    fn from_attr_value(value: AttrValue<'_>) -> Option<Self> {
        <&[u8]>::from_attr_value(value).map(<[u8]>::to_vec)
    }
}
