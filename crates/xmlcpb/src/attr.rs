//! Attribute encoding: picks the most compact representation of a value.
//!
//! Selection order per kind:
//!
//! - integers: type-only constant (`0..=10`, `255`), then 8-bit and 16-bit
//!   magnitudes with the sign in the type, then full 32 or 64 bits
//! - floats: `0.0`, then one-decimal fixed point (`-12.8..=12.7` in tenths),
//!   then full IEEE
//! - vectors / quaternions: unit-axis constants, then semi-constant packing
//!   (2-bit code per component, literals only for components that are not
//!   exactly `0`, `1` or `-1`), then full floats
//! - strings: built-in constants, then interned string-data ids; strings
//!   longer than [`MAX_INTERNED_STRING_LEN`] become raw blobs with their NUL
//!
//! Constants are matched by bit pattern, so `-0.0` and NaN are always stored
//! as literals.

use crate::format::{AttrType, INT_CONSTANTS, MAX_INTERNED_STRING_LEN, STRING_CONSTANTS};
use crate::string_table::StringTableWriter;

const ONE_BITS: u32 = 0x3F80_0000;
const MINUS_ONE_BITS: u32 = 0xBF80_0000;

/// Semi-constant component codes.
pub(crate) const COMPONENT_ZERO: u8 = 0;
pub(crate) const COMPONENT_ONE: u8 = 1;
pub(crate) const COMPONENT_MINUS_ONE: u8 = 2;
pub(crate) const COMPONENT_LITERAL: u8 = 3;

/// Largest inline payload: quaternion mask byte plus four floats.
const INLINE_CAPACITY: usize = 17;

/// A value to be written as an attribute.
///
/// Usually created through `From`/`Into` from plain Rust values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrInput<'a> {
    /// Any integer of 32 bits or less (`u32` is stored by bit pattern).
    Int(i32),
    /// 64-bit integer (`u64` is stored by bit pattern).
    Int64(i64),
    /// Single float.
    Float(f32),
    /// Double float.
    Double(f64),
    /// Three-float vector.
    Vec3([f32; 3]),
    /// Four-float quaternion.
    Quat([f32; 4]),
    /// UTF-8 string.
    Str(&'a str),
    /// Opaque bytes, never deduplicated.
    Bytes(&'a [u8]),
}

macro_rules! impl_from_small_int {
    ($($ty:ty),*) => {$(
        impl From<$ty> for AttrInput<'_> {
            fn from(value: $ty) -> Self {
                AttrInput::Int(i32::from(value))
            }
        }
    )*};
}

impl_from_small_int!(bool, i8, u8, i16, u16, i32);

impl From<u32> for AttrInput<'_> {
    fn from(value: u32) -> Self {
        AttrInput::Int(value as i32)
    }
}

impl From<i64> for AttrInput<'_> {
    fn from(value: i64) -> Self {
        AttrInput::Int64(value)
    }
}

impl From<u64> for AttrInput<'_> {
    fn from(value: u64) -> Self {
        AttrInput::Int64(value as i64)
    }
}

impl From<f32> for AttrInput<'_> {
    fn from(value: f32) -> Self {
        AttrInput::Float(value)
    }
}

impl From<f64> for AttrInput<'_> {
    fn from(value: f64) -> Self {
        AttrInput::Double(value)
    }
}

impl From<[f32; 3]> for AttrInput<'_> {
    fn from(value: [f32; 3]) -> Self {
        AttrInput::Vec3(value)
    }
}

impl From<[f32; 4]> for AttrInput<'_> {
    fn from(value: [f32; 4]) -> Self {
        AttrInput::Quat(value)
    }
}

impl<'a> From<&'a str> for AttrInput<'a> {
    fn from(value: &'a str) -> Self {
        AttrInput::Str(value)
    }
}

impl<'a> From<&'a String> for AttrInput<'a> {
    fn from(value: &'a String) -> Self {
        AttrInput::Str(value)
    }
}

impl<'a> From<&'a [u8]> for AttrInput<'a> {
    fn from(value: &'a [u8]) -> Self {
        AttrInput::Bytes(value)
    }
}

impl<'a> From<&'a Vec<u8>> for AttrInput<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        AttrInput::Bytes(value)
    }
}

/// Encoded payload bytes of one attribute, as held by a live writer node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Payload {
    Inline { bytes: [u8; INLINE_CAPACITY], len: u8 },
    /// Written as a `u32` length followed by the bytes.
    Raw(Vec<u8>),
}

impl Payload {
    pub(crate) fn empty() -> Self {
        Payload::Inline {
            bytes: [0; INLINE_CAPACITY],
            len: 0,
        }
    }

    fn inline(data: &[u8]) -> Self {
        let mut bytes = [0; INLINE_CAPACITY];
        bytes[..data.len()].copy_from_slice(data);
        Payload::Inline {
            bytes,
            len: data.len() as u8,
        }
    }

    fn push(&mut self, data: &[u8]) {
        if let Payload::Inline { bytes, len } = self {
            let start = *len as usize;
            bytes[start..start + data.len()].copy_from_slice(data);
            *len += data.len() as u8;
        }
    }

    /// Number of bytes this payload occupies in the node record.
    pub(crate) fn wire_len(&self) -> usize {
        match self {
            Payload::Inline { len, .. } => *len as usize,
            Payload::Raw(data) => 4 + data.len(),
        }
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Payload::Inline { bytes, len } => out.extend_from_slice(&bytes[..*len as usize]),
            Payload::Raw(data) => {
                out.extend_from_slice(&(data.len() as u32).to_le_bytes());
                out.extend_from_slice(data);
            }
        }
    }
}

/// One attribute value after encoding selection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EncodedAttr {
    pub ty: AttrType,
    pub payload: Payload,
}

impl EncodedAttr {
    fn constant(ty: AttrType) -> Self {
        Self {
            ty,
            payload: Payload::empty(),
        }
    }

    fn inline(ty: AttrType, data: &[u8]) -> Self {
        Self {
            ty,
            payload: Payload::inline(data),
        }
    }
}

/// Why a value could not be encoded as requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EncodeError {
    /// The string-data table is full.
    StringTableFull,
    /// A raw value longer than `u32::MAX` bytes.
    ValueTooLarge,
}

/// Encode a value, interning strings in `strings`.
pub(crate) fn encode_attr(
    input: AttrInput<'_>,
    strings: &mut StringTableWriter,
) -> Result<EncodedAttr, EncodeError> {
    Ok(match input {
        AttrInput::Int(value) => encode_i32(value),
        AttrInput::Int64(value) => encode_i64(value),
        AttrInput::Float(value) => encode_f32(value),
        AttrInput::Double(value) => encode_f64(value),
        AttrInput::Vec3(value) => encode_vec3(value),
        AttrInput::Quat(value) => encode_quat(value),
        AttrInput::Str(value) => return encode_str(value, strings),
        AttrInput::Bytes(value) => encode_raw(value.to_vec())?,
    })
}

pub(crate) fn encode_i32(value: i32) -> EncodedAttr {
    if let Some(index) = INT_CONSTANTS.iter().position(|&c| c == value) {
        return EncodedAttr::constant(AttrType::IntConstant(index as u8));
    }
    let magnitude = value.unsigned_abs();
    match (value < 0, magnitude) {
        (false, 0..=0xFF) => EncodedAttr::inline(AttrType::Pos8, &[magnitude as u8]),
        (true, 0..=0xFF) => EncodedAttr::inline(AttrType::Neg8, &[magnitude as u8]),
        (false, 0..=0xFFFF) => {
            EncodedAttr::inline(AttrType::Pos16, &(magnitude as u16).to_le_bytes())
        }
        (true, 0..=0xFFFF) => {
            EncodedAttr::inline(AttrType::Neg16, &(magnitude as u16).to_le_bytes())
        }
        _ => EncodedAttr::inline(AttrType::Int32, &value.to_le_bytes()),
    }
}

pub(crate) fn encode_i64(value: i64) -> EncodedAttr {
    match i32::try_from(value) {
        Ok(narrow) => encode_i32(narrow),
        Err(_) => EncodedAttr::inline(AttrType::Int64, &value.to_le_bytes()),
    }
}

/// Tenths representation of `value`, if it decodes back bit-exactly.
fn one_decimal(value: f32) -> Option<i8> {
    let tenths = (value * 10.0).round();
    if !(-128.0..=127.0).contains(&tenths) {
        return None;
    }
    let tenths = tenths as i8;
    (decode_one_decimal(tenths).to_bits() == value.to_bits()).then_some(tenths)
}

#[inline]
pub(crate) fn decode_one_decimal(tenths: i8) -> f32 {
    f32::from(tenths) / 10.0
}

pub(crate) fn encode_f32(value: f32) -> EncodedAttr {
    if value.to_bits() == 0 {
        return EncodedAttr::constant(AttrType::F1Zero);
    }
    match one_decimal(value) {
        Some(tenths) => EncodedAttr::inline(AttrType::F1OneDecimal, &[tenths as u8]),
        None => EncodedAttr::inline(AttrType::F1, &value.to_le_bytes()),
    }
}

pub(crate) fn encode_f64(value: f64) -> EncodedAttr {
    let narrow = value as f32;
    if f64::from(narrow).to_bits() == value.to_bits() {
        encode_f32(narrow)
    } else {
        EncodedAttr::inline(AttrType::F64, &value.to_le_bytes())
    }
}

pub(crate) fn component_code(value: f32) -> u8 {
    match value.to_bits() {
        0 => COMPONENT_ZERO,
        ONE_BITS => COMPONENT_ONE,
        MINUS_ONE_BITS => COMPONENT_MINUS_ONE,
        _ => COMPONENT_LITERAL,
    }
}

/// Semi-constant payload: mask byte then the literal components.
///
/// Returns `None` when every component is a literal, in which case the full
/// representation is smaller.
fn semi_constant(values: &[f32]) -> Option<Payload> {
    let mut mask = 0u8;
    for (i, &value) in values.iter().enumerate() {
        mask |= component_code(value) << (2 * i);
    }
    let literals = values
        .iter()
        .filter(|&&v| component_code(v) == COMPONENT_LITERAL)
        .count();
    if literals == values.len() {
        return None;
    }

    let mut payload = Payload::inline(&[mask]);
    for &value in values.iter().filter(|&&v| component_code(v) == COMPONENT_LITERAL) {
        payload.push(&value.to_le_bytes());
    }
    Some(payload)
}

fn full_floats(values: &[f32]) -> Payload {
    let mut payload = Payload::empty();
    for value in values {
        payload.push(&value.to_le_bytes());
    }
    payload
}

pub(crate) fn encode_vec3(value: [f32; 3]) -> EncodedAttr {
    let codes = value.map(component_code);
    let ty = match codes {
        [COMPONENT_ZERO, COMPONENT_ZERO, COMPONENT_ZERO] => Some(AttrType::F3Zero),
        [COMPONENT_ONE, COMPONENT_ZERO, COMPONENT_ZERO] => Some(AttrType::F3UnitX),
        [COMPONENT_ZERO, COMPONENT_ONE, COMPONENT_ZERO] => Some(AttrType::F3UnitY),
        [COMPONENT_ZERO, COMPONENT_ZERO, COMPONENT_ONE] => Some(AttrType::F3UnitZ),
        _ => None,
    };
    if let Some(ty) = ty {
        return EncodedAttr::constant(ty);
    }
    match semi_constant(&value) {
        Some(payload) => EncodedAttr {
            ty: AttrType::F3SemiConstant,
            payload,
        },
        None => EncodedAttr {
            ty: AttrType::F3,
            payload: full_floats(&value),
        },
    }
}

pub(crate) fn encode_quat(value: [f32; 4]) -> EncodedAttr {
    match semi_constant(&value) {
        Some(payload) => EncodedAttr {
            ty: AttrType::QuatSemiConstant,
            payload,
        },
        None => EncodedAttr {
            ty: AttrType::Quat,
            payload: full_floats(&value),
        },
    }
}

pub(crate) fn encode_str(
    value: &str,
    strings: &mut StringTableWriter,
) -> Result<EncodedAttr, EncodeError> {
    if let Some(index) = STRING_CONSTANTS.iter().position(|&c| c == value) {
        return Ok(EncodedAttr::constant(AttrType::StrConstant(index as u8)));
    }
    // Table entries end at the first NUL
    if value.len() > MAX_INTERNED_STRING_LEN || memchr::memchr(0, value.as_bytes()).is_some() {
        return encode_raw_str(value);
    }
    let id = strings
        .get_or_insert(value)
        .ok_or(EncodeError::StringTableFull)?;
    Ok(EncodedAttr::inline(AttrType::Str, &(id as u16).to_le_bytes()))
}

/// Store a string as a raw blob, terminator included.
pub(crate) fn encode_raw_str(value: &str) -> Result<EncodedAttr, EncodeError> {
    let mut data = Vec::with_capacity(value.len() + 1);
    data.extend_from_slice(value.as_bytes());
    data.push(0);
    encode_raw(data)
}

pub(crate) fn encode_raw(data: Vec<u8>) -> Result<EncodedAttr, EncodeError> {
    if u32::try_from(data.len()).is_err() {
        return Err(EncodeError::ValueTooLarge);
    }
    Ok(EncodedAttr {
        ty: AttrType::Raw,
        payload: Payload::Raw(data),
    })
}
