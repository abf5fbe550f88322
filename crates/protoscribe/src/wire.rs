//! Low-level protobuf wire format parsing.
//!
//! This module implements the protobuf wire format parsing needed to walk
//! raw descriptor bytes and pull out specific sub-messages: the descriptor
//! structs produced by `prost` drop wire data they do not statically know
//! (notably custom option extensions), so recovering those requires going
//! back to the bytes.
//!
//! ## Wire Format Overview
//!
//! Each protobuf field is encoded as:
//! - A varint "tag" containing the field number and wire type
//! - The field data (format depends on wire type)
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};
use crate::MAX_FIELD_NUMBER;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_wire_format(
                0,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// One decoded field occurrence.
///
/// For [`WireType::Len`] fields, `value` is the payload without its length
/// prefix; for all other wire types it is the raw value bytes.
#[derive(Debug, Clone, Copy)]
pub struct RawField<'a> {
    /// Field number from the tag
    pub number: u32,
    /// Wire type from the tag
    pub wire_type: WireType,
    /// Value bytes (payload only for length-delimited fields)
    pub value: &'a [u8],
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len()))
}

/// Read one field from the front of `data`.
///
/// Returns the field and the total bytes consumed (tag plus value).
pub fn read_field(data: &[u8]) -> Result<(RawField<'_>, usize)> {
    if data.is_empty() {
        return Err(Error::invalid_wire_format(0, "empty data"));
    }

    let (tag, tag_len) =
        decode_varint(data).map_err(|_| Error::invalid_wire_format(0, "failed to decode field tag"))?;

    let wire_type = WireType::try_from((tag & 0x07) as u8)?;
    let number = (tag >> 3) as u32;

    if number == 0 || number > MAX_FIELD_NUMBER {
        return Err(Error::InvalidFieldNumber {
            number,
            max: MAX_FIELD_NUMBER,
        });
    }

    let rest = &data[tag_len..];
    let (value, consumed) = match wire_type {
        WireType::Varint => {
            let (_, varint_len) = decode_varint(rest)
                .map_err(|_| Error::invalid_wire_format(tag_len, "failed to decode varint value"))?;
            (&rest[..varint_len], tag_len + varint_len)
        }
        WireType::I64 => {
            if rest.len() < 8 {
                return Err(Error::invalid_wire_format(tag_len, "not enough bytes for I64"));
            }
            (&rest[..8], tag_len + 8)
        }
        WireType::Len => {
            let (length, length_varint_len) = decode_varint(rest)
                .map_err(|_| Error::invalid_wire_format(tag_len, "failed to decode length prefix"))?;
            let length = length as usize;
            if rest.len() < length_varint_len + length {
                return Err(Error::invalid_wire_format(
                    tag_len,
                    format!(
                        "not enough bytes for LEN field (need {}, have {})",
                        length,
                        rest.len() - length_varint_len
                    ),
                ));
            }
            (
                &rest[length_varint_len..length_varint_len + length],
                tag_len + length_varint_len + length,
            )
        }
        WireType::StartGroup | WireType::EndGroup => {
            // Groups are deprecated; the tag itself is the marker.
            (&rest[..0], tag_len)
        }
        WireType::I32 => {
            if rest.len() < 4 {
                return Err(Error::invalid_wire_format(tag_len, "not enough bytes for I32"));
            }
            (&rest[..4], tag_len + 4)
        }
    };

    Ok((
        RawField {
            number,
            wire_type,
            value,
        },
        consumed,
    ))
}

/// Collect the payloads of every length-delimited occurrence of `number`
/// in a message's bytes.
pub fn len_fields<'a>(data: &'a [u8], number: u32) -> Result<Vec<&'a [u8]>> {
    let mut out = Vec::new();
    let mut position = 0;

    while position < data.len() {
        let (field, consumed) = read_field(&data[position..])?;
        if field.number == number && field.wire_type == WireType::Len {
            out.push(field.value);
        }
        position += consumed;
    }

    Ok(out)
}

/// Return the payload of the `index`-th length-delimited occurrence of
/// `number`, if present.
pub fn nth_len_field(data: &[u8], number: u32, index: usize) -> Result<Option<&[u8]>> {
    let mut seen = 0;
    let mut position = 0;

    while position < data.len() {
        let (field, consumed) = read_field(&data[position..])?;
        if field.number == number && field.wire_type == WireType::Len {
            if seen == index {
                return Ok(Some(field.value));
            }
            seen += 1;
        }
        position += consumed;
    }

    Ok(None)
}

/// Concatenate every length-delimited occurrence of `number`.
///
/// Split sub-messages merge under protobuf semantics, so concatenating the
/// payloads yields the bytes of the merged message.
pub fn concat_len_fields(data: &[u8], number: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for payload in len_fields(data, number)? {
        out.extend_from_slice(payload);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_varint_single_byte() {
        let data = [0x08]; // Value 8
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 8);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let data = [0xAC, 0x02]; // Value 300
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_decode_varint_max() {
        // Maximum 64-bit varint (all 1s)
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, u64::MAX);
        assert_eq!(len, 10);
    }

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(2).unwrap(), WireType::Len);
        assert_eq!(WireType::try_from(5).unwrap(), WireType::I32);
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_read_varint_field() {
        // Field 1, wire type 0 (varint), value 150
        let data = [0x08, 0x96, 0x01];
        let (field, len) = read_field(&data).unwrap();
        assert_eq!(field.number, 1);
        assert_eq!(field.wire_type, WireType::Varint);
        assert_eq!(len, 3);
    }

    #[test]
    fn test_read_len_field() {
        // Field 1, wire type 2 (len), length 5, "hello"
        let data = [0x0A, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let (field, len) = read_field(&data).unwrap();
        assert_eq!(field.number, 1);
        assert_eq!(field.value, b"hello");
        assert_eq!(len, 7);
    }

    #[test]
    fn test_read_fixed_fields() {
        let data = [0x0D, 0x01, 0x02, 0x03, 0x04];
        let (field, len) = read_field(&data).unwrap();
        assert_eq!(field.wire_type, WireType::I32);
        assert_eq!(len, 5);

        let data = [0x09, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let (field, len) = read_field(&data).unwrap();
        assert_eq!(field.wire_type, WireType::I64);
        assert_eq!(len, 9);
    }

    #[test]
    fn test_invalid_field_number() {
        // Field 0 is invalid
        let data = [0x00, 0x01];
        assert!(read_field(&data).is_err());
    }

    #[test]
    fn test_nth_len_field() {
        // Two occurrences of field 2, one varint field 1 in between.
        let data = [
            0x12, 0x01, b'a', // field 2: "a"
            0x08, 0x05, // field 1: 5
            0x12, 0x01, b'b', // field 2: "b"
        ];
        assert_eq!(nth_len_field(&data, 2, 0).unwrap(), Some(&b"a"[..]));
        assert_eq!(nth_len_field(&data, 2, 1).unwrap(), Some(&b"b"[..]));
        assert_eq!(nth_len_field(&data, 2, 2).unwrap(), None);
        assert_eq!(nth_len_field(&data, 3, 0).unwrap(), None);
    }

    #[test]
    fn test_concat_len_fields() {
        let data = [0x0A, 0x02, b'h', b'i', 0x0A, 0x02, b'y', b'o'];
        let merged = concat_len_fields(&data, 1).unwrap();
        assert_eq!(merged, b"hiyo");
    }
}
