//! Minimal protobuf wire-format primitives, grounded in the varint/key
//! encoding conventions common across the pack's own protobuf codecs
//! (`prost`'s `src/encoding.rs`, `protomon`'s `leb128.rs`). Used to
//! serialize the compiled descriptor tree (`spec.md` §6) and to round-trip
//! `DynamicMessage` option values without a code-generated struct per
//! options type.

use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    SixtyFourBit = 1,
    LengthDelimited = 2,
    ThirtyTwoBit = 5,
}

pub fn encode_key(field_number: i32, wire_type: WireType, buf: &mut BytesMut) {
    encode_varint(((field_number as u64) << 3) | wire_type as u64, buf);
}

pub fn encode_varint(mut value: u64, buf: &mut BytesMut) {
    loop {
        if value < 0x80 {
            buf.put_u8(value as u8);
            break;
        } else {
            buf.put_u8(((value & 0x7f) | 0x80) as u8);
            value >>= 7;
        }
    }
}

pub fn encoded_len_varint(value: u64) -> usize {
    // Every 7 bits of magnitude needs another byte; ilog2 gives us the
    // bit-width in one shot instead of looping just to count.
    if value == 0 {
        1
    } else {
        (64 - value.leading_zeros() as usize).div_ceil(7)
    }
}

pub fn zigzag_encode_32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

pub fn zigzag_encode_64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn encode_int32_field(field_number: i32, value: i32, buf: &mut BytesMut) {
    encode_key(field_number, WireType::Varint, buf);
    encode_varint(value as i64 as u64, buf);
}

pub fn encode_bool_field(field_number: i32, value: bool, buf: &mut BytesMut) {
    encode_key(field_number, WireType::Varint, buf);
    encode_varint(value as u64, buf);
}

pub fn encode_string_field(field_number: i32, value: &str, buf: &mut BytesMut) {
    encode_bytes_field(field_number, value.as_bytes(), buf);
}

pub fn encode_bytes_field(field_number: i32, value: &[u8], buf: &mut BytesMut) {
    encode_key(field_number, WireType::LengthDelimited, buf);
    encode_varint(value.len() as u64, buf);
    buf.put_slice(value);
}

/// Encodes a nested message field by first building its body into a
/// scratch buffer so the length prefix can be written before the body.
pub fn encode_message_field(field_number: i32, body: &[u8], buf: &mut BytesMut) {
    encode_bytes_field(field_number, body, buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trip_lengths() {
        assert_eq!(encoded_len_varint(0), 1);
        assert_eq!(encoded_len_varint(127), 1);
        assert_eq!(encoded_len_varint(128), 2);
        assert_eq!(encoded_len_varint(u64::MAX), 10);
    }

    #[test]
    fn key_encodes_field_and_wire_type() {
        let mut buf = BytesMut::new();
        encode_key(1, WireType::Varint, &mut buf);
        assert_eq!(&buf[..], &[0x08]);
    }
}
