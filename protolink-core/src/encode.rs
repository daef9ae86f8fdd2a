//! Serializes the compiled descriptor tree to the canonical
//! `FileDescriptorProto` wire format (`spec.md` §6). Field numbers below
//! are the ones `descriptor.proto` assigns to each message; they're also
//! exactly the path segments the optional source-info table (`SPEC_FULL.md`
//! §4.9) uses to name a descriptor-tree node.

use bytes::BytesMut;

use crate::descriptor::{
    EnumDescriptor, EnumValueDescriptor, FieldDescriptor, FileDescriptor, Label,
    MessageDescriptor, MethodDescriptor, ServiceDescriptor, Syntax,
};
use crate::dynamic::{DynamicMessage, DynamicValue};
use crate::wire::{
    encode_bool_field, encode_bytes_field, encode_int32_field, encode_message_field,
    encode_string_field, WireType,
};

pub fn encode_file(file: &FileDescriptor) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_string_field(1, &file.name, &mut buf);
    if let Some(package) = &file.package {
        encode_string_field(2, package, &mut buf);
    }
    for dep in &file.dependencies {
        encode_string_field(3, dep, &mut buf);
    }
    for m in &file.messages {
        encode_message_field(4, &encode_message(m), &mut buf);
    }
    for e in &file.enums {
        encode_message_field(5, &encode_enum(e), &mut buf);
    }
    for s in &file.services {
        encode_message_field(6, &encode_service(s), &mut buf);
    }
    for ext in &file.extensions {
        encode_message_field(7, &encode_field(ext), &mut buf);
    }
    if !file.options.is_empty_of_set_fields() {
        encode_message_field(8, &encode_dynamic(&file.options), &mut buf);
    }
    for idx in &file.public_dependency {
        encode_int32_field(10, *idx, &mut buf);
    }
    for idx in &file.weak_dependency {
        encode_int32_field(11, *idx, &mut buf);
    }
    if file.syntax == Syntax::Proto3 {
        encode_string_field(12, "proto3", &mut buf);
    }
    buf.to_vec()
}

fn encode_message(m: &MessageDescriptor) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_string_field(1, &m.name, &mut buf);
    for f in &m.fields {
        encode_message_field(2, &encode_field(f), &mut buf);
    }
    for nested in &m.nested_messages {
        encode_message_field(3, &encode_message(nested), &mut buf);
    }
    for e in &m.nested_enums {
        encode_message_field(4, &encode_enum(e), &mut buf);
    }
    for range in &m.extension_ranges {
        let mut rbuf = BytesMut::new();
        encode_int32_field(1, range.start, &mut rbuf);
        encode_int32_field(2, range.end, &mut rbuf);
        encode_message_field(5, &rbuf, &mut buf);
    }
    for ext in &m.extensions {
        encode_message_field(6, &encode_field(ext), &mut buf);
    }
    if !m.options.is_empty_of_set_fields() {
        encode_message_field(7, &encode_dynamic(&m.options), &mut buf);
    }
    for oneof in &m.oneofs {
        let mut obuf = BytesMut::new();
        encode_string_field(1, &oneof.name, &mut obuf);
        if !oneof.options.is_empty_of_set_fields() {
            encode_message_field(2, &encode_dynamic(&oneof.options), &mut obuf);
        }
        encode_message_field(8, &obuf, &mut buf);
    }
    for range in &m.reserved_ranges {
        let mut rbuf = BytesMut::new();
        encode_int32_field(1, range.start, &mut rbuf);
        encode_int32_field(2, range.end, &mut rbuf);
        encode_message_field(9, &rbuf, &mut buf);
    }
    for name in &m.reserved_names {
        encode_string_field(10, name, &mut buf);
    }
    buf.to_vec()
}

fn encode_field(f: &FieldDescriptor) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_string_field(1, &f.name, &mut buf);
    if let Some(extendee) = &f.extendee {
        encode_string_field(2, extendee, &mut buf);
    }
    encode_int32_field(3, f.number, &mut buf);
    let label_num = match f.label {
        Label::Optional => 1,
        Label::Required => 2,
        Label::Repeated => 3,
    };
    encode_int32_field(4, label_num, &mut buf);
    encode_int32_field(5, f.kind.wire_number(), &mut buf);
    if let Some(type_name) = &f.type_name {
        encode_string_field(6, type_name, &mut buf);
    }
    if let Some(default) = &f.default_value {
        encode_string_field(7, default, &mut buf);
    }
    if !f.options.is_empty_of_set_fields() {
        encode_message_field(8, &encode_dynamic(&f.options), &mut buf);
    }
    if let Some(idx) = f.oneof_index {
        encode_int32_field(9, idx, &mut buf);
    }
    encode_string_field(10, &f.json_name, &mut buf);
    buf.to_vec()
}

fn encode_enum(e: &EnumDescriptor) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_string_field(1, &e.name, &mut buf);
    for v in &e.values {
        encode_message_field(2, &encode_enum_value(v), &mut buf);
    }
    if !e.options.is_empty_of_set_fields() {
        encode_message_field(3, &encode_dynamic(&e.options), &mut buf);
    }
    for range in &e.reserved_ranges {
        let mut rbuf = BytesMut::new();
        encode_int32_field(1, range.start, &mut rbuf);
        // EnumDescriptorProto.EnumReservedRange.end is inclusive, unlike
        // DescriptorProto's message-level ranges.
        encode_int32_field(2, range.end - 1, &mut rbuf);
        encode_message_field(4, &rbuf, &mut buf);
    }
    for name in &e.reserved_names {
        encode_string_field(5, name, &mut buf);
    }
    buf.to_vec()
}

fn encode_enum_value(v: &EnumValueDescriptor) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_string_field(1, &v.name, &mut buf);
    encode_int32_field(2, v.number, &mut buf);
    if !v.options.is_empty_of_set_fields() {
        encode_message_field(3, &encode_dynamic(&v.options), &mut buf);
    }
    buf.to_vec()
}

fn encode_service(s: &ServiceDescriptor) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_string_field(1, &s.name, &mut buf);
    for m in &s.methods {
        encode_message_field(2, &encode_method(m), &mut buf);
    }
    if !s.options.is_empty_of_set_fields() {
        encode_message_field(3, &encode_dynamic(&s.options), &mut buf);
    }
    buf.to_vec()
}

fn encode_method(m: &MethodDescriptor) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_string_field(1, &m.name, &mut buf);
    encode_string_field(2, &m.input_type, &mut buf);
    encode_string_field(3, &m.output_type, &mut buf);
    if !m.options.is_empty_of_set_fields() {
        encode_message_field(4, &encode_dynamic(&m.options), &mut buf);
    }
    if m.client_streaming {
        encode_bool_field(5, true, &mut buf);
    }
    if m.server_streaming {
        encode_bool_field(6, true, &mut buf);
    }
    buf.to_vec()
}

/// Encodes a `DynamicMessage`'s set fields generically: every value knows
/// its own wire type, so no schema lookup is needed at serialization time.
pub fn encode_dynamic(msg: &DynamicMessage) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for (number, value) in msg.iter() {
        encode_dynamic_value(number, value, &mut buf);
    }
    buf.to_vec()
}

fn encode_dynamic_value(number: i32, value: &DynamicValue, buf: &mut BytesMut) {
    match value {
        DynamicValue::Bool(b) => encode_bool_field(number, *b, buf),
        DynamicValue::I32(v) => encode_int32_field(number, *v, buf),
        DynamicValue::I64(v) => {
            crate::wire::encode_key(number, WireType::Varint, buf);
            crate::wire::encode_varint(*v as u64, buf);
        }
        DynamicValue::U32(v) => encode_int32_field(number, *v as i32, buf),
        DynamicValue::U64(v) => {
            crate::wire::encode_key(number, WireType::Varint, buf);
            crate::wire::encode_varint(*v, buf);
        }
        DynamicValue::F32(v) => {
            crate::wire::encode_key(number, WireType::ThirtyTwoBit, buf);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        DynamicValue::F64(v) => {
            crate::wire::encode_key(number, WireType::SixtyFourBit, buf);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        DynamicValue::String(s) => encode_string_field(number, s, buf),
        DynamicValue::Bytes(b) => encode_bytes_field(number, b, buf),
        DynamicValue::Enum(v) => encode_int32_field(number, *v, buf),
        DynamicValue::Message(m) => encode_message_field(number, &encode_dynamic(m), buf),
        DynamicValue::Repeated(values) => {
            for v in values {
                encode_dynamic_value(number, v, buf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldDescriptor;
    use crate::position::Span;

    fn span() -> Span {
        Span::default()
    }

    #[test]
    fn file_name_field_is_tag_1_length_delimited() {
        let file = FileDescriptor {
            name: "foo.proto".to_string(),
            ..Default::default()
        };
        let bytes = encode_file(&file);
        // tag 1, wire type 2 (length-delimited) -> (1 << 3) | 2 = 0x0a
        assert_eq!(bytes[0], 0x0a);
        assert_eq!(bytes[1], "foo.proto".len() as u8);
        assert_eq!(&bytes[2..], b"foo.proto");
    }

    #[test]
    fn proto3_syntax_is_emitted_but_proto2_is_implicit() {
        let mut file = FileDescriptor { name: "a.proto".to_string(), ..Default::default() };
        assert!(!encode_file(&file).windows(6).any(|w| w == b"proto3"));

        file.syntax = Syntax::Proto3;
        assert!(encode_file(&file).windows(6).any(|w| w == b"proto3"));
    }

    #[test]
    fn empty_options_are_not_encoded() {
        let file = FileDescriptor { name: "a.proto".to_string(), ..Default::default() };
        let bytes = encode_file(&file);
        // field 8 would appear as a tag byte (8 << 3) | 2 = 0x42
        assert!(!bytes.contains(&0x42));
    }

    #[test]
    fn field_default_value_round_trips_through_encode_field() {
        let f = FieldDescriptor {
            name: "count".to_string(),
            number: 1,
            label: Label::Optional,
            kind: crate::descriptor::Type::Int32,
            type_name: None,
            extendee: None,
            default_value: Some("5".to_string()),
            oneof_index: None,
            json_name: "count".to_string(),
            options: DynamicMessage::new(""),
            ast_span: span(),
        };
        let bytes = encode_field(&f);
        // field 7 (default_value), length-delimited -> (7 << 3) | 2 = 0x3a
        assert!(bytes.windows(2).any(|w| w == [0x3a, 1]));
        assert!(bytes.windows(1).any(|w| w == b"5"));
    }

    #[test]
    fn encode_dynamic_covers_scalar_and_repeated_values() {
        let mut msg = DynamicMessage::new("Opts");
        msg.set(1, DynamicValue::Bool(true));
        msg.set(2, DynamicValue::String("x".to_string()));
        msg.set(3, DynamicValue::Repeated(vec![DynamicValue::I32(1), DynamicValue::I32(2)]));
        let bytes = encode_dynamic(&msg);

        // field 1, varint: tag 0x08, value 0x01
        assert_eq!(&bytes[0..2], &[0x08, 0x01]);
        // repeated field 3 appears once per element, both tagged the same
        let tag3 = (3 << 3) | 0; // varint
        assert_eq!(bytes.iter().filter(|&&b| b == tag3 as u8).count(), 2);
    }

    #[test]
    fn encode_dynamic_nests_message_values() {
        let mut inner = DynamicMessage::new("Inner");
        inner.set(1, DynamicValue::I32(42));
        let mut outer = DynamicMessage::new("Outer");
        outer.set(5, DynamicValue::Message(inner));

        let bytes = encode_dynamic(&outer);
        // tag 5, length-delimited -> (5 << 3) | 2 = 0x2a
        assert_eq!(bytes[0], 0x2a);
        // the nested body is the encoding of field 1 = 42: 0x08 0x2a
        assert!(bytes.windows(2).any(|w| w == [0x08, 0x2a]));
    }
}
