//! AST → descriptor lowering, per `spec.md` §4.3. Produces a provisional
//! `FileDescriptor` with symbolic (unqualified or relative) type references
//! left in place — only the linker (`linker.rs`) rewrites them to absolute
//! form. Syntactic validations that don't require cross-file information
//! (tag ranges, map-key restrictions, proto3 restrictions, group naming)
//! happen here, inline with the walk, exactly where `spec.md` §4.3 places
//! them.

use crate::ast::{self, Label as AstLabel};
use crate::descriptor::*;
use crate::dynamic::{
    DynamicMessage, UninterpretedNamePart, UninterpretedOption, UninterpretedValue,
};
use crate::error::ErrorHandler;
use crate::position::Span;

pub const MAX_FIELD_NUMBER: i64 = 536_870_911; // 2^29 - 1
const RESERVED_TAG_START: i64 = 19_000;
const RESERVED_TAG_END: i64 = 19_999;

pub fn lower_file(file: &ast::File, errors: &mut ErrorHandler) -> FileDescriptor {
    let syntax: Syntax = file.syntax.into();
    let mut desc = FileDescriptor {
        name: file.name.clone(),
        syntax,
        ..Default::default()
    };

    for item in &file.items {
        match item {
            ast::FileItem::Import(import) => {
                let index = desc.dependencies.len() as i32;
                desc.dependencies.push(import.value.to_string_lossy());
                match import.kind {
                    Some(ast::ImportKind::Public) => desc.public_dependency.push(index),
                    Some(ast::ImportKind::Weak) => desc.weak_dependency.push(index),
                    None => {}
                }
            }
            ast::FileItem::Package(package) => {
                desc.package = Some(package.name.to_dotted_string());
            }
            ast::FileItem::Option(opt) => {
                push_uninterpreted(&mut desc.options, opt, errors);
            }
            ast::FileItem::Message(m) => {
                desc.messages.push(lower_message(m, syntax, errors));
            }
            ast::FileItem::Enum(e) => {
                desc.enums.push(lower_enum(e, errors));
            }
            ast::FileItem::Extend(e) => {
                lower_extend(e, syntax, errors, &mut desc.extensions, &mut desc.messages);
            }
            ast::FileItem::Service(s) => {
                desc.services.push(lower_service(s, errors));
            }
        }
    }

    desc.source_code_info = generate_source_info(file, &desc);
    desc
}

fn check_tag_range(number: i64, span: &Span, errors: &mut ErrorHandler, allow_message_set: bool) {
    if number < 1 {
        errors.push_error(span.clone(), format!("field number {} must be positive", number));
        return;
    }
    let max = if allow_message_set { i32::MAX as i64 } else { MAX_FIELD_NUMBER };
    if number > max {
        errors.push_error(
            span.clone(),
            format!("field number {} is out of range (max {})", number, max),
        );
    }
    if !allow_message_set && (RESERVED_TAG_START..=RESERVED_TAG_END).contains(&number) {
        errors.push_error(
            span.clone(),
            format!(
                "field number {} falls within the reserved implementation range {}..{}",
                number, RESERVED_TAG_START, RESERVED_TAG_END
            ),
        );
    }
}

fn json_name_of(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn lower_message(ast_msg: &ast::Message, syntax: Syntax, errors: &mut ErrorHandler) -> MessageDescriptor {
    let mut desc = MessageDescriptor {
        name: ast_msg.name.text.clone(),
        ast_span: ast_msg.span.clone(),
        ..Default::default()
    };

    for field in &ast_msg.body.fields {
        desc.fields.push(lower_field(field, syntax, errors, false));
    }
    for group in &ast_msg.body.groups {
        lower_group(group, syntax, errors, &mut desc.fields, &mut desc.nested_messages);
    }
    for map_field in &ast_msg.body.map_fields {
        lower_map_field(map_field, errors, &mut desc.fields, &mut desc.nested_messages);
    }
    for nested in &ast_msg.body.messages {
        desc.nested_messages.push(lower_message(nested, syntax, errors));
    }
    for nested_enum in &ast_msg.body.enums {
        desc.nested_enums.push(lower_enum(nested_enum, errors));
    }
    for extend in &ast_msg.body.extends {
        lower_extend(extend, syntax, errors, &mut desc.extensions, &mut desc.nested_messages);
    }
    for ext_range in &ast_msg.body.extensions {
        if syntax == Syntax::Proto3 {
            errors.push_error(
                ext_range.span.clone(),
                "extension ranges are not allowed in proto3 messages",
            );
        }
        for range in &ext_range.ranges {
            let start = range.start.value as i64;
            let end = match &range.end {
                None => start + 1,
                Some(e) => match e.value {
                    None => i32::MAX as i64 + 1, // "max"
                    Some(v) => v as i64 + 1,
                },
            };
            desc.extension_ranges.push(ExtensionRangeDescriptor {
                start: start as i32,
                end: end.min(i32::MAX as i64 + 1) as i32,
                options: {
                    let mut opts = DynamicMessage::new("google.protobuf.ExtensionRangeOptions");
                    for o in &ext_range.options {
                        push_uninterpreted_compact(&mut opts, o, errors);
                    }
                    opts
                },
                ast_span: range.span.clone(),
            });
        }
    }
    for oneof in &ast_msg.body.oneofs {
        lower_oneof(oneof, syntax, errors, &mut desc);
    }
    for reserved in &ast_msg.body.reserved {
        match &reserved.kind {
            ast::ReservedKind::Ranges(ranges) => {
                for r in ranges {
                    let start = r.start.value as i64;
                    let end = match &r.end {
                        None => start + 1,
                        Some(e) => e.value.map(|v| v as i64 + 1).unwrap_or(MAX_FIELD_NUMBER + 1),
                    };
                    if start > end - 1 {
                        errors.push_error(r.span.clone(), "reserved range start must not exceed end");
                    }
                    desc.reserved_ranges.push(ReservedRangeDescriptor {
                        start: start as i32,
                        end: end as i32,
                    });
                }
            }
            ast::ReservedKind::Names(names) => {
                for n in names {
                    desc.reserved_names.push(n.to_string_lossy());
                }
            }
        }
    }
    for opt in &ast_msg.body.options {
        push_uninterpreted(&mut desc.options, opt, errors);
    }

    desc
}

fn lower_field(
    field: &ast::Field,
    syntax: Syntax,
    errors: &mut ErrorHandler,
    in_extend: bool,
) -> FieldDescriptor {
    check_tag_range(field.number.value as i64, &field.number.span, errors, false);

    let label = match &field.label {
        Some((AstLabel::Required, span)) => {
            if syntax == Syntax::Proto3 {
                errors.push_error(span.clone(), "'required' is not allowed in proto3");
            }
            Label::Required
        }
        Some((AstLabel::Repeated, _)) => Label::Repeated,
        Some((AstLabel::Optional, _)) => Label::Optional,
        None => {
            if syntax == Syntax::Proto2 && !in_extend {
                errors.push_error(
                    field.span.clone(),
                    "missing label; proto2 fields require 'optional', 'required' or 'repeated'",
                );
            }
            Label::Optional
        }
    };

    let type_text = field.type_name.to_dotted_string();
    let scalar = if field.type_name.parts.len() == 1 && !field.type_name.leading_dot {
        Type::from_scalar_keyword(&field.type_name.parts[0].text)
    } else {
        None
    };
    let (kind, type_name) = match scalar {
        Some(t) => (t, None),
        // The parser cannot tell message from enum references; default to
        // Message here and let the linker correct it once it knows what
        // the symbol actually names (spec.md §4.6).
        None => (Type::Message, Some(type_text)),
    };

    let mut options = DynamicMessage::new("google.protobuf.FieldOptions");
    let mut default_value = None;
    for opt in &field.options {
        if opt.name.parts.len() == 1
            && !opt.name.parts[0].is_extension
            && opt.name.parts[0].name.to_dotted_string() == "default"
        {
            default_value = Some(text_format_value(&opt.value));
        } else {
            push_uninterpreted_compact(&mut options, opt, errors);
        }
    }
    if default_value.is_some() && syntax == Syntax::Proto3 {
        errors.push_error(field.span.clone(), "explicit defaults are not allowed in proto3");
    }

    FieldDescriptor {
        name: field.name.text.clone(),
        number: field.number.value as i32,
        label,
        kind,
        type_name,
        extendee: None,
        default_value,
        oneof_index: None,
        json_name: json_name_of(&field.name.text),
        options,
        ast_span: field.span.clone(),
    }
}

fn lower_group(
    group: &ast::Group,
    syntax: Syntax,
    errors: &mut ErrorHandler,
    fields: &mut Vec<FieldDescriptor>,
    nested_messages: &mut Vec<MessageDescriptor>,
) {
    check_tag_range(group.number.value as i64, &group.number.span, errors, false);
    if syntax == Syntax::Proto3 {
        errors.push_error(group.span.clone(), "'group' fields are not allowed in proto3");
    }
    if !group.name.text.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        errors.push_error(
            group.name.span.clone(),
            format!("group name \"{}\" must start with a capital letter", group.name.text),
        );
    }
    let label = match &group.label {
        Some((AstLabel::Required, _)) => Label::Required,
        Some((AstLabel::Repeated, _)) => Label::Repeated,
        Some((AstLabel::Optional, _)) | None => Label::Optional,
    };

    let field_name = group.name.text.to_lowercase();
    fields.push(FieldDescriptor {
        name: field_name.clone(),
        number: group.number.value as i32,
        label,
        kind: Type::Group,
        type_name: Some(group.name.text.clone()),
        extendee: None,
        default_value: None,
        oneof_index: None,
        json_name: json_name_of(&field_name),
        options: DynamicMessage::new("google.protobuf.FieldOptions"),
        ast_span: group.span.clone(),
    });

    let mut nested = lower_message_body_as(&group.name.text, &group.body, syntax, errors, group.span.clone());
    nested.ast_span = group.span.clone();
    nested_messages.push(nested);
}

fn lower_message_body_as(
    name: &str,
    body: &ast::MessageBody,
    syntax: Syntax,
    errors: &mut ErrorHandler,
    span: Span,
) -> MessageDescriptor {
    // Reuses lower_message's logic by wrapping the body in a throwaway
    // ast::Message node, since group bodies share the message grammar.
    let synthetic = ast::Message {
        name: ast::Ident {
            text: name.to_string(),
            span: span.clone(),
        },
        body: body.clone(),
        leading_comments: Vec::new(),
        span,
    };
    lower_message(&synthetic, syntax, errors)
}

fn lower_map_field(
    map_field: &ast::MapField,
    errors: &mut ErrorHandler,
    fields: &mut Vec<FieldDescriptor>,
    nested_messages: &mut Vec<MessageDescriptor>,
) {
    check_tag_range(map_field.number.value as i64, &map_field.number.span, errors, false);

    let key_type = match Type::from_scalar_keyword(&map_field.key_type.text) {
        Some(t) if !matches!(t, Type::Float | Type::Double | Type::Bytes) => t,
        Some(_) => {
            errors.push_error(
                map_field.key_type.span.clone(),
                format!("\"{}\" is not a valid map key type", map_field.key_type.text),
            );
            Type::String
        }
        None => {
            errors.push_error(
                map_field.key_type.span.clone(),
                format!("\"{}\" is not a valid map key type", map_field.key_type.text),
            );
            Type::String
        }
    };

    let value_text = map_field.value_type.to_dotted_string();
    let value_scalar = if map_field.value_type.parts.len() == 1 && !map_field.value_type.leading_dot {
        Type::from_scalar_keyword(&map_field.value_type.parts[0].text)
    } else {
        None
    };
    let (value_kind, value_type_name) = match value_scalar {
        Some(t) => (t, None),
        None => (Type::Message, Some(value_text)),
    };

    let entry_name = format!("{}Entry", capitalize(&map_field.name.text));

    let mut entry_options = DynamicMessage::new("google.protobuf.MessageOptions");
    entry_options.set(7, crate::dynamic::DynamicValue::Bool(true)); // map_entry

    let entry = MessageDescriptor {
        name: entry_name.clone(),
        fields: vec![
            FieldDescriptor {
                name: "key".to_string(),
                number: 1,
                label: Label::Optional,
                kind: key_type,
                type_name: None,
                extendee: None,
                default_value: None,
                oneof_index: None,
                json_name: "key".to_string(),
                options: DynamicMessage::new("google.protobuf.FieldOptions"),
                ast_span: map_field.span.clone(),
            },
            FieldDescriptor {
                name: "value".to_string(),
                number: 2,
                label: Label::Optional,
                kind: value_kind,
                type_name: value_type_name,
                extendee: None,
                default_value: None,
                oneof_index: None,
                json_name: "value".to_string(),
                options: DynamicMessage::new("google.protobuf.FieldOptions"),
                ast_span: map_field.span.clone(),
            },
        ],
        options: entry_options,
        ast_span: map_field.span.clone(),
        ..Default::default()
    };
    nested_messages.push(entry);

    let mut options = DynamicMessage::new("google.protobuf.FieldOptions");
    for opt in &map_field.options {
        push_uninterpreted_compact(&mut options, opt, errors);
    }

    fields.push(FieldDescriptor {
        name: map_field.name.text.clone(),
        number: map_field.number.value as i32,
        label: Label::Repeated,
        kind: Type::Message,
        type_name: Some(entry_name),
        extendee: None,
        default_value: None,
        oneof_index: None,
        json_name: json_name_of(&map_field.name.text),
        options,
        ast_span: map_field.span.clone(),
    });
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn lower_oneof(oneof: &ast::Oneof, syntax: Syntax, errors: &mut ErrorHandler, msg: &mut MessageDescriptor) {
    let oneof_index = msg.oneofs.len() as i32;
    let mut options = DynamicMessage::new("google.protobuf.OneofOptions");
    let mut field_count = 0;
    for item in &oneof.items {
        match item {
            ast::OneofItem::Field(f) => {
                if f.label.is_some() {
                    errors.push_error(f.span.clone(), "fields in a oneof must not have a label");
                }
                let mut fd = lower_field(f, syntax, errors, false);
                fd.oneof_index = Some(oneof_index);
                msg.fields.push(fd);
                field_count += 1;
            }
            ast::OneofItem::Group(g) => {
                let before = msg.fields.len();
                lower_group(g, syntax, errors, &mut msg.fields, &mut msg.nested_messages);
                if let Some(f) = msg.fields.get_mut(before) {
                    f.oneof_index = Some(oneof_index);
                }
                field_count += 1;
            }
            ast::OneofItem::Option(o) => {
                push_uninterpreted(&mut options, o, errors);
            }
        }
    }
    if field_count == 0 {
        errors.push_error(oneof.span.clone(), "oneof must declare at least one field");
    }
    msg.oneofs.push(OneofDescriptor {
        name: oneof.name.text.clone(),
        options,
        ast_span: oneof.span.clone(),
    });
}

fn lower_extend(
    extend: &ast::Extend,
    syntax: Syntax,
    errors: &mut ErrorHandler,
    out: &mut Vec<FieldDescriptor>,
    nested_messages: &mut Vec<MessageDescriptor>,
) {
    let extendee = extend.extendee.to_dotted_string();
    if extend.items.is_empty() {
        errors.push_error(extend.span.clone(), "extend block must declare at least one extension");
    }
    for item in &extend.items {
        let mut fd = match item {
            ast::ExtendItem::Field(f) => lower_field(f, syntax, errors, true),
            ast::ExtendItem::Group(g) => {
                let mut fields = Vec::new();
                lower_group(g, syntax, errors, &mut fields, nested_messages);
                fields.into_iter().next().expect("lower_group always pushes one field")
            }
        };
        fd.extendee = Some(extendee.clone());
        out.push(fd);
    }
}

fn lower_enum(ast_enum: &ast::Enum, errors: &mut ErrorHandler) -> EnumDescriptor {
    let mut desc = EnumDescriptor {
        name: ast_enum.name.text.clone(),
        ast_span: ast_enum.span.clone(),
        ..Default::default()
    };
    for value in &ast_enum.body.values {
        if value.value < i32::MIN as i64 || value.value > i32::MAX as i64 {
            errors.push_error(
                value.value_span.clone(),
                format!("enum value {} is out of range for a 32-bit integer", value.value),
            );
        }
        let mut options = DynamicMessage::new("google.protobuf.EnumValueOptions");
        for o in &value.options {
            push_uninterpreted_compact(&mut options, o, errors);
        }
        desc.values.push(EnumValueDescriptor {
            name: value.name.text.clone(),
            number: value.value as i32,
            options,
            ast_span: value.span.clone(),
        });
    }
    if desc.values.is_empty() {
        errors.push_error(ast_enum.span.clone(), "enum must contain at least one value");
    }
    for reserved in &ast_enum.body.reserved {
        match &reserved.kind {
            ast::ReservedKind::Ranges(ranges) => {
                for r in ranges {
                    let start = r.start.value as i64;
                    let end = match &r.end {
                        None => start + 1,
                        Some(e) => e.value.map(|v| v as i64 + 1).unwrap_or(i32::MAX as i64 + 1),
                    };
                    desc.reserved_ranges.push(ReservedRangeDescriptor {
                        start: start as i32,
                        end: end as i32,
                    });
                }
            }
            ast::ReservedKind::Names(names) => {
                for n in names {
                    desc.reserved_names.push(n.to_string_lossy());
                }
            }
        }
    }
    for opt in &ast_enum.body.options {
        push_uninterpreted(&mut desc.options, opt, errors);
    }
    desc
}

fn lower_service(service: &ast::Service, errors: &mut ErrorHandler) -> ServiceDescriptor {
    let mut desc = ServiceDescriptor {
        name: service.name.text.clone(),
        ast_span: service.span.clone(),
        ..Default::default()
    };
    for rpc in &service.body.rpcs {
        let mut options = DynamicMessage::new("google.protobuf.MethodOptions");
        for o in &rpc.options {
            push_uninterpreted(&mut options, o, errors);
        }
        desc.methods.push(MethodDescriptor {
            name: rpc.name.text.clone(),
            input_type: rpc.input.type_name.to_dotted_string(),
            output_type: rpc.output.type_name.to_dotted_string(),
            client_streaming: rpc.input.streaming,
            server_streaming: rpc.output.streaming,
            options,
            ast_span: rpc.span.clone(),
        });
    }
    for opt in &service.body.options {
        push_uninterpreted(&mut desc.options, opt, errors);
    }
    desc
}

// ---- option name/value lowering shared by every element kind --------------

fn push_uninterpreted(target: &mut DynamicMessage, opt: &ast::OptionDecl, errors: &mut ErrorHandler) {
    target.uninterpreted.push(UninterpretedOption {
        name: convert_name(&opt.name.parts),
        value: convert_value(&opt.value, errors),
        span: opt.span.clone(),
    });
}

fn push_uninterpreted_compact(target: &mut DynamicMessage, opt: &ast::CompactOption, errors: &mut ErrorHandler) {
    target.uninterpreted.push(UninterpretedOption {
        name: convert_name(&opt.name.parts),
        value: convert_value(&opt.value, errors),
        span: opt.span.clone(),
    });
}

fn convert_name(parts: &[ast::OptionNamePart]) -> Vec<UninterpretedNamePart> {
    parts
        .iter()
        .map(|p| UninterpretedNamePart {
            name_part: p.name.to_dotted_string(),
            is_extension: p.is_extension,
            span: p.span.clone(),
        })
        .collect()
}

/// Converts a message-literal field's value the same way a top-level
/// option value is converted; used by the option interpreter when it
/// recurses into an aggregate option value (`spec.md` §4.7 step 4).
pub(crate) fn ast_value_to_uninterpreted(value: &ast::Value) -> UninterpretedValue {
    let mut scratch = crate::error::ErrorHandler::default();
    convert_value(value, &mut scratch)
}

fn convert_value(value: &ast::Value, errors: &mut ErrorHandler) -> UninterpretedValue {
    match value {
        ast::Value::String(s) => UninterpretedValue::String(s.value.clone()),
        ast::Value::UInt { value, .. } => UninterpretedValue::PositiveInt(*value),
        ast::Value::Int { value, .. } => {
            if *value >= 0 {
                UninterpretedValue::PositiveInt(*value as u64)
            } else {
                UninterpretedValue::NegativeInt(*value)
            }
        }
        ast::Value::Float { value, .. } => UninterpretedValue::Double(*value),
        ast::Value::Bool { value, .. } => {
            UninterpretedValue::Identifier(if *value { "true" } else { "false" }.to_string())
        }
        ast::Value::Ident(ident) => UninterpretedValue::Identifier(ident.text.clone()),
        ast::Value::Array(values, _) => {
            UninterpretedValue::Array(values.iter().map(|v| convert_value(v, errors)).collect())
        }
        ast::Value::Message(m) => UninterpretedValue::Aggregate(m.clone()),
    }
}

/// Renders a value the way `protoc` stores `FieldDescriptorProto.default_value`:
/// as its text-format string representation.
fn text_format_value(value: &ast::Value) -> String {
    match value {
        ast::Value::String(s) => s.to_string_lossy(),
        ast::Value::UInt { value, .. } => value.to_string(),
        ast::Value::Int { value, .. } => value.to_string(),
        ast::Value::Float { value, .. } => {
            if value.is_infinite() {
                if *value > 0.0 { "inf".to_string() } else { "-inf".to_string() }
            } else if value.is_nan() {
                "nan".to_string()
            } else {
                value.to_string()
            }
        }
        ast::Value::Bool { value, .. } => value.to_string(),
        ast::Value::Ident(ident) => ident.text.clone(),
        ast::Value::Array(_, _) | ast::Value::Message(_) => String::new(),
    }
}

// --- Source info (`SPEC_FULL.md` §4.9) ---
//
// Run as a separate pass over the already-lowered descriptor tree rather
// than threaded through the lowering walk itself: matching AST nodes to
// descriptor nodes by name (instead of by position) means synthetic nodes
// that lowering adds on its own (map-entry messages, group-synthesized
// messages, extend-synthesized extensions) are simply skipped, since they
// have no corresponding source text to report a span for.
//
// Path numbering mirrors `protoc --include_source_info`'s
// `FileDescriptorProto`/`DescriptorProto`/`EnumDescriptorProto`/
// `ServiceDescriptorProto` field numbers.
const FIELD_MESSAGE_TYPE: i32 = 4;
const FIELD_ENUM_TYPE: i32 = 5;
const FIELD_SERVICE: i32 = 6;
const MESSAGE_FIELD: i32 = 2;
const MESSAGE_NESTED_TYPE: i32 = 3;
const MESSAGE_ENUM_TYPE: i32 = 4;
const ENUM_VALUE: i32 = 2;
const SERVICE_METHOD: i32 = 2;

pub fn generate_source_info(ast_file: &ast::File, file: &FileDescriptor) -> Vec<SourceCodeInfoEntry> {
    let mut out = Vec::new();
    let mut message_index = 0;
    let mut enum_index = 0;
    let mut service_index = 0;
    for item in &ast_file.items {
        match item {
            ast::FileItem::Message(m) => {
                if let Some(desc) = file.messages.get(message_index).filter(|d| d.name == m.name.text) {
                    let mut path = vec![FIELD_MESSAGE_TYPE, message_index as i32];
                    push_entry(&mut out, &path, &m.span, &m.leading_comments);
                    visit_message(m, desc, &mut path, &mut out);
                }
                message_index += 1;
            }
            ast::FileItem::Enum(e) => {
                if let Some(desc) = file.enums.get(enum_index).filter(|d| d.name == e.name.text) {
                    let path = vec![FIELD_ENUM_TYPE, enum_index as i32];
                    push_entry(&mut out, &path, &e.span, &e.leading_comments);
                    visit_enum(e, desc, &path, &mut out);
                }
                enum_index += 1;
            }
            ast::FileItem::Service(s) => {
                if let Some(desc) = file.services.get(service_index).filter(|d| d.name == s.name.text) {
                    let path = vec![FIELD_SERVICE, service_index as i32];
                    push_entry(&mut out, &path, &s.span, &s.leading_comments);
                    visit_service(s, desc, &path, &mut out);
                }
                service_index += 1;
            }
            _ => {}
        }
    }
    out
}

fn split_comments(comments: &[crate::token::Comment]) -> (Option<String>, Option<String>) {
    let leading: Vec<&str> = comments
        .iter()
        .filter(|c| !matches!(c.attachment, crate::token::Attachment::Trailing))
        .map(|c| c.text.as_str())
        .collect();
    let trailing: Vec<&str> = comments
        .iter()
        .filter(|c| matches!(c.attachment, crate::token::Attachment::Trailing))
        .map(|c| c.text.as_str())
        .collect();
    (
        (!leading.is_empty()).then(|| leading.join("\n")),
        (!trailing.is_empty()).then(|| trailing.join("\n")),
    )
}

fn push_entry(out: &mut Vec<SourceCodeInfoEntry>, path: &[i32], span: &Span, comments: &[crate::token::Comment]) {
    let (leading_comments, trailing_comments) = split_comments(comments);
    out.push(SourceCodeInfoEntry {
        path: path.to_vec(),
        span: span.clone(),
        leading_comments,
        trailing_comments,
    });
}

fn visit_message(ast_msg: &ast::Message, desc: &MessageDescriptor, path: &mut Vec<i32>, out: &mut Vec<SourceCodeInfoEntry>) {
    let mut field_index = 0;
    for field in &ast_msg.body.fields {
        if desc.fields.get(field_index).is_some_and(|f| f.name == field.name.text) {
            path.push(MESSAGE_FIELD);
            path.push(field_index as i32);
            push_entry(out, path, &field.span, &field.leading_comments);
            path.truncate(path.len() - 2);
        }
        field_index += 1;
    }
    let mut nested_index = 0;
    for nested in &ast_msg.body.messages {
        if let Some(ndesc) = desc.nested_messages.get(nested_index).filter(|n| n.name == nested.name.text) {
            path.push(MESSAGE_NESTED_TYPE);
            path.push(nested_index as i32);
            push_entry(out, path, &nested.span, &nested.leading_comments);
            visit_message(nested, ndesc, path, out);
            path.truncate(path.len() - 2);
        }
        nested_index += 1;
    }
    let mut enum_index = 0;
    for nested_enum in &ast_msg.body.enums {
        if let Some(edesc) = desc.nested_enums.get(enum_index).filter(|e| e.name == nested_enum.name.text) {
            path.push(MESSAGE_ENUM_TYPE);
            path.push(enum_index as i32);
            push_entry(out, path, &nested_enum.span, &nested_enum.leading_comments);
            visit_enum(nested_enum, edesc, path, out);
            path.truncate(path.len() - 2);
        }
        enum_index += 1;
    }
}

fn visit_enum(ast_enum: &ast::Enum, desc: &EnumDescriptor, path: &[i32], out: &mut Vec<SourceCodeInfoEntry>) {
    let mut path = path.to_vec();
    let mut value_index = 0;
    for value in &ast_enum.body.values {
        if desc.values.get(value_index).filter(|v| v.name == value.name.text).is_some() {
            path.push(ENUM_VALUE);
            path.push(value_index as i32);
            push_entry(out, &path, &value.span, &value.leading_comments);
            path.truncate(path.len() - 2);
        }
        value_index += 1;
    }
}

fn visit_service(ast_service: &ast::Service, desc: &ServiceDescriptor, path: &[i32], out: &mut Vec<SourceCodeInfoEntry>) {
    let mut path = path.to_vec();
    let mut method_index = 0;
    for rpc in &ast_service.body.rpcs {
        if desc.methods.get(method_index).filter(|m| m.name == rpc.name.text).is_some() {
            path.push(SERVICE_METHOD);
            path.push(method_index as i32);
            push_entry(out, &path, &rpc.span, &rpc.leading_comments);
            path.truncate(path.len() - 2);
        }
        method_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn lower_source(src: &str) -> (FileDescriptor, ErrorHandler) {
        let mut errors = ErrorHandler::default();
        let tokens = Lexer::new("test.proto", src).tokenize(&mut errors);
        let file = crate::parser::parse("test.proto", tokens, &mut errors);
        let desc = lower_file(&file, &mut errors);
        (desc, errors)
    }

    #[test]
    fn proto3_field_without_label_defaults_to_optional() {
        let (desc, errors) = lower_source("syntax = \"proto3\"; message M { string s = 1; }");
        assert!(errors.diagnostics().is_empty(), "{:?}", errors.diagnostics());
        assert_eq!(desc.messages[0].fields[0].label, Label::Optional);
    }

    #[test]
    fn proto2_field_without_label_is_an_error() {
        let (_desc, errors) = lower_source("syntax = \"proto2\"; message M { string s = 1; }");
        assert!(!errors.diagnostics().is_empty());
    }

    #[test]
    fn field_number_out_of_range_is_rejected() {
        let (_desc, errors) = lower_source("syntax = \"proto3\"; message M { string s = 536870912; }");
        assert!(!errors.diagnostics().is_empty());
    }

    #[test]
    fn field_number_in_reserved_implementation_range_is_rejected() {
        let (_desc, errors) = lower_source("syntax = \"proto3\"; message M { string s = 19500; }");
        assert!(!errors.diagnostics().is_empty());
    }

    #[test]
    fn map_field_synthesizes_a_map_entry_message() {
        let (desc, errors) = lower_source("syntax = \"proto3\"; message M { map<string, int32> counts = 1; }");
        assert!(errors.diagnostics().is_empty(), "{:?}", errors.diagnostics());
        let m = &desc.messages[0];
        assert_eq!(m.nested_messages.len(), 1);
        assert_eq!(m.nested_messages[0].name, "CountsEntry");
        assert!(m.nested_messages[0].is_map_entry());
        assert_eq!(m.fields[0].type_name.as_deref(), Some("CountsEntry"));
        assert_eq!(m.fields[0].label, Label::Repeated);
    }

    #[test]
    fn explicit_default_is_rendered_as_text_format() {
        let (desc, errors) = lower_source("syntax = \"proto2\"; message M { optional int32 n = 1 [default = 5]; }");
        assert!(errors.diagnostics().is_empty(), "{:?}", errors.diagnostics());
        assert_eq!(desc.messages[0].fields[0].default_value.as_deref(), Some("5"));
    }

    #[test]
    fn proto3_rejects_explicit_default() {
        let (_desc, errors) =
            lower_source("syntax = \"proto3\"; message M { int32 n = 1 [default = 5]; }");
        assert!(!errors.diagnostics().is_empty());
    }

    #[test]
    fn oneof_with_no_fields_is_rejected() {
        let (_desc, errors) = lower_source("syntax = \"proto3\"; message M { oneof c { } }");
        assert!(!errors.diagnostics().is_empty());
    }

    #[test]
    fn reserved_name_with_high_byte_escape_is_lossily_decoded() {
        let (desc, errors) = lower_source("syntax = \"proto2\"; message M { reserved \"\\xff\"; }");
        assert!(errors.diagnostics().is_empty(), "{:?}", errors.diagnostics());
        assert_eq!(desc.messages[0].reserved_names, vec!["\u{fffd}".to_string()]);
    }

    #[test]
    fn scalar_and_message_field_types_are_distinguished() {
        let (desc, errors) =
            lower_source("syntax = \"proto3\"; message M { string s = 1; Other o = 2; }");
        assert!(errors.diagnostics().is_empty(), "{:?}", errors.diagnostics());
        let fields = &desc.messages[0].fields;
        assert_eq!(fields[0].kind, Type::String);
        assert_eq!(fields[0].type_name, None);
        // The parser can't yet tell message from enum references; lowering
        // defaults unresolved type names to Message and leaves the linker
        // to correct it.
        assert_eq!(fields[1].kind, Type::Message);
        assert_eq!(fields[1].type_name.as_deref(), Some("Other"));
    }
}
