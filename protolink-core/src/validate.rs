//! The semantic validator (component C10, `spec.md` §4.8): the final pass,
//! run after option interpretation since some of its rules (message-set
//! wire format) depend on interpreted option values.
//!
//! Map-entry synthesis is specified in `spec.md` §4.8 but this
//! implementation performs it earlier, during lowering (`lower.rs`) — see
//! `DESIGN.md` for why. This pass only double-checks the invariant holds
//! (`assert_map_entry_shape`) rather than performing the synthesis.

use std::collections::HashSet;

use crate::descriptor::{EnumDescriptor, FieldDescriptor, FileDescriptor, Label, MessageDescriptor, Syntax};
use crate::error::ErrorHandler;

pub fn validate(files: &mut [FileDescriptor], errors: &mut ErrorHandler) {
    for file in files.iter_mut() {
        let syntax = file.syntax;
        for message in &mut file.messages {
            validate_message(message, syntax, errors);
        }
        for e in &file.enums {
            validate_enum(e, syntax, errors);
        }
    }
}

fn validate_message(message: &mut MessageDescriptor, syntax: Syntax, errors: &mut ErrorHandler) {
    check_duplicate_tags(message, errors);
    check_reserved(message, errors);
    check_message_set(message, errors);
    check_oneofs(message, errors);
    for field in &message.fields {
        if message.is_map_entry() {
            continue;
        }
        assert_map_entry_shape(field, message, errors);
    }
    for nested in &mut message.nested_messages {
        validate_message(nested, syntax, errors);
    }
    for e in &message.nested_enums {
        validate_enum(e, syntax, errors);
    }
}

fn check_duplicate_tags(message: &MessageDescriptor, errors: &mut ErrorHandler) {
    let mut seen: std::collections::HashMap<i32, &FieldDescriptor> = std::collections::HashMap::new();
    for field in &message.fields {
        if let Some(existing) = seen.get(&field.number) {
            errors.push(
                crate::error::Diagnostic::error(
                    field.ast_span.clone(),
                    format!(
                        "field \"{}\" reuses tag {} already used by \"{}\" in \"{}\"",
                        field.name, field.number, existing.name, message.name
                    ),
                )
                .with_secondary(existing.ast_span.clone(), "previous field here"),
            );
        } else {
            seen.insert(field.number, field);
        }
    }
}

fn check_reserved(message: &MessageDescriptor, errors: &mut ErrorHandler) {
    let reserved_names: HashSet<&str> = message.reserved_names.iter().map(String::as_str).collect();
    for field in &message.fields {
        if reserved_names.contains(field.name.as_str()) {
            errors.push_error(
                field.ast_span.clone(),
                format!("field name \"{}\" is reserved in \"{}\"", field.name, message.name),
            );
        }
        let in_reserved_range = message
            .reserved_ranges
            .iter()
            .any(|r| field.number >= r.start && field.number < r.end);
        if in_reserved_range {
            errors.push_error(
                field.ast_span.clone(),
                format!("field \"{}\" uses tag {} which is reserved in \"{}\"", field.name, field.number, message.name),
            );
        }
    }
}

fn check_message_set(message: &MessageDescriptor, errors: &mut ErrorHandler) {
    let message_set_wire_format = message.options.get_bool_field(1) == Some(true);
    if !message_set_wire_format {
        return;
    }
    if !message.fields.is_empty() {
        errors.push_error(
            message.ast_span.clone(),
            format!(
                "\"{}\" is declared message_set_wire_format but has regular fields; only extension ranges are allowed",
                message.name
            ),
        );
    }
    if message.extension_ranges.is_empty() {
        errors.push_error(
            message.ast_span.clone(),
            format!("\"{}\" is declared message_set_wire_format but declares no extension ranges", message.name),
        );
    }
}

/// Checks that every extension targeting a `message_set_wire_format`
/// message is a singular message-typed field (and therefore exempt from
/// the normal 29-bit tag cap, per invariant 8). Run as a second pass since
/// it needs the resolved, linked extendee.
pub fn check_message_set_extensions(
    files: &[FileDescriptor],
    message_set_types: &HashSet<String>,
    errors: &mut ErrorHandler,
) {
    let mut check = |field: &FieldDescriptor| {
        let Some(extendee) = &field.extendee else { return };
        if !message_set_types.contains(extendee) {
            return;
        }
        if field.kind != crate::descriptor::Type::Message || matches!(field.label, Label::Repeated) {
            errors.push_error(
                field.ast_span.clone(),
                format!(
                    "extension \"{}\" of message-set \"{}\" must be a singular message-typed field",
                    field.name, extendee
                ),
            );
        }
    };
    for file in files {
        for ext in &file.extensions {
            check(ext);
        }
        walk_extensions(&file.messages, &mut check);
    }
}

fn walk_extensions<'a>(messages: &'a [MessageDescriptor], visit: &mut dyn FnMut(&'a FieldDescriptor)) {
    for message in messages {
        for ext in &message.extensions {
            visit(ext);
        }
        walk_extensions(&message.nested_messages, visit);
    }
}

/// Collects the absolute names of every message in the graph that has
/// `message_set_wire_format` set, for `check_message_set_extensions`.
pub fn collect_message_set_types(
    index: &std::collections::HashMap<String, &MessageDescriptor>,
) -> HashSet<String> {
    index
        .iter()
        .filter(|(_, m)| m.options.get_bool_field(1) == Some(true))
        .map(|(name, _)| name.clone())
        .collect()
}

fn check_oneofs(message: &MessageDescriptor, errors: &mut ErrorHandler) {
    for (index, oneof) in message.oneofs.iter().enumerate() {
        let member_count = message
            .fields
            .iter()
            .filter(|f| f.oneof_index == Some(index as i32))
            .count();
        if member_count == 0 {
            errors.push_error(oneof.ast_span.clone(), format!("oneof \"{}\" has no member fields", oneof.name));
        }
        for field in message.fields.iter().filter(|f| f.oneof_index == Some(index as i32)) {
            if matches!(field.label, Label::Repeated) {
                errors.push_error(
                    field.ast_span.clone(),
                    format!("field \"{}\" in oneof \"{}\" must not be repeated", field.name, oneof.name),
                );
            }
        }
    }
}

/// Sanity-checks the map-entry shape that `lower.rs` already synthesized:
/// a `repeated` field typed as a message whose nested `...Entry` type
/// (found among `message`'s own nested messages) is marked `map_entry` and
/// carries exactly a `key` (tag 1) and `value` (tag 2) field. This never
/// fires in a correctly functioning lowering pass; it exists as a guard
/// against the two stages drifting apart.
fn assert_map_entry_shape(field: &FieldDescriptor, message: &MessageDescriptor, errors: &mut ErrorHandler) {
    let Some(type_name) = &field.type_name else { return };
    let simple_name = type_name.rsplit('.').next().unwrap_or(type_name.as_str());
    let Some(entry) = message.nested_messages.iter().find(|m| m.name == simple_name) else {
        return;
    };
    if !entry.is_map_entry() {
        return;
    }
    if !matches!(field.label, Label::Repeated) {
        errors.push_error(
            field.ast_span.clone(),
            format!("map field \"{}\" must be repeated", field.name),
        );
    }
    let has_key = entry.fields.iter().any(|f| f.name == "key" && f.number == 1);
    let has_value = entry.fields.iter().any(|f| f.name == "value" && f.number == 2);
    if !has_key || !has_value {
        errors.push_error(
            field.ast_span.clone(),
            format!("synthesized map entry \"{}\" is missing its key/value fields", entry.name),
        );
    }
}

fn validate_enum(e: &EnumDescriptor, syntax: Syntax, errors: &mut ErrorHandler) {
    let allow_alias = e.options.get_bool_field(2) == Some(true);
    let mut seen_names: HashSet<&str> = HashSet::new();
    let mut seen_numbers: std::collections::HashMap<i32, &str> = std::collections::HashMap::new();
    for value in &e.values {
        if !seen_names.insert(value.name.as_str()) {
            errors.push_error(
                value.ast_span.clone(),
                format!("enum value name \"{}\" is duplicated in \"{}\"", value.name, e.name),
            );
        }
        if let Some(existing) = seen_numbers.get(&value.number) {
            if !allow_alias {
                errors.push_error(
                    value.ast_span.clone(),
                    format!(
                        "enum value \"{}\" reuses number {} already used by \"{}\"; set allow_alias if intentional",
                        value.name, value.number, existing
                    ),
                );
            }
        } else {
            seen_numbers.insert(value.number, &value.name);
        }
    }
    validate_proto3_first_enum_value(e, syntax, errors);
}

fn validate_proto3_first_enum_value(e: &EnumDescriptor, syntax: Syntax, errors: &mut ErrorHandler) {
    if syntax != Syntax::Proto3 {
        return;
    }
    match e.values.first() {
        Some(first) if first.number == 0 => {}
        Some(first) => {
            errors.push_error(
                first.ast_span.clone(),
                format!("the first value of proto3 enum \"{}\" must be 0", e.name),
            );
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{OneofDescriptor, Type};
    use crate::position::Position;

    fn span() -> crate::position::Span {
        crate::position::Span::point(Position::start_of("test.proto".into()))
    }

    fn field(name: &str, number: i32, label: Label) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            number,
            label,
            kind: Type::Int32,
            type_name: None,
            extendee: None,
            default_value: None,
            oneof_index: None,
            json_name: name.to_string(),
            options: Default::default(),
            ast_span: span(),
        }
    }

    fn enum_value(name: &str, number: i32) -> crate::descriptor::EnumValueDescriptor {
        crate::descriptor::EnumValueDescriptor {
            name: name.to_string(),
            number,
            options: Default::default(),
            ast_span: span(),
        }
    }

    #[test]
    fn duplicate_tag_is_reported_with_both_fields() {
        let mut errors = ErrorHandler::default();
        let message = MessageDescriptor {
            name: "M".to_string(),
            fields: vec![field("a", 1, Label::Optional), field("b", 1, Label::Optional)],
            ast_span: span(),
            ..Default::default()
        };
        check_duplicate_tags(&message, &mut errors);
        assert_eq!(errors.diagnostics().len(), 1);
        assert!(errors.diagnostics()[0].message.contains("reuses tag 1"));
    }

    #[test]
    fn reserved_name_and_range_are_both_flagged() {
        let mut errors = ErrorHandler::default();
        let message = MessageDescriptor {
            name: "M".to_string(),
            fields: vec![field("old", 5, Label::Optional)],
            reserved_names: vec!["old".to_string()],
            reserved_ranges: vec![crate::descriptor::ReservedRangeDescriptor { start: 5, end: 6 }],
            ast_span: span(),
            ..Default::default()
        };
        check_reserved(&message, &mut errors);
        assert_eq!(errors.diagnostics().len(), 2);
    }

    #[test]
    fn oneof_with_no_members_is_an_error() {
        let mut errors = ErrorHandler::default();
        let message = MessageDescriptor {
            name: "M".to_string(),
            oneofs: vec![OneofDescriptor { name: "choice".to_string(), options: Default::default(), ast_span: span() }],
            ast_span: span(),
            ..Default::default()
        };
        check_oneofs(&message, &mut errors);
        assert!(errors.diagnostics().iter().any(|d| d.message.contains("no member fields")));
    }

    #[test]
    fn repeated_field_in_oneof_is_rejected() {
        let mut errors = ErrorHandler::default();
        let mut member = field("a", 1, Label::Repeated);
        member.oneof_index = Some(0);
        let message = MessageDescriptor {
            name: "M".to_string(),
            fields: vec![member],
            oneofs: vec![OneofDescriptor { name: "choice".to_string(), options: Default::default(), ast_span: span() }],
            ast_span: span(),
            ..Default::default()
        };
        check_oneofs(&message, &mut errors);
        assert!(errors.diagnostics().iter().any(|d| d.message.contains("must not be repeated")));
    }

    #[test]
    fn proto3_enum_must_start_at_zero() {
        let mut errors = ErrorHandler::default();
        let e = EnumDescriptor {
            name: "E".to_string(),
            values: vec![enum_value("A", 1)],
            ..Default::default()
        };
        validate_proto3_first_enum_value(&e, Syntax::Proto3, &mut errors);
        assert!(errors.diagnostics().iter().any(|d| d.message.contains("must be 0")));
    }

    #[test]
    fn proto2_enum_is_exempt_from_first_value_rule() {
        let mut errors = ErrorHandler::default();
        let e = EnumDescriptor {
            name: "E".to_string(),
            values: vec![enum_value("A", 1)],
            ..Default::default()
        };
        validate_proto3_first_enum_value(&e, Syntax::Proto2, &mut errors);
        assert!(errors.diagnostics().is_empty());
    }

    #[test]
    fn duplicate_enum_number_needs_allow_alias() {
        let mut errors = ErrorHandler::default();
        let e = EnumDescriptor {
            name: "E".to_string(),
            values: vec![enum_value("A", 0), enum_value("B", 0)],
            ..Default::default()
        };
        validate_enum(&e, Syntax::Proto3, &mut errors);
        assert!(errors.diagnostics().iter().any(|d| d.message.contains("reuses number")));
    }
}
