//! The linker (component C8, `spec.md` §4.6): resolves every symbolic type
//! reference and extendee left by lowering to absolute form, using the
//! scope-chain rules from `spec.md` §4.5/§4.6, and checks extension-range
//! membership.

use std::collections::HashMap;

use crate::descriptor::{FieldDescriptor, FileDescriptor, Type};
use crate::error::ErrorHandler;
use crate::symbol::{scope_chain, DuplicateSymbol, FilePool, SymbolEntry, SymbolKind, UnionPool};

/// Walks `file`'s symbol declarations into a fresh `FilePool`, per
/// `spec.md` §4.5: FQNs are built by prefixing the current package, then
/// nesting message names; enum values sit in the *enclosing* scope, not
/// inside their enum.
pub fn build_file_pool(file: &FileDescriptor) -> FilePool {
    let mut pool = FilePool::new(file.name.clone());
    let package = file.package.as_deref();

    for message in &file.messages {
        declare_message(&mut pool, message, package, &[]);
    }
    for e in &file.enums {
        declare_enum(&mut pool, e, package, &[]);
    }
    for s in &file.services {
        declare_service(&mut pool, s, package, &[]);
    }
    for ext in &file.extensions {
        let fqn = join(package, &[], &ext.name);
        pool.declare(fqn, SymbolKind::Extension, ext.ast_span.clone());
    }
    pool
}

fn join(package: Option<&str>, nesting: &[String], name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(p) = package {
        if !p.is_empty() {
            parts.push(p);
        }
    }
    for n in nesting {
        parts.push(n);
    }
    parts.push(name);
    parts.join(".")
}

fn declare_message(
    pool: &mut FilePool,
    message: &crate::descriptor::MessageDescriptor,
    package: Option<&str>,
    nesting: &[String],
) {
    let fqn = join(package, nesting, &message.name);
    pool.declare(fqn.clone(), SymbolKind::Message, message.ast_span.clone());

    let mut inner_nesting = nesting.to_vec();
    inner_nesting.push(message.name.clone());

    for field in &message.fields {
        let field_fqn = join(package, &inner_nesting, &field.name);
        pool.declare(field_fqn, SymbolKind::Field, field.ast_span.clone());
    }
    for nested in &message.nested_messages {
        declare_message(pool, nested, package, &inner_nesting);
    }
    for e in &message.nested_enums {
        declare_enum(pool, e, package, &inner_nesting);
    }
    for ext in &message.extensions {
        let ext_fqn = join(package, &inner_nesting, &ext.name);
        pool.declare(ext_fqn, SymbolKind::Extension, ext.ast_span.clone());
    }
    for oneof in &message.oneofs {
        let oneof_fqn = join(package, &inner_nesting, &oneof.name);
        pool.declare(oneof_fqn, SymbolKind::Oneof, oneof.ast_span.clone());
    }
}

fn declare_enum(
    pool: &mut FilePool,
    e: &crate::descriptor::EnumDescriptor,
    package: Option<&str>,
    nesting: &[String],
) {
    let fqn = join(package, nesting, &e.name);
    pool.declare(fqn, SymbolKind::Enum, e.ast_span.clone());
    // Enum values live in the enclosing scope (spec.md §4.5), not nested
    // under the enum's own name.
    for value in &e.values {
        let value_fqn = join(package, nesting, &value.name);
        pool.declare(value_fqn, SymbolKind::EnumValue, value.ast_span.clone());
    }
}

fn declare_service(
    pool: &mut FilePool,
    s: &crate::descriptor::ServiceDescriptor,
    package: Option<&str>,
    nesting: &[String],
) {
    let fqn = join(package, nesting, &s.name);
    pool.declare(fqn.clone(), SymbolKind::Service, s.ast_span.clone());
    let mut inner_nesting = nesting.to_vec();
    inner_nesting.push(s.name.clone());
    for method in &s.methods {
        let method_fqn = join(package, &inner_nesting, &method.name);
        pool.declare(method_fqn, SymbolKind::Method, method.ast_span.clone());
    }
}

/// Merges every file's pool into one `UnionPool`, per invariant 2;
/// duplicates across different files are reported but don't stop linking.
pub fn merge_pools(pools: &[FilePool], errors: &mut ErrorHandler) -> UnionPool {
    let mut union = UnionPool::new();
    for pool in pools {
        for dup in union.merge(pool) {
            report_duplicate(&dup, errors);
        }
    }
    union
}

fn report_duplicate(dup: &DuplicateSymbol, errors: &mut ErrorHandler) {
    errors.push(
        crate::error::Diagnostic::error(
            dup.second_span.clone(),
            format!(
                "\"{}\" is already defined as a {} in \"{}\"",
                dup.fqn,
                dup.kind.describe(),
                dup.first_file
            ),
        )
        .with_secondary(dup.first_span.clone(), "first defined here"),
    );
}

/// What kind of reference a type_name occurrence represents, so a
/// wrong-kind match can be reported precisely ("X is a message, not an
/// enum").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    MessageOrEnum,
    Message,
}

fn resolve_name(
    pool: &UnionPool,
    name: &str,
    leading_dot: bool,
    enclosing_messages: &[String],
    package: Option<&str>,
    wanted: RefKind,
) -> Result<(String, SymbolKind), Option<(String, SymbolKind)>> {
    if leading_dot {
        return match pool.get(name) {
            Some(entry) if kind_matches(entry.kind, wanted) => Ok((format!(".{}", name), entry.kind)),
            Some(entry) => Err(Some((format!(".{}", name), entry.kind))),
            None => Err(None),
        };
    }

    let mut best_guess: Option<(String, SymbolKind)> = None;
    for scope in scope_chain(enclosing_messages, package) {
        let candidate = if scope.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", scope, name)
        };
        if let Some(entry) = pool.get(&candidate) {
            if kind_matches(entry.kind, wanted) {
                return Ok((format!(".{}", candidate), entry.kind));
            }
            if best_guess.is_none() {
                best_guess = Some((format!(".{}", candidate), entry.kind));
            }
        }
    }
    Err(best_guess)
}

fn kind_matches(kind: SymbolKind, wanted: RefKind) -> bool {
    match wanted {
        RefKind::MessageOrEnum => matches!(kind, SymbolKind::Message | SymbolKind::Enum),
        RefKind::Message => matches!(kind, SymbolKind::Message),
    }
}

/// Resolves every field's `type_name` (and, for extensions, `extendee`)
/// across every file in the graph, rewriting to absolute form in place.
/// Returns the per-extendee tag maps built along the way, so callers can
/// also run the duplicate-extension-tag check.
pub fn link(files: &mut [FileDescriptor], pool: &UnionPool, errors: &mut ErrorHandler) {
    for file in files.iter_mut() {
        let package = file.package.clone();
        link_messages(&mut file.messages, pool, package.as_deref(), &[], errors);
        for ext in &mut file.extensions {
            link_field(ext, pool, package.as_deref(), &[], errors);
            link_extendee(ext, pool, errors);
        }
    }
    check_duplicate_extension_tags(files, errors);
}

fn link_messages(
    messages: &mut [crate::descriptor::MessageDescriptor],
    pool: &UnionPool,
    package: Option<&str>,
    nesting: &[String],
    errors: &mut ErrorHandler,
) {
    for message in messages.iter_mut() {
        let mut inner_nesting = nesting.to_vec();
        inner_nesting.push(message.name.clone());

        for field in &mut message.fields {
            link_field(field, pool, package, &inner_nesting, errors);
        }
        for ext in &mut message.extensions {
            link_field(ext, pool, package, &inner_nesting, errors);
            link_extendee(ext, pool, errors);
        }
        link_messages(&mut message.nested_messages, pool, package, &inner_nesting, errors);
    }
}

fn link_field(
    field: &mut FieldDescriptor,
    pool: &UnionPool,
    package: Option<&str>,
    enclosing_messages: &[String],
    errors: &mut ErrorHandler,
) {
    let Some(type_name) = field.type_name.clone() else {
        return;
    };
    if field.kind == Type::Group {
        // Group type names refer to a nested message declared alongside
        // the field, always resolvable relative to the immediate scope;
        // still rewritten to absolute form for consistency.
        if let Ok((resolved, _)) = resolve_name(
            pool,
            &type_name,
            false,
            enclosing_messages,
            package,
            RefKind::MessageOrEnum,
        ) {
            field.type_name = Some(resolved);
        }
        return;
    }

    let leading_dot = type_name.starts_with('.');
    let bare = type_name.strip_prefix('.').unwrap_or(&type_name);
    match resolve_name(pool, bare, leading_dot, enclosing_messages, package, RefKind::MessageOrEnum) {
        Ok((resolved, kind)) => {
            if kind == SymbolKind::Enum {
                field.kind = Type::Enum;
            }
            field.type_name = Some(resolved);
        }
        Err(Some((_, kind))) => {
            errors.push_error(
                field.ast_span.clone(),
                format!("\"{}\" is a {}, not a message or enum", type_name, kind.describe()),
            );
        }
        Err(None) => {
            errors.push_error(field.ast_span.clone(), format!("\"{}\" is not defined", type_name));
        }
    }
}

fn link_extendee(field: &mut FieldDescriptor, pool: &UnionPool, errors: &mut ErrorHandler) {
    let Some(extendee) = field.extendee.clone() else {
        return;
    };
    let leading_dot = extendee.starts_with('.');
    let bare = extendee.strip_prefix('.').unwrap_or(&extendee);
    match resolve_name(pool, bare, leading_dot, &[], None, RefKind::Message) {
        Ok((resolved, _)) => {
            field.extendee = Some(resolved);
        }
        Err(Some((_, kind))) => {
            errors.push_error(
                field.ast_span.clone(),
                format!("\"{}\" is a {}, not a message", extendee, kind.describe()),
            );
        }
        Err(None) => {
            errors.push_error(field.ast_span.clone(), format!("\"{}\" is not defined", extendee));
        }
    }
}

/// A per-extendee map of tag -> extension field name, to catch two
/// extensions of the same message claiming the same tag (`spec.md` §4.6).
fn check_duplicate_extension_tags(files: &[FileDescriptor], errors: &mut ErrorHandler) {
    let mut by_extendee: HashMap<String, HashMap<i32, (String, crate::position::Span)>> = HashMap::new();

    let mut visit = |field: &FieldDescriptor| {
        let Some(extendee) = &field.extendee else { return };
        let tags = by_extendee.entry(extendee.clone()).or_default();
        if let Some((existing_name, existing_span)) = tags.get(&field.number) {
            errors.push(
                crate::error::Diagnostic::error(
                    field.ast_span.clone(),
                    format!(
                        "extension \"{}\" reuses tag {} already claimed by \"{}\" on \"{}\"",
                        field.name, field.number, existing_name, extendee
                    ),
                )
                .with_secondary(existing_span.clone(), "previous extension here"),
            );
        } else {
            tags.insert(field.number, (field.name.clone(), field.ast_span.clone()));
        }
    };

    for file in files {
        for ext in &file.extensions {
            visit(ext);
        }
        visit_nested_extensions(&file.messages, &mut visit);
    }
}

fn visit_nested_extensions<'a>(
    messages: &'a [crate::descriptor::MessageDescriptor],
    visit: &mut dyn FnMut(&'a FieldDescriptor),
) {
    for message in messages {
        for ext in &message.extensions {
            visit(ext);
        }
        visit_nested_extensions(&message.nested_messages, visit);
    }
}

/// Checks extension-range membership for every extension field once
/// extendees are resolved: the tag must lie within one of the extendee
/// message's declared ranges. Run as a second pass since it needs the
/// extendee's `MessageDescriptor` looked up by absolute name.
pub fn check_extension_ranges(
    files: &[FileDescriptor],
    index: &HashMap<String, &crate::descriptor::MessageDescriptor>,
    errors: &mut ErrorHandler,
) {
    let mut check = |field: &FieldDescriptor| {
        let Some(extendee) = &field.extendee else { return };
        let Some(message) = index.get(extendee.as_str()) else { return };
        let in_range = message
            .extension_ranges
            .iter()
            .any(|r| field.number >= r.start && field.number < r.end);
        if !in_range {
            errors.push_error(
                field.ast_span.clone(),
                format!(
                    "extension \"{}\" tag {} is not within any extension range of \"{}\"",
                    field.name, field.number, extendee
                ),
            );
        }
    };

    for file in files {
        for ext in &file.extensions {
            check(ext);
        }
        visit_nested_extensions(&file.messages, &mut check);
    }
}

/// Builds the absolute-name -> message lookup `check_extension_ranges`
/// needs, by walking every file's nested message tree.
pub fn build_message_index(files: &[FileDescriptor]) -> HashMap<String, &crate::descriptor::MessageDescriptor> {
    let mut index = HashMap::new();
    for file in files {
        let package = file.package.as_deref();
        for message in &file.messages {
            index_message(message, package, &[], &mut index);
        }
    }
    index
}

fn index_message<'a>(
    message: &'a crate::descriptor::MessageDescriptor,
    package: Option<&str>,
    nesting: &[String],
    index: &mut HashMap<String, &'a crate::descriptor::MessageDescriptor>,
) {
    let fqn = format!(".{}", join(package, nesting, &message.name));
    index.insert(fqn, message);
    let mut inner_nesting = nesting.to_vec();
    inner_nesting.push(message.name.clone());
    for nested in &message.nested_messages {
        index_message(nested, package, &inner_nesting, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, FileDescriptor, Label, MessageDescriptor};
    use crate::dynamic::DynamicMessage;
    use crate::position::{Position, Span};

    fn dummy_span() -> Span {
        let p = Position {
            file_name: std::rc::Rc::from("t.proto"),
            line: 1,
            column: 1,
            byte_offset: 0,
        };
        Span::point(p)
    }

    fn dummy_field(name: &str, type_name: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            number: 1,
            label: Label::Optional,
            kind: Type::Message,
            type_name: Some(type_name.to_string()),
            extendee: None,
            default_value: None,
            oneof_index: None,
            json_name: name.to_string(),
            options: DynamicMessage::new("google.protobuf.FieldOptions"),
            ast_span: dummy_span(),
        }
    }

    #[test]
    fn resolves_sibling_message_reference_to_absolute_form() {
        let target = MessageDescriptor {
            name: "Bar".to_string(),
            ast_span: dummy_span(),
            ..Default::default()
        };
        let holder = MessageDescriptor {
            name: "Foo".to_string(),
            fields: vec![dummy_field("bar", "Bar")],
            ast_span: dummy_span(),
            ..Default::default()
        };
        let mut file = FileDescriptor {
            name: "t.proto".to_string(),
            messages: vec![target, holder],
            ..Default::default()
        };

        let pool = build_file_pool(&file);
        let mut errors = ErrorHandler::default();
        let union = merge_pools(&[pool], &mut errors);
        assert!(!errors.has_errors());

        let mut files = [file.clone()];
        link(&mut files, &union, &mut errors);
        file = files.into_iter().next().unwrap();

        let holder = file.messages.iter().find(|m| m.name == "Foo").unwrap();
        assert_eq!(holder.fields[0].type_name.as_deref(), Some(".Bar"));
        assert!(!errors.has_errors());
    }
}
