//! The descriptor data model, per `spec.md` §3: a structural mirror of the
//! canonical `FileDescriptorProto` schema. Every node carries an AST back
//! pointer (`ast_span`) used purely for error localization by later passes;
//! `spec.md` §9 requires these to be removable once the descriptors are
//! final, so they're plain `Span`s copied out of the AST rather than
//! borrows, which keeps descriptors independent of the AST's lifetime.

use indexmap::IndexMap;

use crate::dynamic::DynamicMessage;
use crate::position::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    Uint32,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl Type {
    pub fn from_scalar_keyword(text: &str) -> Option<Type> {
        Some(match text {
            "double" => Type::Double,
            "float" => Type::Float,
            "int32" => Type::Int32,
            "int64" => Type::Int64,
            "uint32" => Type::Uint32,
            "uint64" => Type::Uint64,
            "sint32" => Type::Sint32,
            "sint64" => Type::Sint64,
            "fixed32" => Type::Fixed32,
            "fixed64" => Type::Fixed64,
            "sfixed32" => Type::Sfixed32,
            "sfixed64" => Type::Sfixed64,
            "bool" => Type::Bool,
            "string" => Type::String,
            "bytes" => Type::Bytes,
            _ => return None,
        })
    }

    /// The wire number `protoc` assigns, kept around for wire encoding.
    pub fn wire_number(self) -> i32 {
        match self {
            Type::Double => 1,
            Type::Float => 2,
            Type::Int64 => 3,
            Type::Uint64 => 4,
            Type::Int32 => 5,
            Type::Fixed64 => 6,
            Type::Fixed32 => 7,
            Type::Bool => 8,
            Type::String => 9,
            Type::Group => 10,
            Type::Message => 11,
            Type::Bytes => 12,
            Type::Uint32 => 13,
            Type::Enum => 14,
            Type::Sfixed32 => 15,
            Type::Sfixed64 => 16,
            Type::Sint32 => 17,
            Type::Sint64 => 18,
        }
    }

    pub fn is_message_or_group(self) -> bool {
        matches!(self, Type::Message | Type::Group)
    }
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub number: i32,
    pub label: Label,
    pub kind: Type,
    /// Unqualified/relative until the linker runs, absolute (`.a.b.C`)
    /// after (invariant 4 in `spec.md` §3).
    pub type_name: Option<String>,
    /// Set for extension fields: the message being extended.
    pub extendee: Option<String>,
    pub default_value: Option<String>,
    pub oneof_index: Option<i32>,
    pub json_name: String,
    pub options: DynamicMessage,
    pub ast_span: Span,
}

#[derive(Debug, Clone)]
pub struct OneofDescriptor {
    pub name: String,
    pub options: DynamicMessage,
    pub ast_span: Span,
}

#[derive(Debug, Clone)]
pub struct ExtensionRangeDescriptor {
    pub start: i32, // inclusive
    pub end: i32,   // exclusive, matching FileDescriptorProto convention
    pub options: DynamicMessage,
    pub ast_span: Span,
}

#[derive(Debug, Clone)]
pub struct ReservedRangeDescriptor {
    pub start: i32, // inclusive
    pub end: i32,   // exclusive
}

#[derive(Debug, Clone, Default)]
pub struct MessageDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub nested_messages: Vec<MessageDescriptor>,
    pub nested_enums: Vec<EnumDescriptor>,
    pub extension_ranges: Vec<ExtensionRangeDescriptor>,
    pub extensions: Vec<FieldDescriptor>,
    pub oneofs: Vec<OneofDescriptor>,
    pub reserved_ranges: Vec<ReservedRangeDescriptor>,
    pub reserved_names: Vec<String>,
    pub options: DynamicMessage,
    pub ast_span: Span,
}

impl MessageDescriptor {
    pub fn is_map_entry(&self) -> bool {
        self.options.get_bool_field(7) == Some(true) // MessageOptions.map_entry = 7
    }
}

#[derive(Debug, Clone)]
pub struct EnumValueDescriptor {
    pub name: String,
    pub number: i32,
    pub options: DynamicMessage,
    pub ast_span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct EnumDescriptor {
    pub name: String,
    pub values: Vec<EnumValueDescriptor>,
    pub reserved_ranges: Vec<ReservedRangeDescriptor>,
    pub reserved_names: Vec<String>,
    pub options: DynamicMessage,
    pub ast_span: Span,
}

#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
    pub options: DynamicMessage,
    pub ast_span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    pub name: String,
    pub methods: Vec<MethodDescriptor>,
    pub options: DynamicMessage,
    pub ast_span: Span,
}

/// One `(path, span)` entry of the optional source-info table, per
/// `SPEC_FULL.md` §4.9. `path` mirrors `protoc`'s descriptor-tree path
/// scheme (field-number/index pairs from the file descriptor down).
#[derive(Debug, Clone)]
pub struct SourceCodeInfoEntry {
    pub path: Vec<i32>,
    pub span: Span,
    pub leading_comments: Option<String>,
    pub trailing_comments: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FileDescriptor {
    pub name: String,
    pub package: Option<String>,
    pub syntax: Syntax,
    pub dependencies: Vec<String>,
    pub public_dependency: Vec<i32>,
    pub weak_dependency: Vec<i32>,
    pub messages: Vec<MessageDescriptor>,
    pub enums: Vec<EnumDescriptor>,
    pub services: Vec<ServiceDescriptor>,
    pub extensions: Vec<FieldDescriptor>,
    pub options: DynamicMessage,
    pub source_code_info: Vec<SourceCodeInfoEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
}

impl From<crate::ast::Syntax> for Syntax {
    fn from(s: crate::ast::Syntax) -> Self {
        match s {
            crate::ast::Syntax::Proto2 => Syntax::Proto2,
            crate::ast::Syntax::Proto3 => Syntax::Proto3,
        }
    }
}

impl std::fmt::Display for Syntax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        })
    }
}

/// The artifact the compiler returns: every compiled file, topologically
/// ordered (dependencies before dependents), per `spec.md` §6.
#[derive(Debug, Clone, Default)]
pub struct FileDescriptorSet {
    pub files: Vec<FileDescriptor>,
}

impl FileDescriptorSet {
    pub fn by_name(&self) -> IndexMap<String, &FileDescriptor> {
        self.files.iter().map(|f| (f.name.clone(), f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_keyword_lookup_covers_every_scalar_type() {
        assert_eq!(Type::from_scalar_keyword("int32"), Some(Type::Int32));
        assert_eq!(Type::from_scalar_keyword("bytes"), Some(Type::Bytes));
        assert_eq!(Type::from_scalar_keyword("message"), None);
    }

    #[test]
    fn wire_numbers_are_pairwise_distinct() {
        let all = [
            Type::Double, Type::Float, Type::Int64, Type::Uint64, Type::Int32, Type::Fixed64,
            Type::Fixed32, Type::Bool, Type::String, Type::Group, Type::Message, Type::Bytes,
            Type::Uint32, Type::Enum, Type::Sfixed32, Type::Sfixed64, Type::Sint32, Type::Sint64,
        ];
        let mut seen = std::collections::HashSet::new();
        for t in all {
            assert!(seen.insert(t.wire_number()), "duplicate wire number for {:?}", t);
        }
    }

    #[test]
    fn is_map_entry_reads_the_map_entry_option_field() {
        let mut message = MessageDescriptor { name: "Entry".to_string(), ..Default::default() };
        assert!(!message.is_map_entry());
        message.options.set(7, crate::dynamic::DynamicValue::Bool(true));
        assert!(message.is_map_entry());
    }

    #[test]
    fn file_descriptor_set_indexes_files_by_name() {
        let set = FileDescriptorSet {
            files: vec![
                FileDescriptor { name: "a.proto".to_string(), ..Default::default() },
                FileDescriptor { name: "b.proto".to_string(), ..Default::default() },
            ],
        };
        let by_name = set.by_name();
        assert_eq!(by_name.len(), 2);
        assert_eq!(by_name.get("a.proto").map(|f| f.name.as_str()), Some("a.proto"));
    }
}
