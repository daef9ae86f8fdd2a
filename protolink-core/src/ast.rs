//! The typed AST, per `spec.md` §3. Every node carries its source `Span`;
//! nodes are owned directly (no arena) since the tree is small per file and
//! has no cycles — see `spec.md` §9 "AST ownership and cycles".

use crate::position::Span;
use crate::token::Comment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Proto2,
    Proto3,
}

impl Default for Syntax {
    fn default() -> Self {
        Syntax::Proto2
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

/// A plain identifier with its span, the base unit of most AST leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub text: String,
    pub span: Span,
}

/// A dotted sequence of identifiers (`foo.bar.Baz`), optionally
/// leading-dot-qualified (`.foo.bar.Baz`, i.e. absolute).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub leading_dot: bool,
    pub parts: Vec<Ident>,
    pub span: Span,
}

impl TypeName {
    pub fn to_dotted_string(&self) -> String {
        let mut s = String::new();
        if self.leading_dot {
            s.push('.');
        }
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                s.push('.');
            }
            s.push_str(&part.text);
        }
        s
    }
}

/// A string literal's decoded content as raw bytes (`spec.md` §4.1): `\x`
/// and octal escapes name byte values, not necessarily valid UTF-8, so this
/// stays a byte vector until a `string`-typed consumer validates it.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLit {
    pub value: Vec<u8>,
    pub span: Span,
}

impl StringLit {
    /// Lossily decodes the literal as UTF-8 text, for contexts (syntax
    /// declarations, import paths, reserved names) that are always plain
    /// text in practice and don't need a hard validation error.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct IntLit {
    pub value: u64,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Required,
    Optional,
    Repeated,
}

#[derive(Debug, Clone)]
pub struct File {
    pub name: String,
    pub syntax: Syntax,
    pub syntax_span: Option<Span>,
    pub items: Vec<FileItem>,
    pub comments: Vec<Comment>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum FileItem {
    Import(Import),
    Package(Package),
    Option(OptionDecl),
    Message(Message),
    Enum(Enum),
    Extend(Extend),
    Service(Service),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Weak,
    Public,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub kind: Option<ImportKind>,
    pub value: StringLit,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Package {
    pub name: TypeName,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionNamePart {
    pub name: TypeName,
    /// true when this part was written as `(extension.name)`
    pub is_extension: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct OptionName {
    pub parts: Vec<OptionNamePart>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct OptionDecl {
    pub name: OptionName,
    pub value: Value,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(StringLit),
    /// An unsigned integer literal, with an optional separately-parsed
    /// leading `-` folded in here once the parser has decided the value is
    /// an integer (vs. being promoted to a float, see `spec.md` §4.2).
    Int { value: i64, span: Span },
    UInt { value: u64, span: Span },
    Float { value: f64, span: Span },
    Bool { value: bool, span: Span },
    /// An identifier used as a value: an enum constant name.
    Ident(Ident),
    Array(Vec<Value>, Span),
    Message(MessageLiteral),
}

impl Value {
    pub fn span(&self) -> Span {
        match self {
            Value::String(s) => s.span.clone(),
            Value::Int { span, .. }
            | Value::UInt { span, .. }
            | Value::Float { span, .. }
            | Value::Bool { span, .. } => span.clone(),
            Value::Ident(i) => i.span.clone(),
            Value::Array(_, span) => span.clone(),
            Value::Message(m) => m.span.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageLiteral {
    pub fields: Vec<MessageLiteralField>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageLiteralField {
    pub name: OptionNamePart,
    pub value: Value,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CompactOption {
    pub name: OptionName,
    pub value: Value,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub label: Option<(Label, Span)>,
    pub type_name: TypeName,
    pub name: Ident,
    pub number: IntLit,
    pub options: Vec<CompactOption>,
    pub leading_comments: Vec<Comment>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub label: Option<(Label, Span)>,
    pub name: Ident,
    pub number: IntLit,
    pub body: MessageBody,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MapField {
    pub key_type: Ident,
    pub value_type: TypeName,
    pub name: Ident,
    pub number: IntLit,
    pub options: Vec<CompactOption>,
    pub leading_comments: Vec<Comment>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Oneof {
    pub name: Ident,
    pub items: Vec<OneofItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum OneofItem {
    Field(Field),
    Group(Group),
    Option(OptionDecl),
}

#[derive(Debug, Clone)]
pub struct RangeEnd {
    pub value: Option<u64>, // None == `max`
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Range {
    pub start: IntLit,
    pub end: Option<RangeEnd>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ExtensionRange {
    pub ranges: Vec<Range>,
    pub options: Vec<CompactOption>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ReservedKind {
    Ranges(Vec<Range>),
    Names(Vec<StringLit>),
}

#[derive(Debug, Clone)]
pub struct Reserved {
    pub kind: ReservedKind,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct MessageBody {
    pub fields: Vec<Field>,
    pub groups: Vec<Group>,
    pub map_fields: Vec<MapField>,
    pub messages: Vec<Message>,
    pub enums: Vec<Enum>,
    pub extends: Vec<Extend>,
    pub extensions: Vec<ExtensionRange>,
    pub oneofs: Vec<Oneof>,
    pub reserved: Vec<Reserved>,
    pub options: Vec<OptionDecl>,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub name: Ident,
    pub body: MessageBody,
    pub leading_comments: Vec<Comment>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumValue {
    pub name: Ident,
    pub value: i64,
    pub value_span: Span,
    pub options: Vec<CompactOption>,
    pub leading_comments: Vec<Comment>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct EnumBody {
    pub values: Vec<EnumValue>,
    pub options: Vec<OptionDecl>,
    pub reserved: Vec<Reserved>,
}

#[derive(Debug, Clone)]
pub struct Enum {
    pub name: Ident,
    pub body: EnumBody,
    pub leading_comments: Vec<Comment>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExtendItem {
    Field(Field),
    Group(Group),
}

#[derive(Debug, Clone)]
pub struct Extend {
    pub extendee: TypeName,
    pub items: Vec<ExtendItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct RpcType {
    pub streaming: bool,
    pub type_name: TypeName,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Rpc {
    pub name: Ident,
    pub input: RpcType,
    pub output: RpcType,
    pub options: Vec<OptionDecl>,
    pub leading_comments: Vec<Comment>,
    pub span: Span,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceBody {
    pub rpcs: Vec<Rpc>,
    pub options: Vec<OptionDecl>,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub name: Ident,
    pub body: ServiceBody,
    pub leading_comments: Vec<Comment>,
    pub span: Span,
}
