//! Token types produced by the lexer, per `spec.md` §3/§4.1.

use crate::position::Span;

/// The fixed keyword table (~40 words). Listed here instead of computed so
/// the lexer can do a single match on the scanned identifier text.
pub const KEYWORDS: &[(&str, Keyword)] = &[
    ("syntax", Keyword::Syntax),
    ("import", Keyword::Import),
    ("weak", Keyword::Weak),
    ("public", Keyword::Public),
    ("package", Keyword::Package),
    ("option", Keyword::Option),
    ("message", Keyword::Message),
    ("enum", Keyword::Enum),
    ("service", Keyword::Service),
    ("rpc", Keyword::Rpc),
    ("returns", Keyword::Returns),
    ("stream", Keyword::Stream),
    ("extend", Keyword::Extend),
    ("extensions", Keyword::Extensions),
    ("reserved", Keyword::Reserved),
    ("to", Keyword::To),
    ("max", Keyword::Max),
    ("oneof", Keyword::Oneof),
    ("map", Keyword::Map),
    ("group", Keyword::Group),
    ("required", Keyword::Required),
    ("optional", Keyword::Optional),
    ("repeated", Keyword::Repeated),
    ("true", Keyword::True),
    ("false", Keyword::False),
    ("inf", Keyword::Inf),
    ("nan", Keyword::Nan),
    ("double", Keyword::Double),
    ("float", Keyword::Float),
    ("int32", Keyword::Int32),
    ("int64", Keyword::Int64),
    ("uint32", Keyword::Uint32),
    ("uint64", Keyword::Uint64),
    ("sint32", Keyword::Sint32),
    ("sint64", Keyword::Sint64),
    ("fixed32", Keyword::Fixed32),
    ("fixed64", Keyword::Fixed64),
    ("sfixed32", Keyword::Sfixed32),
    ("sfixed64", Keyword::Sfixed64),
    ("bool", Keyword::Bool),
    ("string", Keyword::String),
    ("bytes", Keyword::Bytes),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Syntax,
    Import,
    Weak,
    Public,
    Package,
    Option,
    Message,
    Enum,
    Service,
    Rpc,
    Returns,
    Stream,
    Extend,
    Extensions,
    Reserved,
    To,
    Max,
    Oneof,
    Map,
    Group,
    Required,
    Optional,
    Repeated,
    True,
    False,
    Inf,
    Nan,
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl Keyword {
    pub fn text(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, kw)| *kw == self)
            .map(|(text, _)| *text)
            .unwrap_or("")
    }

    pub fn is_scalar_type(self) -> bool {
        matches!(
            self,
            Keyword::Double
                | Keyword::Float
                | Keyword::Int32
                | Keyword::Int64
                | Keyword::Uint32
                | Keyword::Uint64
                | Keyword::Sint32
                | Keyword::Sint64
                | Keyword::Fixed32
                | Keyword::Fixed64
                | Keyword::Sfixed32
                | Keyword::Sfixed64
                | Keyword::Bool
                | Keyword::String
                | Keyword::Bytes
        )
    }

    pub fn lookup(text: &str) -> Option<Keyword> {
        KEYWORDS
            .iter()
            .find(|(kw_text, _)| *kw_text == text)
            .map(|(_, kw)| *kw)
    }
}

/// How a comment relates to the tokens around it, per `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Leading,
    Trailing,
    Detached,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub text: String,
    pub span: Span,
    pub attachment: Attachment,
}

/// The decoded payload of a token, distinct from its raw source span.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Raw bytes of a string literal's content after escape decoding.
    /// `\x`/octal escapes name a byte value, not necessarily a valid UTF-8
    /// scalar, so this stays unvalidated until a `string`-typed consumer
    /// needs it (`bytes`-typed consumers use it as-is).
    StringLiteral(Vec<u8>),
    IntLiteral(u64),
    FloatLiteral(f64),
    /// `has_dot` records whether the scanner's compound-identifier mode
    /// joined this identifier to a following `.part` (legacy dialect only,
    /// see `spec.md` §9); the modern lexer never sets this and always
    /// emits `.` as its own `Dot` punctuation token.
    Identifier { text: String, has_dot: bool },
    Keyword(Keyword),
    /// Single-character punctuation, e.g. `=`, `;`, `{`, `.`.
    Punct(char),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Comment groups immediately attached to this token (leading comments
    /// that precede it, or a trailing comment sharing its line).
    pub leading_comments: Vec<Comment>,
    pub trailing_comment: Option<Comment>,
}

impl Token {
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier { text, .. } => Some(text),
            TokenKind::Keyword(kw) => Some(kw.text()),
            _ => None,
        }
    }

    /// True for any token that may stand in for a `NAME` nonterminal per the
    /// grammar rule in `spec.md` §4.2: a plain identifier, or any keyword
    /// (so `message`, `import`, etc. may be used as field/option names).
    pub fn is_name_like(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Identifier { .. } | TokenKind::Keyword(_)
        )
    }

    pub fn is_punct(&self, c: char) -> bool {
        matches!(self.kind, TokenKind::Punct(p) if p == c)
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        matches!(self.kind, TokenKind::Keyword(k) if k == kw)
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}
