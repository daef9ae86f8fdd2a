//! Recursive-descent parser, per `spec.md` §4.2 and §9 ("a hand-written
//! recursive-descent parser with Pratt-style precedence" is explicitly
//! sanctioned as an alternative to a generated LALR(1) table). Error
//! recovery synchronizes at the next `;` or balanced closing bracket at the
//! current nesting depth, then continues, so one malformed declaration
//! doesn't swallow the rest of the file's diagnostics.

use std::rc::Rc;

use crate::ast::*;
use crate::error::{Diagnostic, ErrorHandler};
use crate::position::{Position, Span};
use crate::token::{Comment, Keyword, Token, TokenKind};

pub fn parse(file_name: impl Into<Rc<str>>, tokens: Vec<Token>, errors: &mut ErrorHandler) -> File {
    let file_name = file_name.into();
    let mut parser = Parser {
        tokens,
        pos: 0,
        file_name: file_name.clone(),
        errors,
    };
    parser.parse_file()
}

struct Parser<'e> {
    tokens: Vec<Token>,
    pos: usize,
    file_name: Rc<str>,
    errors: &'e mut ErrorHandler,
}

impl<'e> Parser<'e> {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_n(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eof_pos(&self) -> Position {
        self.tokens.last().unwrap().span.start.clone()
    }

    fn error(&mut self, span: Span, msg: impl Into<String>) {
        self.errors.push(Diagnostic::error(span, msg));
    }

    fn expect_punct(&mut self, c: char) -> Option<Token> {
        if self.cur().is_punct(c) {
            Some(self.bump())
        } else {
            self.error(
                self.cur().span.clone(),
                format!("expected '{}', found {}", c, describe(self.cur())),
            );
            None
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Option<Token> {
        if self.cur().is_keyword(kw) {
            Some(self.bump())
        } else {
            self.error(
                self.cur().span.clone(),
                format!("expected '{}', found {}", kw.text(), describe(self.cur())),
            );
            None
        }
    }

    /// The `name` nonterminal: a plain identifier or any keyword token
    /// (`spec.md` §4.2 — keywords remain usable as field/option names).
    fn expect_name(&mut self) -> Option<Ident> {
        if self.cur().is_name_like() {
            let t = self.bump();
            Some(Ident {
                text: t.text().unwrap_or_default().to_string(),
                span: t.span,
            })
        } else {
            self.error(
                self.cur().span.clone(),
                format!("expected identifier, found {}", describe(self.cur())),
            );
            None
        }
    }

    fn expect_int(&mut self) -> Option<IntLit> {
        match &self.cur().kind {
            TokenKind::IntLiteral(v) => {
                let v = *v;
                let t = self.bump();
                Some(IntLit { value: v, span: t.span })
            }
            _ => {
                self.error(
                    self.cur().span.clone(),
                    format!("expected integer literal, found {}", describe(self.cur())),
                );
                None
            }
        }
    }

    fn expect_string(&mut self) -> Option<StringLit> {
        // Adjacent string literals concatenate, per spec.md §4.1/§4.2.
        match &self.cur().kind {
            TokenKind::StringLiteral(_) => {
                let start_span = self.cur().span.clone();
                let mut value = Vec::new();
                let mut end_span = start_span.clone();
                while let TokenKind::StringLiteral(s) = &self.cur().kind {
                    value.extend_from_slice(s);
                    end_span = self.cur().span.clone();
                    self.bump();
                }
                Some(StringLit {
                    value,
                    span: start_span.join(&end_span),
                })
            }
            _ => {
                self.error(
                    self.cur().span.clone(),
                    format!("expected string literal, found {}", describe(self.cur())),
                );
                None
            }
        }
    }

    /// Skips forward to resynchronize after a parse error: to the next `;`
    /// or balanced closing `}`/`]`/`>` at the *current* nesting depth.
    fn synchronize(&mut self) {
        let mut depth: i32 = 0;
        loop {
            if self.cur().is_eof() {
                return;
            }
            if depth == 0 && self.cur().is_punct(';') {
                self.bump();
                return;
            }
            if self.cur().is_punct('{') || self.cur().is_punct('(') || self.cur().is_punct('[') {
                depth += 1;
            }
            if self.cur().is_punct('}') || self.cur().is_punct(')') || self.cur().is_punct(']') {
                if depth == 0 {
                    self.bump();
                    return;
                }
                depth -= 1;
            }
            self.bump();
        }
    }

    // ---- top level ----------------------------------------------------

    fn parse_file(&mut self) -> File {
        let start = self.cur().span.start.clone();
        let mut syntax = Syntax::Proto2;
        let mut syntax_span = None;
        let mut items = Vec::new();

        if self.cur().is_keyword(Keyword::Syntax) {
            let sp_start = self.cur().span.clone();
            self.bump();
            if self.expect_punct('=').is_some() {
                if let Some(s) = self.expect_string() {
                    match s.to_string_lossy().as_str() {
                        "proto2" => syntax = Syntax::Proto2,
                        "proto3" => syntax = Syntax::Proto3,
                        other => {
                            self.error(
                                s.span.clone(),
                                format!("unrecognized syntax \"{}\" — treating file as proto2", other),
                            );
                            syntax = Syntax::Proto2;
                        }
                    }
                }
            }
            let end = self.cur().span.clone();
            self.expect_punct(';');
            syntax_span = Some(sp_start.join(&end));
        }

        while !self.cur().is_eof() {
            if let Some(item) = self.parse_file_item() {
                items.push(item);
            }
        }

        let end = self.eof_pos();
        File {
            name: self.file_name.to_string(),
            syntax,
            syntax_span,
            items,
            comments: Vec::new(),
            span: Span::new(start, end),
        }
    }

    fn parse_file_item(&mut self) -> Option<FileItem> {
        if self.cur().is_punct(';') {
            self.bump();
            return None;
        }
        let comments = self.take_leading_comments();
        let result = if self.cur().is_keyword(Keyword::Import) {
            self.parse_import().map(FileItem::Import)
        } else if self.cur().is_keyword(Keyword::Package) {
            self.parse_package().map(FileItem::Package)
        } else if self.cur().is_keyword(Keyword::Option) {
            self.parse_option_decl().map(FileItem::Option)
        } else if self.cur().is_keyword(Keyword::Message) {
            self.parse_message(comments).map(FileItem::Message)
        } else if self.cur().is_keyword(Keyword::Enum) {
            self.parse_enum(comments).map(FileItem::Enum)
        } else if self.cur().is_keyword(Keyword::Extend) {
            self.parse_extend().map(FileItem::Extend)
        } else if self.cur().is_keyword(Keyword::Service) {
            self.parse_service(comments).map(FileItem::Service)
        } else {
            self.error(
                self.cur().span.clone(),
                format!("unexpected {} at file scope", describe(self.cur())),
            );
            None
        };
        if result.is_none() {
            self.synchronize();
        }
        result
    }

    fn take_leading_comments(&self) -> Vec<Comment> {
        self.cur().leading_comments.clone()
    }

    fn parse_import(&mut self) -> Option<Import> {
        let start = self.cur().span.clone();
        self.bump();
        let kind = if self.cur().is_keyword(Keyword::Weak) {
            self.bump();
            Some(ImportKind::Weak)
        } else if self.cur().is_keyword(Keyword::Public) {
            self.bump();
            Some(ImportKind::Public)
        } else {
            None
        };
        let value = self.expect_string()?;
        let end = self.cur().span.clone();
        self.expect_punct(';');
        Some(Import {
            kind,
            value,
            span: start.join(&end),
        })
    }

    fn parse_package(&mut self) -> Option<Package> {
        let start = self.cur().span.clone();
        self.bump();
        let name = self.parse_type_name(false)?;
        let end = self.cur().span.clone();
        self.expect_punct(';');
        Some(Package {
            name,
            span: start.join(&end),
        })
    }

    fn parse_type_name(&mut self, allow_leading_dot: bool) -> Option<TypeName> {
        let start = self.cur().span.clone();
        let leading_dot = allow_leading_dot && self.cur().is_punct('.');
        if leading_dot {
            self.bump();
        }
        let mut parts = vec![self.expect_name()?];
        while self.cur().is_punct('.') {
            self.bump();
            parts.push(self.expect_name()?);
        }
        let end = parts.last().unwrap().span.clone();
        Some(TypeName {
            leading_dot,
            parts,
            span: start.join(&end),
        })
    }

    // ---- options --------------------------------------------------------

    fn parse_option_decl(&mut self) -> Option<OptionDecl> {
        let start = self.cur().span.clone();
        self.bump();
        let name = self.parse_option_name()?;
        self.expect_punct('=')?;
        let value = self.parse_value()?;
        let end = self.cur().span.clone();
        self.expect_punct(';');
        Some(OptionDecl {
            name,
            value,
            span: start.join(&end),
        })
    }

    fn parse_option_name(&mut self) -> Option<OptionName> {
        let start = self.cur().span.clone();
        let mut parts = vec![self.parse_option_name_part()?];
        while self.cur().is_punct('.') {
            self.bump();
            parts.push(self.parse_option_name_part()?);
        }
        let end = parts.last().unwrap().span.clone();
        Some(OptionName {
            parts,
            span: start.join(&end),
        })
    }

    fn parse_option_name_part(&mut self) -> Option<OptionNamePart> {
        let start = self.cur().span.clone();
        if self.cur().is_punct('(') {
            self.bump();
            let name = self.parse_type_name(true)?;
            let end = self.cur().span.clone();
            self.expect_punct(')')?;
            Some(OptionNamePart {
                name,
                is_extension: true,
                span: start.join(&end),
            })
        } else {
            let ident = self.expect_name()?;
            let span = ident.span.clone();
            Some(OptionNamePart {
                name: TypeName {
                    leading_dot: false,
                    parts: vec![ident],
                    span: span.clone(),
                },
                is_extension: false,
                span,
            })
        }
    }

    fn parse_compact_options(&mut self) -> Vec<CompactOption> {
        let mut options = Vec::new();
        if !self.cur().is_punct('[') {
            return options;
        }
        self.bump();
        loop {
            if self.cur().is_punct(']') || self.cur().is_eof() {
                break;
            }
            let start = self.cur().span.clone();
            if let Some(name) = self.parse_option_name() {
                if self.expect_punct('=').is_some() {
                    if let Some(value) = self.parse_value() {
                        let end = value.span();
                        options.push(CompactOption {
                            name,
                            value,
                            span: start.join(&end),
                        });
                    }
                }
            } else {
                self.synchronize();
            }
            if self.cur().is_punct(',') {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_punct(']');
        options
    }

    fn parse_value(&mut self) -> Option<Value> {
        match &self.cur().kind {
            TokenKind::StringLiteral(_) => self.expect_string().map(Value::String),
            TokenKind::IntLiteral(v) => {
                let v = *v;
                let t = self.bump();
                Some(Value::UInt { value: v, span: t.span })
            }
            TokenKind::FloatLiteral(v) => {
                let v = *v;
                let t = self.bump();
                Some(Value::Float { value: v, span: t.span })
            }
            TokenKind::Punct('-') | TokenKind::Punct('+') => self.parse_signed_number(),
            TokenKind::Keyword(Keyword::True) => {
                let t = self.bump();
                Some(Value::Bool { value: true, span: t.span })
            }
            TokenKind::Keyword(Keyword::False) => {
                let t = self.bump();
                Some(Value::Bool { value: false, span: t.span })
            }
            TokenKind::Keyword(Keyword::Inf) => {
                let t = self.bump();
                Some(Value::Float { value: f64::INFINITY, span: t.span })
            }
            TokenKind::Keyword(Keyword::Nan) => {
                let t = self.bump();
                Some(Value::Float { value: f64::NAN, span: t.span })
            }
            TokenKind::Identifier { .. } | TokenKind::Keyword(_) => {
                let ident = self.expect_name()?;
                Some(Value::Ident(ident))
            }
            TokenKind::Punct('[') => self.parse_array_literal(),
            TokenKind::Punct('{') | TokenKind::Punct('<') => {
                self.parse_message_literal().map(Value::Message)
            }
            _ => {
                self.error(
                    self.cur().span.clone(),
                    format!("expected a value, found {}", describe(self.cur())),
                );
                None
            }
        }
    }

    fn parse_signed_number(&mut self) -> Option<Value> {
        let sign_tok = self.bump();
        let negative = sign_tok.is_punct('-');
        match &self.cur().kind {
            TokenKind::IntLiteral(v) => {
                let v = *v;
                let t = self.bump();
                let span = sign_tok.span.join(&t.span);
                // An unsigned magnitude of exactly 2^63 following a unary
                // minus is promoted to a float rather than treated as an
                // out-of-range signed integer (spec.md §4.2, §8).
                if negative && v == 1u64 << 63 {
                    Some(Value::Float {
                        value: -(v as f64),
                        span,
                    })
                } else if negative {
                    match i64::try_from(v) {
                        Ok(mag) => Some(Value::Int { value: -mag, span }),
                        Err(_) => Some(Value::Float { value: -(v as f64), span }),
                    }
                } else {
                    Some(Value::UInt { value: v, span })
                }
            }
            TokenKind::FloatLiteral(v) => {
                let v = *v;
                let t = self.bump();
                let span = sign_tok.span.join(&t.span);
                Some(Value::Float {
                    value: if negative { -v } else { v },
                    span,
                })
            }
            TokenKind::Keyword(Keyword::Inf) => {
                let t = self.bump();
                let span = sign_tok.span.join(&t.span);
                Some(Value::Float {
                    value: if negative { f64::NEG_INFINITY } else { f64::INFINITY },
                    span,
                })
            }
            _ => {
                self.error(
                    self.cur().span.clone(),
                    "expected a number after sign".to_string(),
                );
                None
            }
        }
    }

    fn parse_array_literal(&mut self) -> Option<Value> {
        let start = self.cur().span.clone();
        self.bump();
        let mut values = Vec::new();
        loop {
            if self.cur().is_punct(']') || self.cur().is_eof() {
                break;
            }
            if let Some(v) = self.parse_value() {
                values.push(v);
            } else {
                self.synchronize();
            }
            if self.cur().is_punct(',') {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.cur().span.clone();
        self.expect_punct(']');
        Some(Value::Array(values, start.join(&end)))
    }

    fn parse_message_literal(&mut self) -> Option<MessageLiteral> {
        let start = self.cur().span.clone();
        let closing = if self.cur().is_punct('{') { '}' } else { '>' };
        self.bump();
        let mut fields = Vec::new();
        loop {
            if self.cur().is_punct(closing) || self.cur().is_eof() {
                break;
            }
            if let Some(field) = self.parse_message_literal_field() {
                fields.push(field);
            } else {
                self.synchronize();
            }
            if self.cur().is_punct(',') || self.cur().is_punct(';') {
                self.bump();
            }
        }
        let end = self.cur().span.clone();
        self.expect_punct(closing);
        Some(MessageLiteral {
            fields,
            span: start.join(&end),
        })
    }

    fn parse_message_literal_field(&mut self) -> Option<MessageLiteralField> {
        let start = self.cur().span.clone();
        let name = self.parse_option_name_part()?;
        let is_message_value = self.cur().is_punct('{') || self.cur().is_punct('<');
        if self.cur().is_punct(':') {
            self.bump();
        } else if !is_message_value {
            self.error(
                self.cur().span.clone(),
                "expected ':' before scalar message-literal value".to_string(),
            );
        }
        let value = self.parse_value()?;
        let end = value.span();
        Some(MessageLiteralField {
            name,
            value,
            span: start.join(&end),
        })
    }

    // ---- message ----------------------------------------------------------

    fn parse_message(&mut self, leading_comments: Vec<Comment>) -> Option<Message> {
        let start = self.cur().span.clone();
        self.bump();
        let name = self.expect_name()?;
        let body = self.parse_message_body()?;
        let end = self.cur().span.clone();
        Some(Message {
            name,
            body,
            leading_comments,
            span: start.join(&end),
        })
    }

    fn parse_message_body(&mut self) -> Option<MessageBody> {
        self.expect_punct('{')?;
        let mut body = MessageBody::default();
        while !self.cur().is_punct('}') && !self.cur().is_eof() {
            self.parse_message_body_item(&mut body);
        }
        self.expect_punct('}');
        Some(body)
    }

    fn parse_message_body_item(&mut self, body: &mut MessageBody) {
        if self.cur().is_punct(';') {
            self.bump();
            return;
        }
        let comments = self.take_leading_comments();
        let ok = if self.cur().is_keyword(Keyword::Message) {
            self.parse_message(comments).map(|m| body.messages.push(m))
        } else if self.cur().is_keyword(Keyword::Enum) {
            self.parse_enum(comments).map(|e| body.enums.push(e))
        } else if self.cur().is_keyword(Keyword::Extend) {
            self.parse_extend().map(|e| body.extends.push(e))
        } else if self.cur().is_keyword(Keyword::Extensions) {
            self.parse_extension_range().map(|e| body.extensions.push(e))
        } else if self.cur().is_keyword(Keyword::Reserved) {
            self.parse_reserved().map(|r| body.reserved.push(r))
        } else if self.cur().is_keyword(Keyword::Oneof) {
            self.parse_oneof().map(|o| body.oneofs.push(o))
        } else if self.cur().is_keyword(Keyword::Option) {
            self.parse_option_decl().map(|o| body.options.push(o))
        } else if self.cur().is_keyword(Keyword::Map) {
            self.parse_map_field().map(|m| body.map_fields.push(m))
        } else if self.is_group_start() {
            self.parse_group().map(|g| body.groups.push(g))
        } else if self.is_field_start() {
            self.parse_field(comments).map(|f| body.fields.push(f))
        } else {
            self.error(
                self.cur().span.clone(),
                format!("unexpected {} in message body", describe(self.cur())),
            );
            None
        };
        if ok.is_none() {
            self.synchronize();
        }
    }

    fn is_label(&self) -> bool {
        matches!(
            self.cur().kind,
            TokenKind::Keyword(Keyword::Required)
                | TokenKind::Keyword(Keyword::Optional)
                | TokenKind::Keyword(Keyword::Repeated)
        )
    }

    fn is_group_start(&self) -> bool {
        if self.cur().is_keyword(Keyword::Group) {
            return true;
        }
        self.is_label() && self.peek_n(1).is_keyword(Keyword::Group)
    }

    fn is_field_start(&self) -> bool {
        self.is_label() || self.cur().is_name_like()
    }

    fn parse_label(&mut self) -> Option<(Label, Span)> {
        if !self.is_label() {
            return None;
        }
        let t = self.bump();
        let label = match t.kind {
            TokenKind::Keyword(Keyword::Required) => Label::Required,
            TokenKind::Keyword(Keyword::Optional) => Label::Optional,
            TokenKind::Keyword(Keyword::Repeated) => Label::Repeated,
            _ => unreachable!(),
        };
        Some((label, t.span))
    }

    fn parse_field(&mut self, leading_comments: Vec<Comment>) -> Option<Field> {
        let start = self.cur().span.clone();
        let label = self.parse_label();
        let type_name = self.parse_type_name(true)?;
        let name = self.expect_name()?;
        self.expect_punct('=')?;
        let number = self.expect_int()?;
        let options = self.parse_compact_options();
        let end = self.cur().span.clone();
        self.expect_punct(';');
        Some(Field {
            label,
            type_name,
            name,
            number,
            options,
            leading_comments,
            span: start.join(&end),
        })
    }

    fn parse_group(&mut self) -> Option<Group> {
        let start = self.cur().span.clone();
        let label = self.parse_label();
        self.expect_keyword(Keyword::Group)?;
        let name = self.expect_name()?;
        self.expect_punct('=')?;
        let number = self.expect_int()?;
        let body = self.parse_message_body()?;
        let end = self.cur().span.clone();
        Some(Group {
            label,
            name,
            number,
            body,
            span: start.join(&end),
        })
    }

    fn parse_map_field(&mut self) -> Option<MapField> {
        let start = self.cur().span.clone();
        self.bump(); // "map"
        self.expect_punct('<')?;
        let key_type = self.expect_name()?;
        self.expect_punct(',')?;
        let value_type = self.parse_type_name(true)?;
        self.expect_punct('>')?;
        let name = self.expect_name()?;
        self.expect_punct('=')?;
        let number = self.expect_int()?;
        let options = self.parse_compact_options();
        let end = self.cur().span.clone();
        self.expect_punct(';');
        Some(MapField {
            key_type,
            value_type,
            name,
            number,
            options,
            leading_comments: Vec::new(),
            span: start.join(&end),
        })
    }

    fn parse_oneof(&mut self) -> Option<Oneof> {
        let start = self.cur().span.clone();
        self.bump();
        let name = self.expect_name()?;
        self.expect_punct('{')?;
        let mut items = Vec::new();
        while !self.cur().is_punct('}') && !self.cur().is_eof() {
            if self.cur().is_punct(';') {
                self.bump();
                continue;
            }
            let comments = self.take_leading_comments();
            let ok = if self.cur().is_keyword(Keyword::Option) {
                self.parse_option_decl().map(|o| items.push(OneofItem::Option(o)))
            } else if self.is_group_start() {
                self.parse_group().map(|g| items.push(OneofItem::Group(g)))
            } else {
                self.parse_field(comments).map(|f| items.push(OneofItem::Field(f)))
            };
            if ok.is_none() {
                self.synchronize();
            }
        }
        let end = self.cur().span.clone();
        self.expect_punct('}');
        Some(Oneof {
            name,
            items,
            span: start.join(&end),
        })
    }

    fn parse_range(&mut self) -> Option<Range> {
        let start = self.expect_int()?;
        let start_span = start.span.clone();
        let end = if self.cur().is_keyword(Keyword::To) {
            self.bump();
            if self.cur().is_keyword(Keyword::Max) {
                let t = self.bump();
                Some(RangeEnd { value: None, span: t.span })
            } else {
                let e = self.expect_int()?;
                Some(RangeEnd {
                    value: Some(e.value),
                    span: e.span,
                })
            }
        } else {
            None
        };
        let span = match &end {
            Some(e) => start_span.join(&e.span),
            None => start_span,
        };
        Some(Range { start, end, span })
    }

    fn parse_extension_range(&mut self) -> Option<ExtensionRange> {
        let start = self.cur().span.clone();
        self.bump();
        let mut ranges = vec![self.parse_range()?];
        while self.cur().is_punct(',') {
            self.bump();
            ranges.push(self.parse_range()?);
        }
        let options = self.parse_compact_options();
        let end = self.cur().span.clone();
        self.expect_punct(';');
        Some(ExtensionRange {
            ranges,
            options,
            span: start.join(&end),
        })
    }

    fn parse_reserved(&mut self) -> Option<Reserved> {
        let start = self.cur().span.clone();
        self.bump();
        let kind = if matches!(self.cur().kind, TokenKind::StringLiteral(_)) {
            let mut names = vec![self.expect_string()?];
            while self.cur().is_punct(',') {
                self.bump();
                names.push(self.expect_string()?);
            }
            ReservedKind::Names(names)
        } else {
            let mut ranges = vec![self.parse_range()?];
            while self.cur().is_punct(',') {
                self.bump();
                ranges.push(self.parse_range()?);
            }
            ReservedKind::Ranges(ranges)
        };
        let end = self.cur().span.clone();
        self.expect_punct(';');
        Some(Reserved {
            kind,
            span: start.join(&end),
        })
    }

    // ---- enum ---------------------------------------------------------

    fn parse_enum(&mut self, leading_comments: Vec<Comment>) -> Option<Enum> {
        let start = self.cur().span.clone();
        self.bump();
        let name = self.expect_name()?;
        self.expect_punct('{')?;
        let mut body = EnumBody::default();
        while !self.cur().is_punct('}') && !self.cur().is_eof() {
            if self.cur().is_punct(';') {
                self.bump();
                continue;
            }
            let comments = self.take_leading_comments();
            let ok = if self.cur().is_keyword(Keyword::Option) {
                self.parse_option_decl().map(|o| body.options.push(o))
            } else if self.cur().is_keyword(Keyword::Reserved) {
                self.parse_reserved().map(|r| body.reserved.push(r))
            } else {
                self.parse_enum_value(comments).map(|v| body.values.push(v))
            };
            if ok.is_none() {
                self.synchronize();
            }
        }
        let end = self.cur().span.clone();
        self.expect_punct('}');
        Some(Enum {
            name,
            body,
            leading_comments,
            span: start.join(&end),
        })
    }

    fn parse_enum_value(&mut self, leading_comments: Vec<Comment>) -> Option<EnumValue> {
        let start = self.cur().span.clone();
        let name = self.expect_name()?;
        self.expect_punct('=')?;
        let negative = self.cur().is_punct('-');
        if negative {
            self.bump();
        }
        let magnitude = self.expect_int()?;
        let value = if negative { -(magnitude.value as i64) } else { magnitude.value as i64 };
        let value_span = magnitude.span;
        let options = self.parse_compact_options();
        let end = self.cur().span.clone();
        self.expect_punct(';');
        Some(EnumValue {
            name,
            value,
            value_span,
            options,
            leading_comments,
            span: start.join(&end),
        })
    }

    // ---- extend ---------------------------------------------------------

    fn parse_extend(&mut self) -> Option<Extend> {
        let start = self.cur().span.clone();
        self.bump();
        let extendee = self.parse_type_name(true)?;
        self.expect_punct('{')?;
        let mut items = Vec::new();
        while !self.cur().is_punct('}') && !self.cur().is_eof() {
            if self.cur().is_punct(';') {
                self.bump();
                continue;
            }
            let comments = self.take_leading_comments();
            let ok = if self.is_group_start() {
                self.parse_group().map(|g| items.push(ExtendItem::Group(g)))
            } else {
                self.parse_field(comments).map(|f| items.push(ExtendItem::Field(f)))
            };
            if ok.is_none() {
                self.synchronize();
            }
        }
        let end = self.cur().span.clone();
        self.expect_punct('}');
        Some(Extend {
            extendee,
            items,
            span: start.join(&end),
        })
    }

    // ---- service --------------------------------------------------------

    fn parse_service(&mut self, leading_comments: Vec<Comment>) -> Option<Service> {
        let start = self.cur().span.clone();
        self.bump();
        let name = self.expect_name()?;
        self.expect_punct('{')?;
        let mut body = ServiceBody::default();
        while !self.cur().is_punct('}') && !self.cur().is_eof() {
            if self.cur().is_punct(';') {
                self.bump();
                continue;
            }
            let comments = self.take_leading_comments();
            let ok = if self.cur().is_keyword(Keyword::Option) {
                self.parse_option_decl().map(|o| body.options.push(o))
            } else {
                self.parse_rpc(comments).map(|r| body.rpcs.push(r))
            };
            if ok.is_none() {
                self.synchronize();
            }
        }
        let end = self.cur().span.clone();
        self.expect_punct('}');
        Some(Service {
            name,
            body,
            leading_comments,
            span: start.join(&end),
        })
    }

    fn parse_rpc_type(&mut self) -> Option<RpcType> {
        let start = self.cur().span.clone();
        self.expect_punct('(')?;
        let streaming = if self.cur().is_keyword(Keyword::Stream) {
            self.bump();
            true
        } else {
            false
        };
        let type_name = self.parse_type_name(true)?;
        let end = self.cur().span.clone();
        self.expect_punct(')')?;
        Some(RpcType {
            streaming,
            type_name,
            span: start.join(&end),
        })
    }

    fn parse_rpc(&mut self, leading_comments: Vec<Comment>) -> Option<Rpc> {
        let start = self.cur().span.clone();
        self.expect_keyword(Keyword::Rpc)?;
        let name = self.expect_name()?;
        let input = self.parse_rpc_type()?;
        self.expect_keyword(Keyword::Returns)?;
        let output = self.parse_rpc_type()?;
        let mut options = Vec::new();
        let end;
        if self.cur().is_punct('{') {
            self.bump();
            while !self.cur().is_punct('}') && !self.cur().is_eof() {
                if self.cur().is_punct(';') {
                    self.bump();
                    continue;
                }
                if let Some(o) = self.parse_option_decl() {
                    options.push(o);
                } else {
                    self.synchronize();
                }
            }
            end = self.cur().span.clone();
            self.expect_punct('}');
        } else {
            end = self.cur().span.clone();
            self.expect_punct(';');
        }
        Some(Rpc {
            name,
            input,
            output,
            options,
            leading_comments,
            span: start.join(&end),
        })
    }
}

fn describe(token: &Token) -> String {
    match &token.kind {
        TokenKind::Eof => "end of file".to_string(),
        TokenKind::StringLiteral(_) => "string literal".to_string(),
        TokenKind::IntLiteral(v) => format!("integer '{}'", v),
        TokenKind::FloatLiteral(v) => format!("float '{}'", v),
        TokenKind::Identifier { text, .. } => format!("identifier '{}'", text),
        TokenKind::Keyword(kw) => format!("'{}'", kw.text()),
        TokenKind::Punct(c) => format!("'{}'", c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_source(src: &str) -> (File, ErrorHandler) {
        let mut errors = ErrorHandler::default();
        let tokens = Lexer::new("test.proto", src).tokenize(&mut errors);
        let file = parse("test.proto", tokens, &mut errors);
        (file, errors)
    }

    #[test]
    fn parses_message_with_field() {
        let (file, errors) = parse_source("syntax = \"proto3\"; message M { string s = 1; }");
        assert!(errors.diagnostics().is_empty(), "{:?}", errors.diagnostics());
        assert_eq!(file.syntax, Syntax::Proto3);
        assert_eq!(file.items.len(), 1);
        let FileItem::Message(message) = &file.items[0] else {
            panic!("expected a message item");
        };
        assert_eq!(message.name.text, "M");
        assert_eq!(message.body.fields.len(), 1);
        assert_eq!(message.body.fields[0].name.text, "s");
        assert_eq!(message.body.fields[0].number.value, 1);
    }

    #[test]
    fn parses_oneof_map_and_extensions() {
        let (file, errors) = parse_source(
            "syntax = \"proto2\"; message M { \
             oneof choice { int32 a = 1; string b = 2; } \
             map<string, int32> counts = 3; \
             extensions 100 to max; \
             }",
        );
        assert!(errors.diagnostics().is_empty(), "{:?}", errors.diagnostics());
        let FileItem::Message(message) = &file.items[0] else {
            panic!("expected a message item");
        };
        assert_eq!(message.body.oneofs.len(), 1);
        assert_eq!(message.body.oneofs[0].items.len(), 2);
        assert_eq!(message.body.map_fields.len(), 1);
        assert_eq!(message.body.map_fields[0].key_type.text, "string");
        assert_eq!(message.body.extensions.len(), 1);
    }

    #[test]
    fn adjacent_string_literals_concatenate() {
        let (file, errors) = parse_source("syntax = \"pro\" \"to3\";");
        assert!(errors.diagnostics().is_empty(), "{:?}", errors.diagnostics());
        assert_eq!(file.syntax, Syntax::Proto3);
    }

    #[test]
    fn malformed_field_recovers_at_next_statement() {
        let (file, errors) = parse_source(
            "syntax = \"proto3\"; message M { !!! ; string s = 1; }",
        );
        assert!(!errors.diagnostics().is_empty());
        let FileItem::Message(message) = &file.items[0] else {
            panic!("expected a message item");
        };
        assert_eq!(message.body.fields.len(), 1);
        assert_eq!(message.body.fields[0].name.text, "s");
    }
}
