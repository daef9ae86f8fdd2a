//! The small dynamic-message subsystem used to hold option values, per
//! `spec.md` §4.7 and §9 ("Dynamic option values"): a value that can carry
//! fields of any descriptor type — including extensions the interpreter
//! learns about only at link time — without code generation. Represented
//! as a `field_number -> TypedValue` map so it composes uniformly whether
//! the field is a built-in option (e.g. `FileOptions.java_package`, field 1)
//! or a custom extension discovered by the linker.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    /// The numeric value of an enum constant.
    Enum(i32),
    Message(DynamicMessage),
    Repeated(Vec<DynamicValue>),
}

/// A field-number-keyed bag of values, standing in for a concrete
/// `FileOptions`/`MessageOptions`/etc. message without needing a
/// code-generated struct per options type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicMessage {
    pub type_name: String,
    fields: IndexMap<i32, DynamicValue>,
    /// Options left uninterpreted so far; cleared by the option
    /// interpreter once every entry has been bound (`spec.md` §4.7 step 7).
    pub uninterpreted: Vec<UninterpretedOption>,
}

/// Mirrors the parser's still-unbound option representation: a name path
/// (each part either a plain field name or a parenthesized extension name)
/// plus an unparsed-but-classified value, per `spec.md` §4.7.
#[derive(Debug, Clone, PartialEq)]
pub struct UninterpretedOption {
    pub name: Vec<UninterpretedNamePart>,
    pub value: UninterpretedValue,
    pub span: crate::position::Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UninterpretedNamePart {
    pub name_part: String,
    pub is_extension: bool,
    pub span: crate::position::Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UninterpretedValue {
    Identifier(String),
    PositiveInt(u64),
    NegativeInt(i64),
    Double(f64),
    String(Vec<u8>),
    Aggregate(crate::ast::MessageLiteral),
    /// A bracketed list of values given directly as an option's value.
    /// Not part of `protoc`'s `UninterpretedOption` schema (which only
    /// allows a single scalar/aggregate per statement) but permitted by
    /// `spec.md` §4.2's grammar; the interpreter applies each element to a
    /// repeated target field in turn.
    Array(Vec<UninterpretedValue>),
}

impl DynamicMessage {
    pub fn new(type_name: impl Into<String>) -> Self {
        DynamicMessage {
            type_name: type_name.into(),
            fields: IndexMap::new(),
            uninterpreted: Vec::new(),
        }
    }

    pub fn get(&self, number: i32) -> Option<&DynamicValue> {
        self.fields.get(&number)
    }

    pub fn set(&mut self, number: i32, value: DynamicValue) {
        self.fields.insert(number, value);
    }

    pub fn contains(&self, number: i32) -> bool {
        self.fields.contains_key(&number)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &DynamicValue)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty_of_set_fields(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get_bool_field(&self, number: i32) -> Option<bool> {
        match self.get(number) {
            Some(DynamicValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn get_string_field(&self, number: i32) -> Option<&str> {
        match self.get(number) {
            Some(DynamicValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_enum_field(&self, number: i32) -> Option<i32> {
        match self.get(number) {
            Some(DynamicValue::Enum(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns a mutable handle to a singular message-typed field, creating
    /// an empty sub-message of `type_name` on first access. Used by the
    /// option interpreter to walk a dotted option-name path one message
    /// field at a time (`spec.md` §4.7 step 3).
    pub fn get_mut_message(&mut self, number: i32, type_name: &str) -> Option<&mut DynamicMessage> {
        if !self.fields.contains_key(&number) {
            self.fields
                .insert(number, DynamicValue::Message(DynamicMessage::new(type_name)));
        }
        match self.fields.get_mut(&number) {
            Some(DynamicValue::Message(m)) => Some(m),
            _ => None,
        }
    }

    /// Appends to a repeated field, creating it if absent.
    pub fn push_repeated(&mut self, number: i32, value: DynamicValue) {
        match self.fields.get_mut(&number) {
            Some(DynamicValue::Repeated(values)) => values.push(value),
            Some(_) => {
                // shouldn't happen if the caller checked the field is repeated
            }
            None => {
                self.fields.insert(number, DynamicValue::Repeated(vec![value]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_mut_message_creates_on_first_access_and_reuses_after() {
        let mut msg = DynamicMessage::new("google.protobuf.FileOptions");
        assert!(!msg.contains(1));
        msg.get_mut_message(1, "Sub").unwrap().set(1, DynamicValue::Bool(true));
        assert!(msg.contains(1));
        assert_eq!(
            msg.get_mut_message(1, "Sub").unwrap().get_bool_field(1),
            Some(true)
        );
    }

    #[test]
    fn push_repeated_creates_then_appends() {
        let mut msg = DynamicMessage::new("M");
        msg.push_repeated(3, DynamicValue::I32(1));
        msg.push_repeated(3, DynamicValue::I32(2));
        assert_eq!(
            msg.get(3),
            Some(&DynamicValue::Repeated(vec![DynamicValue::I32(1), DynamicValue::I32(2)]))
        );
    }

    #[test]
    fn get_string_field_only_matches_string_variant() {
        let mut msg = DynamicMessage::new("M");
        msg.set(1, DynamicValue::Bytes(vec![1, 2, 3]));
        assert_eq!(msg.get_string_field(1), None);
        msg.set(2, DynamicValue::String("hi".to_string()));
        assert_eq!(msg.get_string_field(2), Some("hi"));
    }

    #[test]
    fn is_empty_of_set_fields_reflects_mutations() {
        let mut msg = DynamicMessage::new("M");
        assert!(msg.is_empty_of_set_fields());
        msg.set(1, DynamicValue::Bool(true));
        assert!(!msg.is_empty_of_set_fields());
    }
}
