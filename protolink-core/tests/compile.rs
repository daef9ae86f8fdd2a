//! End-to-end compile scenarios driven through the public `Compiler` API
//! and an `InMemoryProvider`, one per round-trip case.

use protolink_core::descriptor::{Label, Type};
use protolink_core::provider::InMemoryProvider;
use protolink_core::{CompileOptions, Compiler};

fn compile_one(name: &str, source: &str) -> protolink_core::CompileResult {
    let _ = env_logger::try_init();
    let provider = InMemoryProvider::new().with_file(name, source);
    let compiler = Compiler::new(&provider, CompileOptions::default());
    compiler.compile(&[name.to_string()])
}

#[test]
fn minimum_message() {
    let result = compile_one("m.proto", "syntax=\"proto3\"; message M { string s = 1; }");
    assert!(!result.has_errors(), "{:?}", result.diagnostics);

    let files = result.file_set.files;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].syntax.to_string(), "proto3");

    let message = &files[0].messages[0];
    assert_eq!(message.name, "M");
    assert_eq!(message.fields.len(), 1);
    let field = &message.fields[0];
    assert_eq!(field.name, "s");
    assert_eq!(field.number, 1);
    assert_eq!(field.kind, Type::String);
    assert_eq!(field.label, Label::Optional);
}

#[test]
fn map_field_expansion() {
    let result = compile_one("m.proto", "syntax=\"proto3\"; message M { map<string, M> m = 7; }");
    assert!(!result.has_errors(), "{:?}", result.diagnostics);

    let message = &result.file_set.files[0].messages[0];
    let entry = message
        .nested_messages
        .iter()
        .find(|m| m.name == "MEntry")
        .expect("synthesized map entry message");
    assert!(entry.is_map_entry());
    assert_eq!(entry.fields.len(), 2);

    let key = entry.fields.iter().find(|f| f.name == "key").unwrap();
    assert_eq!(key.number, 1);
    assert_eq!(key.kind, Type::String);

    let value = entry.fields.iter().find(|f| f.name == "value").unwrap();
    assert_eq!(value.number, 2);
    assert_eq!(value.kind, Type::Message);
    assert_eq!(value.type_name.as_deref(), Some(".M"));

    let outer = message.fields.iter().find(|f| f.name == "m").unwrap();
    assert_eq!(outer.label, Label::Repeated);
    assert_eq!(outer.number, 7);
    assert_eq!(outer.type_name.as_deref(), Some(".M.MEntry"));
}

#[test]
fn custom_option_via_extension() {
    let source = "syntax=\"proto2\";\n\
         import \"google/protobuf/descriptor.proto\";\n\
         extend google.protobuf.FieldOptions { optional string my_opt = 50001; }\n\
         message M { optional int32 x = 1 [(my_opt) = \"hello\"]; }\n";
    let result = compile_one("m.proto", source);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);

    let message = &result.file_set.files[0].messages[0];
    let field = message.fields.iter().find(|f| f.name == "x").unwrap();
    assert_eq!(field.options.get_string_field(50001), Some("hello"));
    assert!(field.options.uninterpreted.is_empty());
}

#[test]
fn import_cycle_reports_single_diagnostic_and_no_descriptors() {
    let _ = env_logger::try_init();
    let provider = InMemoryProvider::new()
        .with_file("a.proto", "syntax=\"proto3\"; import \"b.proto\";")
        .with_file("b.proto", "syntax=\"proto3\"; import \"a.proto\";");
    let compiler = Compiler::new(&provider, CompileOptions::default());
    let result = compiler.compile(&["a.proto".to_string()]);

    assert!(result.has_errors());
    assert!(result.file_set.files.is_empty());
    assert!(result.diagnostics.iter().any(|d| d.message.contains("cycle found in imports")));
}

#[test]
fn duplicate_symbol_across_files() {
    let _ = env_logger::try_init();
    let provider = InMemoryProvider::new()
        .with_file("x.proto", "syntax=\"proto3\"; message Foo {}")
        .with_file("y.proto", "syntax=\"proto3\"; message Foo {}");
    let compiler = Compiler::new(&provider, CompileOptions::default());
    let result = compiler.compile(&["x.proto".to_string(), "y.proto".to_string()]);

    assert!(result.has_errors());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("Foo") && d.message.contains("already defined")));
}

#[test]
fn proto3_required_field_is_rejected() {
    let result = compile_one("m.proto", "syntax=\"proto3\"; message M { required int32 x = 1; }");
    assert!(result.has_errors());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("'required'") && d.message.contains("proto3")));
}
