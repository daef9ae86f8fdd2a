//! Pipeline orchestration (`spec.md` §5 and §6): wires lex → parse → lower
//! → import resolution → linking → option interpretation → validation into
//! the two public entry points, `parse` (syntax only) and `compile` (the
//! full pipeline).

use std::collections::HashMap;

use crate::descriptor::{FileDescriptor, FileDescriptorSet};
use crate::error::{Diagnostic, Error, ErrorHandler, ErrorMode};
use crate::provider::{CacheEntry, FileProvider, ImportLoader, LinkerReport};

/// Knobs controlling one compilation run, per `SPEC_FULL.md` §1.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Populate `FileDescriptor::source_code_info` from comments and spans
    /// (`SPEC_FULL.md` §4.9). Off by default since most callers only need
    /// the descriptors, not editor-grade position data.
    pub include_source_info: bool,
    /// After linking, report imports that declared no symbol referenced by
    /// the importing graph (`SPEC_FULL.md` §2's linker report).
    pub validate_unused_imports: bool,
    /// Stop at the first error-severity diagnostic instead of collecting
    /// every one a stage can find.
    pub fail_fast: bool,
    /// Upper bound on import depth, guarding against runaway or
    /// pathologically deep dependency graphs.
    pub recursion_limit: u32,
    /// Skip the option interpreter (component C9) entirely, leaving every
    /// option on every descriptor in `uninterpreted` form. Useful for
    /// tooling that only needs structural shape, not option values.
    pub skip_option_interpretation: bool,
    /// If a well-known file (e.g. `google/protobuf/descriptor.proto`) is
    /// also supplied by the `FileProvider`, prefer the built-in over the
    /// provided copy. Defaults to `false`: per `spec.md` §6, a user-supplied
    /// copy of a well-known file shadows the built-in by default.
    pub built_ins_shadow_user_files: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            include_source_info: false,
            validate_unused_imports: false,
            fail_fast: false,
            recursion_limit: 64,
            skip_option_interpretation: false,
            built_ins_shadow_user_files: false,
        }
    }
}

/// The result of a `compile()` call: the best-effort descriptor set built
/// so far (per `spec.md` §7, a failed compile still returns whatever was
/// assembled before the error) plus every diagnostic collected along the
/// way.
#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub file_set: FileDescriptorSet,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Parses a single source into an AST without resolving imports, linking,
/// or interpreting options. Mirrors `spec.md` §6's `parse()` entry point;
/// useful for editor tooling that only needs syntax diagnostics.
pub fn parse(file_name: &str, source: &str, errors: &mut ErrorHandler) -> crate::ast::File {
    let tokens = crate::lexer::Lexer::new(file_name.to_string(), source).tokenize(errors);
    crate::parser::parse(file_name.to_string(), tokens, errors)
}

fn synthetic_span(file_name: &str) -> crate::position::Span {
    crate::position::Span::point(crate::position::Position::start_of(std::rc::Rc::from(file_name)))
}

fn lower_source(file_name: &str, source: &str, errors: &mut ErrorHandler) -> FileDescriptor {
    let ast_file = parse(file_name, source, errors);
    crate::lower::lower_file(&ast_file, errors)
}

/// Drives the full pipeline over a set of entry-point files, resolving
/// their transitive imports through `provider`.
pub struct Compiler<'p> {
    provider: &'p dyn FileProvider,
    options: CompileOptions,
}

impl<'p> Compiler<'p> {
    pub fn new(provider: &'p dyn FileProvider, options: CompileOptions) -> Self {
        Compiler { provider, options }
    }

    pub fn compile(&self, entry_paths: &[String]) -> CompileResult {
        let mode = if self.options.fail_fast { ErrorMode::FailFast } else { ErrorMode::CollectAll };
        let mut errors = ErrorHandler::new(mode);

        let mut loader = ImportLoader::new(
            self.provider,
            self.options.recursion_limit,
            self.options.built_ins_shadow_user_files,
        );
        loader.seed_builtins();

        // Import cycles and recursion-limit breaches are hard failures that
        // abort the whole compilation (`spec.md` §7), even when they surface
        // several imports deep; `compile_fn` cannot return a `Result` (the
        // loader's callback signature returns a bare `FileDescriptor`), so
        // the first such error is stashed here and checked after each
        // `resolve()` call unwinds.
        let abort: std::rc::Rc<std::cell::RefCell<Option<Error>>> = std::rc::Rc::new(std::cell::RefCell::new(None));

        let mut roots: Vec<FileDescriptor> = Vec::new();
        for entry in entry_paths {
            if let Some(cached) = loader.get_cached(entry) {
                roots.push(cached.descriptor().clone());
                continue;
            }
            let result = self.load_and_lower(&mut loader, entry, &mut errors, &abort);
            let stashed = abort.borrow_mut().take();
            match (result, stashed) {
                (Ok(desc), None) => roots.push(desc),
                (Ok(_), Some(err)) | (Err(err), _) => {
                    log::error!("{}", err);
                    errors.push(Diagnostic::error(synthetic_span(entry), err.to_string()));
                    return CompileResult {
                        file_set: FileDescriptorSet::default(),
                        diagnostics: errors.into_diagnostics(),
                    };
                }
            }
            if !errors.should_continue() {
                break;
            }
        }

        // Assemble the full file set: every root plus every transitively
        // imported (and actually compiled, i.e. non-prebuilt-duplicate)
        // file the loader cached along the way, de-duplicated by name and
        // topologically ordered (dependencies first, matching `spec.md`
        // §6's output contract) via a simple DFS over `dependencies`.
        let mut by_name: HashMap<String, FileDescriptor> = HashMap::new();
        for (name, entry) in loader.into_cache() {
            if let CacheEntry::Compiled(desc) = entry {
                by_name.insert(name, desc);
            }
        }
        for root in &roots {
            by_name.insert(root.name.clone(), root.clone());
        }

        let mut ordered = Vec::with_capacity(by_name.len());
        let mut visited = std::collections::HashSet::new();
        fn visit(
            name: &str,
            by_name: &HashMap<String, FileDescriptor>,
            visited: &mut std::collections::HashSet<String>,
            ordered: &mut Vec<FileDescriptor>,
        ) {
            if !visited.insert(name.to_string()) {
                return;
            }
            let Some(desc) = by_name.get(name) else { return };
            for dep in &desc.dependencies {
                visit(dep, by_name, visited, ordered);
            }
            ordered.push(desc.clone());
        }
        for root in &roots {
            visit(&root.name, &by_name, &mut visited, &mut ordered);
        }
        // Anything reachable only from another import's perspective but
        // not yet visited (shouldn't normally happen, but keeps the output
        // complete if a provider's dependency graph is inconsistent).
        for name in by_name.keys() {
            visit(name, &by_name, &mut visited, &mut ordered);
        }

        let pools: Vec<_> = ordered.iter().map(crate::linker::build_file_pool).collect();
        let union = crate::linker::merge_pools(&pools, &mut errors);
        crate::linker::link(&mut ordered, &union, &mut errors);
        {
            let index = crate::linker::build_message_index(&ordered);
            crate::linker::check_extension_ranges(&ordered, &index, &mut errors);
        }

        if !self.options.skip_option_interpretation && errors.should_continue() {
            crate::options::interpret(&mut ordered, &mut errors);
        }

        if errors.should_continue() {
            crate::validate::validate(&mut ordered, &mut errors);
            let index = crate::linker::build_message_index(&ordered);
            let message_set_types = crate::validate::collect_message_set_types(&index);
            crate::validate::check_message_set_extensions(&ordered, &message_set_types, &mut errors);
        }

        if self.options.validate_unused_imports {
            self.check_unused_imports(&ordered, &mut errors);
        }

        if !self.options.include_source_info {
            for file in &mut ordered {
                file.source_code_info.clear();
            }
        }

        CompileResult {
            file_set: FileDescriptorSet { files: ordered },
            diagnostics: errors.into_diagnostics(),
        }
    }

    fn load_and_lower(
        &self,
        loader: &mut ImportLoader<'p>,
        import_path: &str,
        errors: &mut ErrorHandler,
        abort: &std::rc::Rc<std::cell::RefCell<Option<Error>>>,
    ) -> Result<FileDescriptor, Error> {
        let mut compile_fn = |loader: &mut ImportLoader<'p>, name: &str, source: &str| -> FileDescriptor {
            let mut local_errors = ErrorHandler::default();
            let desc = lower_source(name, source, &mut local_errors);
            for dep in desc.dependencies.clone() {
                if loader.get_cached(&dep).is_none() {
                    if let Err(err) = self.load_and_lower(loader, &dep, &mut local_errors, abort) {
                        if abort.borrow().is_none() {
                            *abort.borrow_mut() = Some(err);
                        }
                    }
                }
            }
            errors.extend(local_errors.into_diagnostics());
            desc
        };
        loader.resolve(import_path, &mut compile_fn)
    }

    /// Reports every import declared by a file in `files` whose declared
    /// top-level symbols were never referenced (by absolute name) from any
    /// other file's resolved field/extendee type names, per
    /// `SPEC_FULL.md` §2's linker-report supplement to `spec.md`.
    fn check_unused_imports(&self, files: &[FileDescriptor], errors: &mut ErrorHandler) {
        let mut referenced: std::collections::HashSet<String> = std::collections::HashSet::new();
        for file in files {
            collect_referenced_types(file, &mut referenced);
        }

        let mut report = LinkerReport {
            declared_symbols: files.iter().map(|f| count_declared_symbols(&f.messages) + f.enums.len()).sum(),
            resolved_references: referenced.len(),
            dangling_references: Vec::new(),
        };

        for file in files {
            for (index, dep) in file.dependencies.iter().enumerate() {
                if file.public_dependency.contains(&(index as i32)) {
                    continue;
                }
                let Some(imported) = files.iter().find(|f| &f.name == dep) else { continue };
                let declares_anything = !imported.messages.is_empty() || !imported.enums.is_empty();
                if declares_anything && !file_declares_any(imported, &referenced) {
                    report.dangling_references.push(format!("{} (imported by {})", dep, file.name));
                    errors.push_warning(synthetic_span(&file.name), format!("import \"{}\" is unused", dep));
                }
            }
        }

        log::debug!(
            "linker report: {} declared symbol(s), {} resolved reference(s), {} unused import(s)",
            report.declared_symbols,
            report.resolved_references,
            report.dangling_references.len()
        );
    }
}

fn count_declared_symbols(messages: &[crate::descriptor::MessageDescriptor]) -> usize {
    messages
        .iter()
        .map(|m| 1 + m.nested_enums.len() + count_declared_symbols(&m.nested_messages))
        .sum()
}

fn collect_referenced_types(file: &FileDescriptor, out: &mut std::collections::HashSet<String>) {
    fn visit_field(field: &crate::descriptor::FieldDescriptor, out: &mut std::collections::HashSet<String>) {
        if let Some(t) = &field.type_name {
            out.insert(t.clone());
        }
        if let Some(e) = &field.extendee {
            out.insert(e.clone());
        }
    }
    fn visit_message(message: &crate::descriptor::MessageDescriptor, out: &mut std::collections::HashSet<String>) {
        for field in message.fields.iter().chain(message.extensions.iter()) {
            visit_field(field, out);
        }
        for nested in &message.nested_messages {
            visit_message(nested, out);
        }
    }
    for message in &file.messages {
        visit_message(message, out);
    }
    for ext in &file.extensions {
        visit_field(ext, out);
    }
    for service in &file.services {
        for method in &service.methods {
            out.insert(method.input_type.clone());
            out.insert(method.output_type.clone());
        }
    }
}

fn file_declares_any(file: &FileDescriptor, referenced: &std::collections::HashSet<String>) -> bool {
    fn message_fqn_matches(
        message: &crate::descriptor::MessageDescriptor,
        prefix: &str,
        referenced: &std::collections::HashSet<String>,
    ) -> bool {
        let fqn = format!("{}.{}", prefix, message.name);
        if referenced.contains(&fqn) {
            return true;
        }
        message.nested_messages.iter().any(|m| message_fqn_matches(m, &fqn, referenced))
    }
    let prefix = match &file.package {
        Some(p) => format!(".{}", p),
        None => String::new(),
    };
    file.messages.iter().any(|m| message_fqn_matches(m, &prefix, referenced))
        || file.enums.iter().any(|e| referenced.contains(&format!("{}.{}", prefix, e.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryProvider;

    #[test]
    fn compiles_minimal_proto3_message() {
        let provider = InMemoryProvider::new().with_file(
            "a.proto",
            "syntax = \"proto3\";\nmessage Greeting {\n  string text = 1;\n}\n",
        );
        let compiler = Compiler::new(&provider, CompileOptions::default());
        let result = compiler.compile(&["a.proto".to_string()]);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        let file = result.file_set.by_name().get("a.proto").cloned().unwrap();
        assert_eq!(file.messages.len(), 1);
        assert_eq!(file.messages[0].fields[0].type_name, None);
    }

    #[test]
    fn reports_import_cycle() {
        let provider = InMemoryProvider::new()
            .with_file("a.proto", "syntax = \"proto3\";\nimport \"b.proto\";\n")
            .with_file("b.proto", "syntax = \"proto3\";\nimport \"a.proto\";\n");
        let compiler = Compiler::new(&provider, CompileOptions::default());
        let result = compiler.compile(&["a.proto".to_string()]);
        assert!(result.has_errors());
    }
}
