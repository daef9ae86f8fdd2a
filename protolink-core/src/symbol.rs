//! The symbol pool, per `spec.md` §4.5: per-file maps keyed by fully
//! qualified name, merged into a process-wide union pool that enforces
//! global uniqueness (invariants 1 and 2 in `spec.md` §3).

use indexmap::IndexMap;

use crate::position::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Message,
    Enum,
    EnumValue,
    Field,
    Extension,
    Oneof,
    Service,
    Method,
    ExtensionRange,
    Package,
}

impl SymbolKind {
    pub fn describe(self) -> &'static str {
        match self {
            SymbolKind::Message => "message",
            SymbolKind::Enum => "enum",
            SymbolKind::EnumValue => "enum value",
            SymbolKind::Field => "field",
            SymbolKind::Extension => "extension",
            SymbolKind::Oneof => "oneof",
            SymbolKind::Service => "service",
            SymbolKind::Method => "method",
            SymbolKind::ExtensionRange => "extension range",
            SymbolKind::Package => "package",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub kind: SymbolKind,
    pub file: String,
    pub span: Span,
}

/// `FQN (without leading dot) -> entry`, for one file's declarations.
#[derive(Debug, Clone, Default)]
pub struct FilePool {
    pub file_name: String,
    pub entries: IndexMap<String, SymbolEntry>,
}

impl FilePool {
    pub fn new(file_name: impl Into<String>) -> Self {
        FilePool {
            file_name: file_name.into(),
            entries: IndexMap::new(),
        }
    }

    /// Declares `fqn`; returns the existing entry if it was already
    /// declared *within this file* (duplicate within one file's scope,
    /// invariant 1). Cross-file duplicates are caught when pools are
    /// merged into a `UnionPool`.
    pub fn declare(&mut self, fqn: String, kind: SymbolKind, span: Span) -> Option<&SymbolEntry> {
        if self.entries.contains_key(&fqn) {
            return self.entries.get(&fqn);
        }
        self.entries.insert(
            fqn.clone(),
            SymbolEntry {
                kind,
                file: self.file_name.clone(),
                span,
            },
        );
        None
    }
}

/// The process-wide pool across every file in the current compilation's
/// import graph (invariant 2). Built by merging each file's `FilePool`; on
/// a name collision between two *different* files, the canonical file used
/// for reporting is the lexicographically smaller name (`spec.md` §4.5).
#[derive(Debug, Clone, Default)]
pub struct UnionPool {
    entries: IndexMap<String, SymbolEntry>,
}

pub struct DuplicateSymbol {
    pub fqn: String,
    pub kind: SymbolKind,
    pub first_file: String,
    pub first_span: Span,
    pub second_file: String,
    pub second_span: Span,
}

impl UnionPool {
    pub fn new() -> Self {
        UnionPool::default()
    }

    /// Merges `pool` in, returning any cross-file duplicates found. Entries
    /// already present under the *same* file name are left untouched (that
    /// file was already merged).
    pub fn merge(&mut self, pool: &FilePool) -> Vec<DuplicateSymbol> {
        let mut dups = Vec::new();
        for (fqn, entry) in &pool.entries {
            match self.entries.get(fqn) {
                Some(existing) if existing.file != entry.file => {
                    let (first_file, first_span, second_file, second_span) =
                        if existing.file <= entry.file {
                            (
                                existing.file.clone(),
                                existing.span.clone(),
                                entry.file.clone(),
                                entry.span.clone(),
                            )
                        } else {
                            (
                                entry.file.clone(),
                                entry.span.clone(),
                                existing.file.clone(),
                                existing.span.clone(),
                            )
                        };
                    dups.push(DuplicateSymbol {
                        fqn: fqn.clone(),
                        kind: entry.kind,
                        first_file,
                        first_span,
                        second_file,
                        second_span,
                    });
                }
                Some(_) => {}
                None => {
                    self.entries.insert(fqn.clone(), entry.clone());
                }
            }
        }
        dups
    }

    pub fn get(&self, fqn: &str) -> Option<&SymbolEntry> {
        self.entries.get(fqn)
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.entries.contains_key(fqn)
    }
}

/// The ordered list of namespaces searched when resolving an unqualified
/// name, innermost first: the package-qualified nesting path, trimmed one
/// dot-segment at a time down to the root. Symbol pool entries are always
/// declared with their package prefix (`linker.rs`'s `join(package,
/// nesting, name)`), so the candidate scopes here must be built the same
/// way — package and nesting combined into one path before trimming —
/// rather than as two independently-trimmed lists, or a reference to a
/// sibling type nested alongside the current message would never match the
/// pool's actual entry once a non-empty package is in play.
pub fn scope_chain(enclosing_messages: &[String], package: Option<&str>) -> Vec<String> {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(package) = package {
        parts.extend(package.split('.').filter(|p| !p.is_empty()));
    }
    parts.extend(enclosing_messages.iter().map(String::as_str));

    let mut scopes = Vec::new();
    for i in (0..parts.len()).rev() {
        scopes.push(parts[..=i].join("."));
    }
    scopes.push(String::new()); // root
    scopes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combines_package_and_nesting_into_one_trimmed_chain() {
        let enclosing = vec!["Outer".to_string(), "Inner".to_string()];
        let chain = scope_chain(&enclosing, Some("foo.bar"));
        assert_eq!(
            chain,
            vec![
                "foo.bar.Outer.Inner".to_string(),
                "foo.bar.Outer".to_string(),
                "foo.bar".to_string(),
                "foo".to_string(),
                "".to_string(),
            ]
        );
    }

    #[test]
    fn packaged_nested_message_sibling_resolves() {
        // package foo.bar; message Outer { message Inner {} message Sibling {} }
        // A reference to bare `Sibling` written inside `Inner` must resolve
        // against `foo.bar.Outer.Sibling`, the FQN `linker.rs` declares it
        // under, not against a package-less `Outer.Sibling`.
        let mut pool = UnionPool::new();
        let mut file = FilePool::new("test.proto");
        file.declare(
            "foo.bar.Outer".to_string(),
            SymbolKind::Message,
            Span::point(crate::position::Position::start_of("test.proto".into())),
        );
        file.declare(
            "foo.bar.Outer.Inner".to_string(),
            SymbolKind::Message,
            Span::point(crate::position::Position::start_of("test.proto".into())),
        );
        file.declare(
            "foo.bar.Outer.Sibling".to_string(),
            SymbolKind::Message,
            Span::point(crate::position::Position::start_of("test.proto".into())),
        );
        pool.merge(&file);

        let enclosing = vec!["Outer".to_string(), "Inner".to_string()];
        let found = scope_chain(&enclosing, Some("foo.bar"))
            .into_iter()
            .map(|scope| if scope.is_empty() { "Sibling".to_string() } else { format!("{}.Sibling", scope) })
            .find_map(|candidate| pool.get(&candidate).map(|_| candidate));
        assert_eq!(found.as_deref(), Some("foo.bar.Outer.Sibling"));
    }
}
