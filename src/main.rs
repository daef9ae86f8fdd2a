use std::path::{Path, PathBuf};

use clap::Parser;
use colorful::Colorful;
use commands::Args;
use protolink_core::error::Severity;
use protolink_core::provider::{FileProvider, Resolved};
use protolink_core::{CompileOptions, Compiler};

use crate::log::*;

mod commands;
mod log;

fn main() {
    let args = Args::parse();
    let level = if args.verbose {
        Level::Debug
    } else if args.quiet {
        Level::Warn
    } else {
        Level::Info
    };
    SimpleLogger::new().with_level(level).init().unwrap();

    let provider = FsProvider::new(args.proto_path.iter().map(PathBuf::from).collect());
    let options = CompileOptions {
        include_source_info: args.include_source_info,
        validate_unused_imports: args.validate_unused_imports,
        fail_fast: args.fail_fast,
        recursion_limit: args.recursion_limit,
        skip_option_interpretation: args.skip_option_interpretation,
        built_ins_shadow_user_files: args.builtin_shadowing,
    };
    let compiler = Compiler::new(&provider, options);
    let result = compiler.compile(&args.files);

    let mut error_count = 0;
    let mut warning_count = 0;
    for diagnostic in &result.diagnostics {
        match diagnostic.severity {
            Severity::Error => {
                error_count += 1;
                error!("{}", diagnostic);
            }
            Severity::Warning => {
                warning_count += 1;
                warn!("{}", diagnostic);
            }
        }
    }

    if error_count > 0 {
        error!(
            "{}",
            format!("compilation failed with {} error(s), {} warning(s)", error_count, warning_count).bold()
        );
        std::process::exit(1);
    }

    info!(
        "{}",
        format!(
            "compiled {} file(s) ({} warning(s))",
            result.file_set.files.len(),
            warning_count
        )
        .bold()
    );
}

/// Resolves imports against the filesystem: first relative to each file's
/// own directory, then each configured `-I`/`--proto-path` directory in
/// order, matching `protoc`'s own import search order.
struct FsProvider {
    proto_path: Vec<PathBuf>,
}

impl FsProvider {
    fn new(proto_path: Vec<PathBuf>) -> Self {
        FsProvider { proto_path }
    }

    fn candidates<'a>(&'a self, import_path: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
        self.proto_path.iter().map(move |dir| dir.join(import_path))
    }
}

impl FileProvider for FsProvider {
    fn open(&self, import_path: &str) -> protolink_core::Result<Option<Resolved>> {
        let direct = Path::new(import_path);
        let candidates = std::iter::once(direct.to_path_buf()).chain(self.candidates(import_path));
        for candidate in candidates {
            match std::fs::read_to_string(&candidate) {
                Ok(source) => return Ok(Some(Resolved::Source(source))),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(protolink_core::Error::ProviderFailed {
                        path: candidate.display().to_string(),
                        reason: err.to_string(),
                    })
                }
            }
        }
        Ok(None)
    }

    fn canonicalize(&self, import_path: &str) -> Option<String> {
        let direct = Path::new(import_path);
        let candidates = std::iter::once(direct.to_path_buf()).chain(self.candidates(import_path));
        candidates
            .filter_map(|candidate| std::fs::canonicalize(&candidate).ok())
            .next()
            .map(|p| p.display().to_string())
    }
}
