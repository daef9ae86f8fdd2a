use clap::Parser;

/// Compile protobuf schema files into descriptor sets.
///
/// Accepts one or more `.proto` entry points, resolves their imports
/// relative to the given `-I`/`--proto-path` directories, and reports any
/// diagnostics found while lexing, parsing, linking and validating them.
#[derive(Parser, Debug)]
#[command(name = "protolink", author = "Ari Seyhun <ariseyhun@live.com.au>")]
pub struct Args {
    /// Proto files to compile
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Directory to search for imports, in addition to each file's own
    /// directory. May be given multiple times; searched in order.
    #[arg(short = 'I', long = "proto-path")]
    pub proto_path: Vec<String>,

    /// Record leading/trailing comments and source spans on every
    /// descriptor node
    #[arg(long)]
    pub include_source_info: bool,

    /// Warn about imports that declare no symbol referenced elsewhere in
    /// the compiled graph
    #[arg(long)]
    pub validate_unused_imports: bool,

    /// Stop at the first error instead of collecting every diagnostic a
    /// pass can find
    #[arg(long)]
    pub fail_fast: bool,

    /// Maximum import depth before aborting with a recursion-limit error
    #[arg(long, default_value_t = 64)]
    pub recursion_limit: u32,

    /// Leave every option uninterpreted instead of running the option
    /// interpreter
    #[arg(long)]
    pub skip_option_interpretation: bool,

    /// Prefer the embedded well-known file over a same-named file found on
    /// the proto path, instead of letting the proto-path copy shadow it
    #[arg(long)]
    pub builtin_shadowing: bool,

    /// Print more information
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print errors and warnings
    #[arg(short, long)]
    pub quiet: bool,
}
