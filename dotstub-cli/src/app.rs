use std::path::PathBuf;

use clap::Parser;

/// dotstub - move .NET string literals into native stubs
#[derive(Debug, Parser)]
#[command(name = "dotstub", version, about, long_about = None)]
pub struct Cli {
    /// Path to the module document to transform.
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    #[command(flatten)]
    pub global: GlobalOptions,

    /// Leave non-ASCII strings in place instead of emitting UTF-16 stubs.
    #[arg(long)]
    pub narrow_only: bool,
}

/// Output options.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit the report as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}
