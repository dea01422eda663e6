mod app;
mod output;
mod transform;

use std::process::ExitCode;

use clap::Parser;

use crate::app::Cli;

fn main() -> ExitCode {
    if let Err(error) = ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    }) {
        eprintln!("failed to set Ctrl+C handler: {error}");
    }

    let cli = Cli::parse();

    // Show dotstub info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("dotstub", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match transform::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if cli.global.json {
                eprintln!("Error: {error:#}");
            } else {
                log::error!(target: "dotstub", "{error:#}");
            }
            ExitCode::FAILURE
        }
    }
}
