use anyhow::Context;
use dotstub::{process_file, JsonStore, TransformOptions};

use crate::{app::Cli, output::print_output};

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let options = TransformOptions {
        narrow_only: cli.narrow_only,
    };

    let outcome = process_file(&cli.path, &JsonStore::new(), &options)
        .with_context(|| format!("failed to transform {}", cli.path.display()))?;

    print_output(&outcome, &cli.global, |outcome| {
        let report = &outcome.report;
        println!("Output:               {}", outcome.output.display());
        println!("Methods scanned:      {}", report.methods_scanned);
        println!("Methods rewritten:    {}", report.methods_rewritten);
        println!("Strings externalized: {}", report.strings_externalized);
        println!("Stubs created:        {}", report.stubs_created);
        if report.empty_skipped > 0 {
            println!("Empty skipped:        {}", report.empty_skipped);
        }
        if report.unencodable_skipped > 0 {
            println!("Unencodable skipped:  {}", report.unencodable_skipped);
        }
    })
}
