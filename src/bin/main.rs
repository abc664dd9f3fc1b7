use std::process;

use clap::Parser;

#[macro_use]
extern crate log;

/// Parse command line arguments and run the requested subcommand.
fn main() {
    let cli = parser::Cli::parse();
    logger::init(cli.verbose, cli.quiet);
    cli.serialize();

    if let Err(e) = snapclust::run(cli) {
        error!("{e:#}");
        process::exit(snapclust::exit_code(&e));
    }
}
