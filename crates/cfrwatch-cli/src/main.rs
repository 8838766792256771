//! cfrwatch CLI: the `cfrwatch` command.

mod check;
mod cli;
mod logging;

use clap::Parser;
use cli::Cli;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    check::run(cli);
}
