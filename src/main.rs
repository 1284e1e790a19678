use clap::Parser;
use transit_store::cli::Cli;

fn main() -> anyhow::Result<()> {
    transit_store::logging::init();
    let mut cli = Cli::parse();
    cli.run()
}
