use anyhow::Result;
use clap::Parser;
use revrec::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    revrec::logging::init_tracing(cli.verbose);
    cli.run().await
}
