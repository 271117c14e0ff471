//! ViewSync CLI: drive the reconciliation engine against a local store.
//!
//! Indexes composite documents from the fixture sources, delivers change
//! messages, and inspects what was written.

mod commands;
mod fragments;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
