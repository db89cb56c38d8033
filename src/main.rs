//! repo-query CLI entry point

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // stdout carries tool results, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = repo_query::cli::Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(repo_query::cli::run(cli))
}
