#![deny(clippy::mod_module_files)]
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod filter;
mod rewrite;
mod stream;

/// Rewrite repository history, removing the Groq API key line from
/// backend/.gitignore in every commit.
#[derive(Parser)]
#[command(name = "git-scrub-key", version)]
struct Cli {
    /// Path to the repository to rewrite
    #[arg(default_value = ".")]
    repo: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let stats = rewrite::run(&cli.repo)?;

    tracing::info!(
        "rewrote {} commit(s): {} blob(s) filtered, {} shared blob(s) cloned",
        stats.commits,
        stats.blobs_rewritten,
        stats.blobs_cloned
    );
    if stats.blobs_rewritten + stats.blobs_cloned > 0 {
        tracing::info!(
            "pre-rewrite objects stay until `git reflog expire --expire=now --all && git gc --prune=now` is run"
        );
    }
    Ok(())
}
