//! codedoc CLI: generate and check source code documentation with LLMs.
//!
//! Parses a codebase, retrieves similar elements as prompt context, asks an
//! OpenAI or Gemini model for docstrings, and reports on consistency.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let dotenv = codedoc_shared::load_dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "environment loaded from .env"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "ignoring .env file"),
    }

    tokio::select! {
        result = commands::run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\nOperation cancelled by user.");
            std::process::exit(1);
        }
    }
}
