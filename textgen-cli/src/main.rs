//! Textgen CLI.
//!
//! Commands:
//! - `textgen` / `textgen serve`: load a model and serve the HTTP API
//! - `textgen generate [prompt]`: complete one prompt and stream it to stdout
//!
//! Exit codes:
//! - 0: Success
//! - 1: Error (including no model being available)

use clap::Parser;
use textgen_cli::{run, Cli};
use textgen_common::logging::init_tracing;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
