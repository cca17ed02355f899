//! Virtual background CLI
//!
//! Command-line interface for segmenting a person and replacing or blurring
//! the background of an image.

use virtual_background::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
