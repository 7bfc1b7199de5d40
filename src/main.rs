//! spanweave CLI entry point.

use spanweave::cli::{self, Cli};
use spanweave::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
