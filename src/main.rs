//! sigroute - generate OpenAPI documents from route-annotated Rust handlers.
//!
//! ```bash
//! sigroute ./my-api-project -o openapi.yaml
//! sigroute ./my-api-project -f json --title "Shop API" --api-version 2.0.0
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use sigroute::cli;

fn main() -> Result<()> {
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("sigroute starting...");
    let args = cli::validate_args(args)?;
    cli::run(args)?;
    info!("OpenAPI document generation completed successfully");
    Ok(())
}
