//! OpenAPI from Metadata - command-line tool for generating OpenAPI documents.
//!
//! Reads route metadata manifests (controllers, routes, validation rule sets,
//! response examples) and writes one OpenAPI 3 document per server group.
//!
//! # Usage
//!
//! ```bash
//! openapi-from-metadata [OPTIONS] <MANIFEST_PATH>
//! ```
//!
//! # Examples
//!
//! Print the JSON document of the default configuration:
//! ```bash
//! openapi-from-metadata ./routes
//! ```
//!
//! Write one YAML file per server group:
//! ```bash
//! openapi-from-metadata ./routes -c openapi.yaml -f yaml -o docs/{server}.yaml
//! ```
//!
//! Enable verbose logging:
//! ```bash
//! openapi-from-metadata ./routes -v
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_from_metadata::cli;

fn main() -> Result<()> {
    // Parse first so the verbose flag can pick the log level
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("OpenAPI from Metadata starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    info!("OpenAPI document generation completed successfully");

    Ok(())
}
