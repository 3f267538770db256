//! Aspen PKI keys - operator CLI for the keys of a PKI mount.
//!
//! Lists, inspects, renames, and deletes the signing keys of a PKI mount,
//! registers externally generated keys, and manages the default key.
//!
//! # Usage
//!
//! ```bash
//! # List keys in the configured mount
//! aspen-pki-keys --config /etc/aspen/pki-keys.toml list
//!
//! # Read the default key, then rename it
//! aspen-pki-keys read
//! aspen-pki-keys rename default ca-root-2024
//!
//! # Register a PEM key and make it the default
//! aspen-pki-keys import --type ec --file issuing.pem --name issuing
//! aspen-pki-keys set-default issuing
//!
//! # JSON output for scripting
//! aspen-pki-keys --json --quiet list | jq '.keys'
//! ```

mod cli;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Log filter for the flags given. `--quiet` beats `--verbose`; with neither,
/// `RUST_LOG` applies and defaults to warnings only.
fn log_filter(quiet: bool, verbose: bool) -> EnvFilter {
    match (quiet, verbose) {
        (true, _) => EnvFilter::new("off"),
        (false, true) => EnvFilter::new("warn,aspen_pki_keys=debug"),
        (false, false) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries command output only.
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.global.is_quiet, cli.global.is_verbose))
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    cli.run().await
}
