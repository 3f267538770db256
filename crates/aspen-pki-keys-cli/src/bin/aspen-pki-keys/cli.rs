//! CLI argument parsing and command dispatch.
//!
//! Uses clap derive macros for declarative argument definition with
//! support for environment variables and global options.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use aspen_pki_keys::ImportKeyRequest;
use aspen_pki_keys::KeysConfig;
use aspen_pki_keys::KeysHandler;
use aspen_pki_keys::KeysRequest;
use aspen_pki_keys::PrivateKeyType;
use aspen_pki_keys::StoredKeyManager;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use tracing::debug;

use crate::output::KeysOutput;
use crate::output::print_output;

/// Command-line interface for Aspen PKI key management.
#[derive(Parser)]
#[command(name = "aspen-pki-keys")]
#[command(version)]
#[command(about = "Manage the signing keys of an Aspen PKI mount")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: KeysCommand,
}

/// Global options available to all commands.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// Path to the keys configuration file (TOML).
    ///
    /// Without one, the default configuration is used: mount "pki" stored in
    /// ./data/pki-keys.redb.
    #[arg(long, env = "ASPEN_PKI_KEYS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured PKI mount.
    #[arg(long, global = true)]
    pub mount: Option<String>,

    /// Output JSON instead of human-readable format.
    #[arg(long = "json", global = true)]
    pub is_json: bool,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub is_verbose: bool,

    /// Suppress all logging output (warnings, debug messages).
    ///
    /// Useful for scripting and when parsing JSON output.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub is_quiet: bool,
}

/// Key management commands.
#[derive(Subcommand)]
pub enum KeysCommand {
    /// List all keys with their names.
    List,

    /// Show one key.
    Read(ReadArgs),

    /// Rename a key. Omit the name to remove it.
    Rename(RenameArgs),

    /// Delete a key. The reference is required, so `default` must be spelled out.
    Delete(ReferenceArgs),

    /// Register an externally generated key.
    Import(ImportArgs),

    /// Make a key the default.
    SetDefault(ReferenceArgs),

    /// Show the current default key id.
    Default,
}

#[derive(Args)]
pub struct ReadArgs {
    /// Key id, name, or "default" (the default).
    pub reference: Option<String>,
}

#[derive(Args)]
pub struct RenameArgs {
    /// Key id, name, or "default".
    pub reference: String,

    /// New name. Empty or omitted removes the name.
    #[arg(default_value = "")]
    pub name: String,
}

#[derive(Args)]
pub struct ReferenceArgs {
    /// Key id, name, or "default".
    pub reference: String,
}

#[derive(Args)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["file", "managed"])))]
pub struct ImportArgs {
    /// Key type: rsa, ec, or ed25519.
    #[arg(long = "type")]
    pub key_type: PrivateKeyType,

    /// File containing the key material.
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Handle of a key held by an external key manager.
    #[arg(long)]
    pub managed: Option<String>,

    /// Optional key name.
    #[arg(long, default_value = "")]
    pub name: String,
}

impl KeysCommand {
    fn into_request(self) -> Result<KeysRequest> {
        Ok(match self {
            KeysCommand::List => KeysRequest::List,
            KeysCommand::Read(args) => KeysRequest::Read {
                reference: args.reference,
            },
            KeysCommand::Rename(args) => KeysRequest::Update {
                reference: Some(args.reference),
                name: args.name,
            },
            KeysCommand::Delete(args) => KeysRequest::Delete {
                reference: Some(args.reference),
            },
            KeysCommand::Import(args) => {
                let request = match (args.file, args.managed) {
                    (Some(path), _) => {
                        let material = std::fs::read(&path)
                            .with_context(|| format!("failed to read key material from {}", path.display()))?;
                        ImportKeyRequest::stored(args.key_type, material)
                    }
                    (None, Some(handle)) => ImportKeyRequest::managed(args.key_type, handle),
                    (None, None) => anyhow::bail!("either --file or --managed is required"),
                };
                KeysRequest::Import(request.with_name(args.name))
            }
            KeysCommand::SetDefault(args) => KeysRequest::SetDefault {
                reference: args.reference,
            },
            KeysCommand::Default => KeysRequest::ReadDefault,
        })
    }
}

impl Cli {
    fn load_config(&self) -> Result<KeysConfig> {
        let config = match &self.global.config {
            Some(path) => KeysConfig::load(path).context("failed to load keys configuration")?,
            None => KeysConfig::default(),
        };
        Ok(match &self.global.mount {
            Some(mount) => config.with_mount(mount.clone()),
            None => config,
        })
    }

    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        debug!(mount = %config.mount, backend = ?config.storage.backend, "Opening key storage");

        let backend = config.open_backend().context("failed to open key storage")?;
        let handler = KeysHandler::new(Arc::new(StoredKeyManager::with_backend(backend)));

        let request = self.command.into_request()?;
        let response = handler.handle(request).await?;

        let output = KeysOutput::new(response);
        print_output(&output, self.global.is_json);
        if !output.is_success() {
            std::process::exit(1);
        }
        Ok(())
    }
}
