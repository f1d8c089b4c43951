//! codepad - a local playground server for running Go snippets.

mod config;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use codepad_core::blob::BlobStore;
use codepad_core::toolchain::Toolchain;
use codepad_server::{AppState, AuthKeys, ServerConfig};
use codepad_store::SnippetStore;

use config::Config;

#[derive(Parser)]
#[command(name = "codepad")]
#[command(about = "Local playground server for running Go snippets in the browser")]
#[command(version)]
struct Cli {
    /// Path to the JSON configuration file. Without one, the server
    /// prompts for a login password and runs with defaults.
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose)?;
    tracing::info!("loaded config:\n{}", serde_json::to_string_pretty(&config)?);

    let data_dir = config.ensure_data_dir()?;
    let store = Arc::new(SnippetStore::open(&data_dir)?);
    let blobs = Arc::new(BlobStore::new());

    let mut toolchain = Toolchain::new(config.go_binary.clone(), config.fmt_binary.clone());
    toolchain.versions = config.go_versions.clone();
    toolchain.environment = config.environment.clone();

    let auth = match config.password_keys()? {
        Some((hash, salt)) => AuthKeys::new(hash, salt),
        None => {
            tracing::warn!("no password configured; every request is authenticated");
            AuthKeys::disabled()
        }
    };

    if !config.tls_cert_file.is_empty() {
        // TLS termination belongs to a fronting proxy; the certificate
        // paths are validated but not consumed here.
        tracing::warn!("TLS fields are set; serving plain HTTP behind your proxy");
    }

    let state = Arc::new(AppState::new(store, blobs, toolchain, auth));
    codepad_server::serve(
        state,
        ServerConfig {
            serve_address: config.serve_address.clone(),
        },
    )
    .await?;
    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.log_file.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(Arc::new(file))
            .init();
    }
    Ok(())
}
