use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackvault::auth::{CredentialSigner, generate_secret};
use trackvault::config::{FileConfig, ServerConfig};
use trackvault::server::{AppState, create_router};
use trackvault::store::{SqliteStore, Store};

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "trackvault")]
#[command(about = "Per-user GPX track storage server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory (create database and signing secret)
    Init {
        /// Data directory for the database and track files
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Start the server
    Serve {
        /// TOML config file; flags below override its values
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database and track files
        #[arg(long)]
        data_dir: Option<String>,
    },
}

fn run_init(data_dir: String) -> anyhow::Result<()> {
    let config = ServerConfig {
        data_dir: data_dir.into(),
        ..ServerConfig::default()
    };
    fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let secret_file = config.secret_path();
    if secret_file.exists() {
        bail!(
            "Server already initialized. Signing secret exists at: {}",
            secret_file.display()
        );
    }

    fs::write(&secret_file, generate_secret())?;

    #[cfg(unix)]
    set_restrictive_permissions(&secret_file);

    println!("Initialized data directory at {}", config.data_dir.display());
    println!("Signing secret written to: {}", secret_file.display());

    Ok(())
}

fn build_config(
    config_file: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<String>,
) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::default();

    if let Some(path) = config_file {
        let file = FileConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?;
        config = config.merge(file)?;
    }

    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir.into();
    }

    Ok(config)
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    let secret_file = config.secret_path();
    if !secret_file.exists() {
        bail!("Server not initialized. Run 'trackvault init' first to create the database and signing secret.");
    }

    let secret = fs::read_to_string(&secret_file)?;
    let credentials = CredentialSigner::from_hex(&secret, config.token_ttl()?)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let state = Arc::new(
        AppState::new(Arc::new(store), &config.data_dir, credentials)
            .with_max_upload_bytes(config.max_upload_bytes),
    );

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trackvault=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => run_init(data_dir)?,
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
        } => {
            let config = build_config(config, host, port, data_dir)?;
            run_serve(config).await?;
        }
    }

    Ok(())
}
