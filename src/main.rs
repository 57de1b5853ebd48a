use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use groundctl::auth::{TokenGenerator, TokenKind};
use groundctl::config::ServerConfig;
use groundctl::server::{AppState, create_router};
use groundctl::store::{SqliteStore, Store};
use groundctl::types::AdminToken;
use groundctl::upstream::{HarborClient, OciClient};

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "groundctl")]
#[command(about = "Control plane for edge registry satellites", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve(ServeArgs),
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin token)
    Init {
        /// Data directory for the database and admin token
        #[arg(long, env = "GROUNDCTL_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// TOML config file
        #[arg(long, env = "GROUNDCTL_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Flags override environment variables, which override the config file.
#[derive(Args)]
struct ServeArgs {
    /// TOML config file
    #[arg(long, env = "GROUNDCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "GROUNDCTL_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(long, short, env = "GROUNDCTL_PORT")]
    port: Option<u16>,

    /// Data directory for the database and admin token
    #[arg(long, env = "GROUNDCTL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Upstream registry base URL (e.g. "https://reg.example.com")
    #[arg(long, env = "REGISTRY_URL")]
    registry_url: Option<String>,

    /// Registry user that provisions robot accounts and pushes state
    #[arg(long, env = "REGISTRY_USERNAME")]
    registry_username: Option<String>,

    #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true)]
    registry_password: Option<String>,

    /// Registry project holding state artifacts
    #[arg(long, env = "GROUNDCTL_STATE_NAMESPACE")]
    state_namespace: Option<String>,

    /// Bootstrap token lifetime in seconds; 0 disables expiry
    #[arg(long, env = "GROUNDCTL_TOKEN_TTL")]
    token_ttl: Option<u64>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

impl ServeArgs {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = load_config(self.config.as_deref())?;

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(url) = self.registry_url {
            config.registry.url = url;
        }
        if let Some(username) = self.registry_username {
            config.registry.username = username;
        }
        if let Some(password) = self.registry_password {
            config.registry.password = password;
        }
        if let Some(namespace) = self.state_namespace {
            config.registry.state_namespace = namespace;
        }
        if let Some(ttl) = self.token_ttl {
            config.token_ttl_secs = (ttl > 0).then_some(ttl);
        }

        if config.registry.url.is_empty() {
            bail!("No registry URL configured. Pass --registry-url or set REGISTRY_URL.");
        }
        Ok(config)
    }
}

async fn run_init(data_dir: Option<PathBuf>, config: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = load_config(config.as_deref())?;
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize().await?;

    let token_file = config.admin_token_path();
    let conn = store.connection().await?;

    if conn.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let generated = TokenGenerator::new().generate(TokenKind::Admin)?;
    conn.create_admin_token(&AdminToken {
        id: Uuid::new_v4().to_string(),
        token_hash: generated.hash,
        token_lookup: generated.lookup,
        created_at: Utc::now(),
        last_used_at: None,
    })?;
    fs::write(&token_file, &generated.raw)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {}", generated.raw);
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = args.into_config()?;

    let store = SqliteStore::new(config.db_path())
        .with_context(|| format!("failed to open {}", config.db_path().display()))?
        .with_lock_timeout(config.lock_timeout());
    store.initialize().await?;

    if !store.connection().await?.has_admin_token()? {
        bail!(
            "Server not initialized. Run 'groundctl admin init' first to create the database and admin token."
        );
    }
    info!(
        "Admin token available at {}",
        config.admin_token_path().display()
    );

    let projects = Arc::new(HarborClient::new(&config.registry)?);
    let artifacts = Arc::new(OciClient::new(&config.registry)?);
    let state = Arc::new(AppState::new(store, &config, projects, artifacts));

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!(
        "Starting server on {} (registry {})",
        addr,
        config.registry.host()
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("groundctl=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir, config } => run_init(data_dir, config).await?,
        },
        Commands::Serve(args) => run_serve(args).await?,
    }

    Ok(())
}
