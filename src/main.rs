//! Portcullis CLI - Log identity-layer users into legacy form-login apps
//!
//! Run `portcullis --help` for usage information.

use clap::{Parser, Subcommand};
use portcullis::config::{Config, LogFormat};
use portcullis::proxy::ProxyServer;
use portcullis::router::{normalize_host, CredentialResolver};
use portcullis::storage::{self, StorageBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the database path
const DATABASE_ENV: &str = "PORTCULLIS_DATABASE";

#[derive(Parser)]
#[command(
    name = "portcullis",
    about = "Identity-aware proxy that signs users into legacy form-login applications",
    version
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy
    Serve {
        /// Address to bind to (overrides server.bind)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Write a default configuration and create the database schema
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show which credential an email would use on an application
    Resolve {
        /// Application hostname
        hostname: String,

        /// Access email to resolve for
        email: String,
    },

    /// List configured applications
    Apps {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    if let Commands::Init { force } = &cli.command {
        init_logging(&Config::default(), cli.verbose);
        return init_config(&config_path, *force).await;
    }

    let mut config = if cli.config.is_some() || config_path.exists() {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    if let Ok(path) = std::env::var(DATABASE_ENV) {
        config.storage.path = portcullis::config::expand_home(&path);
    }

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { bind } => {
            run_server(config, bind).await?;
        }
        Commands::Resolve { hostname, email } => {
            resolve_credential(config, hostname, email).await?;
        }
        Commands::Apps { format } => {
            list_applications(config, format).await?;
        }
        Commands::Init { .. } => {}
    }

    Ok(())
}

/// Install the tracing subscriber; `-v` flags win over the configured level
fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
    }
}

/// Open the configured storage backend
async fn init_storage(config: &Config) -> Result<Arc<dyn StorageBackend>, Box<dyn std::error::Error>> {
    let storage = storage::open(&config.storage).await?;
    storage.health_check().await?;
    Ok(storage)
}

/// Run the proxy
async fn run_server(mut config: Config, bind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let storage = init_storage(&config).await?;
    let server = ProxyServer::new(config, storage)?;

    server
        .run()
        .await
        .map_err(|e| -> Box<dyn std::error::Error> { e })
}

/// Dry-run the credential resolver
async fn resolve_credential(
    config: Config,
    hostname: String,
    email: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let storage = init_storage(&config).await?;
    let hostname = normalize_host(&hostname);

    if storage.get_application(&hostname).await?.is_none() {
        return Err(format!("No application configured for {}", hostname).into());
    }

    let resolver = CredentialResolver::new(storage);
    match resolver.resolve_for(&hostname, &email).await? {
        Some(record) => {
            println!("Application: {}", hostname);
            println!("Email:       {}", email);
            println!("Pattern:     {}", record.access_email_pattern);
            println!("Username:    {}", record.legacy_username);
        }
        None => {
            println!("No credential matches {} on {}", email, hostname);
        }
    }

    Ok(())
}

/// List configured applications
async fn list_applications(config: Config, format: String) -> Result<(), Box<dyn std::error::Error>> {
    let storage = init_storage(&config).await?;
    let apps = storage.list_applications().await?;

    if apps.is_empty() {
        println!("No applications configured");
        return Ok(());
    }

    match format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&apps)?;
            println!("{}", json);
        }
        _ => {
            println!(
                "{:<30} {:<20} {:<20} {:<6} {}",
                "HOSTNAME", "LOGIN PATH", "SESSION COOKIE", "AUTO", "CREDENTIALS"
            );
            println!("{}", "-".repeat(90));
            for app in apps {
                let credentials = storage.list_credentials(&app.hostname).await?.len();
                println!(
                    "{:<30} {:<20} {:<20} {:<6} {}",
                    app.hostname,
                    app.login_path,
                    app.session_cookie,
                    if app.auto_login { "yes" } else { "no" },
                    credentials
                );
            }
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Portcullis Configuration

[server]
bind = "127.0.0.1:8787"
# max_body_bytes = 10485760

[identity]
header = "cf-access-authenticated-user-email"
fallback_email = "unknown@example.com"

# [admin]
# hostname = "portcullis.example.com"
# upstream = "http://127.0.0.1:9000"

[upstream]
scheme = "https"
# timeout_secs = 30

# [upstream.overrides]
# "wiki.example.com" = "http://10.0.0.5:8080"

[storage]
backend = "sqlite"
path = "~/.local/share/portcullis/portcullis.db"

[logging]
level = "info"
format = "pretty"
"#;

/// Write the default configuration and create the database schema
async fn init_config(config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() && !force {
        return Err(format!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(config_path, DEFAULT_CONFIG).await?;
    println!("Configuration initialized at {}", config_path.display());

    let mut config = Config::parse(DEFAULT_CONFIG)?;
    if let Ok(path) = std::env::var(DATABASE_ENV) {
        config.storage.path = portcullis::config::expand_home(&path);
    }

    storage::open(&config.storage).await?;
    info!(path = %config.storage.path.display(), "Database schema ready");
    println!("Database ready at {}", config.storage.path.display());

    Ok(())
}
