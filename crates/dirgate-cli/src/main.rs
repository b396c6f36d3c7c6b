//! Dirgate - HTTP-to-LDAP bridge
//!
//! Exposes user provisioning, login and user search over HTTP, backed by an
//! LDAP directory server.

use clap::{Parser, Subcommand};
use dirgate_api::DirgateServer;
use dirgate_core::config::{DirgateConfig, LoggingConfig};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dirgate")]
#[command(author = "Dirgate Team")]
#[command(version = dirgate_core::VERSION)]
#[command(about = "HTTP-to-LDAP bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (TOML). Environment variables are used otherwise.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "DIRGATE_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DIRGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Server,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if matches!(cli.command, Some(Commands::Version)) {
        print_banner();
        return Ok(());
    }

    let file_config = match &cli.config {
        Some(config_path) => Some(DirgateConfig::from_file(config_path)?),
        None => None,
    };

    let logging = logging_config(&cli, file_config.as_ref());
    init_logging(&logging);

    let mut config = match file_config {
        Some(config) => config,
        None => DirgateConfig::from_env(),
    };
    config.logging = logging;

    // Override with CLI args
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    print_banner();

    if let Err(e) = run_server(config).await {
        error!(code = e.code(), "Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}

/// Log settings from the config file, overridden by `--log-level` /
/// `DIRGATE_LOG_LEVEL` and `--log-json`
fn logging_config(cli: &Cli, file_config: Option<&DirgateConfig>) -> LoggingConfig {
    let mut logging = file_config
        .map(|config| config.logging.clone())
        .unwrap_or_default();

    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if cli.log_json {
        logging.json = true;
    }

    logging
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let json = logging.json;
    tracing_subscriber::registry()
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true)))
        .with(filter)
        .init();
}

fn print_banner() {
    println!(
        r#"
       _ _                  _
    __| (_)_ __ __ _  __ _| |_ ___
   / _` | | '__/ _` |/ _` | __/ _ \
  | (_| | | | | (_| | (_| | ||  __/
   \__,_|_|_|  \__, |\__,_|\__\___|
               |___/

   HTTP-to-LDAP Bridge
   Version: {}
"#,
        dirgate_core::VERSION
    );
}

async fn run_server(config: DirgateConfig) -> dirgate_core::Result<()> {
    info!("Starting Dirgate server...");
    info!("LDAP base DN: {}", config.ldap.base_dn);
    info!("Admin DN: {}", config.ldap.admin_dn());

    DirgateServer::new(config).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_resolved_without_env_config() {
        let cli = Cli::parse_from(["dirgate", "--log-level", "debug", "--log-json"]);

        let logging = logging_config(&cli, None);
        assert_eq!(logging.level, "debug");
        assert!(logging.json);
    }

    #[test]
    fn test_cli_log_level_overrides_file() {
        let mut file_config = DirgateConfig::default();
        file_config.logging.level = "warn".to_string();
        file_config.logging.json = true;

        let cli = Cli::parse_from(["dirgate", "--log-level", "trace"]);
        let logging = logging_config(&cli, Some(&file_config));
        assert_eq!(logging.level, "trace");
        assert!(logging.json);
    }

    #[test]
    fn test_logging_defaults() {
        let cli = Cli {
            command: None,
            config: None,
            bind: None,
            port: None,
            log_level: None,
            log_json: false,
        };

        let logging = logging_config(&cli, None);
        assert_eq!(logging.level, "info");
        assert!(!logging.json);
    }
}
