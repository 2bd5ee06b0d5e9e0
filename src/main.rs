//! Crabproxy - SOCKS5 proxy server
//!
//! This is the main entry point for the Crabproxy application.

use anyhow::Result;
use clap::Parser;
use crabproxy::config::{load_config, Config};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Crabproxy - SOCKS5 proxy server
#[derive(Parser, Debug)]
#[command(name = "crabproxy")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CRABPROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "PROXY_LISTEN")]
    listen: Option<SocketAddr>,

    /// Port to listen on, replacing the port of the listen address
    #[arg(short, long, env = "PROXY_PORT")]
    port: Option<u16>,

    /// Username for SOCKS5 authentication
    #[arg(long, env = "PROXY_USER")]
    user: Option<String>,

    /// Password for SOCKS5 authentication
    #[arg(long, env = "PROXY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Regular expression requested domain names must match
    #[arg(long, env = "ALLOWED_DEST_FQDN")]
    allowed_dest_fqdn: Option<String>,

    /// Comma separated peer IPs allowed to connect
    #[arg(long, env = "ALLOWED_IPS", value_delimiter = ',')]
    allowed_ips: Vec<String>,

    /// Comma separated peer networks (CIDR) allowed to connect
    #[arg(long, env = "ALLOWED_NETS", value_delimiter = ',')]
    allowed_nets: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let mut config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => Config::default(),
    };
    apply_overrides(&mut config, &args);

    let server = config.server_builder()?.build()?;

    info!("Crabproxy v{}", crabproxy::VERSION);
    if config.auth.has_credentials() {
        info!("Username/password authentication enabled");
    }

    // Drain live connections on Ctrl+C and termination signals
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.stop(true).await;
    });

    server.listen_and_serve(config.listen).await?;

    Ok(())
}

/// Merge command-line and environment values over the file configuration
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(port) = args.port {
        config.listen.set_port(port);
    }
    if let Some(user) = non_empty(&args.user) {
        config.auth.username = Some(user);
    }
    match &args.password {
        Some(password) if !password.is_empty() || config.auth.username.is_some() => {
            config.auth.password = Some(password.clone());
        }
        _ => {}
    }
    // A user without a password authenticates with the empty password
    if config.auth.username.is_some() && config.auth.password.is_none() {
        config.auth.password = Some(String::new());
    }
    if let Some(pattern) = non_empty(&args.allowed_dest_fqdn) {
        config.rules.allowed_dest_fqdn = Some(pattern);
    }

    config.filter.allowed_ips.extend(list_values(&args.allowed_ips));
    config.filter.allowed_nets.extend(list_values(&args.allowed_nets));
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

fn list_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down...");
                    }
                }
            }
            Err(e) => {
                warn!("Failed to setup SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        // On Windows, only handle Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

/// Setup logging based on configuration
///
/// `RUST_LOG` takes precedence over `--log-level` when set.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
