//! SQRL simulator - runs the browser / device / site triangle in one
//! process.
//!
//! Provides:
//! - A full first-time login conversation (`run`)
//! - An identity rotation conversation (`rotate`)
//!
//! No HTTP is involved; the point is to watch the protocol engine's
//! round trips, TIF values, and nut transitions.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sqrl_client::{contact_url, SqrlClient};
use sqrl_core::NutTtl;
use sqrl_engine::{
    DriverConfig, InboundRequest, MemoryStorage, MemoryStorageConfig, PollOutcome, ProtocolDriver,
};
use sqrl_proto::{OptionFlags, SqrlCommand};

/// SQRL protocol simulator.
#[derive(Parser)]
#[command(name = "sqrl-sim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.sqrl-sim/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a first-time login (default)
    Run,

    /// Simulate an identity rotation
    Rotate,
}

/// Simulator configuration.
#[derive(Debug, Clone)]
struct SimConfig {
    /// Authentication domain
    domain: String,
    /// Protocol endpoint path
    path: String,
    /// Server friendly name
    friendly_name: String,
    /// Whether to use the `sqrl` (https-backed) scheme
    secure: bool,
    /// Nut lifetime in seconds
    nut_ttl_secs: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            domain: "example.com".to_string(),
            path: "/sqrl".to_string(),
            friendly_name: "Example".to_string(),
            secure: true,
            nut_ttl_secs: NutTtl::DEFAULT_SECS,
        }
    }
}

/// Load configuration from TOML file.
fn load_config(path: &PathBuf) -> Result<SimConfig> {
    let path = expand_tilde(path);

    if !path.exists() {
        info!("No config file found at {:?}, using defaults", path);
        return Ok(SimConfig::default());
    }

    let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
    let toml: toml::Value = content.parse().context("Failed to parse config file")?;

    let mut config = SimConfig::default();

    if let Some(site) = toml.get("site") {
        if let Some(domain) = site.get("domain").and_then(|v| v.as_str()) {
            config.domain = domain.to_string();
        }
        if let Some(path) = site.get("path").and_then(|v| v.as_str()) {
            config.path = path.to_string();
        }
        if let Some(name) = site.get("friendly_name").and_then(|v| v.as_str()) {
            config.friendly_name = name.to_string();
        }
        if let Some(secure) = site.get("secure").and_then(|v| v.as_bool()) {
            config.secure = secure;
        }
    }

    if let Some(nuts) = toml.get("nuts") {
        if let Some(ttl) = nuts.get("ttl_secs").and_then(|v| v.as_integer()) {
            config.nut_ttl_secs = ttl as u64;
        }
    }

    Ok(config)
}

/// Expand ~ to home directory.
fn expand_tilde(path: &PathBuf) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(&s[2..]);
        }
    }
    path.clone()
}

/// Builds the site's protocol driver from configuration.
fn build_driver(config: &SimConfig) -> ProtocolDriver {
    let storage = Arc::new(MemoryStorage::with_config(MemoryStorageConfig {
        nut_ttl: NutTtl::from_secs(config.nut_ttl_secs),
        expiration_enabled: true,
    }));

    let mut driver_config = DriverConfig::new(&config.domain);
    driver_config.secure = config.secure;
    driver_config.path = config.path.clone();
    driver_config.server_friendly_name = Some(config.friendly_name.clone());
    driver_config.success_url = Some(format!("https://{}/loggedin", config.domain));
    driver_config.cancel_url = Some(format!("https://{}/cancelled", config.domain));

    ProtocolDriver::new(driver_config, storage)
}

/// Runs one device round trip and prints the exchange.
async fn round_trip(
    driver: &ProtocolDriver,
    client: &SqrlClient,
    session: &mut sqrl_client::ClientSession,
    command: SqrlCommand,
    options: OptionFlags,
) -> Result<()> {
    let body = client.build_request(session, command, options);
    let nut = session.nut().to_string();

    let response = driver
        .handle(
            &mut OsRng,
            InboundRequest {
                nut,
                body,
                ambient_tif: sqrl_core::Tif::NONE,
            },
        )
        .await
        .context("Protocol driver failed")?;

    let wire = response.to_body();
    let absorbed = client
        .absorb(session, &wire)
        .context("Failed to parse server response")?;

    println!(
        "  device -> site  cmd={:<7} | site -> device  tif=0x{} next_qry={}",
        command.as_str(),
        absorbed.tif.to_hex(),
        absorbed.query_path
    );
    Ok(())
}

/// Prints the browser's view of a poll.
async fn show_poll(driver: &ProtocolDriver, nut: &str) -> Result<()> {
    let outcome = driver.poll(nut).await.context("Poll failed")?;
    let shown = match &outcome {
        PollOutcome::NotFound => "not found".to_string(),
        PollOutcome::Pending => "pending".to_string(),
        PollOutcome::LoggedIn(key) => format!("logged in as {}", key),
    };
    println!("  browser poll nut={}: {}", nut, shown);
    Ok(())
}

/// Simulates a first-time login.
async fn simulate_login(config: &SimConfig) -> Result<()> {
    let driver = build_driver(config);
    let client = SqrlClient::generate(&mut OsRng);

    println!("First-time login against {}", config.domain);
    println!();

    let login = driver.issue_login_url(&mut OsRng).await?;
    println!("  site shows: {}", login.url);
    println!("  device contacts: {}", contact_url(&login.url));

    let mut session = client
        .begin(&login.url)
        .context("Device could not scan the login URL")?;

    show_poll(&driver, &login.nut).await?;
    round_trip(
        &driver,
        &client,
        &mut session,
        SqrlCommand::Query,
        OptionFlags::default(),
    )
    .await?;
    show_poll(&driver, &login.nut).await?;
    round_trip(
        &driver,
        &client,
        &mut session,
        SqrlCommand::Ident,
        OptionFlags {
            client_provided_session: true,
            ..Default::default()
        },
    )
    .await?;
    show_poll(&driver, &login.nut).await?;

    if let Some(response) = session.last_response() {
        if let Some(url) = &response.redirect_url {
            println!("  CPS redirect: {}", url);
        }
    }

    println!();
    println!("Login complete");
    Ok(())
}

/// Simulates an identity rotation.
async fn simulate_rotation(config: &SimConfig) -> Result<()> {
    let driver = build_driver(config);
    let mut client = SqrlClient::generate(&mut OsRng);

    println!("Identity rotation against {}", config.domain);
    println!();

    // Register under the original key.
    let login = driver.issue_login_url(&mut OsRng).await?;
    let mut session = client.begin(&login.url)?;
    round_trip(
        &driver,
        &client,
        &mut session,
        SqrlCommand::Ident,
        OptionFlags::default(),
    )
    .await?;
    println!("  registered as {}", client.identity().identity_key());

    // Rekey and return.
    client.identity_mut().rekey(&mut OsRng);
    println!("  device rekeyed to {}", client.identity().identity_key());
    println!();

    let login = driver.issue_login_url(&mut OsRng).await?;
    let mut session = client.begin(&login.url)?;
    round_trip(
        &driver,
        &client,
        &mut session,
        SqrlCommand::Query,
        OptionFlags::default(),
    )
    .await?;
    round_trip(
        &driver,
        &client,
        &mut session,
        SqrlCommand::Ident,
        OptionFlags::default(),
    )
    .await?;
    show_poll(&driver, &login.nut).await?;

    println!();
    println!("Rotation complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => simulate_login(&config).await,
        Commands::Rotate => simulate_rotation(&config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let path = PathBuf::from("~/.sqrl-sim/config.toml");
        let expanded = expand_tilde(&path);

        if let Some(home) = dirs::home_dir() {
            assert!(expanded.starts_with(&home));
            assert!(expanded.ends_with(".sqrl-sim/config.toml"));
        }
    }

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.domain, "example.com");
        assert_eq!(config.nut_ttl_secs, NutTtl::DEFAULT_SECS);
    }
}
