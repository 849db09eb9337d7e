//! Command line tool for Keon WiFi devices
//!
//! Finds devices over BLE, obtains a registration token from the fastest
//! OAuth server and pushes WiFi credentials plus the token onto a device.

mod config;
mod logging;

use clap::{Parser, Subcommand};
use keon_ble_controller::ble::{self, KeonConnection};
use keon_oauth::{
    HttpOauthApi, RegistrationToken, ServerSelector, credential_for_control_server, display_token,
    token_for_keon_wifi,
};
use tracing::{info, warn};

use crate::config::{ConfigError, KeonConfig, keon_home};

#[derive(Parser)]
#[command(name = "keon")]
#[command(about = "Provision and register Keon WiFi devices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for BLE devices and flag the Keons
    Scan {
        /// Scan duration in seconds (defaults to the configured value)
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Connect to a device and print its identity and battery level
    Info {
        /// Device name or address; any Keon if omitted
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Pick the fastest OAuth server and print the tokens it issues
    Token {
        /// Partner access credential
        #[arg(short, long)]
        credential: String,
        /// Known device connection key
        #[arg(short = 'k', long)]
        device_key: Option<String>,
        /// Only run the server selection
        #[arg(long)]
        select_only: bool,
    },
    /// Resolve the control server and access token from a registration token
    Credentials {
        #[arg(short, long)]
        credential: String,
        #[arg(short, long)]
        registration_token: String,
    },
    /// Send WiFi credentials and a registration token to a device
    Provision {
        #[arg(short, long)]
        device: Option<String>,
        #[arg(short, long)]
        ssid: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        token: String,
    },
    /// Obtain a registration token and provision a device with it
    Setup {
        #[arg(short, long)]
        device: Option<String>,
        #[arg(short, long)]
        credential: String,
        #[arg(short = 'k', long)]
        device_key: Option<String>,
        #[arg(short, long)]
        ssid: String,
        #[arg(short, long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let home = keon_home()?;
    let (config, invalid) = match KeonConfig::load(&home) {
        Ok(config) => (config, None),
        Err(e @ ConfigError::Invalid { .. }) => (KeonConfig::default(), Some(e)),
        Err(e) => return Err(e.into()),
    };
    logging::init(&config.log_level);
    match invalid {
        Some(e) => warn!("{e}; using defaults"),
        None => info!(home = %home.display(), "config loaded"),
    }

    match cli.command {
        Commands::Scan { duration } => {
            scan_devices(duration.unwrap_or(config.scan_secs)).await?;
        }
        Commands::Info { device } => {
            device_info(&config, device.as_deref()).await?;
        }
        Commands::Token {
            credential,
            device_key,
            select_only,
        } => {
            fetch_tokens(&config, &credential, device_key.as_deref(), select_only).await?;
        }
        Commands::Credentials {
            credential,
            registration_token,
        } => {
            let api = HttpOauthApi::new()?;
            let token = RegistrationToken::new(registration_token);
            let creds = credential_for_control_server(&api, &credential, &token).await?;
            println!("socket server: {}", creds.socket_server_url);
            println!("access token:  {}", creds.access_token);
        }
        Commands::Provision {
            device,
            ssid,
            password,
            token,
        } => {
            provision(&config, device.as_deref(), &ssid, &password, &token).await?;
        }
        Commands::Setup {
            device,
            credential,
            device_key,
            ssid,
            password,
        } => {
            let api = HttpOauthApi::new()?;
            let servers = config.servers();
            let tokens = token_for_keon_wifi(&api, &servers, &credential, device_key.as_deref())
                .await
                .ok_or("could not obtain a registration token")?;
            println!(
                "registration token: {}",
                display_token(tokens.registration_token.as_str())
            );
            provision(
                &config,
                device.as_deref(),
                &ssid,
                &password,
                tokens.registration_token.as_str(),
            )
            .await?;
        }
    }

    Ok(())
}

async fn scan_devices(duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for Keon devices ({} seconds)...", duration);

    let adapter = ble::get_adapter().await?;
    let devices = ble::scan(&adapter, duration).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_keon { " [KEON]" } else { "" };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }
    Ok(())
}

async fn device_info(
    config: &KeonConfig,
    target: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let adapter = ble::get_adapter().await?;
    let peripheral = ble::find_device(&adapter, target, config.scan_secs).await?;

    let (connection, info) = KeonConnection::connect(peripheral).await?;
    let battery = connection.battery_level().await;
    connection.close().await?;

    println!("{}", serde_json::to_string_pretty(&info)?);
    match battery {
        Ok(level) => println!("battery: {level}%"),
        Err(e) => println!("battery: unavailable ({e})"),
    }
    Ok(())
}

async fn fetch_tokens(
    config: &KeonConfig,
    credential: &str,
    device_key: Option<&str>,
    select_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = HttpOauthApi::new()?;
    let servers = config.servers();

    if select_only {
        let selection = ServerSelector::new(&api, servers)
            .choose_best_server(credential, device_key)
            .await;
        for (server, token) in &selection.tokens {
            println!("  {server}: {}", display_token(token));
        }
        let best = selection.best.ok_or("no OAuth server validated a token")?;
        println!("best server: {} ({:?})", best.url, best.latency);
        println!("access token: {}", best.access_token);
        return Ok(());
    }

    let tokens = token_for_keon_wifi(&api, &servers, credential, device_key)
        .await
        .ok_or("could not obtain a registration token")?;
    println!("registration token: {}", tokens.registration_token.as_str());
    if let Some(key) = tokens.device_connection_key {
        println!("device connection key: {key}");
    }
    Ok(())
}

async fn provision(
    config: &KeonConfig,
    target: Option<&str>,
    ssid: &str,
    password: &str,
    token: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let adapter = ble::get_adapter().await?;
    let peripheral = ble::find_device(&adapter, target, config.scan_secs).await?;

    println!("Sending WiFi credentials...");
    println!("  SSID: {}", ssid);
    let info = ble::provision_device(
        peripheral,
        ssid,
        password,
        token,
        &config.provision_options(),
    )
    .await?;

    println!(
        "Device {} provisioned! It will now join WiFi and register.",
        info.serial_number.as_deref().unwrap_or(&info.id)
    );
    Ok(())
}
