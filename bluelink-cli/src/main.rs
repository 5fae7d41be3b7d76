/*!
 * bluelink
 * Pair, connect and manage Bluetooth devices from the terminal
 */

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

mod terminal;

use bluelink_core::{
    BluelinkConfig, BluetoothError, Bluetoothctl, Device, DeviceFilter, Host, ProcessLauncher,
    Query, Workflows,
};
use terminal::TerminalHost;

#[derive(Parser)]
#[command(name = "bluelink")]
#[command(about = "Bluetooth device management over bluetoothctl")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the bluetoothctl binary
    #[arg(long)]
    bluetoothctl: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List known devices
    Devices {
        #[arg(short, long, value_enum)]
        filter: Option<Filter>,
        #[arg(long)]
        json: bool,
    },
    /// Show one device
    Info {
        mac: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the default controller
    Controller {
        #[arg(long)]
        json: bool,
    },
    /// Pair with a device
    Pair { mac: String },
    /// Connect to a device
    Connect { mac: String },
    /// Disconnect from a device
    Disconnect { mac: String },
    /// Remove a device
    Remove { mac: String },
    /// Trust a device
    Trust { mac: String },
    /// Stay discoverable and accept incoming pairs until Ctrl-C
    Discoverable,
    /// Turn discoverable mode off
    Undiscoverable,
    /// Print every parsed bluetoothctl line as JSON until Ctrl-C
    Watch {
        /// Start scanning while watching
        #[arg(long)]
        scan: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    Paired,
    Bonded,
    Trusted,
    Connected,
}

impl From<Filter> for DeviceFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Paired => DeviceFilter::Paired,
            Filter::Bonded => DeviceFilter::Bonded,
            Filter::Trusted => DeviceFilter::Trusted,
            Filter::Connected => DeviceFilter::Connected,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("bluelink={},bluelink_core={}", log_level, log_level))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => BluelinkConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BluelinkConfig::default(),
    };
    if let Some(program) = cli.bluetoothctl {
        config.bluetoothctl.program = program;
    }
    debug!("Using bluetoothctl at {}", config.bluetoothctl.program.display());

    let query = Query::new(config.bluetoothctl.program.clone());
    match cli.command {
        Commands::Devices { filter, json } => list_devices(&query, filter, json).await,
        Commands::Info { mac, json } => show_info(&query, &mac, json).await,
        Commands::Controller { json } => show_controller(&query, json).await,
        Commands::Pair { mac } => {
            let device = resolve(&query, &mac).await;
            workflows(&config).pair_to_device(&device).await?;
            Ok(())
        }
        Commands::Connect { mac } => {
            let device = resolve(&query, &mac).await;
            workflows(&config).connect_to_device(&device).await?;
            Ok(())
        }
        Commands::Disconnect { mac } => {
            let device = resolve(&query, &mac).await;
            workflows(&config).disconnect_from_device(&device).await?;
            Ok(())
        }
        Commands::Remove { mac } => {
            let device = resolve(&query, &mac).await;
            workflows(&config).remove_device(&device).await?;
            Ok(())
        }
        Commands::Trust { mac } => {
            let device = resolve(&query, &mac).await;
            workflows(&config).trust_device(&device).await?;
            Ok(())
        }
        Commands::Discoverable => stay_discoverable(&config).await,
        Commands::Undiscoverable => {
            workflows(&config).make_undiscoverable().await?;
            Ok(())
        }
        Commands::Watch { scan } => watch(&config, scan).await,
    }
}

fn workflows(config: &BluelinkConfig) -> Workflows {
    let terminal = Arc::new(TerminalHost::new());
    let host = Host::new(terminal.clone(), terminal.clone(), terminal);
    let launcher = Arc::new(ProcessLauncher::new(config.bluetoothctl.program.clone()));
    Workflows::new(launcher, host, config)
}

/// Looks the device up for a friendly name; unknown devices are still addressed by MAC.
async fn resolve(query: &Query, mac: &str) -> Device {
    match query.info(mac).await {
        Ok(info) => Device::from(info),
        Err(e) => {
            debug!("No info for {}: {}", mac, e);
            Device::new(mac, mac)
        }
    }
}

async fn list_devices(query: &Query, filter: Option<Filter>, json: bool) -> Result<()> {
    let devices = query.list_devices(filter.map(DeviceFilter::from)).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    for device in &devices {
        let mut flags = Vec::new();
        if device.connected {
            flags.push("connected".to_string());
        }
        if device.trusted {
            flags.push("trusted".to_string());
        }
        if let Some(level) = device.battery_level {
            flags.push(format!("battery {}%", level));
        }
        println!("{}  {:<24} {}", device.mac, device.name, flags.join(", "));
    }
    Ok(())
}

async fn show_info(query: &Query, mac: &str, json: bool) -> Result<()> {
    let info = match query.info(mac).await {
        Ok(info) => info,
        Err(BluetoothError::NotAvailable { mac }) => anyhow::bail!("Device {} not available", mac),
        Err(e) => return Err(e.into()),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Device {}", info.mac);
    if let Some(name) = &info.name {
        println!("  Name:      {}", name);
    }
    if let Some(alias) = &info.alias {
        println!("  Alias:     {}", alias);
    }
    if let Some(icon) = &info.icon {
        println!("  Icon:      {}", icon);
    }
    println!("  Paired:    {}", yes_no(info.paired));
    println!("  Bonded:    {}", yes_no(info.bonded));
    println!("  Trusted:   {}", yes_no(info.trusted));
    println!("  Blocked:   {}", yes_no(info.blocked));
    println!("  Connected: {}", yes_no(info.connected));
    if let Some(battery) = info.battery_percentage {
        println!("  Battery:   {}%", battery);
    }
    for uuid in &info.uuids {
        println!("  UUID:      {}", uuid);
    }
    Ok(())
}

async fn show_controller(query: &Query, json: bool) -> Result<()> {
    let controller = query.controller().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&controller)?);
        return Ok(());
    }

    println!("Controller {}", controller.mac);
    if let Some(name) = &controller.name {
        println!("  Name:         {}", name);
    }
    println!("  Powered:      {}", yes_no(controller.powered));
    println!("  Discoverable: {}", yes_no(controller.discoverable));
    if let Some(timeout) = controller.discoverable_timeout {
        println!("  Timeout:      {}s", timeout);
    }
    println!("  Pairable:     {}", yes_no(controller.pairable));
    println!("  Discovering:  {}", yes_no(controller.discovering));
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

async fn stay_discoverable(config: &BluelinkConfig) -> Result<()> {
    let discoverable = workflows(config).make_discoverable().await?;
    info!("Discoverable, waiting for Ctrl-C");
    tokio::signal::ctrl_c().await?;
    discoverable.stop().await?;
    Ok(())
}

async fn watch(config: &BluelinkConfig, scan: bool) -> Result<()> {
    let session = Bluetoothctl::spawn(&config.bluetoothctl.program).await?;
    let (_subscription, mut events) = session.events();
    if scan {
        session.scan_on().await?;
    }

    loop {
        tokio::select! {
            line = events.recv() => match line {
                Some(line) => println!("{}", serde_json::to_string(&line)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if scan {
                    session.scan_off().await?;
                }
                break;
            }
        }
    }

    session.kill().await;
    Ok(())
}
