//! Command-line interface for WoTLink.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use wotlink_devices::config::env_vars;
use wotlink_devices::{
    describe_sensors, entity, validate_connection, AuthType, DeviceConfig, DeviceCoordinator,
    DeviceRecord, HttpTransport, PollEvent, ReqwestTransport, WotConfig, WotService,
};

/// WoTLink - discover, poll and control Web of Things HTTP devices.
#[derive(Parser, Debug)]
#[command(name = "wotlink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Credentials for commands that talk to a single URL.
#[derive(clap::Args, Debug)]
struct AuthArgs {
    /// Authentication type (none, basic, bearer).
    #[arg(long, default_value = "none")]
    auth_type: AuthType,
    /// Username for basic auth.
    #[arg(long)]
    username: Option<String>,
    /// Password for basic auth.
    #[arg(long)]
    password: Option<String>,
    /// Token for bearer auth.
    #[arg(long)]
    token: Option<String>,
}

impl AuthArgs {
    fn device_config(&self, url: &str) -> DeviceConfig {
        DeviceConfig {
            auth_type: self.auth_type,
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
            ..DeviceConfig::new("cli", url)
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run one poll cycle against a URL and print what was found.
    Discover {
        /// Device base URL.
        url: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Check that a device is reachable before adding it.
    Validate {
        /// Device base URL.
        url: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Poll configured devices.
    Poll {
        /// Path to the TOML config file.
        #[arg(short, long)]
        config: PathBuf,
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },
    /// Invoke an action on a configured device.
    Invoke {
        /// Path to the TOML config file.
        #[arg(short, long)]
        config: PathBuf,
        /// Device id.
        device: String,
        /// Action name.
        action: String,
        /// Action input as a JSON object.
        #[arg(short, long)]
        input: Option<String>,
    },
    /// List the sensors each configured device would expose.
    Sensors {
        /// Path to the TOML config file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());

    match args.command {
        Command::Discover { url, auth } => run_discover(transport, &auth.device_config(&url)).await,
        Command::Validate { url, auth } => run_validate(transport, &auth.device_config(&url)).await,
        Command::Poll { config, once } => run_poll(transport, &config, once).await,
        Command::Invoke {
            config,
            device,
            action,
            input,
        } => run_invoke(transport, &config, &device, &action, input.as_deref()).await,
        Command::Sensors { config } => run_sensors(transport, &config).await,
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "wotlink=debug" } else { "wotlink=info" };

    // Build the env filter for log level control
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: &Path) -> Result<WotConfig> {
    WotConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

async fn run_discover(transport: Arc<dyn HttpTransport>, config: &DeviceConfig) -> Result<()> {
    let record = DeviceRecord::from_config(config);
    let mut coordinator = DeviceCoordinator::from_record(&record, transport);
    let data = coordinator
        .first_refresh()
        .await
        .with_context(|| format!("Failed to poll {}", config.base_url))?;

    let td = coordinator.thing_description();
    let info = entity::device_info(coordinator.base_url(), td.map(|td| td.as_ref()));
    let actions: Vec<String> = td
        .map(|td| td.actions().into_iter().map(|(name, _)| name).collect())
        .unwrap_or_default();

    print_json(&json!({
        "name": info.name,
        "base_url": coordinator.base_url(),
        "thing_description": td.is_some(),
        "actions": actions,
        "values": Value::Object(data.values),
    }))
}

async fn run_validate(transport: Arc<dyn HttpTransport>, config: &DeviceConfig) -> Result<()> {
    let validated = validate_connection(transport.as_ref(), config).await?;
    print_json(&json!({
        "title": validated.title,
        "base_url": validated.base_url,
        "thing_description": validated.thing_description.is_some(),
        "properties": validated.property_count(),
        "actions": validated.action_count(),
    }))
}

async fn run_poll(transport: Arc<dyn HttpTransport>, path: &Path, once: bool) -> Result<()> {
    let config = load_config(path)?;

    if once {
        let cycles = config.devices.iter().map(|device| {
            let transport = transport.clone();
            async move {
                let record = DeviceRecord::from_config(device);
                let mut coordinator = DeviceCoordinator::from_record(&record, transport);
                (device.id.clone(), coordinator.refresh().await)
            }
        });

        let mut output = Map::new();
        let mut failed = 0;
        for (id, result) in futures::future::join_all(cycles).await {
            let entry = match result {
                Ok(data) => json!({"available": true, "values": Value::Object(data.values)}),
                Err(e) => {
                    failed += 1;
                    json!({"available": false, "error": e.to_string()})
                }
            };
            output.insert(id, entry);
        }
        print_json(&Value::Object(output))?;

        if failed > 0 && failed == config.devices.len() {
            anyhow::bail!("No configured device could be polled");
        }
        return Ok(());
    }

    let service = WotService::from_config(&config, transport);
    let mut events = service.subscribe();

    for (id, result) in service.add_devices(&config).await {
        match result {
            Ok(record) => {
                tracing::info!(device_id = %id, services = ?record.action_services(), "Polling device")
            }
            Err(e) => tracing::error!(device_id = %id, "Device not added: {}", e),
        }
    }
    if service.registry().is_empty().await {
        anyhow::bail!("No configured device could be polled");
    }
    for id in service.registry().list_ids().await {
        if let Some(data) = service.latest(&id).await {
            print_json(&json!({"device_id": id, "values": Value::Object(data.values)}))?;
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(PollEvent::Updated { device_id, data, timestamp }) => {
                    print_json(&json!({
                        "device_id": device_id,
                        "timestamp": timestamp,
                        "values": Value::Object(data.values),
                    }))?;
                }
                Ok(PollEvent::UpdateFailed { device_id, error, .. }) => {
                    tracing::warn!(device_id = %device_id, "Update failed: {}", error);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {} poll events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    service.shutdown().await;
    Ok(())
}

async fn run_invoke(
    transport: Arc<dyn HttpTransport>,
    path: &Path,
    device_id: &str,
    action: &str,
    input: Option<&str>,
) -> Result<()> {
    let config = load_config(path)?;
    let device = config
        .device(device_id)
        .with_context(|| format!("Device {} is not configured", device_id))?;

    let input = match input {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("Invalid --input JSON")? {
            Value::Object(map) => map,
            _ => anyhow::bail!("--input must be a JSON object"),
        },
        None => Map::new(),
    };

    let service = WotService::from_config(&config, transport);
    service.add_device(device).await?;
    let result = service.invoke(device_id, action, &input).await;
    service.shutdown().await;

    let outcome = result?;
    print_json(&json!({
        "status": outcome.status,
        "response": outcome.response,
    }))
}

async fn run_sensors(transport: Arc<dyn HttpTransport>, path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let mut output = Map::new();

    for device in &config.devices {
        let record = DeviceRecord::from_config(device);
        let mut coordinator = DeviceCoordinator::from_record(&record, transport.clone());
        let data = match coordinator.refresh().await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(device_id = %device.id, "Skipping device: {}", e);
                continue;
            }
        };

        let td = coordinator.thing_description().map(|td| td.as_ref());
        let info = entity::device_info(&record.base_url, td);
        let sensors: Vec<Value> = describe_sensors(&info.name, &record.base_url, td, Some(&data))
            .into_iter()
            .map(|sensor| {
                json!({
                    "unique_id": sensor.unique_id,
                    "name": sensor.name,
                    "unit": sensor.unit,
                    "device_class": sensor.device_class(),
                    "state_class": sensor.state_class(),
                    "value": sensor.native_value(Some(&data)),
                    "attributes": sensor.geo_attributes(td),
                    "available": coordinator.last_update_success(),
                })
            })
            .collect();

        output.insert(
            device.id.clone(),
            json!({"device": info, "sensors": sensors}),
        );
    }

    print_json(&Value::Object(output))
}
