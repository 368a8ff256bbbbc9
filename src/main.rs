//! SentryHouse Sensor Monitor Binary

use clap::{Parser, Subcommand};
use sentryhouse_monitor::auth::{self, Credentials};
use sentryhouse_monitor::images::ImageStore;
use sentryhouse_monitor::monitor::MonitorSnapshot;
use sentryhouse_monitor::settings::{Settings, normalize_base_url};
use sentryhouse_monitor::{
    ApiClient, ClientCache, Config, FanController, MonitorError, MonitorSettings, Result,
    SensorMonitor, TracingAlertSink,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sentryhouse", version, about = "Gas and water leak monitor")]
struct Cli {
    /// Sensor service base URL, overriding the stored setting
    #[arg(long, env = "BASE_URL", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the sensors until interrupted
    Monitor {
        /// Run a single cycle and print the snapshot
        #[arg(long)]
        once: bool,
    },
    /// Check credentials against the login service
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "LOGIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Control the ventilation fan
    Fan {
        #[command(subcommand)]
        action: FanAction,
    },
    /// Manage per-sensor photo references
    Photo {
        #[command(subcommand)]
        action: PhotoAction,
    },
    /// Inspect or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum FanAction {
    On,
    Off,
    Status,
}

#[derive(Subcommand)]
enum PhotoAction {
    Set {
        screen: String,
        sensor_id: String,
        uri: String,
    },
    Clear {
        screen: String,
        sensor_id: String,
    },
    Show {
        screen: String,
        sensor_id: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    SetBaseUrl { url: String },
    Show,
}

#[tokio::main]
async fn main() {
    initialize_tracing();

    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(base_url) = cli.base_url {
        config.base_url = Some(base_url);
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli.command, config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    let mut settings = Settings::open(config.settings_path()).await?;
    let mut clients = ClientCache::new();

    match command {
        Command::Monitor { once } => {
            let client = sensor_client(&config, &settings, &mut clients)?;
            run_monitor(&config, client, once).await
        }
        Command::Login { email, password } => {
            let auth_url = match &config.auth_base_url {
                Some(url) => normalize_base_url(url)?,
                None => normalize_base_url(&config.resolve_base_url(&settings))?,
            };
            let client = clients.client_for(&config.client_config(auth_url))?;

            let outcome = auth::login(client, &Credentials::new(email, password)).await;
            println!("{}", outcome.user_message());

            if outcome.is_accepted() {
                Ok(())
            } else {
                Err(MonitorError::Auth("login failed".to_string()))
            }
        }
        Command::Fan { action } => {
            let client = sensor_client(&config, &settings, &mut clients)?;
            let mut fan = FanController::new(client);

            match action {
                FanAction::Status => {
                    let state = fan.refresh().await?;
                    println!("Fan is {}", state.label());
                }
                FanAction::On | FanAction::Off => {
                    let desired = matches!(action, FanAction::On);
                    let outcome = fan.set_state(desired).await?;
                    if outcome.applied {
                        println!("Fan is {}", outcome.state.label());
                    } else {
                        println!("Fan command was not applied; fan is {}", outcome.state.label());
                    }
                }
            }
            Ok(())
        }
        Command::Photo { action } => {
            let mut images = ImageStore::open(config.images_path()).await?;

            match action {
                PhotoAction::Set { screen, sensor_id, uri } => {
                    images.save_image(&screen, &sensor_id, Some(&uri)).await?;
                    println!("Stored image for {} sensor {}", screen, sensor_id);
                }
                PhotoAction::Clear { screen, sensor_id } => {
                    images.save_image(&screen, &sensor_id, None).await?;
                    println!("Removed image for {} sensor {}", screen, sensor_id);
                }
                PhotoAction::Show { screen, sensor_id } => match images.image(&screen, &sensor_id) {
                    Some(uri) => println!("{}", uri),
                    None => println!("No image for {} sensor {}", screen, sensor_id),
                },
            }
            Ok(())
        }
        Command::Config { action } => {
            match action {
                ConfigAction::SetBaseUrl { url } => {
                    let stored = settings.set_base_url(&url).await?;
                    println!("Base URL saved: {}", stored);

                    let client = sensor_client(&config, &settings, &mut clients)?;
                    if config.base_url.is_none() && !client.test_connectivity().await {
                        warn!("Saved base URL {} did not answer", stored);
                    }
                }
                ConfigAction::Show => {
                    println!("base_url: {}", config.resolve_base_url(&settings));
                    println!("settings: {}", config.settings_path().display());
                    println!("poll_interval_ms: {}", config.poll_interval.as_millis());
                    println!("alert_threshold_percent: {}", config.alert_threshold_percent);
                    for sensor in &config.sensors {
                        println!(
                            "sensor {} ({}): baseline {} max {}",
                            sensor.id, sensor.name, sensor.baseline, sensor.max_value
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

/// Client for the resolved sensor base URL, reused while that URL is unchanged.
fn sensor_client(config: &Config, settings: &Settings, clients: &mut ClientCache) -> Result<ApiClient> {
    let base_url = normalize_base_url(&config.resolve_base_url(settings))?;
    Ok(clients.client_for(&config.client_config(base_url))?.clone())
}

async fn run_monitor(config: &Config, client: ApiClient, once: bool) -> Result<()> {
    info!(
        "Starting SentryHouse monitor v{} against {}",
        env!("CARGO_PKG_VERSION"),
        client.base_url()
    );

    if !client.test_connectivity().await {
        warn!("Sensor service connectivity test failed, but continuing anyway");
    }

    let mut monitor = SensorMonitor::new(
        config.sensors.clone(),
        Arc::new(client),
        Arc::new(TracingAlertSink),
        MonitorSettings::from(config),
    )?;

    if once {
        monitor.poll_once().await;
        println!("{}", serde_json::to_string_pretty(&*monitor.snapshot())?);
        return Ok(());
    }

    let handle = monitor.start(config.poll_interval, CancellationToken::new())?;

    let mut snapshots = handle.snapshots();
    let reporter = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            log_snapshot(&snapshot);
        }
    });

    tokio::signal::ctrl_c().await.map_err(|e| {
        MonitorError::Other(format!("Failed to wait for shutdown signal: {}", e))
    })?;

    info!("Shutting down sensor monitor");
    let monitor = handle.stop().await?;
    reporter.abort();

    info!("Sensor monitor shutdown complete after {} cycles", monitor.cycle());
    Ok(())
}

fn log_snapshot(snapshot: &MonitorSnapshot) {
    for sensor in &snapshot.sensors {
        match sensor.leak {
            Some(leak) => info!(
                cycle = snapshot.cycle,
                sensor_id = %sensor.id,
                raw = sensor.last_raw,
                leak = leak.value(),
                trend = ?sensor.trend,
                gate = ?sensor.gate,
                "Sensor reading"
            ),
            None => info!(
                cycle = snapshot.cycle,
                sensor_id = %sensor.id,
                failures = sensor.consecutive_failures,
                "No reading yet"
            ),
        }
    }
}

/// Initialize structured logging on stderr
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
