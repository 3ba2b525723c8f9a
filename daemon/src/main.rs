use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use hubtool_types::parse_serial;
use log::{info, warn};
use simplelog::{
    ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger,
};
use tokio::sync::{broadcast, mpsc};
use tokio::{join, signal};

use crate::cli::{Cli, APPLICATION, ORGANISATION, QUALIFIER};
use crate::device::{clamp_polling_delay, Device};
use crate::events::spawn_event_handler;
use crate::primary_worker::spawn_hub_handler;
use crate::settings::SettingsHandle;
use crate::shutdown::Shutdown;

mod cache;
mod cli;
mod device;
mod event_log;
mod events;
mod limits;
mod names;
mod primary_worker;
mod session;
mod settings;
mod shutdown;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const LOG_FILE_COUNT: usize = 5;
const LOG_FILE_SIZE: usize = 2 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();
    let level = log::LevelFilter::from(args.log_level);

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    let mut log_file_error = None;
    if !args.log_file_disable {
        match ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION) {
            Some(proj_dirs) => {
                let log_path = proj_dirs.data_local_dir().join("logs").join("hubtool.log");
                let file = FileRotate::new(
                    log_path,
                    AppendCount::new(LOG_FILE_COUNT),
                    ContentLimit::Bytes(LOG_FILE_SIZE),
                    Compression::None,
                    #[cfg(unix)]
                    None,
                );
                loggers.push(WriteLogger::new(level, Config::default(), file));
            }
            None => log_file_error = Some("Unable to locate a directory for the log file"),
        }
    }

    CombinedLogger::init(loggers).context("Could not configure the logger")?;
    log_panics::init();

    if let Some(error) = log_file_error {
        warn!("{}", error);
    }

    info!("Starting HubTool Daemon v{}", VERSION);
    let settings = SettingsHandle::load(args.config).await?;

    let mut target = None;
    if let Some(serial) = &args.serial {
        match parse_serial(serial) {
            Some(parsed) => {
                target = Some(parsed);
                settings.set_preferred_serial(Some(serial.clone())).await;
                settings.save().await;
            }
            None => warn!("Ignoring invalid serial number: {}", serial),
        }
    }

    let polling_delay = match args.polling_delay {
        Some(delay) => delay,
        None => settings.get_polling_delay().await,
    };
    let polling_delay = clamp_polling_delay(polling_delay);
    info!("Polling every {}ms", polling_delay.as_millis());

    let mut shutdown = Shutdown::new();

    // Single producer (the hub worker), any number of consumers.
    let capacity = settings.get_event_buffer().await.max(1);
    let (broadcast_tx, broadcast_rx) = broadcast::channel(capacity);

    let (device_tx, device_rx) = mpsc::channel(32);
    let device = Device::new(
        hubtool_usb::open_transport(),
        target,
        args.demo,
        polling_delay,
    );
    let hub_handle = tokio::spawn(spawn_hub_handler(
        device_rx,
        broadcast_tx.clone(),
        shutdown.clone(),
        device,
    ));

    let event_handle = tokio::spawn(spawn_event_handler(
        broadcast_rx,
        device_tx,
        settings.get_preferred_serial().await,
        shutdown.clone(),
    ));

    // Setup Ctrl+C Monitoring..
    tokio::spawn(await_ctrl_c(shutdown.clone()));

    shutdown.recv().await;
    info!("Shutting down daemon");

    let _ = join!(hub_handle, event_handle);
    Ok(())
}

async fn await_ctrl_c(shutdown: Shutdown) {
    if signal::ctrl_c().await.is_ok() {
        shutdown.trigger();
    }
}
