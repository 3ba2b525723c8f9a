use clap::{Parser, ValueEnum};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const QUALIFIER: &str = "com";
pub const ORGANISATION: &str = "Acroname";
pub const APPLICATION: &str = "HubTool";

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Cli {
    /// Minimum log level to print out
    #[clap(long, value_enum, default_value = "info")]
    pub log_level: LevelFilter,

    /// Location of the daemon configuration file on disk
    #[clap(long, default_value_os_t = default_config_location())]
    pub config: PathBuf,

    /// Serial number of the hub to connect to, in hex (eg. 0x0000BEEF)
    #[clap(long)]
    pub serial: Option<String>,

    /// Milliseconds to wait between the end of one poll and the start of the next
    #[clap(long)]
    pub polling_delay: Option<u64>,

    /// Don't look for hardware, poll the demo hub instead
    #[clap(long)]
    pub demo: bool,

    /// Don't write a log file, only log to the terminal
    #[clap(long)]
    pub log_file_disable: bool,
}

fn default_config_location() -> PathBuf {
    match ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION) {
        Some(proj_dirs) => proj_dirs.config_dir().join("settings.json"),
        None => PathBuf::from("settings.json"),
    }
}

#[repr(usize)]
#[derive(ValueEnum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LevelFilter {
    /// A level lower than all log levels.
    Off,
    /// Corresponds to the `Error` log level.
    Error,
    /// Corresponds to the `Warn` log level.
    Warn,
    /// Corresponds to the `Info` log level.
    Info,
    /// Corresponds to the `Debug` log level.
    Debug,
    /// Corresponds to the `Trace` log level.
    Trace,
}

impl From<LevelFilter> for log::LevelFilter {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        }
    }
}
