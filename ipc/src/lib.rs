use serde::{Deserialize, Serialize};

mod device;

pub use device::*;
use hubtool_types::{
    DataSpeed, DeviceIdentity, HubModel, LinkSpeed, PortMode, PortModeBits, UpstreamMode,
    UpstreamState,
};

/// User intent, sent from the presentation layer to the daemon's worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubCommand {
    // Connection
    SelectDevice(String),
    SetPollingDelay(u64),

    // System
    SetLed(bool),
    SaveState,
    ResetDevice,
    FetchEventLog,
    RenameHub(String),

    // Ports
    SetPortPower(u8, bool),
    SetPortData(u8, bool),
    SetPortHiSpeedData(u8, bool),
    SetPortSuperSpeedData(u8, bool),
    SetPortEnabled(u8, bool),
    SetPortMode(u8, PortMode),
    SetPortCurrentLimit(u8, u32),
    ClearPortError(u8),
    ClearAllPortErrors,
    RenamePort(u8, String),

    // Upstream
    SetUpstreamMode(UpstreamMode),
    SetUpstreamBoost(u8),

    // Downstream
    SetEnumerationDelay(u32),
    SetDownstreamBoost(u8),
}

/// Changes observed on (or requested of) the hub, in the order they were detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubEvent {
    IdentityChanged(DeviceIdentity),

    // Per port, the metrics are reported every cycle regardless of change.
    PortMetricsChanged {
        port: u8,
        microvolts: i32,
        microamps: i32,
    },
    PortStateChanged {
        port: u8,
        bits: u32,
        description: String,
        speed: Option<LinkSpeed>,
    },
    PortErrorChanged {
        port: u8,
        bits: u32,
        description: String,
    },
    PortLimitChanged {
        port: u8,
        microamps: u32,
    },
    PortModeChanged {
        port: u8,
        mode: PortMode,
    },
    HubModeChanged {
        bits: u32,
        ports: Vec<PortModeBits>,
    },

    TemperatureChanged {
        micro_celsius: i32,
        max_micro_celsius: Option<i32>,
        display: String,
    },
    InputPowerChanged {
        microvolts: u32,
        microamps: Option<u32>,
    },
    LedChanged(bool),
    UpstreamChanged(UpstreamChange),
    DownstreamChanged(DownstreamChange),
    UptimeChanged(Option<u32>),
    NameChanged {
        index: usize,
        name: String,
    },

    LogLine(String),
    ReconnectNeeded(Vec<String>),
    PollCompleted,
    LayoutChanged {
        model: HubModel,
        port_count: u8,
    },
    ConnectionChanged(ConnectionStatus),
    DataSpeedRequested {
        port: u8,
        speed: DataSpeed,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpstreamChange {
    State(UpstreamState),
    Mode(UpstreamMode),
    Boost(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownstreamChange {
    EnumerationDelay(u32),
    Boost(u8),
}
