use hubtool_types::{
    default_name, Capabilities, DataSpeed, DeviceIdentity, HubModel, PortMode, UpstreamMode,
    UpstreamState, MAX_PORTS, SYSTEM_NAME_INDEX,
};
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    AwaitingSelection,
    Connected,
    LinkLost,
    Demo,
}

/// A snapshot of everything known about the hub. Fields are None until first read, and
/// keep their last value through an outage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubStatus {
    pub connection: ConnectionStatus,
    pub identity: Option<DeviceIdentity>,
    pub capabilities: Capabilities,
    pub system: SystemRecord,
    pub ports: Vec<PortRecord>,
    pub upstream: UpstreamRecord,
    pub downstream: DownstreamRecord,
    pub update_rate_hz: f64,
}

impl HubStatus {
    pub fn model(&self) -> HubModel {
        self.capabilities.model
    }

    pub fn port(&self, port: u8) -> Option<&PortRecord> {
        self.ports.get(port as usize)
    }

    pub fn port_mut(&mut self, port: u8) -> Option<&mut PortRecord> {
        self.ports.get_mut(port as usize)
    }

    /// Names by index, ports first, then the hub.
    pub fn name(&self, index: usize) -> Option<&str> {
        match index {
            SYSTEM_NAME_INDEX => Some(&self.system.name),
            port => self.ports.get(port).map(|p| p.name.as_str()),
        }
    }
}

impl Default for HubStatus {
    fn default() -> Self {
        Self {
            connection: Default::default(),
            identity: None,
            capabilities: Default::default(),
            system: Default::default(),
            ports: (0..MAX_PORTS).map(PortRecord::new).collect(),
            upstream: Default::default(),
            downstream: Default::default(),
            update_rate_hz: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    pub voltage_microvolts: Option<i32>,
    pub current_microamps: Option<i32>,
    pub state_bits: Option<u32>,
    pub error_bits: Option<u32>,
    pub current_limit_microamps: Option<u32>,
    pub mode: Option<PortMode>,
    pub data_speed: Option<DataSpeed>,
    pub power_enabled: Option<bool>,
    pub port_enabled: Option<bool>,
    pub name: String,
}

impl PortRecord {
    pub fn new(port: usize) -> Self {
        Self {
            voltage_microvolts: None,
            current_microamps: None,
            state_bits: None,
            error_bits: None,
            current_limit_microamps: None,
            mode: None,
            data_speed: None,
            power_enabled: None,
            port_enabled: None,
            name: default_name(port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    pub temperature_micro_celsius: Option<i32>,
    pub max_temperature_micro_celsius: Option<i32>,
    pub input_voltage_microvolts: Option<u32>,
    pub input_current_microamps: Option<u32>,
    pub led_on: Option<bool>,
    pub uptime_minutes: Option<u32>,
    pub name: String,
}

impl Default for SystemRecord {
    fn default() -> Self {
        Self {
            temperature_micro_celsius: None,
            max_temperature_micro_celsius: None,
            input_voltage_microvolts: None,
            input_current_microamps: None,
            led_on: None,
            uptime_minutes: None,
            name: default_name(SYSTEM_NAME_INDEX),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRecord {
    pub state: Option<UpstreamState>,
    pub mode: Option<UpstreamMode>,
    pub boost: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownstreamRecord {
    pub enumeration_delay_ms: Option<u32>,
    pub boost: Option<u8>,
}
