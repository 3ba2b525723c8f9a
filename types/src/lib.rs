use enumset::{EnumSet, EnumSetType};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;
use strum::{Display, EnumIter};

pub const MODEL_CODE_HUB_2X4: u8 = 17;
pub const MODEL_CODE_HUB_3P: u8 = 19;

/// Firmware builds at or above this packed version expose the per-port state and error
/// registers, the temperature entity, and (on the Hub3+) uptime and max temperature.
pub const FIRMWARE_FEATURE_FLOOR: u32 = 0x2500_0000;

/// Anything hotter than this is displayed as this.
pub const MAX_DISPLAY_TEMPERATURE: i32 = 200_000_000;

pub const MAX_PORTS: usize = 8;

/// Names are indexed 0..=7 for ports, and this index for the hub itself.
pub const SYSTEM_NAME_INDEX: usize = 8;

#[derive(Copy, Clone, Debug, Display, EnumIter, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HubModel {
    #[strum(to_string = "USBHub2x4")]
    Hub2x4,
    #[strum(to_string = "USBHub3+")]
    Hub3Plus,
    Unknown,
}

impl HubModel {
    pub fn from_code(code: u8) -> Self {
        match code {
            MODEL_CODE_HUB_2X4 => HubModel::Hub2x4,
            MODEL_CODE_HUB_3P => HubModel::Hub3Plus,
            _ => HubModel::Unknown,
        }
    }

    pub fn code(&self) -> Option<u8> {
        match self {
            HubModel::Hub2x4 => Some(MODEL_CODE_HUB_2X4),
            HubModel::Hub3Plus => Some(MODEL_CODE_HUB_3P),
            HubModel::Unknown => None,
        }
    }

    pub fn port_count(&self) -> u8 {
        match self {
            HubModel::Hub2x4 => 4,
            HubModel::Hub3Plus => 8,
            HubModel::Unknown => 0,
        }
    }
}

#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FirmwareVersion(pub u32);

impl FirmwareVersion {
    pub fn major(&self) -> u32 {
        self.0 >> 28
    }

    pub fn minor(&self) -> u32 {
        (self.0 & 0x0F00_0000) >> 24
    }

    pub fn patch(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub fn meets_feature_floor(&self) -> bool {
        self.0 >= FIRMWARE_FEATURE_FLOOR
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

impl std::fmt::Debug for FirmwareVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#010x})", self, self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceIdentity {
    pub serial_number: u32,
    pub model: HubModel,
    pub firmware: FirmwareVersion,
    pub module_address: u8,
}

/// Optional hardware features, only some of which exist on a given model / firmware pair.
#[derive(Debug, Display, EnumSetType)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Feature {
    PortRegisters,
    Temperature,
    MaxTemperature,
    Uptime,
    InputCurrent,
    EventLog,
    SplitDataSpeed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Capabilities {
    pub model: HubModel,
    pub port_count: u8,
    pub features: EnumSet<Feature>,
}

impl Capabilities {
    /// What we know before the firmware version has been read.
    pub fn for_model(model: HubModel) -> Self {
        let mut features = EnumSet::empty();
        if model == HubModel::Hub3Plus {
            features |= Feature::InputCurrent | Feature::EventLog | Feature::SplitDataSpeed;
        }

        Self {
            model,
            port_count: model.port_count(),
            features,
        }
    }

    pub fn resolve(model: HubModel, firmware: FirmwareVersion) -> Self {
        let mut capabilities = Self::for_model(model);
        if firmware.meets_feature_floor() {
            capabilities.features |= Feature::PortRegisters | Feature::Temperature;
            if model == HubModel::Hub3Plus {
                capabilities.features |= Feature::MaxTemperature | Feature::Uptime;
            }
        }
        capabilities
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    pub fn has_port(&self, port: u8) -> bool {
        port < self.port_count
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::for_model(HubModel::Unknown)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PortMode {
    Sdp,
    Cdp,
    Unknown(u8),
}

impl PortMode {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => PortMode::Sdp,
            1 => PortMode::Cdp,
            other => PortMode::Unknown(other),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            PortMode::Sdp => 0,
            PortMode::Cdp => 1,
            PortMode::Unknown(raw) => *raw,
        }
    }
}

#[derive(Copy, Clone, Debug, Display, EnumIter, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataSpeed {
    None,
    HiSpeedOnly,
    SuperSpeedOnly,
    HiSpeedPlusSuperSpeed,
}

/// The speed a device is actually attached at, as reported in the port state register.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LinkSpeed {
    HiSpeed,
    SuperSpeed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UpstreamState {
    Port0,
    Port1,
    None,
    Unknown(u8),
}

impl UpstreamState {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => UpstreamState::Port0,
            1 => UpstreamState::Port1,
            2 => UpstreamState::None,
            other => UpstreamState::Unknown(other),
        }
    }
}

impl std::fmt::Display for UpstreamState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamState::Port0 => write!(f, "Port 0"),
            UpstreamState::Port1 => write!(f, "Port 1"),
            UpstreamState::None => write!(f, "None"),
            UpstreamState::Unknown(_) => write!(f, "Unknown"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UpstreamMode {
    Port0,
    Port1,
    Auto,
    None,
    Unknown(u8),
}

impl UpstreamMode {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => UpstreamMode::Port0,
            1 => UpstreamMode::Port1,
            2 => UpstreamMode::Auto,
            255 => UpstreamMode::None,
            other => UpstreamMode::Unknown(other),
        }
    }

    pub fn raw(&self) -> u8 {
        match self {
            UpstreamMode::Port0 => 0,
            UpstreamMode::Port1 => 1,
            UpstreamMode::Auto => 2,
            UpstreamMode::None => 255,
            UpstreamMode::Unknown(raw) => *raw,
        }
    }
}

impl std::fmt::Display for UpstreamMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamMode::Port0 => write!(f, "Port 0"),
            UpstreamMode::Port1 => write!(f, "Port 1"),
            UpstreamMode::Auto => write!(f, "Auto"),
            UpstreamMode::None => write!(f, "None"),
            UpstreamMode::Unknown(_) => write!(f, "Unknown"),
        }
    }
}

/// Nonvolatile (internal) or volatile (RAM) store on the hub.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Store {
    Internal,
    Ram,
}

#[derive(Debug, EnumSetType)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PortStateFlag {
    Attached,
    ConstantCurrent,
    Error,
    HiSpeedLink,
    SuperSpeedLink,
}

impl PortStateFlag {
    pub fn bit(&self) -> u32 {
        match self {
            PortStateFlag::Attached => 23,
            PortStateFlag::ConstantCurrent => 21,
            PortStateFlag::Error => 19,
            PortStateFlag::HiSpeedLink => 11,
            PortStateFlag::SuperSpeedLink => 12,
        }
    }

    /// Short tag shown next to the port, speed bits are shown elsewhere so have none.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            PortStateFlag::Attached => Some("ATT"),
            PortStateFlag::ConstantCurrent => Some("CC"),
            PortStateFlag::Error => Some("ERR"),
            PortStateFlag::HiSpeedLink | PortStateFlag::SuperSpeedLink => None,
        }
    }

    pub fn decode(bits: u32) -> EnumSet<PortStateFlag> {
        EnumSet::<PortStateFlag>::all()
            .iter()
            .filter(|flag| bits & (1 << flag.bit()) != 0)
            .collect()
    }

    pub fn describe(flags: EnumSet<PortStateFlag>) -> String {
        // Order matters here, it's what users are used to reading.
        [
            PortStateFlag::Attached,
            PortStateFlag::ConstantCurrent,
            PortStateFlag::Error,
        ]
        .iter()
        .filter(|flag| flags.contains(**flag))
        .filter_map(|flag| flag.label())
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn link_speed(flags: EnumSet<PortStateFlag>) -> Option<LinkSpeed> {
        if !flags.contains(PortStateFlag::Attached) {
            return None;
        }
        if flags.contains(PortStateFlag::SuperSpeedLink) {
            return Some(LinkSpeed::SuperSpeed);
        }
        if flags.contains(PortStateFlag::HiSpeedLink) {
            return Some(LinkSpeed::HiSpeed);
        }
        None
    }
}

#[derive(Debug, EnumSetType)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PortErrorFlag {
    OverCurrent,
    BackDrive,
    OverVoltage,
    Discharge,
}

impl PortErrorFlag {
    pub fn bit(&self) -> u32 {
        match self {
            PortErrorFlag::OverCurrent => 0,
            PortErrorFlag::BackDrive => 1,
            PortErrorFlag::OverVoltage => 2,
            PortErrorFlag::Discharge => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PortErrorFlag::OverCurrent => "OVER_ILIM",
            PortErrorFlag::BackDrive => "BACK_VOLT",
            PortErrorFlag::OverVoltage => "OVER_VOLT",
            PortErrorFlag::Discharge => "DISCHARGE_ERR",
        }
    }

    pub fn decode(bits: u32) -> EnumSet<PortErrorFlag> {
        EnumSet::<PortErrorFlag>::all()
            .iter()
            .filter(|flag| bits & (1 << flag.bit()) != 0)
            .collect()
    }

    pub fn describe(flags: EnumSet<PortErrorFlag>) -> String {
        flags
            .iter()
            .map(|flag| flag.label())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A single port's slice of the hub mode register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortModeBits {
    pub power_enabled: bool,
    pub data_speed: DataSpeed,
    pub port_enabled: bool,
}

impl PortModeBits {
    // Each port owns two bits in the low half (HiSpeed, Power) and one in the high half
    // (SuperSpeed), so everything is shifted by twice the port number.
    const HI_SPEED: u32 = 0x0000_0001;
    const POWER: u32 = 0x0000_0002;
    const SUPER_SPEED: u32 = 0x0001_0000;

    pub fn decode(hub_mode: u32, model: HubModel, port: u8) -> Self {
        let shifted = hub_mode >> (port as u32 * 2);
        let hi_speed = shifted & Self::HI_SPEED != 0;
        let super_speed = shifted & Self::SUPER_SPEED != 0;
        let power_enabled = shifted & Self::POWER != 0;

        let data_speed = match (hi_speed, super_speed) {
            (true, true) => DataSpeed::HiSpeedPlusSuperSpeed,
            (false, true) => DataSpeed::SuperSpeedOnly,
            (true, false) => DataSpeed::HiSpeedOnly,
            (false, false) => DataSpeed::None,
        };

        let enabled_mask = match model {
            HubModel::Hub2x4 => Self::POWER | Self::HI_SPEED,
            _ => Self::POWER | Self::HI_SPEED | Self::SUPER_SPEED,
        };

        Self {
            power_enabled,
            data_speed,
            port_enabled: shifted & enabled_mask == enabled_mask,
        }
    }
}

pub const DEFAULT_HUB_NAME: &str = "My Acroname Hub";

/// The name shown for a port (or the hub) until the user sets one.
pub fn default_name(index: usize) -> String {
    match index {
        SYSTEM_NAME_INDEX => String::from(DEFAULT_HUB_NAME),
        port => format!("Port {port}"),
    }
}

pub fn format_serial(serial: u32) -> String {
    format!("0x{serial:08X}")
}

pub fn parse_serial(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).ok()
}

pub fn clamp_temperature(micro_celsius: i32) -> i32 {
    micro_celsius.min(MAX_DISPLAY_TEMPERATURE)
}

pub fn format_temperature(micro_celsius: i32, max_micro_celsius: Option<i32>) -> String {
    let current = clamp_temperature(micro_celsius) as f64 / 1.0e6;
    match max_micro_celsius {
        Some(max) => {
            let max = clamp_temperature(max) as f64 / 1.0e6;
            format!("{current:.1}˚C (max: {max:.1}˚C)")
        }
        None => format!("{current:.1}˚C"),
    }
}

pub fn format_uptime(minutes: Option<u32>) -> String {
    match minutes {
        Some(minutes) => format!("{}h{}m", minutes / 60, minutes % 60),
        None => String::from("Not Supported"),
    }
}
