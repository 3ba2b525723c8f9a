use crate::commands::Attribute;
use crate::error::{ConnectError, HubError, HubResult};
use hubtool_types::{format_serial, HubModel, PortMode, Store, UpstreamMode};

// This is a basic SuperTrait which defines all the 'Parts' of a hub client.
pub trait FullHubClient: AttachHub + HubCommands + Send {}

pub trait AttachHub {
    /// Every device visible on the link, recognised or not.
    fn discover(&mut self) -> Vec<HubDescriptor>;

    fn connect(&mut self, descriptor: &HubDescriptor) -> Result<(), ConnectError>;
    fn disconnect(&mut self);
    fn reconnect(&mut self) -> HubResult<()>;
    fn is_connected(&mut self) -> bool;
    fn link_descriptor(&mut self) -> HubResult<LinkDescriptor>;
}

pub trait ExecutableHub {
    /// Discards any unsolicited packets still queued for this attribute.
    fn drain(&mut self, attribute: Attribute);

    fn read_value(&mut self, attribute: Attribute, index: Option<u8>) -> HubResult<u32>;
    fn write_value(&mut self, attribute: Attribute, index: Option<u8>, value: u32)
        -> HubResult<()>;

    fn slot_size(&mut self, store: Store, slot: u8) -> HubResult<usize>;
    fn unload_slot(&mut self, store: Store, slot: u8, length: usize) -> HubResult<Vec<u8>>;
    fn load_slot(&mut self, store: Store, slot: u8, data: &[u8]) -> HubResult<()>;
}

// These are commands that can be executed, but the raw reads and writes must be implemented..
pub trait HubCommands: ExecutableHub {
    fn get_serial_number(&mut self) -> HubResult<u32> {
        self.read_value(Attribute::SerialNumber, None)
    }

    fn get_model(&mut self) -> HubResult<u8> {
        narrow(self.read_value(Attribute::Model, None)?)
    }

    fn get_firmware_version(&mut self) -> HubResult<u32> {
        self.read_value(Attribute::FirmwareVersion, None)
    }

    fn get_module_address(&mut self) -> HubResult<u8> {
        narrow(self.read_value(Attribute::ModuleAddress, None)?)
    }

    fn get_temperature(&mut self) -> HubResult<i32> {
        Ok(self.read_value(Attribute::Temperature, None)? as i32)
    }

    fn get_max_temperature(&mut self) -> HubResult<i32> {
        Ok(self.read_value(Attribute::MaxTemperature, None)? as i32)
    }

    fn get_input_voltage(&mut self) -> HubResult<u32> {
        self.read_value(Attribute::InputVoltage, None)
    }

    fn get_input_current(&mut self) -> HubResult<u32> {
        self.read_value(Attribute::InputCurrent, None)
    }

    fn get_led(&mut self) -> HubResult<bool> {
        Ok(self.read_value(Attribute::Led, None)? != 0)
    }

    fn set_led(&mut self, enabled: bool) -> HubResult<()> {
        self.write_value(Attribute::Led, None, u32::from(enabled))
    }

    fn get_uptime(&mut self) -> HubResult<u32> {
        self.read_value(Attribute::Uptime, None)
    }

    fn save(&mut self) -> HubResult<()> {
        self.write_value(Attribute::Save, None, 0)
    }

    fn reset(&mut self) -> HubResult<()> {
        self.write_value(Attribute::Reset, None, 0)
    }

    /// Latches the hub's event log into the RAM store.
    fn log_events(&mut self) -> HubResult<()> {
        self.write_value(Attribute::LogEvents, None, 0)
    }

    fn get_port_voltage(&mut self, port: u8) -> HubResult<i32> {
        Ok(self.read_value(Attribute::PortVoltage, Some(port))? as i32)
    }

    fn get_port_current(&mut self, port: u8) -> HubResult<i32> {
        Ok(self.read_value(Attribute::PortCurrent, Some(port))? as i32)
    }

    fn get_hub_mode(&mut self) -> HubResult<u32> {
        self.read_value(Attribute::HubMode, None)
    }

    fn get_port_state(&mut self, port: u8) -> HubResult<u32> {
        self.read_value(Attribute::PortState, Some(port))
    }

    fn get_port_error(&mut self, port: u8) -> HubResult<u32> {
        self.read_value(Attribute::PortError, Some(port))
    }

    fn clear_port_error(&mut self, port: u8) -> HubResult<()> {
        self.write_value(Attribute::ClearPortError, Some(port), 0)
    }

    fn get_port_current_limit(&mut self, port: u8) -> HubResult<u32> {
        self.read_value(Attribute::PortCurrentLimit, Some(port))
    }

    fn set_port_current_limit(&mut self, port: u8, microamps: u32) -> HubResult<()> {
        self.write_value(Attribute::PortCurrentLimit, Some(port), microamps)
    }

    fn get_port_mode(&mut self, port: u8) -> HubResult<u8> {
        narrow(self.read_value(Attribute::PortMode, Some(port))?)
    }

    fn set_port_mode(&mut self, port: u8, mode: PortMode) -> HubResult<()> {
        self.write_value(Attribute::PortMode, Some(port), mode.raw() as u32)
    }

    fn set_port_data(&mut self, port: u8, enabled: bool) -> HubResult<()> {
        self.write_value(Attribute::PortData, Some(port), u32::from(enabled))
    }

    fn set_port_hi_speed_data(&mut self, port: u8, enabled: bool) -> HubResult<()> {
        self.write_value(Attribute::PortHiSpeedData, Some(port), u32::from(enabled))
    }

    fn set_port_super_speed_data(&mut self, port: u8, enabled: bool) -> HubResult<()> {
        self.write_value(Attribute::PortSuperSpeedData, Some(port), u32::from(enabled))
    }

    fn set_port_power(&mut self, port: u8, enabled: bool) -> HubResult<()> {
        self.write_value(Attribute::PortPower, Some(port), u32::from(enabled))
    }

    fn set_port_enabled(&mut self, port: u8, enabled: bool) -> HubResult<()> {
        self.write_value(Attribute::PortEnable, Some(port), u32::from(enabled))
    }

    fn get_upstream_state(&mut self) -> HubResult<u8> {
        narrow(self.read_value(Attribute::UpstreamState, None)?)
    }

    fn get_upstream_mode(&mut self) -> HubResult<u8> {
        narrow(self.read_value(Attribute::UpstreamMode, None)?)
    }

    fn set_upstream_mode(&mut self, mode: UpstreamMode) -> HubResult<()> {
        self.write_value(Attribute::UpstreamMode, None, mode.raw() as u32)
    }

    fn get_upstream_boost(&mut self) -> HubResult<u8> {
        narrow(self.read_value(Attribute::UpstreamBoost, None)?)
    }

    fn set_upstream_boost(&mut self, boost: u8) -> HubResult<()> {
        self.write_value(Attribute::UpstreamBoost, None, boost as u32)
    }

    fn get_enumeration_delay(&mut self) -> HubResult<u32> {
        self.read_value(Attribute::EnumerationDelay, None)
    }

    fn set_enumeration_delay(&mut self, delay_ms: u32) -> HubResult<()> {
        self.write_value(Attribute::EnumerationDelay, None, delay_ms)
    }

    fn get_downstream_boost(&mut self) -> HubResult<u8> {
        narrow(self.read_value(Attribute::DownstreamBoost, None)?)
    }

    fn set_downstream_boost(&mut self, boost: u8) -> HubResult<()> {
        self.write_value(Attribute::DownstreamBoost, None, boost as u32)
    }
}

// Byte sized registers arrive in a u32, anything wider is a bad response.
fn narrow(value: u32) -> HubResult<u8> {
    u8::try_from(value).map_err(|_| HubError::Parameter)
}

/// A device found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubDescriptor {
    pub(crate) serial_number: u32,
    pub(crate) model_code: u8,
}

impl HubDescriptor {
    pub fn new(serial_number: u32, model_code: u8) -> Self {
        Self {
            serial_number,
            model_code,
        }
    }

    pub fn serial_number(&self) -> u32 {
        self.serial_number
    }

    pub fn model(&self) -> HubModel {
        HubModel::from_code(self.model_code)
    }

    /// The string a user picks this device by.
    pub fn identifier(&self) -> String {
        format_serial(self.serial_number)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkType {
    Invalid,
    Usb,
}

/// What the transport currently believes it is (or was) linked to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LinkDescriptor {
    pub link_type: LinkType,
    pub serial_number: u32,
}

impl LinkDescriptor {
    pub fn invalid() -> Self {
        Self {
            link_type: LinkType::Invalid,
            serial_number: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.link_type != LinkType::Invalid
    }
}
