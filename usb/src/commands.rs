use strum::Display;

/// The hub's store slot holding the NAMES blob.
pub const NAME_SLOT: u8 = 10;

/// The RAM store slot the hub latches its event log into.
pub const EVENT_LOG_SLOT: u8 = 0;

/// Top level command codes on the link, these also key the entries in the NAMES blob.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum Entity {
    System,
    Usb,
}

impl Entity {
    pub fn id(&self) -> u8 {
        match self {
            Entity::System => 3,
            Entity::Usb => 18,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            3 => Some(Entity::System),
            18 => Some(Entity::Usb),
            _ => None,
        }
    }
}

/// Every value or action addressable on the hub. Reads are tagged with these so stale
/// responses for the same attribute can be drained beforehand.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Display)]
pub enum Attribute {
    // System
    SerialNumber,
    Model,
    FirmwareVersion,
    ModuleAddress,
    InputVoltage,
    InputCurrent,
    Led,
    MaxTemperature,
    Uptime,
    Save,
    Reset,
    LogEvents,

    // Temperature
    Temperature,

    // USB
    PortVoltage,
    PortCurrent,
    HubMode,
    PortState,
    PortError,
    PortCurrentLimit,
    PortMode,
    PortData,
    PortHiSpeedData,
    PortSuperSpeedData,
    PortPower,
    PortEnable,
    ClearPortError,
    UpstreamState,
    UpstreamMode,
    UpstreamBoost,
    EnumerationDelay,
    DownstreamBoost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_keys_match_entity_ids() {
        assert_eq!(Entity::System.id(), 3);
        assert_eq!(Entity::Usb.id(), 18);
        assert_eq!(Entity::from_id(18), Some(Entity::Usb));
        assert_eq!(Entity::from_id(4), None);
    }
}
