use crate::commands::Attribute;
use crate::device::base::{ExecutableHub, HubCommands};
use crate::error::HubResult;
use hubtool_types::{Store, MODEL_CODE_HUB_3P};
use log::debug;
use rand::Rng;

pub const DEMO_SERIAL: u32 = 0xDEAD0123;
pub const DEMO_FIRMWARE: u32 = 0xABCD1234;

/// Stands in for a hub when none is attached, fabricating values within the ranges a real
/// USBHub3+ reports so everything above the client can run without hardware.
#[derive(Debug, Default)]
pub struct DemoHub;

impl DemoHub {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutableHub for DemoHub {
    fn drain(&mut self, _attribute: Attribute) {}

    fn read_value(&mut self, attribute: Attribute, _index: Option<u8>) -> HubResult<u32> {
        let mut rng = rand::thread_rng();

        let value = match attribute {
            Attribute::SerialNumber => DEMO_SERIAL,
            Attribute::Model => MODEL_CODE_HUB_3P as u32,
            Attribute::FirmwareVersion => DEMO_FIRMWARE,
            Attribute::ModuleAddress => 0,

            Attribute::PortVoltage => 4_500_000 + rng.gen_range(0..1_000_000),
            Attribute::PortCurrent => rng.gen_range(0..2_900_000),
            Attribute::HubMode | Attribute::PortState => rng.gen(),
            Attribute::PortError => 0,
            Attribute::PortCurrentLimit => rng.gen_range(0..2_500_000),
            Attribute::PortMode | Attribute::Led => rng.gen_range(0..2),

            Attribute::Temperature => rng.gen_range(0..150_000_000),
            Attribute::MaxTemperature => 150_000_000,
            Attribute::InputVoltage => rng.gen_range(0..24_000_000),
            Attribute::InputCurrent => rng.gen_range(0..10_000_000),
            Attribute::Uptime => rng.gen_range(0..60),

            Attribute::UpstreamState | Attribute::UpstreamMode => rng.gen_range(0..2),
            Attribute::UpstreamBoost | Attribute::DownstreamBoost => rng.gen_range(0..3),
            Attribute::EnumerationDelay => rng.gen_range(0..10) * 100,

            // Write only, nothing sensible to report.
            _ => 0,
        };
        Ok(value)
    }

    fn write_value(&mut self, attribute: Attribute, index: Option<u8>, value: u32) -> HubResult<()> {
        debug!("Demo hub ignoring write of {value} to {attribute} ({index:?})");
        Ok(())
    }

    // The demo hub has no stored names or events.
    fn slot_size(&mut self, _store: Store, _slot: u8) -> HubResult<usize> {
        Ok(0)
    }

    fn unload_slot(&mut self, _store: Store, _slot: u8, _length: usize) -> HubResult<Vec<u8>> {
        Ok(vec![])
    }

    fn load_slot(&mut self, _store: Store, _slot: u8, _data: &[u8]) -> HubResult<()> {
        Ok(())
    }
}

impl HubCommands for DemoHub {}
