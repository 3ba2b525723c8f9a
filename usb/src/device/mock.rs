use crate::commands::Attribute;
use crate::device::base::{
    AttachHub, ExecutableHub, FullHubClient, HubCommands, HubDescriptor, LinkDescriptor, LinkType,
};
use crate::error::{ConnectError, HubError, HubResult};
use hubtool_types::{HubModel, Store};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Everything the mock was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Discover,
    Connect(u32),
    Disconnect,
    Reconnect,
    Drain(Attribute),
    Read(Attribute, Option<u8>),
    Write(Attribute, Option<u8>, u32),
    SlotSize(Store, u8),
    UnloadSlot(Store, u8),
    LoadSlot(Store, u8, Vec<u8>),
}

#[derive(Debug)]
pub struct MockState {
    pub devices: Vec<HubDescriptor>,
    pub connected: bool,
    pub link: LinkDescriptor,
    pub connect_fails: bool,
    pub reconnect_succeeds: bool,
    pub values: HashMap<(Attribute, Option<u8>), u32>,
    pub failures: HashMap<Attribute, HubError>,
    pub slots: HashMap<(Store, u8), Vec<u8>>,
    pub journal: Vec<Call>,
}

/// A scripted, in-memory hub. Clones share state, so a test can keep a handle to a mock
/// it has boxed up and handed to a session.
#[derive(Debug, Clone)]
pub struct MockHub {
    state: Arc<Mutex<MockState>>,
}

impl MockHub {
    /// A mock with nothing attached.
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                devices: vec![],
                connected: false,
                link: LinkDescriptor::invalid(),
                connect_fails: false,
                reconnect_succeeds: true,
                values: HashMap::new(),
                failures: HashMap::new(),
                slots: HashMap::new(),
                journal: vec![],
            })),
        }
    }

    /// A single discoverable hub of the given model, on current firmware.
    pub fn new(model: HubModel, serial_number: u32) -> Self {
        let hub = Self::empty();
        let code = model.code().unwrap_or(0);
        {
            let mut state = hub.state();
            state.devices.push(HubDescriptor::new(serial_number, code));
            state.values.insert((Attribute::SerialNumber, None), serial_number);
            state.values.insert((Attribute::Model, None), code as u32);
            state.values.insert((Attribute::FirmwareVersion, None), 0x2600_0000);
            state.values.insert((Attribute::ModuleAddress, None), 6);
        }
        hub
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread shouldn't hide the journal from the rest of the test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_device(&self, serial_number: u32, model: HubModel) {
        let code = model.code().unwrap_or(0);
        self.state()
            .devices
            .push(HubDescriptor::new(serial_number, code));
    }

    pub fn set_value(&self, attribute: Attribute, index: Option<u8>, value: u32) {
        self.state().values.insert((attribute, index), value);
    }

    pub fn fail(&self, attribute: Attribute, error: HubError) {
        self.state().failures.insert(attribute, error);
    }

    pub fn recover(&self, attribute: Attribute) {
        self.state().failures.remove(&attribute);
    }

    pub fn set_slot(&self, store: Store, slot: u8, data: &[u8]) {
        self.state().slots.insert((store, slot), data.to_vec());
    }

    pub fn slot(&self, store: Store, slot: u8) -> Option<Vec<u8>> {
        self.state().slots.get(&(store, slot)).cloned()
    }

    /// Simulates the link dropping (or returning) underneath an established connection.
    pub fn set_link_up(&self, up: bool) {
        self.state().connected = up;
    }

    pub fn set_reconnect_succeeds(&self, succeeds: bool) {
        self.state().reconnect_succeeds = succeeds;
    }

    pub fn set_connect_fails(&self, fails: bool) {
        self.state().connect_fails = fails;
    }

    pub fn journal(&self) -> Vec<Call> {
        self.state().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    pub fn count(&self, call: &Call) -> usize {
        self.state().journal.iter().filter(|c| *c == call).count()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.state()
            .journal
            .iter()
            .filter(|c| matches!(c, Call::Write(..) | Call::LoadSlot(..)))
            .cloned()
            .collect()
    }

    fn record(&self, call: Call) {
        self.state().journal.push(call);
    }

    fn check(&self, attribute: Attribute) -> HubResult<()> {
        if let Some(error) = self.state().failures.get(&attribute) {
            return Err(*error);
        }
        self.check_link()
    }

    fn check_link(&self) -> HubResult<()> {
        match self.state().connected {
            true => Ok(()),
            false => Err(HubError::NotConnected),
        }
    }
}

impl AttachHub for MockHub {
    fn discover(&mut self) -> Vec<HubDescriptor> {
        self.record(Call::Discover);
        self.state().devices.clone()
    }

    fn connect(&mut self, descriptor: &HubDescriptor) -> Result<(), ConnectError> {
        self.record(Call::Connect(descriptor.serial_number()));
        let mut state = self.state();
        if state.connect_fails {
            return Err(ConnectError::Link(HubError::Io));
        }
        if !state.devices.contains(descriptor) {
            return Err(ConnectError::DeviceNotFound);
        }
        state.connected = true;
        state.link = LinkDescriptor {
            link_type: LinkType::Usb,
            serial_number: descriptor.serial_number(),
        };
        Ok(())
    }

    fn disconnect(&mut self) {
        self.record(Call::Disconnect);
        self.state().connected = false;
    }

    fn reconnect(&mut self) -> HubResult<()> {
        self.record(Call::Reconnect);
        let mut state = self.state();
        if !state.link.is_valid() || !state.reconnect_succeeds {
            return Err(HubError::Io);
        }
        state.connected = true;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.state().connected
    }

    fn link_descriptor(&mut self) -> HubResult<LinkDescriptor> {
        Ok(self.state().link)
    }
}

impl ExecutableHub for MockHub {
    fn drain(&mut self, attribute: Attribute) {
        self.record(Call::Drain(attribute));
    }

    fn read_value(&mut self, attribute: Attribute, index: Option<u8>) -> HubResult<u32> {
        self.record(Call::Read(attribute, index));
        self.check(attribute)?;
        Ok(self
            .state()
            .values
            .get(&(attribute, index))
            .copied()
            .unwrap_or_default())
    }

    fn write_value(&mut self, attribute: Attribute, index: Option<u8>, value: u32) -> HubResult<()> {
        self.record(Call::Write(attribute, index, value));
        self.check(attribute)?;
        self.state().values.insert((attribute, index), value);
        Ok(())
    }

    fn slot_size(&mut self, store: Store, slot: u8) -> HubResult<usize> {
        self.record(Call::SlotSize(store, slot));
        self.check_link()?;
        Ok(self.slot(store, slot).map(|data| data.len()).unwrap_or(0))
    }

    fn unload_slot(&mut self, store: Store, slot: u8, length: usize) -> HubResult<Vec<u8>> {
        self.record(Call::UnloadSlot(store, slot));
        self.check_link()?;
        let mut data = self.slot(store, slot).unwrap_or_default();
        data.truncate(length);
        Ok(data)
    }

    fn load_slot(&mut self, store: Store, slot: u8, data: &[u8]) -> HubResult<()> {
        self.record(Call::LoadSlot(store, slot, data.to_vec()));
        self.check_link()?;
        self.set_slot(store, slot, data);
        Ok(())
    }
}

impl HubCommands for MockHub {}
impl FullHubClient for MockHub {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_journal() {
        let hub = MockHub::new(HubModel::Hub2x4, 0x1234);
        let mut client: Box<dyn FullHubClient> = Box::new(hub.clone());

        let found = client.discover();
        assert_eq!(found.len(), 1);
        client.connect(&found[0]).unwrap();
        client.drain(Attribute::SerialNumber);
        assert_eq!(client.get_serial_number(), Ok(0x1234));

        assert_eq!(
            hub.journal(),
            vec![
                Call::Discover,
                Call::Connect(0x1234),
                Call::Drain(Attribute::SerialNumber),
                Call::Read(Attribute::SerialNumber, None),
            ]
        );
    }

    #[test]
    fn reads_fail_once_the_link_drops() {
        let hub = MockHub::new(HubModel::Hub3Plus, 1);
        let mut client = hub.clone();
        let found = client.discover();
        client.connect(&found[0]).unwrap();

        hub.set_link_up(false);
        assert_eq!(client.get_hub_mode(), Err(HubError::NotConnected));
        assert!(client.link_descriptor().unwrap().is_valid());

        client.reconnect().unwrap();
        assert!(client.is_connected());
    }

    #[test]
    fn oversized_byte_registers_are_refused() {
        let hub = MockHub::new(HubModel::Hub3Plus, 1);
        let mut client = hub.clone();
        let found = client.discover();
        client.connect(&found[0]).unwrap();

        hub.set_value(Attribute::UpstreamBoost, None, 0x100);
        assert_eq!(client.get_upstream_boost(), Err(HubError::Parameter));

        hub.set_value(Attribute::UpstreamMode, None, 255);
        assert_eq!(client.get_upstream_mode(), Ok(255));
    }

    #[test]
    fn slots_read_back_what_was_stored() {
        let hub = MockHub::new(HubModel::Hub3Plus, 1);
        let mut client = hub.clone();
        let found = client.discover();
        client.connect(&found[0]).unwrap();

        hub.set_slot(Store::Internal, 10, b"NAMES\n");
        let size = client.slot_size(Store::Internal, 10).unwrap();
        assert_eq!(size, 6);
        assert_eq!(client.unload_slot(Store::Internal, 10, size).unwrap(), b"NAMES\n");

        client.load_slot(Store::Ram, 0, &[1, 2, 3]).unwrap();
        assert_eq!(hub.slot(Store::Ram, 0), Some(vec![1, 2, 3]));
    }
}
