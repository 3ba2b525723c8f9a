use crate::cache::{ChangeCache, Reading};
use crate::events::EventQueue;
use crate::names::{self, NameTable, NAME_COUNT};
use enumset::{EnumSet, EnumSetType};
use hubtool_ipc::{ConnectionStatus, HubEvent, HubStatus};
use hubtool_types::{
    format_serial, parse_serial, Capabilities, DeviceIdentity, Feature, FirmwareVersion,
    HubModel, PortMode, Store, UpstreamMode, UpstreamState,
};
use hubtool_usb::commands::{Attribute, NAME_SLOT};
use hubtool_usb::error::HubResult;
use hubtool_usb::{DemoHub, FullHubClient, HubCommands, HubDescriptor, LinkDescriptor};
use log::{debug, Level};

// A name slot smaller than this can't even hold the header.
const MIN_NAME_STORE_SIZE: usize = 6;

/// Features that older firmware lacks, each of which is only complained about once.
#[derive(Debug, EnumSetType)]
enum Deprecation {
    PortState,
    PortError,
    Temperature,
}

impl Deprecation {
    fn message(&self, firmware: FirmwareVersion) -> String {
        let what = match self {
            Deprecation::PortState => "Port state",
            Deprecation::PortError => "Port error",
            Deprecation::Temperature => "Temperature",
        };
        format!("{what} is not available on firmware {firmware}, please update the hub")
    }
}

/// Owns the client and the connection state machine, and turns one poll of the hub into a
/// list of events.
pub struct PollSession {
    client: Box<dyn FullHubClient>,
    demo: DemoHub,

    target: Option<u32>,
    candidates: Vec<HubDescriptor>,

    cache: ChangeCache,
    names: NameTable,
    warnings: EnumSet<Deprecation>,

    retry_count: u32,
    first_poll: bool,
}

impl PollSession {
    pub fn new(client: Box<dyn FullHubClient>, target: Option<u32>) -> Self {
        Self {
            client,
            demo: DemoHub::new(),
            target,
            candidates: vec![],
            cache: ChangeCache::default(),
            names: NameTable::default(),
            warnings: EnumSet::empty(),
            retry_count: 0,
            first_poll: false,
        }
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.cache.status().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection() == ConnectionStatus::Connected
    }

    pub fn capabilities(&self) -> Capabilities {
        self.cache.capabilities()
    }

    pub fn status(&self) -> &HubStatus {
        self.cache.status()
    }

    pub fn cache_mut(&mut self) -> &mut ChangeCache {
        &mut self.cache
    }

    /// The client, but only while a hub is actually on the other end of it.
    pub fn hub(&mut self) -> Option<&mut dyn FullHubClient> {
        match self.is_connected() {
            true => Some(self.client.as_mut()),
            false => None,
        }
    }

    pub fn start(&mut self, force_demo: bool, events: &mut EventQueue) {
        if force_demo {
            self.enter_demo(events);
            return;
        }

        events.push_change(self.cache.set_connection(ConnectionStatus::Connecting));
        self.try_connect(events, false);
    }

    pub fn poll(&mut self, events: &mut EventQueue) {
        match self.connection() {
            ConnectionStatus::Demo => self.poll_demo(events),
            ConnectionStatus::Connecting => self.try_connect(events, true),
            ConnectionStatus::Connected | ConnectionStatus::LinkLost => self.poll_device(events),
            ConnectionStatus::Disconnected | ConnectionStatus::AwaitingSelection => {}
        }
        events.push(HubEvent::PollCompleted);
    }

    pub fn select_device(&mut self, identifier: &str, events: &mut EventQueue) {
        let Some(serial) = parse_serial(identifier) else {
            events.notice(Level::Warn, format!("Unrecognised hub identifier: {identifier}"));
            return;
        };

        let known = self
            .candidates
            .iter()
            .find(|candidate| candidate.serial_number() == serial)
            .cloned();
        let descriptor = match known {
            Some(descriptor) => descriptor,
            None => match self.discover().into_iter().find(|d| d.serial_number() == serial) {
                Some(descriptor) => descriptor,
                None => {
                    events.notice(Level::Warn, format!("Hub {identifier} is not available"));
                    return;
                }
            },
        };

        if self.is_connected() {
            self.client.disconnect();
        }
        self.retry_count = 0;
        self.connect(&descriptor, events);
    }

    pub fn disconnect(&mut self) {
        if self.is_connected() {
            debug!("Releasing hub link");
            self.client.disconnect();
        }
        self.cache.set_connection(ConnectionStatus::Disconnected);
    }

    /// Renames a port (or the hub at the system index), and stores the names on the hub
    /// if one is connected. An empty name goes back to the default.
    pub fn rename(&mut self, index: usize, name: &str, events: &mut EventQueue) {
        let mut names = self.names.clone();
        if !names.set(index, names::sanitize(name)) {
            events.notice(Level::Warn, format!("There is nothing to name at index {index}"));
            return;
        }

        let blob = match names::encode(&names) {
            Ok(blob) => blob,
            Err(e) => {
                events.notice(Level::Error, e.to_string());
                return;
            }
        };

        let name = names.effective(index);
        self.names = names;
        events.push_change(self.cache.update(Reading::Name { index, name }));

        let Some(hub) = self.hub() else {
            debug!("No hub connected, names will not be stored");
            return;
        };
        if let Err(e) = hub.load_slot(Store::Internal, NAME_SLOT, blob.as_bytes()) {
            events.notice(Level::Error, format!("Error writing names to store: {e}"));
        }
    }

    fn discover(&mut self) -> Vec<HubDescriptor> {
        self.client
            .discover()
            .into_iter()
            .filter(|descriptor| descriptor.model() != HubModel::Unknown)
            .collect()
    }

    // A quiet attempt is a retry, so doesn't repeat what the first attempt already said.
    fn try_connect(&mut self, events: &mut EventQueue, quiet: bool) {
        let found = self.discover();

        if let Some(target) = self.target {
            match found.iter().find(|d| d.serial_number() == target) {
                Some(descriptor) => self.connect(descriptor, events),
                None if !quiet => events.notice(
                    Level::Warn,
                    format!("Hub {} not found, waiting for it", format_serial(target)),
                ),
                None => {}
            }
            return;
        }

        match found.len() {
            0 if quiet => {}
            0 => self.enter_demo(events),
            1 => self.connect(&found[0], events),
            _ => {
                let identifiers = found.iter().map(HubDescriptor::identifier).collect();
                self.candidates = found;
                events.push_change(
                    self.cache
                        .set_connection(ConnectionStatus::AwaitingSelection),
                );
                events.push(HubEvent::ReconnectNeeded(identifiers));
            }
        }
    }

    fn connect(&mut self, descriptor: &HubDescriptor, events: &mut EventQueue) {
        match self.client.connect(descriptor) {
            Ok(()) => {
                let model = descriptor.model();
                events.notice(Level::Info, format!("Successfully connected to {model}"));

                self.retry_count = 0;
                self.first_poll = true;
                self.cache.set_capabilities(Capabilities::for_model(model));
                events.push_change(self.cache.set_connection(ConnectionStatus::Connected));
                self.push_layout(events);
            }
            Err(e) => {
                if self.retry_count == 0 {
                    events.notice(Level::Error, format!("Error connecting to device: {e}"));
                }
                self.retry_count = self.retry_count.saturating_add(1);
                events.push_change(self.cache.set_connection(ConnectionStatus::Connecting));
            }
        }
    }

    fn enter_demo(&mut self, events: &mut EventQueue) {
        events.notice(Level::Info, "No devices found. Running in demo mode.");
        events.push_change(self.cache.set_connection(ConnectionStatus::Demo));

        match read_identity(&mut self.demo) {
            Ok(identity) => self.apply_identity(identity, events),
            Err(e) => events.notice(Level::Error, format!("Error reading hub identity: {e}")),
        }
        self.apply_names(NameTable::default(), events);
    }

    fn poll_demo(&mut self, events: &mut EventQueue) {
        let mut poller = Poller {
            cache: &mut self.cache,
            warnings: &mut self.warnings,
            events,
        };
        poller.run(&mut self.demo);
    }

    fn poll_device(&mut self, events: &mut EventQueue) {
        let link = self.link_descriptor();
        if !link.is_valid() {
            debug!("Transport reports no valid link");
        }

        // Nothing can be read over a dead transport, whatever it says it was linked to.
        if !self.client.is_connected() {
            self.recover_link(events);
            return;
        }

        // The transport may have come back by itself.
        if self.connection() == ConnectionStatus::LinkLost {
            self.on_reconnected(link, events);
        }
        self.retry_count = 0;

        if self.first_poll && self.fetch_identity(events) {
            self.fetch_names(events);
            self.first_poll = false;
        }

        let mut poller = Poller {
            cache: &mut self.cache,
            warnings: &mut self.warnings,
            events,
        };
        poller.run(self.client.as_mut());
    }

    fn link_descriptor(&mut self) -> LinkDescriptor {
        self.client.link_descriptor().unwrap_or_else(|e| {
            debug!("Unable to fetch the link descriptor: {}", e);
            LinkDescriptor::invalid()
        })
    }

    fn recover_link(&mut self, events: &mut EventQueue) {
        if self.retry_count == 0 {
            events.notice(Level::Warn, "Lost link. Trying to reconnect.");
            events.push_change(self.cache.set_connection(ConnectionStatus::LinkLost));
        }
        self.retry_count = self.retry_count.saturating_add(1);

        self.client.disconnect();
        match self.client.reconnect() {
            Ok(()) if self.client.is_connected() => {
                let link = self.link_descriptor();
                self.on_reconnected(link, events);
            }
            Ok(()) => debug!("Reconnect attempt {} left the link down", self.retry_count),
            Err(e) => debug!("Reconnect attempt {} failed: {}", self.retry_count, e),
        }
    }

    fn on_reconnected(&mut self, link: LinkDescriptor, events: &mut EventQueue) {
        self.retry_count = 0;
        self.first_poll = true;

        let serial = match (link.is_valid(), self.cache.status().identity) {
            (false, Some(identity)) => identity.serial_number,
            _ => link.serial_number,
        };
        let serial = format_serial(serial);
        events.notice(Level::Info, format!("Reconnected to {serial}"));
        events.push_change(self.cache.set_connection(ConnectionStatus::Connected));
        self.push_layout(events);
    }

    fn push_layout(&self, events: &mut EventQueue) {
        let capabilities = self.cache.capabilities();
        events.push(HubEvent::LayoutChanged {
            model: capabilities.model,
            port_count: capabilities.port_count,
        });
    }

    fn fetch_identity(&mut self, events: &mut EventQueue) -> bool {
        match read_identity(self.client.as_mut()) {
            Ok(identity) => {
                self.apply_identity(identity, events);
                true
            }
            Err(e) => {
                events.notice(Level::Error, format!("Error reading hub identity: {e}"));
                false
            }
        }
    }

    fn apply_identity(&mut self, identity: DeviceIdentity, events: &mut EventQueue) {
        let previous = self.cache.capabilities();
        let capabilities = Capabilities::resolve(identity.model, identity.firmware);
        self.cache.set_capabilities(capabilities);

        events.push_change(self.cache.update(Reading::Identity(identity)));
        if previous.model != capabilities.model || previous.port_count != capabilities.port_count
        {
            self.push_layout(events);
        }
    }

    fn fetch_names(&mut self, events: &mut EventQueue) {
        let size = match self.client.slot_size(Store::Internal, NAME_SLOT) {
            Ok(size) => size,
            Err(e) => {
                events.notice(Level::Error, format!("Error reading store size: {e}"));
                return;
            }
        };

        if size < MIN_NAME_STORE_SIZE {
            debug!("Name store holds {} bytes, using default names", size);
            self.apply_names(NameTable::default(), events);
            return;
        }

        match self.client.unload_slot(Store::Internal, NAME_SLOT, size) {
            Ok(data) if data.len() == size => self.apply_names(names::decode(&data), events),
            Ok(data) => events.notice(
                Level::Error,
                format!(
                    "Got wrong size back when reading store: got {}; expected {}",
                    data.len(),
                    size
                ),
            ),
            Err(e) => {
                events.notice(Level::Error, format!("Error reading name data from store: {e}"))
            }
        }
    }

    fn apply_names(&mut self, names: NameTable, events: &mut EventQueue) {
        for index in 0..NAME_COUNT {
            let name = names.effective(index);
            events.push_change(self.cache.update(Reading::Name { index, name }));
        }
        self.names = names;
    }
}

fn read_identity<H: HubCommands + ?Sized>(hub: &mut H) -> HubResult<DeviceIdentity> {
    hub.drain(Attribute::SerialNumber);
    let serial_number = hub.get_serial_number()?;

    hub.drain(Attribute::Model);
    let model = HubModel::from_code(hub.get_model()?);

    hub.drain(Attribute::FirmwareVersion);
    let firmware = FirmwareVersion(hub.get_firmware_version()?);

    hub.drain(Attribute::ModuleAddress);
    let module_address = hub.get_module_address()?;

    Ok(DeviceIdentity {
        serial_number,
        model,
        firmware,
        module_address,
    })
}

// One pass over every polled attribute, in a fixed order. Every read drains first, and a
// failed read only loses that one value for this cycle.
struct Poller<'a> {
    cache: &'a mut ChangeCache,
    warnings: &'a mut EnumSet<Deprecation>,
    events: &'a mut EventQueue,
}

impl Poller<'_> {
    fn run<H: HubCommands + ?Sized>(&mut self, hub: &mut H) {
        let capabilities = self.cache.capabilities();
        let ports = 0..capabilities.port_count;

        self.temperature(hub, capabilities);
        self.input_power(hub, capabilities);
        if let Some(on) = self.read(hub, Attribute::Led, None, |h| h.get_led()) {
            self.push(Reading::Led(on));
        }

        for port in ports.clone() {
            let voltage = self.read(hub, Attribute::PortVoltage, Some(port), |h| {
                h.get_port_voltage(port)
            });
            let current = self.read(hub, Attribute::PortCurrent, Some(port), |h| {
                h.get_port_current(port)
            });
            if let (Some(microvolts), Some(microamps)) = (voltage, current) {
                self.push(Reading::PortMetrics {
                    port,
                    microvolts,
                    microamps,
                });
            }
        }

        if let Some(bits) = self.read(hub, Attribute::HubMode, None, |h| h.get_hub_mode()) {
            self.push(Reading::HubMode(bits));
        }

        if capabilities.supports(Feature::PortRegisters) {
            for port in ports.clone() {
                let state = self.read(hub, Attribute::PortState, Some(port), |h| {
                    h.get_port_state(port)
                });
                if let Some(bits) = state {
                    self.push(Reading::PortState { port, bits });
                }
            }
            for port in ports.clone() {
                let error = self.read(hub, Attribute::PortError, Some(port), |h| {
                    h.get_port_error(port)
                });
                if let Some(bits) = error {
                    self.push(Reading::PortError { port, bits });
                }
            }
        } else {
            self.warn_once(Deprecation::PortState);
            self.warn_once(Deprecation::PortError);
        }

        for port in ports.clone() {
            let limit = self.read(hub, Attribute::PortCurrentLimit, Some(port), |h| {
                h.get_port_current_limit(port)
            });
            if let Some(microamps) = limit {
                self.push(Reading::PortLimit { port, microamps });
            }
        }

        for port in ports {
            let mode = self.read(hub, Attribute::PortMode, Some(port), |h| {
                h.get_port_mode(port)
            });
            if let Some(raw) = mode {
                self.push(Reading::PortMode {
                    port,
                    mode: PortMode::from_raw(raw),
                });
            }
        }

        self.upstream(hub);
        self.downstream(hub);

        if capabilities.supports(Feature::Uptime) {
            if let Some(minutes) = self.read(hub, Attribute::Uptime, None, |h| h.get_uptime()) {
                self.push(Reading::Uptime(Some(minutes)));
            }
        } else {
            self.push(Reading::Uptime(None));
        }
    }

    fn temperature<H: HubCommands + ?Sized>(&mut self, hub: &mut H, caps: Capabilities) {
        if !caps.supports(Feature::Temperature) {
            self.warn_once(Deprecation::Temperature);
            return;
        }

        let Some(micro_celsius) =
            self.read(hub, Attribute::Temperature, None, |h| h.get_temperature())
        else {
            return;
        };

        // Without the max the reading would be shown in the wrong format, so skip it.
        let mut max_micro_celsius = None;
        if caps.supports(Feature::MaxTemperature) {
            let max = self.read(hub, Attribute::MaxTemperature, None, |h| h.get_max_temperature());
            if max.is_none() {
                return;
            }
            max_micro_celsius = max;
        }

        self.push(Reading::Temperature {
            micro_celsius,
            max_micro_celsius,
        });
    }

    fn input_power<H: HubCommands + ?Sized>(&mut self, hub: &mut H, caps: Capabilities) {
        let Some(microvolts) =
            self.read(hub, Attribute::InputVoltage, None, |h| h.get_input_voltage())
        else {
            return;
        };

        let mut microamps = None;
        if caps.supports(Feature::InputCurrent) {
            microamps = self.read(hub, Attribute::InputCurrent, None, |h| h.get_input_current());
        }

        self.push(Reading::InputPower {
            microvolts,
            microamps,
        });
    }

    fn upstream<H: HubCommands + ?Sized>(&mut self, hub: &mut H) {
        let state = self.read(hub, Attribute::UpstreamState, None, |h| h.get_upstream_state());
        if let Some(raw) = state {
            self.push(Reading::UpstreamState(UpstreamState::from_raw(raw)));
        }

        let mode = self.read(hub, Attribute::UpstreamMode, None, |h| h.get_upstream_mode());
        if let Some(raw) = mode {
            self.push(Reading::UpstreamMode(UpstreamMode::from_raw(raw)));
        }

        let boost = self.read(hub, Attribute::UpstreamBoost, None, |h| h.get_upstream_boost());
        if let Some(boost) = boost {
            self.push(Reading::UpstreamBoost(boost));
        }
    }

    fn downstream<H: HubCommands + ?Sized>(&mut self, hub: &mut H) {
        let delay = self.read(hub, Attribute::EnumerationDelay, None, |h| {
            h.get_enumeration_delay()
        });
        if let Some(delay) = delay {
            self.push(Reading::EnumerationDelay(delay));
        }

        let boost = self.read(hub, Attribute::DownstreamBoost, None, |h| {
            h.get_downstream_boost()
        });
        if let Some(boost) = boost {
            self.push(Reading::DownstreamBoost(boost));
        }
    }

    fn read<H, T, F>(
        &mut self,
        hub: &mut H,
        attribute: Attribute,
        port: Option<u8>,
        read: F,
    ) -> Option<T>
    where
        H: HubCommands + ?Sized,
        F: FnOnce(&mut H) -> HubResult<T>,
    {
        hub.drain(attribute);
        match read(hub) {
            Ok(value) => Some(value),
            Err(e) => {
                let message = match port {
                    Some(port) => format!("Error reading {attribute} on port {port}: {e}"),
                    None => format!("Error reading {attribute}: {e}"),
                };
                self.events.notice(Level::Warn, message);
                None
            }
        }
    }

    fn push(&mut self, reading: Reading) {
        let change = self.cache.update(reading);
        self.events.push_change(change);
    }

    // Until the hub has identified itself we don't know what it's missing.
    fn warn_once(&mut self, deprecation: Deprecation) {
        let Some(identity) = self.cache.status().identity else {
            return;
        };
        if self.warnings.insert(deprecation) {
            let message = deprecation.message(identity.firmware);
            self.events.notice(Level::Warn, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubtool_types::MAX_DISPLAY_TEMPERATURE;
    use hubtool_usb::device::mock::{Call, MockHub};
    use hubtool_usb::error::HubError;

    const SERIAL: u32 = 0x0000_BEEF;

    fn connected(hub: &MockHub) -> (PollSession, EventQueue) {
        let mut session = PollSession::new(Box::new(hub.clone()), None);
        let mut events = EventQueue::default();
        session.start(false, &mut events);
        assert_eq!(session.connection(), ConnectionStatus::Connected);
        (session, events)
    }

    fn identity_reads(hub: &MockHub) -> usize {
        hub.count(&Call::Read(Attribute::SerialNumber, None))
    }

    #[test]
    fn single_hub_connects_and_identifies() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        let (mut session, mut events) = connected(&hub);
        assert!(events
            .log_lines()
            .contains(&"Successfully connected to USBHub3+"));

        events.clear();
        session.poll(&mut events);

        assert!(events.events().iter().any(|e| matches!(
            e,
            HubEvent::IdentityChanged(identity) if identity.serial_number == SERIAL
        )));
        assert_eq!(events.events().last(), Some(&HubEvent::PollCompleted));
        assert!(session.capabilities().supports(Feature::Uptime));
    }

    #[test]
    fn no_hubs_runs_the_demo() {
        let hub = MockHub::empty();
        let mut session = PollSession::new(Box::new(hub.clone()), None);
        let mut events = EventQueue::default();
        session.start(false, &mut events);

        assert_eq!(session.connection(), ConnectionStatus::Demo);
        assert!(events
            .log_lines()
            .contains(&"No devices found. Running in demo mode."));
        assert!(events
            .events()
            .contains(&HubEvent::ConnectionChanged(ConnectionStatus::Demo)));

        events.clear();
        session.poll(&mut events);
        let metrics = events
            .events()
            .iter()
            .filter(|e| matches!(e, HubEvent::PortMetricsChanged { .. }))
            .count();
        assert_eq!(metrics, 8);

        // Nothing is ever sent to the real client while in demo mode.
        assert_eq!(hub.journal(), vec![Call::Discover]);
    }

    #[test]
    fn several_hubs_wait_for_a_selection() {
        let hub = MockHub::new(HubModel::Hub2x4, 1);
        hub.add_device(2, HubModel::Hub3Plus);
        hub.add_device(3, HubModel::Unknown);

        let mut session = PollSession::new(Box::new(hub.clone()), None);
        let mut events = EventQueue::default();
        session.start(false, &mut events);

        assert_eq!(session.connection(), ConnectionStatus::AwaitingSelection);
        assert!(events.events().contains(&HubEvent::ReconnectNeeded(vec![
            String::from("0x00000001"),
            String::from("0x00000002"),
        ])));

        events.clear();
        session.select_device("0x00000002", &mut events);
        assert!(session.is_connected());
        assert_eq!(session.capabilities().port_count, 8);
        assert_eq!(hub.count(&Call::Connect(2)), 1);
    }

    #[test]
    fn target_serial_skips_the_selection() {
        let hub = MockHub::new(HubModel::Hub2x4, 1);
        hub.add_device(2, HubModel::Hub3Plus);

        let mut session = PollSession::new(Box::new(hub.clone()), Some(2));
        let mut events = EventQueue::default();
        session.start(false, &mut events);

        assert!(session.is_connected());
        assert_eq!(hub.count(&Call::Connect(2)), 1);
    }

    #[test]
    fn every_read_is_drained_first() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);

        let journal = hub.journal();
        let mut reads = 0;
        for (position, call) in journal.iter().enumerate() {
            if let Call::Read(attribute, _) = call {
                reads += 1;
                assert_eq!(
                    journal.get(position - 1),
                    Some(&Call::Drain(*attribute)),
                    "{attribute} was read without draining"
                );
            }
        }
        assert!(reads > 0);
    }

    #[test]
    fn attributes_are_polled_in_order() {
        let hub = MockHub::new(HubModel::Hub2x4, SERIAL);
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);
        hub.clear_journal();
        session.poll(&mut events);

        let order: Vec<Attribute> = hub
            .journal()
            .iter()
            .filter_map(|call| match call {
                Call::Read(attribute, _) => Some(*attribute),
                _ => None,
            })
            .fold(vec![], |mut order, attribute| {
                if order.last() != Some(&attribute) {
                    order.push(attribute);
                }
                order
            });

        assert_eq!(
            order,
            vec![
                Attribute::Temperature,
                Attribute::InputVoltage,
                Attribute::Led,
                Attribute::PortVoltage,
                Attribute::PortCurrent,
                Attribute::PortVoltage,
                Attribute::PortCurrent,
                Attribute::PortVoltage,
                Attribute::PortCurrent,
                Attribute::PortVoltage,
                Attribute::PortCurrent,
                Attribute::HubMode,
                Attribute::PortState,
                Attribute::PortError,
                Attribute::PortCurrentLimit,
                Attribute::PortMode,
                Attribute::UpstreamState,
                Attribute::UpstreamMode,
                Attribute::UpstreamBoost,
                Attribute::EnumerationDelay,
                Attribute::DownstreamBoost,
            ]
        );
    }

    #[test]
    fn link_loss_is_reported_once_and_identity_refetched_once() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);
        assert_eq!(identity_reads(&hub), 1);

        // Drops, and stays down for a few cycles.
        hub.set_link_up(false);
        hub.set_reconnect_succeeds(false);
        events.clear();
        for _ in 0..3 {
            session.poll(&mut events);
        }
        assert_eq!(session.connection(), ConnectionStatus::LinkLost);

        hub.set_reconnect_succeeds(true);
        session.poll(&mut events);
        session.poll(&mut events);
        session.poll(&mut events);

        let lines = events.log_lines();
        let lost = lines
            .iter()
            .filter(|l| **l == "Lost link. Trying to reconnect.")
            .count();
        let back = lines
            .iter()
            .filter(|l| **l == "Reconnected to 0x0000BEEF")
            .count();
        assert_eq!(lost, 1);
        assert_eq!(back, 1);
        assert_eq!(identity_reads(&hub), 2);
        assert_eq!(hub.count(&Call::Reconnect), 4);
        assert!(events.events().contains(&HubEvent::LayoutChanged {
            model: HubModel::Hub3Plus,
            port_count: 8
        }));
    }

    #[test]
    fn connected_lost_connected_over_three_polls() {
        let hub = MockHub::new(HubModel::Hub2x4, SERIAL);
        let (mut session, mut events) = connected(&hub);

        session.poll(&mut events);
        hub.set_link_up(false);
        session.poll(&mut events);
        session.poll(&mut events);

        let lines = events.log_lines();
        assert_eq!(
            lines
                .iter()
                .filter(|l| l.starts_with("Lost link"))
                .count(),
            1
        );
        assert_eq!(
            lines
                .iter()
                .filter(|l| l.starts_with("Reconnected"))
                .count(),
            1
        );
        assert_eq!(identity_reads(&hub), 2);
    }

    #[test]
    fn dead_transport_without_a_link_is_not_polled() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);

        {
            let mut state = hub.state();
            state.link = LinkDescriptor::invalid();
            state.connected = false;
        }
        hub.clear_journal();
        events.clear();
        session.poll(&mut events);
        session.poll(&mut events);

        assert_eq!(session.connection(), ConnectionStatus::LinkLost);
        assert_eq!(events.log_lines(), vec!["Lost link. Trying to reconnect."]);
        assert!(!hub
            .journal()
            .iter()
            .any(|call| matches!(call, Call::Read(..) | Call::Drain(..))));
        assert_eq!(hub.count(&Call::Reconnect), 2);
    }

    #[test]
    fn failed_identity_is_retried() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        hub.fail(Attribute::Model, HubError::Timeout);
        let (mut session, mut events) = connected(&hub);

        session.poll(&mut events);
        assert!(session.status().identity.is_none());

        hub.recover(Attribute::Model);
        session.poll(&mut events);
        session.poll(&mut events);
        assert!(session.status().identity.is_some());
        assert_eq!(identity_reads(&hub), 2);
    }

    #[test]
    fn a_failed_port_only_loses_that_value() {
        let hub = MockHub::new(HubModel::Hub2x4, SERIAL);
        hub.fail(Attribute::PortCurrentLimit, HubError::Busy);
        hub.set_value(Attribute::Led, None, 1);
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);

        assert!(events.events().contains(&HubEvent::LedChanged(true)));
        assert!(events
            .log_lines()
            .contains(&"Error reading PortCurrentLimit on port 3: Hub is busy"));
        assert!(session.status().port(0).unwrap().current_limit_microamps.is_none());
        assert!(session.status().port(0).unwrap().mode.is_some());
    }

    #[test]
    fn old_firmware_warns_once() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        hub.set_value(Attribute::FirmwareVersion, None, 0x2400_0000);
        let (mut session, mut events) = connected(&hub);
        for _ in 0..3 {
            session.poll(&mut events);
        }

        let warnings = events
            .log_lines()
            .iter()
            .filter(|l| l.contains("is not available on firmware 2.4.0"))
            .count();
        assert_eq!(warnings, 3);
        assert_eq!(hub.count(&Call::Read(Attribute::PortState, Some(0))), 0);
        assert_eq!(hub.count(&Call::Read(Attribute::Uptime, None)), 0);

        let unsupported = events
            .events()
            .iter()
            .filter(|e| **e == HubEvent::UptimeChanged(None))
            .count();
        assert_eq!(unsupported, 1);
    }

    #[test]
    fn hot_hub_is_shown_capped() {
        let hub = MockHub::new(HubModel::Hub2x4, SERIAL);
        hub.set_value(Attribute::Temperature, None, 205_000_000);
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);

        let shown = events.events().iter().find_map(|e| match e {
            HubEvent::TemperatureChanged {
                micro_celsius,
                display,
                ..
            } => Some((*micro_celsius, display.clone())),
            _ => None,
        });
        assert_eq!(
            shown,
            Some((MAX_DISPLAY_TEMPERATURE, String::from("200.0˚C")))
        );
    }

    #[test]
    fn temperature_waits_for_its_max() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        hub.set_value(Attribute::Temperature, None, 45_300_000);
        hub.set_value(Attribute::MaxTemperature, None, 150_000_000);
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);

        hub.set_value(Attribute::Temperature, None, 50_000_000);
        hub.fail(Attribute::MaxTemperature, HubError::Busy);
        events.clear();
        session.poll(&mut events);

        assert!(!events
            .events()
            .iter()
            .any(|e| matches!(e, HubEvent::TemperatureChanged { .. })));
        let system = &session.status().system;
        assert_eq!(system.temperature_micro_celsius, Some(45_300_000));
        assert_eq!(system.max_temperature_micro_celsius, Some(150_000_000));
    }

    #[test]
    fn stored_names_are_loaded_on_connect() {
        let hub = MockHub::new(HubModel::Hub2x4, SERIAL);
        hub.set_slot(Store::Internal, NAME_SLOT, b"NAMES\n18.0.1=Scope\n3.0=Bench\n");
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);

        let renames: Vec<&HubEvent> = events
            .events()
            .iter()
            .filter(|e| matches!(e, HubEvent::NameChanged { .. }))
            .collect();
        assert_eq!(renames.len(), 2);
        assert_eq!(session.status().name(1), Some("Scope"));
        assert_eq!(session.status().name(8), Some("Bench"));
    }

    #[test]
    fn headerless_store_gives_defaults_quietly() {
        let hub = MockHub::new(HubModel::Hub2x4, SERIAL);
        hub.set_slot(Store::Internal, NAME_SLOT, b"18.0.1=Scope\n3.0=Bench\n");
        let (mut session, mut events) = connected(&hub);
        session.poll(&mut events);

        assert!(!events
            .events()
            .iter()
            .any(|e| matches!(e, HubEvent::NameChanged { .. })));
        assert_eq!(session.status().name(8), Some("My Acroname Hub"));
    }

    #[test]
    fn renames_are_written_to_the_store() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        let (mut session, mut events) = connected(&hub);
        session.rename(4, "Cam=era", &mut events);

        assert_eq!(
            hub.slot(Store::Internal, NAME_SLOT),
            Some(b"NAMES\n18.0.4=Cam:era\n".to_vec())
        );
        assert!(events.events().contains(&HubEvent::NameChanged {
            index: 4,
            name: String::from("Cam:era")
        }));
    }

    #[test]
    fn oversized_names_are_never_written() {
        let hub = MockHub::new(HubModel::Hub3Plus, SERIAL);
        let (mut session, mut events) = connected(&hub);
        let long = "n".repeat(600);
        for index in 0..NAME_COUNT {
            session.rename(index, &long, &mut events);
        }

        let writes = hub.writes().len();
        assert!(writes < NAME_COUNT);
        assert!(events
            .log_lines()
            .iter()
            .any(|l| l.starts_with("Names too long to be saved to the device")));
    }

    #[test]
    fn renames_while_disconnected_stay_local() {
        let hub = MockHub::empty();
        hub.add_device(1, HubModel::Hub2x4);
        hub.set_connect_fails(true);

        let mut session = PollSession::new(Box::new(hub.clone()), None);
        let mut events = EventQueue::default();
        session.start(false, &mut events);
        assert_eq!(session.connection(), ConnectionStatus::Connecting);

        session.rename(8, "Lab", &mut events);
        assert!(hub.writes().is_empty());
        assert_eq!(session.status().name(8), Some("Lab"));

        // Retries quietly, and gets there once the hub cooperates.
        session.poll(&mut events);
        hub.set_connect_fails(false);
        session.poll(&mut events);
        assert!(session.is_connected());
        let errors = events
            .log_lines()
            .iter()
            .filter(|l| l.starts_with("Error connecting to device"))
            .count();
        assert_eq!(errors, 1);
    }
}
