use crate::cache::Reading;
use crate::event_log;
use crate::events::EventQueue;
use crate::limits::quantize_current_limit;
use crate::session::PollSession;
use hubtool_ipc::{HubCommand, HubEvent, HubStatus};
use hubtool_types::{
    Capabilities, DataSpeed, Feature, HubModel, Store, MAX_PORTS, SYSTEM_NAME_INDEX,
};
use hubtool_usb::commands::EVENT_LOG_SLOT;
use hubtool_usb::error::{HubError, HubResult};
use hubtool_usb::FullHubClient;
use log::{debug, Level};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const MAX_POLLING_DELAY: u64 = 10_000;
const MAX_BOOST: u8 = 3;
const RATE_WINDOW: usize = 5;

pub fn clamp_polling_delay(milliseconds: u64) -> Duration {
    Duration::from_millis(milliseconds.min(MAX_POLLING_DELAY))
}

/// Drives the poll session, and applies user commands to the hub between polls.
pub struct Device {
    session: PollSession,
    force_demo: bool,
    polling_delay: Duration,

    last_poll: Option<Instant>,
    periods: VecDeque<Duration>,
}

impl Device {
    pub fn new(
        client: Box<dyn FullHubClient>,
        target: Option<u32>,
        force_demo: bool,
        polling_delay: Duration,
    ) -> Self {
        Self {
            session: PollSession::new(client, target),
            force_demo,
            polling_delay,
            last_poll: None,
            periods: VecDeque::with_capacity(RATE_WINDOW),
        }
    }

    pub fn start(&mut self, events: &mut EventQueue) {
        self.session.start(self.force_demo, events);
    }

    pub fn poll(&mut self, events: &mut EventQueue) {
        let now = Instant::now();
        if let Some(last) = self.last_poll.replace(now) {
            if self.periods.len() == RATE_WINDOW {
                self.periods.pop_front();
            }
            self.periods.push_back(now - last);

            let total: Duration = self.periods.iter().sum();
            if !total.is_zero() {
                let rate = self.periods.len() as f64 / total.as_secs_f64();
                debug!("Update rate: {:.1}Hz", rate);
                self.session.cache_mut().set_update_rate(rate);
            }
        }

        self.session.poll(events);
    }

    pub fn polling_delay(&self) -> Duration {
        self.polling_delay
    }

    pub fn status(&self) -> HubStatus {
        self.session.status().clone()
    }

    pub fn connected_model(&self) -> HubModel {
        self.session.capabilities().model
    }

    pub fn shutdown(&mut self) {
        self.session.disconnect();
    }

    pub fn perform_command(&mut self, command: HubCommand, events: &mut EventQueue) {
        debug!("Performing {:?}", command);
        let capabilities = self.session.capabilities();
        if !validate(&command, capabilities, events) {
            return;
        }

        match command {
            HubCommand::SelectDevice(identifier) => {
                self.session.select_device(&identifier, events);
            }
            HubCommand::SetPollingDelay(milliseconds) => {
                self.polling_delay = clamp_polling_delay(milliseconds);
            }
            HubCommand::RenameHub(name) => {
                self.session.rename(SYSTEM_NAME_INDEX, &name, events);
            }
            HubCommand::RenamePort(port, name) => {
                self.session.rename(port as usize, &name, events);
            }
            HubCommand::SetPortCurrentLimit(port, microamps) => {
                let microamps = quantize_current_limit(capabilities.model, microamps);

                // Shown straight away, whether or not the hub is there to take it.
                let change = self
                    .session
                    .cache_mut()
                    .update(Reading::PortLimit { port, microamps });
                events.push_change(change);

                if let Some(hub) = self.session.hub() {
                    let result = hub.set_port_current_limit(port, microamps);
                    report(events, "setting the current limit", result);
                }
            }
            HubCommand::SetPortHiSpeedData(port, enabled) => {
                let Some(hub) = self.session.hub() else {
                    return ignored("SetPortHiSpeedData");
                };
                let result = hub.set_port_hi_speed_data(port, enabled);
                if report(events, "setting Hi-Speed data", result) {
                    self.request_speed(port, Some(enabled), None, events);
                }
            }
            HubCommand::SetPortSuperSpeedData(port, enabled) => {
                let Some(hub) = self.session.hub() else {
                    return ignored("SetPortSuperSpeedData");
                };
                let result = hub.set_port_super_speed_data(port, enabled);
                if report(events, "setting SuperSpeed data", result) {
                    self.request_speed(port, None, Some(enabled), events);
                }
            }
            HubCommand::FetchEventLog => self.fetch_event_log(capabilities, events),
            command => self.apply(command, events),
        }
    }

    // Everything else is a single write to a connected hub.
    fn apply(&mut self, command: HubCommand, events: &mut EventQueue) {
        let capabilities = self.session.capabilities();
        let Some(hub) = self.session.hub() else {
            return ignored(&format!("{command:?}"));
        };

        match command {
            HubCommand::SetLed(on) => {
                report(events, "setting the LED", hub.set_led(on));
            }
            HubCommand::SaveState => {
                if report(events, "saving state", hub.save()) {
                    events.notice(Level::Info, "Hub state saved");
                }
            }
            HubCommand::ResetDevice => match hub.reset() {
                Ok(()) => events.notice(Level::Info, "Successful reset"),
                // The hub drops off the link while it restarts.
                Err(HubError::Timeout) => {
                    events.notice(Level::Info, "Successful reset (timeout received)")
                }
                Err(e) => events.notice(Level::Error, format!("Error resetting hub: {e}")),
            },
            HubCommand::SetPortPower(port, enabled) => {
                report(events, "setting port power", hub.set_port_power(port, enabled));
            }
            HubCommand::SetPortData(port, enabled) => {
                report(events, "setting port data", hub.set_port_data(port, enabled));
            }
            HubCommand::SetPortEnabled(port, enabled) => {
                let result = hub.set_port_enabled(port, enabled);
                report(events, "enabling the port", result);
            }
            HubCommand::SetPortMode(port, mode) => {
                report(events, "setting the port mode", hub.set_port_mode(port, mode));
            }
            HubCommand::ClearPortError(port) => {
                report(events, "clearing port errors", hub.clear_port_error(port));
            }
            HubCommand::ClearAllPortErrors => {
                for port in 0..capabilities.port_count {
                    report(events, "clearing port errors", hub.clear_port_error(port));
                }
            }
            HubCommand::SetUpstreamMode(mode) => {
                report(events, "setting the upstream mode", hub.set_upstream_mode(mode));
            }
            HubCommand::SetUpstreamBoost(boost) => {
                let result = hub.set_upstream_boost(boost);
                report(events, "setting the upstream boost", result);
            }
            HubCommand::SetEnumerationDelay(delay) => {
                let result = hub.set_enumeration_delay(delay);
                report(events, "setting the enumeration delay", result);
            }
            HubCommand::SetDownstreamBoost(boost) => {
                let result = hub.set_downstream_boost(boost);
                report(events, "setting the downstream boost", result);
            }
            other => debug!("{:?} was not expected here", other),
        }
    }

    fn fetch_event_log(&mut self, capabilities: Capabilities, events: &mut EventQueue) {
        if !capabilities.supports(Feature::EventLog) {
            let model = capabilities.model;
            events.notice(Level::Warn, format!("{model} does not support event logs"));
            return;
        }
        let Some(hub) = self.session.hub() else {
            return ignored("FetchEventLog");
        };

        if let Err(e) = hub.log_events() {
            events.notice(Level::Error, format!("Error logging events: {e}"));
            return;
        }

        let size = match hub.slot_size(Store::Ram, EVENT_LOG_SLOT) {
            Ok(size) => size,
            Err(e) => {
                events.notice(Level::Error, format!("Error reading store size: {e}"));
                return;
            }
        };

        match hub.unload_slot(Store::Ram, EVENT_LOG_SLOT, size) {
            Ok(data) => {
                let entries = event_log::decode(&data);
                events.notice(Level::Info, event_log::format(size, &entries));
            }
            Err(e) => events.notice(Level::Error, format!("Error unloading slot: {e}")),
        }
    }

    // Works out what the port's data speed will be once a half of it has been switched.
    fn request_speed(
        &mut self,
        port: u8,
        hi_speed: Option<bool>,
        super_speed: Option<bool>,
        events: &mut EventQueue,
    ) {
        let current = self
            .session
            .status()
            .port(port)
            .and_then(|record| record.data_speed)
            .unwrap_or(DataSpeed::None);

        let has_hi_speed = matches!(
            current,
            DataSpeed::HiSpeedOnly | DataSpeed::HiSpeedPlusSuperSpeed
        );
        let has_super_speed = matches!(
            current,
            DataSpeed::SuperSpeedOnly | DataSpeed::HiSpeedPlusSuperSpeed
        );

        let speed = match (
            hi_speed.unwrap_or(has_hi_speed),
            super_speed.unwrap_or(has_super_speed),
        ) {
            (true, true) => DataSpeed::HiSpeedPlusSuperSpeed,
            (true, false) => DataSpeed::HiSpeedOnly,
            (false, true) => DataSpeed::SuperSpeedOnly,
            (false, false) => DataSpeed::None,
        };
        events.push(HubEvent::DataSpeedRequested { port, speed });
    }
}

// Checks a command against what the hub can do, so nothing invalid is ever written.
fn validate(command: &HubCommand, capabilities: Capabilities, events: &mut EventQueue) -> bool {

    let port = match command {
        HubCommand::SetPortPower(port, _)
        | HubCommand::SetPortData(port, _)
        | HubCommand::SetPortHiSpeedData(port, _)
        | HubCommand::SetPortSuperSpeedData(port, _)
        | HubCommand::SetPortEnabled(port, _)
        | HubCommand::SetPortMode(port, _)
        | HubCommand::SetPortCurrentLimit(port, _)
        | HubCommand::ClearPortError(port)
        | HubCommand::RenamePort(port, _) => Some(*port),
        _ => None,
    };
    if let Some(port) = port {
        // Until the model is known every port is a candidate, the limit may be set ahead of time.
        let exists = match capabilities.model {
            HubModel::Unknown => (port as usize) < MAX_PORTS,
            _ => capabilities.has_port(port),
        };
        if !exists {
            let message = format!("Port {port} does not exist on a {}", capabilities.model);
            events.notice(Level::Warn, message);
            return false;
        }
    }

    match command {
        HubCommand::SetUpstreamBoost(boost) | HubCommand::SetDownstreamBoost(boost)
            if *boost > MAX_BOOST =>
        {
            events.notice(
                Level::Warn,
                format!("Boost must be between 0 and {MAX_BOOST}, got {boost}"),
            );
            false
        }
        HubCommand::SetPortHiSpeedData(..) | HubCommand::SetPortSuperSpeedData(..)
            if !capabilities.supports(Feature::SplitDataSpeed) =>
        {
            events.notice(
                Level::Warn,
                format!(
                    "{} can't switch Hi-Speed and SuperSpeed data separately",
                    capabilities.model
                ),
            );
            false
        }
        _ => true,
    }
}

fn ignored(command: &str) {
    debug!("No hub connected, ignoring {}", command);
}

// Logs a failed write, returning whether it went through.
fn report(events: &mut EventQueue, action: &str, result: HubResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            events.notice(Level::Error, format!("Error {action}: {e}"));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubtool_types::PortMode;
    use hubtool_usb::commands::Attribute;
    use hubtool_usb::device::mock::{Call, MockHub};

    fn connected_device(hub: &MockHub) -> (Device, EventQueue) {
        let mut device = Device::new(
            Box::new(hub.clone()),
            None,
            false,
            Duration::from_millis(20),
        );
        let mut events = EventQueue::default();
        device.start(&mut events);
        device.poll(&mut events);
        hub.clear_journal();
        events.clear();
        (device, events)
    }

    #[test]
    fn commands_write_to_a_connected_hub() {
        let hub = MockHub::new(HubModel::Hub3Plus, 7);
        let (mut device, mut events) = connected_device(&hub);

        device.perform_command(HubCommand::SetLed(true), &mut events);
        device.perform_command(HubCommand::SetPortPower(2, false), &mut events);
        device.perform_command(HubCommand::SetPortMode(3, PortMode::Cdp), &mut events);

        assert_eq!(
            hub.writes(),
            vec![
                Call::Write(Attribute::Led, None, 1),
                Call::Write(Attribute::PortPower, Some(2), 0),
                Call::Write(Attribute::PortMode, Some(3), 1),
            ]
        );
    }

    #[test]
    fn commands_are_dropped_without_a_hub() {
        let hub = MockHub::empty();
        hub.add_device(1, HubModel::Hub2x4);
        hub.set_connect_fails(true);
        let (mut device, mut events) = connected_device(&hub);

        device.perform_command(HubCommand::SetLed(true), &mut events);
        device.perform_command(HubCommand::SaveState, &mut events);
        assert!(hub.writes().is_empty());
        assert!(events.events().is_empty());
    }

    #[test]
    fn current_limit_is_cached_while_disconnected() {
        let hub = MockHub::empty();
        hub.add_device(1, HubModel::Hub2x4);
        hub.set_connect_fails(true);
        let (mut device, mut events) = connected_device(&hub);

        device.perform_command(HubCommand::SetPortCurrentLimit(1, 1_100_000), &mut events);
        assert!(hub.writes().is_empty());
        assert_eq!(
            events.events(),
            &[HubEvent::PortLimitChanged {
                port: 1,
                microamps: 1_100_000
            }]
        );
        assert_eq!(
            device.status().port(1).unwrap().current_limit_microamps,
            Some(1_100_000)
        );
    }

    #[test]
    fn current_limit_is_quantized_for_the_model() {
        let hub = MockHub::new(HubModel::Hub2x4, 7);
        let (mut device, mut events) = connected_device(&hub);

        device.perform_command(HubCommand::SetPortCurrentLimit(0, 1_100_000), &mut events);
        device.perform_command(HubCommand::SetPortCurrentLimit(1, 9_000_000), &mut events);
        assert_eq!(
            hub.writes(),
            vec![
                Call::Write(Attribute::PortCurrentLimit, Some(0), 1_200_000),
                Call::Write(Attribute::PortCurrentLimit, Some(1), 2_500_000),
            ]
        );
    }

    #[test]
    fn invalid_ports_and_boosts_are_rejected() {
        let hub = MockHub::new(HubModel::Hub2x4, 7);
        let (mut device, mut events) = connected_device(&hub);

        device.perform_command(HubCommand::SetPortPower(4, true), &mut events);
        device.perform_command(HubCommand::SetUpstreamBoost(4), &mut events);
        device.perform_command(HubCommand::SetDownstreamBoost(3), &mut events);

        assert_eq!(
            hub.writes(),
            vec![Call::Write(Attribute::DownstreamBoost, None, 3)]
        );
        assert_eq!(events.log_lines().len(), 2);
    }

    #[test]
    fn reset_timeout_counts_as_success() {
        let hub = MockHub::new(HubModel::Hub3Plus, 7);
        hub.fail(Attribute::Reset, HubError::Timeout);
        let (mut device, mut events) = connected_device(&hub);

        device.perform_command(HubCommand::ResetDevice, &mut events);
        assert_eq!(events.log_lines(), vec!["Successful reset (timeout received)"]);

        hub.fail(Attribute::Reset, HubError::Busy);
        events.clear();
        device.perform_command(HubCommand::ResetDevice, &mut events);
        assert_eq!(events.log_lines(), vec!["Error resetting hub: Hub is busy"]);
    }

    #[test]
    fn clear_all_touches_every_port() {
        let hub = MockHub::new(HubModel::Hub2x4, 7);
        let (mut device, mut events) = connected_device(&hub);

        device.perform_command(HubCommand::ClearAllPortErrors, &mut events);
        let cleared: Vec<Call> = (0..4)
            .map(|port| Call::Write(Attribute::ClearPortError, Some(port), 0))
            .collect();
        assert_eq!(hub.writes(), cleared);
    }

    #[test]
    fn split_data_speed_needs_a_hub3p() {
        let hub = MockHub::new(HubModel::Hub2x4, 7);
        let (mut device, mut events) = connected_device(&hub);
        device.perform_command(HubCommand::SetPortSuperSpeedData(0, true), &mut events);
        assert!(hub.writes().is_empty());

        let hub = MockHub::new(HubModel::Hub3Plus, 8);
        // Port 0 currently has Hi-Speed data only.
        hub.set_value(Attribute::HubMode, None, 0b11);
        let (mut device, mut events) = connected_device(&hub);
        device.perform_command(HubCommand::SetPortSuperSpeedData(0, true), &mut events);

        assert_eq!(
            hub.writes(),
            vec![Call::Write(Attribute::PortSuperSpeedData, Some(0), 1)]
        );
        assert!(events.events().contains(&HubEvent::DataSpeedRequested {
            port: 0,
            speed: DataSpeed::HiSpeedPlusSuperSpeed
        }));
    }

    #[test]
    fn event_log_is_decoded() {
        let hub = MockHub::new(HubModel::Hub3Plus, 7);
        hub.set_slot(Store::Ram, EVENT_LOG_SLOT, &[0x0A, 0, 0, 0, 8, 0xFF]);
        let (mut device, mut events) = connected_device(&hub);

        device.perform_command(HubCommand::FetchEventLog, &mut events);
        assert_eq!(
            events.log_lines(),
            vec!["Showing hub event logs (log size: 6)\n0: time: 10 e: boot\n"]
        );
        assert_eq!(hub.count(&Call::Write(Attribute::LogEvents, None, 0)), 1);
    }

    #[test]
    fn hub2x4_has_no_event_log() {
        let hub = MockHub::new(HubModel::Hub2x4, 7);
        let (mut device, mut events) = connected_device(&hub);
        device.perform_command(HubCommand::FetchEventLog, &mut events);
        assert_eq!(
            events.log_lines(),
            vec!["USBHub2x4 does not support event logs"]
        );
        assert!(hub.writes().is_empty());
    }

    #[test]
    fn polling_delay_is_clamped() {
        let hub = MockHub::new(HubModel::Hub2x4, 7);
        let (mut device, mut events) = connected_device(&hub);
        device.perform_command(HubCommand::SetPollingDelay(60_000), &mut events);
        assert_eq!(device.polling_delay(), Duration::from_millis(MAX_POLLING_DELAY));
        assert_eq!(clamp_polling_delay(5), Duration::from_millis(5));
    }
}
