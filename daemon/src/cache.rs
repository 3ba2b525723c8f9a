use hubtool_ipc::{ConnectionStatus, DownstreamChange, HubEvent, HubStatus, UpstreamChange};
use hubtool_types::{
    clamp_temperature, format_temperature, Capabilities, DeviceIdentity, PortErrorFlag, PortMode,
    PortModeBits, PortStateFlag, UpstreamMode, UpstreamState, SYSTEM_NAME_INDEX,
};

/// A freshly read value from the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Identity(DeviceIdentity),
    PortMetrics {
        port: u8,
        microvolts: i32,
        microamps: i32,
    },
    HubMode(u32),
    PortState {
        port: u8,
        bits: u32,
    },
    PortError {
        port: u8,
        bits: u32,
    },
    PortLimit {
        port: u8,
        microamps: u32,
    },
    PortMode {
        port: u8,
        mode: PortMode,
    },
    Temperature {
        micro_celsius: i32,
        max_micro_celsius: Option<i32>,
    },
    InputPower {
        microvolts: u32,
        microamps: Option<u32>,
    },
    Led(bool),
    UpstreamState(UpstreamState),
    UpstreamMode(UpstreamMode),
    UpstreamBoost(u8),
    EnumerationDelay(u32),
    DownstreamBoost(u8),
    Uptime(Option<u32>),
    Name {
        index: usize,
        name: String,
    },
}

/// The last known value of everything polled. Only a value that differs from what's held
/// here produces an event, except port metrics which always do.
#[derive(Debug, Default)]
pub struct ChangeCache {
    status: HubStatus,
    hub_mode: Option<u32>,

    // Uptime distinguishes 'never read' from 'not supported'.
    uptime: Option<Option<u32>>,
}

// Replaces the cached value, returning whether it changed.
fn replace<T: PartialEq>(cached: &mut Option<T>, value: T) -> bool {
    if cached.as_ref() == Some(&value) {
        return false;
    }
    *cached = Some(value);
    true
}

impl ChangeCache {
    pub fn status(&self) -> &HubStatus {
        &self.status
    }

    pub fn capabilities(&self) -> Capabilities {
        self.status.capabilities
    }

    /// Changing the layout forgets the hub mode, so the next read re-decodes every port.
    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        if self.status.capabilities != capabilities {
            self.hub_mode = None;
        }
        self.status.capabilities = capabilities;
    }

    pub fn set_update_rate(&mut self, hz: f64) {
        self.status.update_rate_hz = hz;
    }

    pub fn set_connection(&mut self, connection: ConnectionStatus) -> Option<HubEvent> {
        if self.status.connection == connection {
            return None;
        }
        self.status.connection = connection;
        Some(HubEvent::ConnectionChanged(connection))
    }

    pub fn update(&mut self, reading: Reading) -> Option<HubEvent> {
        match reading {
            Reading::Identity(identity) => {
                if !replace(&mut self.status.identity, identity) {
                    return None;
                }
                Some(HubEvent::IdentityChanged(identity))
            }
            Reading::PortMetrics {
                port,
                microvolts,
                microamps,
            } => {
                let record = self.status.port_mut(port)?;
                record.voltage_microvolts = Some(microvolts);
                record.current_microamps = Some(microamps);
                Some(HubEvent::PortMetricsChanged {
                    port,
                    microvolts,
                    microamps,
                })
            }
            Reading::HubMode(bits) => self.update_hub_mode(bits),
            Reading::PortState { port, bits } => {
                let record = self.status.port_mut(port)?;
                if !replace(&mut record.state_bits, bits) {
                    return None;
                }
                let flags = PortStateFlag::decode(bits);
                Some(HubEvent::PortStateChanged {
                    port,
                    bits,
                    description: PortStateFlag::describe(flags),
                    speed: PortStateFlag::link_speed(flags),
                })
            }
            Reading::PortError { port, bits } => {
                let record = self.status.port_mut(port)?;
                if !replace(&mut record.error_bits, bits) {
                    return None;
                }
                Some(HubEvent::PortErrorChanged {
                    port,
                    bits,
                    description: PortErrorFlag::describe(PortErrorFlag::decode(bits)),
                })
            }
            Reading::PortLimit { port, microamps } => {
                let record = self.status.port_mut(port)?;
                if !replace(&mut record.current_limit_microamps, microamps) {
                    return None;
                }
                Some(HubEvent::PortLimitChanged { port, microamps })
            }
            Reading::PortMode { port, mode } => {
                let record = self.status.port_mut(port)?;
                if !replace(&mut record.mode, mode) {
                    return None;
                }
                Some(HubEvent::PortModeChanged { port, mode })
            }
            Reading::Temperature {
                micro_celsius,
                max_micro_celsius,
            } => self.update_temperature(micro_celsius, max_micro_celsius),
            Reading::InputPower {
                microvolts,
                microamps,
            } => {
                let system = &mut self.status.system;
                let voltage_changed = replace(&mut system.input_voltage_microvolts, microvolts);
                let current_changed = match microamps {
                    Some(microamps) => replace(&mut system.input_current_microamps, microamps),
                    None => false,
                };
                if !voltage_changed && !current_changed {
                    return None;
                }
                Some(HubEvent::InputPowerChanged {
                    microvolts,
                    microamps,
                })
            }
            Reading::Led(on) => {
                if !replace(&mut self.status.system.led_on, on) {
                    return None;
                }
                Some(HubEvent::LedChanged(on))
            }
            Reading::UpstreamState(state) => {
                if !replace(&mut self.status.upstream.state, state) {
                    return None;
                }
                Some(HubEvent::UpstreamChanged(UpstreamChange::State(state)))
            }
            Reading::UpstreamMode(mode) => {
                if !replace(&mut self.status.upstream.mode, mode) {
                    return None;
                }
                Some(HubEvent::UpstreamChanged(UpstreamChange::Mode(mode)))
            }
            Reading::UpstreamBoost(boost) => {
                if !replace(&mut self.status.upstream.boost, boost) {
                    return None;
                }
                Some(HubEvent::UpstreamChanged(UpstreamChange::Boost(boost)))
            }
            Reading::EnumerationDelay(delay) => {
                if !replace(&mut self.status.downstream.enumeration_delay_ms, delay) {
                    return None;
                }
                Some(HubEvent::DownstreamChanged(
                    DownstreamChange::EnumerationDelay(delay),
                ))
            }
            Reading::DownstreamBoost(boost) => {
                if !replace(&mut self.status.downstream.boost, boost) {
                    return None;
                }
                Some(HubEvent::DownstreamChanged(DownstreamChange::Boost(boost)))
            }
            Reading::Uptime(minutes) => {
                if !replace(&mut self.uptime, minutes) {
                    return None;
                }
                self.status.system.uptime_minutes = minutes;
                Some(HubEvent::UptimeChanged(minutes))
            }
            Reading::Name { index, name } => {
                if self.status.name(index)? == name {
                    return None;
                }
                if index == SYSTEM_NAME_INDEX {
                    self.status.system.name = name.clone();
                } else {
                    self.status.ports.get_mut(index)?.name = name.clone();
                }
                Some(HubEvent::NameChanged { index, name })
            }
        }
    }

    fn update_hub_mode(&mut self, bits: u32) -> Option<HubEvent> {
        if !replace(&mut self.hub_mode, bits) {
            return None;
        }

        let model = self.status.capabilities.model;
        let port_count = self.status.capabilities.port_count;
        let ports: Vec<PortModeBits> = (0..port_count)
            .map(|port| PortModeBits::decode(bits, model, port))
            .collect();

        for (record, decoded) in self.status.ports.iter_mut().zip(ports.iter()) {
            record.data_speed = Some(decoded.data_speed);
            record.power_enabled = Some(decoded.power_enabled);
            record.port_enabled = Some(decoded.port_enabled);
        }
        Some(HubEvent::HubModeChanged { bits, ports })
    }

    fn update_temperature(&mut self, raw: i32, raw_max: Option<i32>) -> Option<HubEvent> {
        let system = &mut self.status.system;

        // Compare on the raw values, clamping is only for display.
        let mut changed = replace(&mut system.temperature_micro_celsius, raw);
        if let Some(raw_max) = raw_max {
            changed |= replace(&mut system.max_temperature_micro_celsius, raw_max);
        }
        if !changed {
            return None;
        }

        let micro_celsius = clamp_temperature(raw);
        let max_micro_celsius = raw_max.map(clamp_temperature);
        Some(HubEvent::TemperatureChanged {
            micro_celsius,
            max_micro_celsius,
            display: format_temperature(raw, raw_max),
        })
    }
}
