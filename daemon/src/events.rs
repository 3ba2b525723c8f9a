// This file handles the events leaving the hub worker. The worker collects them into an
// EventQueue while it works, and everything else only ever sees them on the broadcast channel.

use crate::primary_worker::{DeviceCommand, DeviceSender};
use crate::Shutdown;
use hubtool_ipc::{ConnectionStatus, HubCommand, HubEvent};
use hubtool_types::{format_temperature, format_uptime, parse_serial};
use log::{debug, info, log, warn, Level};
use tokio::select;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<HubEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: HubEvent) {
        self.events.push(event);
    }

    pub fn push_change(&mut self, change: Option<HubEvent>) {
        if let Some(event) = change {
            self.events.push(event);
        }
    }

    /// Writes a human readable notice to the log, and passes it on to the presentation layer.
    pub fn notice(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log!(level, "{}", message);
        self.events.push(HubEvent::LogLine(message));
    }

    /// Sends everything queued so far, in order. Nobody listening isn't an error.
    pub fn flush(&mut self, sender: &Sender<HubEvent>) {
        for event in self.events.drain(..) {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
impl EventQueue {
    pub fn events(&self) -> &[HubEvent] {
        &self.events
    }

    pub fn log_lines(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                HubEvent::LogLine(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

/// A console stand-in for a GUI, renders events into the log and picks a hub when asked.
pub async fn spawn_event_handler(
    mut rx: Receiver<HubEvent>,
    device_tx: DeviceSender,
    preferred_serial: Option<String>,
    mut shutdown: Shutdown,
) {
    debug!("Starting Event Loop..");
    loop {
        select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => handle_event(event, &device_tx, &preferred_serial).await,
                    Err(RecvError::Lagged(missed)) => warn!("Event handler fell behind, {} events were dropped", missed),
                    Err(RecvError::Closed) => break,
                }
            }
            () = shutdown.recv() => break,
        }
    }
    debug!("Event Loop Stopped");
}

async fn handle_event(event: HubEvent, device_tx: &DeviceSender, preferred: &Option<String>) {
    match event {
        // Notices have already been written to the log by the worker.
        HubEvent::LogLine(_) | HubEvent::PollCompleted => {}

        HubEvent::ReconnectNeeded(candidates) => {
            let chosen = preferred.as_ref().and_then(|preferred| {
                let preferred = parse_serial(preferred)?;
                candidates
                    .iter()
                    .find(|candidate| parse_serial(candidate) == Some(preferred))
            });

            match chosen {
                Some(candidate) => {
                    info!("Selecting preferred hub {}", candidate);
                    let command = HubCommand::SelectDevice(candidate.clone());
                    if device_tx.send(DeviceCommand::RunHubCommand(command)).await.is_err() {
                        warn!("Hub worker has gone away, unable to select {}", candidate);
                    }
                }
                None => {
                    info!("Multiple hubs found: {}", candidates.join(", "));
                    info!("Restart with --serial <serial> to choose one");
                }
            }
        }
        HubEvent::ConnectionChanged(status) => {
            info!("Connection: {}", status);
            if status == ConnectionStatus::Connected {
                let (tx, rx) = oneshot::channel();
                if device_tx.send(DeviceCommand::GetConnectedModel(tx)).await.is_ok() {
                    if let Ok(model) = rx.await {
                        info!("Now monitoring a {}", model);
                    }
                }
            }
        }
        HubEvent::IdentityChanged(identity) => info!(
            "Hub {} ({}), firmware {}, module address {}",
            hubtool_types::format_serial(identity.serial_number),
            identity.model,
            identity.firmware,
            identity.module_address
        ),
        HubEvent::LayoutChanged { model, port_count } => {
            info!("Layout: {} with {} ports", model, port_count)
        }
        HubEvent::NameChanged { index, name } => info!("Name {}: {}", index, name),
        HubEvent::PortStateChanged {
            port,
            description,
            speed,
            ..
        } => match speed {
            Some(speed) => info!("Port {} state: {} ({})", port, description, speed),
            None => info!("Port {} state: {}", port, description),
        },
        HubEvent::PortErrorChanged {
            port, description, ..
        } => info!("Port {} errors: {}", port, description),
        HubEvent::TemperatureChanged {
            micro_celsius,
            max_micro_celsius,
            ..
        } => debug!(
            "Temperature: {}",
            format_temperature(micro_celsius, max_micro_celsius)
        ),
        HubEvent::UptimeChanged(minutes) => debug!("Uptime: {}", format_uptime(minutes)),
        other => debug!("{:?}", other),
    }
}
