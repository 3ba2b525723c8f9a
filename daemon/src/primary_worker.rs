use crate::device::Device;
use crate::events::EventQueue;
use crate::Shutdown;
use hubtool_ipc::{HubCommand, HubEvent, HubStatus};
use hubtool_types::HubModel;
use log::{debug, info};
use tokio::sync::broadcast::Sender as BroadcastSender;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration, Instant};

pub enum DeviceCommand {
    RunHubCommand(HubCommand),
    GetStatus(oneshot::Sender<HubStatus>),
    GetConnectedModel(oneshot::Sender<HubModel>),
}

pub type DeviceSender = mpsc::Sender<DeviceCommand>;
pub type DeviceReceiver = mpsc::Receiver<DeviceCommand>;

pub async fn spawn_hub_handler(
    mut command_rx: DeviceReceiver,
    broadcast_tx: BroadcastSender<HubEvent>,
    mut shutdown: Shutdown,
    mut device: Device,
) {
    let mut events = EventQueue::default();
    device.start(&mut events);
    events.flush(&broadcast_tx);

    // The first poll happens straight away, after that the timer is only re-armed once a
    // poll has completed, so polls never overlap with each other or with a command.
    let poll_sleep = sleep(Duration::from_millis(0));
    tokio::pin!(poll_sleep);

    loop {
        tokio::select! {
            () = &mut poll_sleep => {
                device.poll(&mut events);
                events.flush(&broadcast_tx);
                poll_sleep.as_mut().reset(Instant::now() + device.polling_delay());
            }
            Some(command) = command_rx.recv() => {
                match command {
                    DeviceCommand::RunHubCommand(command) => {
                        device.perform_command(command, &mut events);
                        events.flush(&broadcast_tx);
                    }
                    DeviceCommand::GetStatus(sender) => {
                        let _ = sender.send(device.status());
                    }
                    DeviceCommand::GetConnectedModel(sender) => {
                        let _ = sender.send(device.connected_model());
                    }
                }
            }
            () = shutdown.recv() => {
                info!("Shutting down hub worker");
                device.shutdown();
                break;
            }
        }
    }
    debug!("Hub worker stopped");
}
