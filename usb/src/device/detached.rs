use crate::commands::Attribute;
use crate::device::base::{
    AttachHub, ExecutableHub, FullHubClient, HubCommands, HubDescriptor, LinkDescriptor,
};
use crate::error::{ConnectError, HubError, HubResult};
use hubtool_types::Store;

/// The client used when no vendor transport is linked into the build. It never finds a
/// device, so a session built on it runs in demo mode.
#[derive(Debug, Default)]
pub struct DetachedTransport;

impl AttachHub for DetachedTransport {
    fn discover(&mut self) -> Vec<HubDescriptor> {
        vec![]
    }

    fn connect(&mut self, _descriptor: &HubDescriptor) -> Result<(), ConnectError> {
        Err(ConnectError::DeviceNotFound)
    }

    fn disconnect(&mut self) {}

    fn reconnect(&mut self) -> HubResult<()> {
        Err(HubError::NotConnected)
    }

    fn is_connected(&mut self) -> bool {
        false
    }

    fn link_descriptor(&mut self) -> HubResult<LinkDescriptor> {
        Ok(LinkDescriptor::invalid())
    }
}

impl ExecutableHub for DetachedTransport {
    fn drain(&mut self, _attribute: Attribute) {}

    fn read_value(&mut self, _attribute: Attribute, _index: Option<u8>) -> HubResult<u32> {
        Err(HubError::NotConnected)
    }

    fn write_value(&mut self, _: Attribute, _: Option<u8>, _: u32) -> HubResult<()> {
        Err(HubError::NotConnected)
    }

    fn slot_size(&mut self, _store: Store, _slot: u8) -> HubResult<usize> {
        Err(HubError::NotConnected)
    }

    fn unload_slot(&mut self, _: Store, _: u8, _: usize) -> HubResult<Vec<u8>> {
        Err(HubError::NotConnected)
    }

    fn load_slot(&mut self, _store: Store, _slot: u8, _data: &[u8]) -> HubResult<()> {
        Err(HubError::NotConnected)
    }
}

impl HubCommands for DetachedTransport {}
impl FullHubClient for DetachedTransport {}
