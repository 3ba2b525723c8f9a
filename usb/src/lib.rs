pub mod commands;
pub mod device;
pub mod error;

pub use device::base::{
    AttachHub, ExecutableHub, FullHubClient, HubCommands, HubDescriptor, LinkDescriptor, LinkType,
};
pub use device::demo::DemoHub;
pub use device::open_transport;
