use crate::device::base::FullHubClient;
use crate::device::detached::DetachedTransport;

pub mod base;
pub mod demo;
mod detached;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Opens the link layer compiled into this build. Without a vendor transport this is a
/// detached client, which never finds anything to connect to.
pub fn open_transport() -> Box<dyn FullHubClient> {
    Box::new(DetachedTransport)
}
