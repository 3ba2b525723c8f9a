#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Request timed out")]
    Timeout,

    #[error("Hub is not connected")]
    NotConnected,

    #[error("Link IO error")]
    Io,

    #[error("Hub is busy")]
    Busy,

    #[error("Invalid parameter")]
    Parameter,

    #[error("Not supported by this hub")]
    Unsupported,

    #[error("Invalid entity")]
    InvalidEntity,

    #[error("Hub is out of resources")]
    Resource,

    #[error("Hardware error {0}")]
    Other(u8),
}

pub type HubResult<T> = Result<T, HubError>;

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("No supported hub was found")]
    DeviceNotFound,

    #[error("Device model {0} is not a supported hub")]
    UnsupportedModel(u8),

    #[error("Link error: {0}")]
    Link(#[from] HubError),
}
