#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("invalid bus name: {0}")]
    InvalidBusName(String),
    #[error("invalid interface name: {0}")]
    InvalidInterfaceName(String),
    #[error("invalid member name: {0}")]
    InvalidMemberName(String),
    #[error("invalid error name: {0}")]
    InvalidErrorName(String),
    #[error("invalid unique name: {0}")]
    InvalidUniqueName(String),
}

pub type Result<T> = std::result::Result<T, Error>;
