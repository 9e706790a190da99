use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("pcap error: {0}")]
    PcapError(String),

    #[error("gateway rejected command: {0}")]
    Gateway(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GuardError>;
