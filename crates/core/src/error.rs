use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlarmError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid repeat interval: {0}")]
    InvalidInterval(i64),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("alarm service is no longer running")]
    ServiceClosed,
}
