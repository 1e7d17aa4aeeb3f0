use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Invalid setting `{setting}`: {message}")]
    InvalidSetting { setting: &'static str, message: String },

    #[error("Logging initialisation failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
