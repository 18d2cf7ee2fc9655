use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Resolve Error - {0}")]
    Resolve(String),

    #[error("Read Error - {0}")]
    Read(String),

    #[error("Create Error - {0}")]
    Create(String),

    #[error("Append Error - {0}")]
    Append(String),

    #[error("Delete Error - {0}")]
    Delete(String),

    #[error("Store Error - {0}")]
    Store(String),

    #[error("Registry Error - {0}")]
    Registry(String),

    #[error("Event Error - {0}")]
    Event(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<filersync_azure::Error> for Error {
    fn from(value: filersync_azure::Error) -> Self {
        match value {
            filersync_azure::Error::InvalidConfig(e) => Error::Config(e),
            e => Error::Store(e.to_string()),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(value: config::ConfigError) -> Self {
        Error::Config(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Event(value.to_string())
    }
}
