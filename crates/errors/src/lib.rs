use anyhow::Error as AnyhowError;
use thiserror::Error;

pub type Result<T, E = SondeError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum SondeError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("validation: {0}")]
    Validation(String),
    #[error("no transmission channels available")]
    NoChannelsAvailable,
    #[error(transparent)]
    InvalidEvent(#[from] InvalidEventError),
    /// Raised by a plugin, channel or listener hook and passed through untouched.
    #[error(transparent)]
    Plugin(#[from] AnyhowError),
}

impl SondeError {
    /// Whether the error was raised while accepting a telemetry item.
    pub const fn is_invalid_event(&self) -> bool {
        matches!(self, Self::InvalidEvent(_))
    }

    /// The missing field name when the error is a [`InvalidEventError::MissingField`].
    pub const fn missing_field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidEvent(InvalidEventError::MissingField(field)) => Some(field),
            _ => None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("core should not be initialized more than once")]
    AlreadyInitialized,
    #[error("please provide instrumentation key")]
    MissingInstrumentationKey,
    #[error("core is not initialized")]
    NotInitialized,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidEventError {
    #[error("invalid telemetry item: {0}")]
    Malformed(String),
    #[error("telemetry item is missing required field {0}")]
    MissingField(&'static str),
}
