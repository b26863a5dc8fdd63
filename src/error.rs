//! Error types for the shared queue listener.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::{DecodeError, MessagingError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ListenerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Consumer already registered: {0}")]
    DuplicateRegistration(String),
    #[error("Invalid consumer identifier: '{0}'")]
    InvalidConsumerId(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Timeout error: {0}")]
    Timeout(String),
}

pub type ListenerResult<T> = std::result::Result<T, ListenerError>;
