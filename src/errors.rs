use crate::alert::{Alert, AlertDescription, AlertLevel};

pub type Result<T> = core::result::Result<T, Error>;

/// Failure taxonomy for the engine. Everything that happens on an active
/// connection maps to a TLS alert; the remaining variants are surfaced
/// synchronously and never touch the connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A protocol failure with a TLS alert translation. Fatal alerts close
    /// the connection once the outbound alert record has been flushed.
    #[error("tls alert {description:?}: {message}")]
    Alert {
        level: AlertLevel,
        description: AlertDescription,
        message: String,
    },

    /// More input is required before the value can be parsed. Used by the
    /// record layer to drive handshake message reassembly.
    #[error("incomplete input")]
    Incomplete,

    /// Invalid parameters detected before any bytes were produced.
    #[error("configuration: {0}")]
    Config(String),

    /// A trust/key/crypto capability failed.
    #[error("capability: {0}")]
    Capability(String),

    /// The host called the engine in a way its current state forbids.
    #[error("misuse: {0}")]
    Misuse(String),
}

impl Error {
    pub fn fatal<S: Into<String>>(description: AlertDescription, message: S) -> Self {
        Error::Alert {
            level: AlertLevel::fatal,
            description,
            message: message.into(),
        }
    }

    pub fn warning<S: Into<String>>(description: AlertDescription, message: S) -> Self {
        Error::Alert {
            level: AlertLevel::warning,
            description,
            message: message.into(),
        }
    }

    pub fn is_incomplete(&self) -> bool {
        match self {
            Error::Incomplete => true,
            _ => false,
        }
    }

    /// The alert record which should be sent to the peer for this failure.
    /// Failures without a protocol translation become internal_error.
    pub fn to_alert(&self) -> Option<Alert> {
        match self {
            Error::Alert { level, description, .. } => Some(Alert {
                level: *level,
                description: *description,
            }),
            Error::Capability(_) => Some(Alert {
                level: AlertLevel::fatal,
                description: AlertDescription::internal_error,
            }),
            Error::Incomplete => Some(Alert {
                level: AlertLevel::fatal,
                description: AlertDescription::decode_error,
            }),
            Error::Config(_) | Error::Misuse(_) => None,
        }
    }
}
