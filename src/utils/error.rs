use std::time::Duration;
use thiserror::Error;

/// Operator input rejected before any Modbus request is issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid relay number: {0} (must be 0-7)")]
    RelayIndexOutOfRange(i64),

    #[error("Invalid duration: {0} ms (must be 1-65535)")]
    DurationOutOfRange(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Failure of a Modbus round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Not connected to a Modbus server")]
    NotConnected,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Modbus exception: {0}")]
    Exception(String),

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Relay {relay}: duration set to {duration_ms} ms but arming failed: {source}")]
    ArmIncomplete {
        relay: u8,
        duration_ms: u16,
        source: TransportError,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Local terminal or file I/O, never the Modbus link.
    #[error("IO error: {0}")]
    Io(String),
}

impl RelayError {
    pub fn is_validation(&self) -> bool {
        matches!(self, RelayError::Validation(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RelayError::Transport(_) | RelayError::ArmIncomplete { .. }
        )
    }

    /// True when the transport has no usable session left and must reconnect.
    pub fn is_session_lost(&self) -> bool {
        let source = match self {
            RelayError::Transport(source) | RelayError::ArmIncomplete { source, .. } => source,
            _ => return false,
        };
        matches!(
            source,
            TransportError::Timeout(_) | TransportError::NotConnected
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl From<tokio_modbus::Error> for TransportError {
    fn from(err: tokio_modbus::Error) -> Self {
        match err {
            tokio_modbus::Error::Transport(e) => TransportError::Io(e.to_string()),
            other => TransportError::InvalidResponse(other.to_string()),
        }
    }
}

impl From<tokio_modbus::ExceptionCode> for TransportError {
    fn from(code: tokio_modbus::ExceptionCode) -> Self {
        TransportError::Exception(code.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for RelayError {
    fn from(err: toml::ser::Error) -> Self {
        RelayError::Config(format!("TOML write error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let validation: RelayError = ValidationError::RelayIndexOutOfRange(8).into();
        assert!(validation.is_validation());
        assert!(!validation.is_transport());

        let timeout: RelayError = TransportError::Timeout(Duration::from_secs(5)).into();
        assert!(timeout.is_transport());

        let partial = RelayError::ArmIncomplete {
            relay: 3,
            duration_ms: 1500,
            source: TransportError::NotConnected,
        };
        assert!(partial.is_transport());
        assert!(!partial.is_validation());
        assert!(partial.is_session_lost());
        assert!(timeout.is_session_lost());
    }

    #[test]
    fn test_session_lost_only_for_dead_sessions() {
        let exception: RelayError = TransportError::Exception("Illegal data address".into()).into();
        assert!(!exception.is_session_lost());
        let validation: RelayError = ValidationError::DurationOutOfRange(0).into();
        assert!(!validation.is_session_lost());
    }

    #[test]
    fn test_validation_message_names_the_value() {
        let err = RelayError::from(ValidationError::RelayIndexOutOfRange(-1));
        assert_eq!(err.to_string(), "Invalid relay number: -1 (must be 0-7)");
    }
}
