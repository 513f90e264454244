//! Error handling for SonicAmp
//!
//! Provides error types for all layers of the control stack:
//! - Connection errors (transport, framing, timeouts)
//! - Protocol errors (contracts, answers, device error codes)
//! - Procedure errors (controller and argument validation)
//! - Script errors (parser and sequencer)
//!
//! All error types use `thiserror` for ergonomic error handling.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Connection error type
///
/// Represents failures of the byte stream below the command layer. Every
/// variant except [`ConnectionError::Framing`] and [`ConnectionError::Timeout`]
/// is terminal for the device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Malformed or oversized frame
    #[error("Framing error: {reason}")]
    Framing {
        /// What was wrong with the frame.
        reason: String,
    },

    /// Transport reached EOF or failed with an I/O error
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// Why the connection was lost.
        reason: String,
    },

    /// No answer arrived within the per-attempt budget
    #[error("No answer within {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// The communicator was closed while a request was outstanding
    #[error("Connection closed")]
    Closed,

    /// Failed to open the transport
    #[error("Failed to open {port}: {reason}")]
    FailedToOpen {
        /// Serial port or executable path.
        port: String,
        /// The reason opening failed.
        reason: String,
    },

    /// I/O error outside of an open connection
    #[error("I/O error: {reason}")]
    Io {
        /// Description of the underlying I/O failure.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents problems with commands and answers once bytes move correctly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The answer did not match its contract
    #[error("Invalid answer to {command}: {answer:?}")]
    AnswerInvalid {
        /// The identifier of the command that was sent.
        command: String,
        /// The raw answer body.
        answer: String,
    },

    /// The device speaks the other protocol
    #[error("Protocol mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch {
        /// The protocol that was probed.
        expected: String,
        /// What the device answered with.
        actual: String,
    },

    /// The command code is not in the device's supported set
    #[error("Command {command} is not supported by this device")]
    CommandNotSupported {
        /// Name of the command code.
        command: String,
    },

    /// The device answered with an error code
    #[error("Device error {code} ({kind}){}", .value.as_ref().map(|v| format!(": {v}")).unwrap_or_default())]
    DeviceError {
        /// Error code, always >= 20000.
        code: i32,
        /// Human readable name of the error code.
        kind: String,
        /// Offending value echoed by the device, if any.
        value: Option<String>,
    },

    /// A command argument does not satisfy its field type
    #[error("Invalid argument for {command}: {reason}")]
    InvalidArgument {
        /// Identifier of the command.
        command: String,
        /// Which constraint was violated.
        reason: String,
    },

    /// The text does not match any known command contract
    #[error("Unknown command: {text}")]
    UnknownCommand {
        /// The offending text.
        text: String,
    },
}

/// Procedure error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcedureError {
    /// Another procedure is already running
    #[error("Procedure {running} is already running")]
    Busy {
        /// The procedure currently running.
        running: String,
    },

    /// The device does not provide this procedure
    #[error("Procedure {procedure} is not available on this device")]
    NotAvailable {
        /// The requested procedure.
        procedure: String,
    },

    /// Arguments do not satisfy the procedure's schema
    #[error("Invalid argument '{field}' for {procedure}: {reason}")]
    InvalidArgs {
        /// The procedure the arguments were for.
        procedure: String,
        /// The offending field.
        field: String,
        /// The violated constraint.
        reason: String,
    },

    /// A remote procedure did not report completion in time
    #[error("{procedure} did not finish within {timeout_ms}ms")]
    FinishTimeout {
        /// The procedure that was awaited.
        procedure: String,
        /// How long the wait lasted in milliseconds.
        timeout_ms: u64,
    },
}

/// Script error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    /// The parser rejected the source
    #[error("Syntax error at line {line} near '{token}': {reason}")]
    Syntax {
        /// One-based source line.
        line: usize,
        /// The offending token.
        token: String,
        /// What was expected.
        reason: String,
    },

    /// The sequencer is already executing a script
    #[error("A script is already running")]
    AlreadyRunning,
}

/// Main error type for SonicAmp
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Procedure error
    #[error(transparent)]
    Procedure(#[from] ProcedureError),

    /// Script error
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Error of a layer outside the control stack, e.g. settings
    #[error(transparent)]
    External(SharedError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// A foreign error behind a shared pointer
///
/// Keeps [`Error`] cloneable while preserving the foreign error's type and
/// source chain. Two values are equal only if they share the same error.
#[derive(Clone)]
pub struct SharedError(Arc<dyn std::error::Error + Send + Sync>);

impl SharedError {
    /// Take ownership of `err`
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }

    /// The wrapped error if it is a `T`
    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for SharedError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Wrap an error of another layer, keeping its source chain
    pub fn external(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::External(SharedError::new(err))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::Timeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this error ends the device session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Connection(
                ConnectionError::ConnectionLost { .. }
                    | ConnectionError::Closed
                    | ConnectionError::FailedToOpen { .. }
                    | ConnectionError::Io { .. }
            )
        )
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if the device rejected the command with an error code
    pub fn is_device_error(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::DeviceError { .. }))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Connection(ConnectionError::Io {
            reason: err.to_string(),
        })
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
