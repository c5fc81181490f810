//! Core types for the control protocol
//!
//! Defines the fundamental types shared by every stage of the dispatcher:
//! - Transports and change origins
//! - Protocol constants (MIDI limits, method length)
//! - Error types

use std::fmt;

/// Maximum number of MIDI channels
pub const MAX_MIDI_CHANNELS: i32 = 16;
/// Exclusive upper bound for MIDI note numbers
pub const MAX_MIDI_NOTE: i32 = 128;
/// Exclusive upper bound for MIDI data values (velocity etc.)
pub const MAX_MIDI_VALUE: i32 = 128;
/// Exclusive upper bound for assignable MIDI CC numbers
pub const MAX_MIDI_CONTROL: i32 = 120;

/// Maximum number of characters copied out of a plugin method name
pub const MAX_METHOD_LEN: usize = 32;

/// The two independent channels protocol messages arrive on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Stream-oriented (TCP)
    Tcp,
    /// Datagram-oriented (UDP)
    Udp,
}

impl Transport {
    pub fn is_stream(self) -> bool {
        matches!(self, Transport::Tcp)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => write!(f, "TCP"),
            Transport::Udp => write!(f, "UDP"),
        }
    }
}

/// Where a state change came from.
///
/// Every mutating engine and plugin call carries one. Listeners are always
/// notified, but a change with `External` origin was caused by a protocol
/// message and must not be re-broadcast over the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Caused by an incoming protocol message (echo suppressed)
    External,
    /// Caused by the engine itself, the GUI, or a snapshot request
    Internal,
}

impl Origin {
    /// Whether the change should be sent back out over the protocol
    pub fn broadcasts(self) -> bool {
        matches!(self, Origin::Internal)
    }
}

/// Control protocol error types
///
/// None of these are fatal: the dispatcher logs them and waits for the next
/// message.
#[derive(Debug)]
pub enum ControlError {
    /// Path does not start with this instance's root name
    NotAddressedToInstance { path: String },
    /// Path has the right prefix but cannot be decoded
    MalformedPath { path: String, reason: String },
    /// Plugin index is not below the current plugin count
    PluginIndexOutOfRange { index: u32, count: u32 },
    /// Plugin at the index is gone or now reports a different index
    StalePluginReference { index: u32 },
    /// Wrong number of arguments
    ArityMismatch {
        command: String,
        expected: usize,
        actual: usize,
    },
    /// Argument type tag does not match the declared signature
    TypeMismatch {
        command: String,
        position: usize,
        expected: String,
        actual: char,
    },
    /// Argument passed type validation but its value is out of range
    RangeViolation {
        command: String,
        argument: &'static str,
        value: String,
    },
    /// Transport already has a registered controller
    RegistrationConflict { transport: Transport, owner: String },
    /// Unregister origin does not match the current owner
    UnregisterOwnerMismatch {
        transport: Transport,
        owner: String,
        requested: String,
    },
    /// Unregister or control command with no controller bound
    NotRegistered { transport: Transport },
    /// Command not allowed on this transport
    TransportNotAllowed { path: String, transport: Transport },
    /// Registration URL cannot be parsed or resolved
    InvalidOrigin { url: String, reason: String },
    /// Global command name not in the dispatch table
    UnknownCommand { name: String },
    /// Engine refused an operation
    Engine(String),
    /// Outbound message could not be encoded
    Encode(String),
    /// Outbound send failure
    Io(std::io::Error),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::NotAddressedToInstance { path } => {
                write!(f, "Message not for this instance: '{}'", path)
            }
            ControlError::MalformedPath { path, reason } => {
                write!(f, "Malformed path '{}': {}", path, reason)
            }
            ControlError::PluginIndexOutOfRange { index, count } => write!(
                f,
                "Plugin index {} out of range (plugin count is {})",
                index, count
            ),
            ControlError::StalePluginReference { index } => write!(
                f,
                "Plugin {} is no longer present, probably has been removed",
                index
            ),
            ControlError::ArityMismatch {
                command,
                expected,
                actual,
            } => write!(
                f,
                "'{}' expects {} argument(s), got {}",
                command, expected, actual
            ),
            ControlError::TypeMismatch {
                command,
                position,
                expected,
                actual,
            } => write!(
                f,
                "'{}' argument {} has type '{}', expected {}",
                command, position, actual, expected
            ),
            ControlError::RangeViolation {
                command,
                argument,
                value,
            } => write!(
                f,
                "'{}' argument '{}' out of range: {}",
                command, argument, value
            ),
            ControlError::RegistrationConflict { transport, owner } => write!(
                f,
                "{} backend already registered to {}",
                transport, owner
            ),
            ControlError::UnregisterOwnerMismatch {
                transport,
                owner,
                requested,
            } => write!(
                f,
                "{} unregister failed, current owner {} does not match requested {}",
                transport, owner, requested
            ),
            ControlError::NotRegistered { transport } => {
                write!(f, "{} backend is not registered yet", transport)
            }
            ControlError::TransportNotAllowed { path, transport } => {
                write!(f, "'{}' is not accepted over {}", path, transport)
            }
            ControlError::InvalidOrigin { url, reason } => {
                write!(f, "Invalid origin URL '{}': {}", url, reason)
            }
            ControlError::UnknownCommand { name } => {
                write!(f, "Unhandled control command '{}'", name)
            }
            ControlError::Engine(msg) => write!(f, "Engine error: {}", msg),
            ControlError::Encode(msg) => write!(f, "OSC encode error: {}", msg),
            ControlError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<std::io::Error> for ControlError {
    fn from(e: std::io::Error) -> Self {
        ControlError::Io(e)
    }
}

/// Result type for control protocol operations
pub type ControlResult<T> = Result<T, ControlError>;
