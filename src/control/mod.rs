//! # OSC control protocol
//!
//! Remote controllers drive the engine by sending OSC messages over TCP or
//! UDP. This module decodes their paths, validates arguments, invokes the
//! matching engine or plugin operation, and reports engine events back.
//!
//! ## Address space
//!
//! ```text
//! /register <url>            bind the controller of this transport
//! /unregister <url>          release it
//! /ctrl/<command> ...        engine-wide commands (TCP controller only)
//! /<root>/<index>/<method>   plugin commands
//! ```

pub mod address;
pub mod commands;
pub mod dispatcher;
pub mod engine;
pub mod mock_engine;
pub mod notifier;
pub mod origin_url;
pub mod registry;
pub mod signature;
pub mod types;

pub use address::{parse_route, PathFault, Route};
pub use commands::{CommandDescriptor, GLOBAL_COMMANDS, PLUGIN_COMMANDS};
pub use dispatcher::{Dispatched, Dispatcher, DispatcherOptions};
pub use engine::{AddPluginRequest, Engine, EngineEvent, EngineInfo, EngineSnapshot, EventSink, Plugin};
pub use mock_engine::{MemoryEngine, MockPlugin, RecordingSender};
pub use notifier::{OscSender, OutboundNotifier, ReplyTarget, SocketSender};
pub use registry::{ClientBinding, ClientRegistry};
pub use types::{ControlError, ControlResult, Origin, Transport};
