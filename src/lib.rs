//! # Plughost - OSC control for an audio plugin host
//!
//! Plughost lets remote controllers (GUIs, control surfaces, scripts) drive a
//! plugin host engine over OSC, on TCP and UDP at the same time.
//!
//! ## Core Features
//!
//! - **Path routing**: `/register`, `/unregister`, `/ctrl/<command>` and
//!   `/<name>/<index>/<method>` addressing
//! - **Strict validation**: every command has one exact type signature
//! - **Single-owner registration**: one controller per transport, with a
//!   state snapshot sent to late joiners
//! - **Echo suppression**: changes a controller made are not reported back
//!
//! ## Quick Start
//!
//! ```rust
//! use plughost::control::{
//!     ClientRegistry, Dispatcher, DispatcherOptions, MemoryEngine, RecordingSender, Transport,
//! };
//! use rosc::{OscMessage, OscType};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(MemoryEngine::new());
//! engine.load_plugin("Reverb");
//!
//! let registry = Arc::new(ClientRegistry::new(Arc::new(RecordingSender::new())));
//! let dispatcher = Dispatcher::new(engine.clone(), registry, DispatcherOptions::new("plughost"));
//!
//! let msg = OscMessage {
//!     addr: "/plughost/0/set_volume".to_string(),
//!     args: vec![OscType::Float(0.5)],
//! };
//! assert!(dispatcher.handle_message(Transport::Udp, &msg).is_ok());
//! ```

pub mod config;
pub mod control;
pub mod server;

pub use config::{ConfigError, HostConfig};
pub use control::{ControlError, ControlResult, Dispatcher, Transport};
pub use server::ControlServer;
