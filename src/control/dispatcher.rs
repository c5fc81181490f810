//! Command Dispatcher
//!
//! Single entry point for every decoded OSC message:
//!
//! ```text
//! message ─▶ parse_route ─▶ validate signature ─▶ handler ─▶ Engine / Plugin
//! ```
//!
//! The protocol is one-way. Success produces no reply; every rejection is
//! logged exactly once, here, with the transport, path and arguments.

use super::address::{parse_route, Route};
use super::commands::{GlobalContext, Handler, GLOBAL_COMMANDS, PLUGIN_COMMANDS};
use super::engine::{Engine, Plugin};
use super::registry::ClientRegistry;
use super::signature::{signature_of, validate, ArgTag};
use super::types::{ControlError, ControlResult, Transport};
use rosc::{OscMessage, OscPacket};
use std::sync::Arc;
use tracing::{debug, warn};

/// Dispatcher settings
#[derive(Clone, Debug)]
pub struct DispatcherOptions {
    /// First path segment of plugin-scoped messages
    pub root_name: String,
    /// Read both `switch_plugins` indices from the first argument
    pub switch_plugins_first_slot: bool,
}

impl DispatcherOptions {
    pub fn new(root_name: &str) -> Self {
        Self {
            root_name: root_name.to_string(),
            switch_plugins_first_slot: false,
        }
    }
}

/// What a successfully handled message did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Registered,
    Unregistered,
    Control { name: &'static str },
    Plugin { index: u32, method: &'static str },
    /// Unknown method handed to the plugin's own handler
    Forwarded { index: u32, method: String },
    /// Known method that is deliberately not implemented
    Unsupported { index: u32, method: &'static str },
}

/// Routes messages into the engine
pub struct Dispatcher {
    engine: Arc<dyn Engine>,
    registry: Arc<ClientRegistry>,
    options: DispatcherOptions,
}

impl Dispatcher {
    /// # Panics
    ///
    /// If the root name is empty or contains `/`; such a dispatcher could
    /// never address a plugin.
    pub fn new(
        engine: Arc<dyn Engine>,
        registry: Arc<ClientRegistry>,
        options: DispatcherOptions,
    ) -> Self {
        assert!(
            !options.root_name.is_empty() && !options.root_name.contains('/'),
            "invalid root name '{}'",
            options.root_name
        );
        Self {
            engine,
            registry,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn root_name(&self) -> &str {
        &self.options.root_name
    }

    /// Handle every message in a packet, bundles included, in order.
    /// Returns how many messages were handled without error.
    pub fn handle_packet(&self, transport: Transport, packet: &OscPacket) -> usize {
        match packet {
            OscPacket::Message(msg) => usize::from(self.handle_message(transport, msg).is_ok()),
            OscPacket::Bundle(bundle) => bundle
                .content
                .iter()
                .map(|p| self.handle_packet(transport, p))
                .sum(),
        }
    }

    /// Handle one message, logging the outcome
    pub fn handle_message(&self, transport: Transport, msg: &OscMessage) -> ControlResult<Dispatched> {
        debug!(
            "{} message {} '{}'",
            transport,
            msg.addr,
            signature_of(&msg.args)
        );

        let result = self.dispatch(transport, msg);
        match &result {
            Ok(outcome) => debug!("{} {} -> {:?}", transport, msg.addr, outcome),
            Err(e) => warn!(
                transport = %transport,
                path = %msg.addr,
                args = ?msg.args,
                "{}",
                e
            ),
        }
        result
    }

    fn dispatch(&self, transport: Transport, msg: &OscMessage) -> ControlResult<Dispatched> {
        match parse_route(&msg.addr, &self.options.root_name) {
            Route::GlobalRegister => {
                let args = validate("register", &[ArgTag::Str], &msg.args)?;
                self.registry
                    .register(transport, args.string(0)?, self.engine.as_ref())?;
                Ok(Dispatched::Registered)
            }
            Route::GlobalUnregister => {
                let args = validate("unregister", &[ArgTag::Str], &msg.args)?;
                self.registry.unregister(transport, args.string(0)?)?;
                Ok(Dispatched::Unregistered)
            }
            Route::ControlCommand { name } => self.dispatch_control(transport, msg, &name),
            Route::PluginCommand {
                plugin_index,
                method,
            } => self.dispatch_plugin(msg, plugin_index, method),
            Route::NotForThisInstance => Err(ControlError::NotAddressedToInstance {
                path: msg.addr.clone(),
            }),
            Route::Malformed(fault) => Err(ControlError::MalformedPath {
                path: msg.addr.clone(),
                reason: fault.to_string(),
            }),
        }
    }

    fn dispatch_control(
        &self,
        transport: Transport,
        msg: &OscMessage,
        name: &str,
    ) -> ControlResult<Dispatched> {
        if !transport.is_stream() {
            return Err(ControlError::TransportNotAllowed {
                path: msg.addr.clone(),
                transport,
            });
        }
        if !self.registry.is_registered(Transport::Tcp) {
            return Err(ControlError::NotRegistered {
                transport: Transport::Tcp,
            });
        }

        let descriptor = GLOBAL_COMMANDS
            .get(name)
            .ok_or_else(|| ControlError::UnknownCommand {
                name: name.to_string(),
            })?;

        let handler = match descriptor.handler {
            Handler::Global(handler) => handler,
            _ => {
                return Err(ControlError::UnknownCommand {
                    name: name.to_string(),
                })
            }
        };

        let args = validate(descriptor.name, descriptor.signature, &msg.args)?;
        let ctx = GlobalContext {
            engine: self.engine.as_ref(),
            switch_plugins_first_slot: self.options.switch_plugins_first_slot,
        };
        handler(&ctx, &args)?;

        Ok(Dispatched::Control {
            name: descriptor.name,
        })
    }

    /// Resolve a plugin index to the plugin that currently holds it
    fn resolve_plugin(&self, index: u32) -> ControlResult<Arc<dyn Plugin>> {
        let count = self.engine.plugin_count();
        if index >= count {
            return Err(ControlError::PluginIndexOutOfRange { index, count });
        }

        self.engine
            .plugin_unchecked(index)
            .filter(|plugin| plugin.id() == index)
            .ok_or(ControlError::StalePluginReference { index })
    }

    fn dispatch_plugin(
        &self,
        msg: &OscMessage,
        index: u32,
        method: String,
    ) -> ControlResult<Dispatched> {
        let plugin = self.resolve_plugin(index)?;

        let descriptor = match PLUGIN_COMMANDS.get(method.as_str()) {
            Some(descriptor) => descriptor,
            None => {
                debug!("Forwarding '{}' to plugin {}", method, index);
                plugin.handle_custom_message(&method, &msg.args);
                return Ok(Dispatched::Forwarded { index, method });
            }
        };

        match descriptor.handler {
            Handler::Plugin(handler) => {
                let args = validate(descriptor.name, descriptor.signature, &msg.args)?;
                handler(plugin.as_ref(), &args)?;
                Ok(Dispatched::Plugin {
                    index,
                    method: descriptor.name,
                })
            }
            Handler::Unsupported => {
                debug!(
                    "'{}' is deliberately unsupported, ignoring (plugin {})",
                    descriptor.name, index
                );
                Ok(Dispatched::Unsupported {
                    index,
                    method: descriptor.name,
                })
            }
            Handler::Global(_) => Err(ControlError::UnknownCommand { name: method }),
        }
    }
}
