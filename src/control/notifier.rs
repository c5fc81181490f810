//! Outbound Notifier
//!
//! Pushes engine events back to the registered controllers. Events are sent
//! as `<base-path>/cb` messages with a fixed argument layout:
//!
//! ```text
//! action:i  plugin_id:i  value1:i  value2:i  value3:i  valuef:f  value_str:s
//! ```
//!
//! Parameter and note events prefer the UDP controller; everything else goes
//! to the TCP controller.

use super::engine::{EngineEvent, EventSink};
use super::registry::ClientRegistry;
use super::types::{ControlError, ControlResult, Origin, Transport};
use rosc::{OscMessage, OscPacket, OscType};
use std::collections::HashMap;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Where outbound messages for a controller are sent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplyTarget {
    pub transport: Transport,
    pub addr: SocketAddr,
}

/// Delivers encoded messages to a reply target
pub trait OscSender: Send + Sync {
    fn send(&self, target: &ReplyTarget, message: OscMessage) -> ControlResult<()>;

    /// Drop any connection held for `target`; the next send starts afresh
    fn forget(&self, _target: &ReplyTarget) {}
}

/// Encode a message as a standalone OSC packet
pub fn encode_message(message: OscMessage) -> ControlResult<Vec<u8>> {
    rosc::encoder::encode(&OscPacket::Message(message))
        .map_err(|e| ControlError::Encode(format!("{:?}", e)))
}

/// Sends over real sockets: one UDP socket, plus one cached TCP stream per
/// controller address. TCP packets are framed with a big-endian `u32` length.
pub struct SocketSender {
    udp: UdpSocket,
    streams: Mutex<HashMap<SocketAddr, TcpStream>>,
    timeout: Duration,
}

impl SocketSender {
    pub fn new() -> ControlResult<Self> {
        let udp = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            udp,
            streams: Mutex::new(HashMap::new()),
            timeout: Duration::from_millis(500),
        })
    }

    fn send_tcp(&self, addr: SocketAddr, bytes: &[u8]) -> ControlResult<()> {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);

        if !streams.contains_key(&addr) {
            let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
            stream.set_nodelay(true)?;
            stream.set_write_timeout(Some(self.timeout))?;
            debug!("Opened notification stream to {}", addr);
            streams.insert(addr, stream);
        }

        let result = match streams.get_mut(&addr) {
            Some(stream) => {
                let len = bytes.len() as u32;
                stream
                    .write_all(&len.to_be_bytes())
                    .and_then(|_| stream.write_all(bytes))
            }
            None => Ok(()),
        };

        if let Err(e) = result {
            // Reconnect on the next message
            streams.remove(&addr);
            return Err(e.into());
        }
        Ok(())
    }
}

impl OscSender for SocketSender {
    fn send(&self, target: &ReplyTarget, message: OscMessage) -> ControlResult<()> {
        let bytes = encode_message(message)?;
        match target.transport {
            Transport::Udp => {
                self.udp.send_to(&bytes, target.addr)?;
                Ok(())
            }
            Transport::Tcp => self.send_tcp(target.addr, &bytes),
        }
    }

    fn forget(&self, target: &ReplyTarget) {
        if !target.transport.is_stream() {
            return;
        }
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        if streams.remove(&target.addr).is_some() {
            debug!("Closed notification stream to {}", target.addr);
        }
    }
}

/// Callback action codes carried in the first argument
pub mod action {
    pub const PLUGIN_ADDED: i32 = 1;
    pub const PLUGIN_REMOVED: i32 = 2;
    pub const PLUGIN_RENAMED: i32 = 3;
    pub const PARAMETER_VALUE_CHANGED: i32 = 5;
    pub const PROGRAM_CHANGED: i32 = 10;
    pub const MIDI_PROGRAM_CHANGED: i32 = 11;
    pub const NOTE_ON: i32 = 13;
    pub const NOTE_OFF: i32 = 14;
    pub const PATCHBAY_CONNECTION_ADDED: i32 = 24;
    pub const PATCHBAY_CONNECTION_REMOVED: i32 = 25;
    pub const ENGINE_STARTED: i32 = 30;
}

/// Whether an event belongs on the low-latency (UDP) channel
pub fn is_realtime(event: &EngineEvent) -> bool {
    matches!(
        event,
        EngineEvent::ParameterValueChanged { .. }
            | EngineEvent::NoteOn { .. }
            | EngineEvent::NoteOff { .. }
    )
}

/// Build the `<base_path>/cb` message for an event
pub fn callback_message(base_path: &str, event: &EngineEvent) -> OscMessage {
    let (act, id, v1, v2, v3, vf, text): (i32, u32, i32, i32, i32, f32, String) = match event {
        EngineEvent::EngineStarted(info) => (
            action::ENGINE_STARTED,
            0,
            info.process_mode as i32,
            info.transport_mode as i32,
            info.buffer_size as i32,
            info.sample_rate as f32,
            info.driver_name.clone(),
        ),
        EngineEvent::PluginAdded { id, name } => {
            (action::PLUGIN_ADDED, *id, 0, 0, 0, 0.0, name.clone())
        }
        EngineEvent::PluginRemoved { id } => {
            (action::PLUGIN_REMOVED, *id, 0, 0, 0, 0.0, String::new())
        }
        EngineEvent::PluginRenamed { id, name } => {
            (action::PLUGIN_RENAMED, *id, 0, 0, 0, 0.0, name.clone())
        }
        EngineEvent::ParameterValueChanged { id, index, value } => (
            action::PARAMETER_VALUE_CHANGED,
            *id,
            *index as i32,
            0,
            0,
            *value,
            String::new(),
        ),
        EngineEvent::ProgramChanged { id, index } => {
            (action::PROGRAM_CHANGED, *id, *index, 0, 0, 0.0, String::new())
        }
        EngineEvent::MidiProgramChanged { id, index } => {
            (action::MIDI_PROGRAM_CHANGED, *id, *index, 0, 0, 0.0, String::new())
        }
        EngineEvent::NoteOn {
            id,
            channel,
            note,
            velocity,
        } => (
            action::NOTE_ON,
            *id,
            i32::from(*channel),
            i32::from(*note),
            i32::from(*velocity),
            0.0,
            String::new(),
        ),
        EngineEvent::NoteOff { id, channel, note } => (
            action::NOTE_OFF,
            *id,
            i32::from(*channel),
            i32::from(*note),
            0,
            0.0,
            String::new(),
        ),
        EngineEvent::PatchbayConnectionAdded {
            connection_id,
            description,
        } => (
            action::PATCHBAY_CONNECTION_ADDED,
            0,
            *connection_id as i32,
            0,
            0,
            0.0,
            description.clone(),
        ),
        EngineEvent::PatchbayConnectionRemoved { connection_id } => (
            action::PATCHBAY_CONNECTION_REMOVED,
            0,
            *connection_id as i32,
            0,
            0,
            0.0,
            String::new(),
        ),
    };

    OscMessage {
        addr: format!("{}/cb", base_path),
        args: vec![
            OscType::Int(act),
            OscType::Int(id as i32),
            OscType::Int(v1),
            OscType::Int(v2),
            OscType::Int(v3),
            OscType::Float(vf),
            OscType::String(text),
        ],
    }
}

/// Forwards engine events to whichever controllers are registered
pub struct OutboundNotifier {
    registry: Arc<ClientRegistry>,
}

impl OutboundNotifier {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Send one event. Returns `false` when no controller could take it.
    ///
    /// A failed send moves on to the next transport; the error is only
    /// returned if no transport delivered the event.
    pub fn notify(&self, event: &EngineEvent) -> ControlResult<bool> {
        let order: &[Transport] = if is_realtime(event) {
            &[Transport::Udp, Transport::Tcp]
        } else {
            &[Transport::Tcp]
        };

        let mut failure = None;
        for &transport in order {
            match self
                .registry
                .send_to(transport, |binding| callback_message(binding.path(), event))
            {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    debug!("{} notification failed: {}", transport, e);
                    failure = Some(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }
}

impl EventSink for OutboundNotifier {
    fn emit(&self, event: &EngineEvent, origin: Origin) {
        if !origin.broadcasts() {
            debug!("Suppressed protocol echo of {:?}", event);
            return;
        }
        if let Err(e) = self.notify(event) {
            warn!("Failed to notify controller of {:?}: {}", event, e);
        }
    }
}
