//! Engine and plugin boundary
//!
//! The dispatcher owns no plugin state. Everything it does lands on these
//! traits, which the host engine implements. Implementations must be
//! internally synchronized: calls arrive from the TCP and UDP handlers
//! concurrently with the audio thread.

use super::types::{ControlResult, Origin};
use rosc::OscType;
use std::sync::Arc;

/// Engine configuration reported to a newly registered controller
#[derive(Clone, Debug, PartialEq)]
pub struct EngineInfo {
    pub process_mode: u32,
    pub transport_mode: u32,
    pub buffer_size: u32,
    pub sample_rate: f64,
    pub driver_name: String,
}

/// Consistent view of the engine taken in one step
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSnapshot {
    pub info: EngineInfo,
    /// `(index, name)` of every loaded plugin, in index order
    pub plugins: Vec<(u32, String)>,
    /// Whether the patchbay includes external (system) ports
    pub external_patchbay: bool,
}

/// Arguments of an `add_plugin` request
#[derive(Clone, Debug, PartialEq)]
pub struct AddPluginRequest {
    pub binary_type: u32,
    pub plugin_type: u32,
    pub filename: Option<String>,
    pub name: Option<String>,
    pub label: String,
    pub unique_id: i64,
    pub options: u32,
}

/// State changes the engine reports to its listeners
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    EngineStarted(EngineInfo),
    PluginAdded { id: u32, name: String },
    PluginRemoved { id: u32 },
    PluginRenamed { id: u32, name: String },
    ParameterValueChanged { id: u32, index: u32, value: f32 },
    ProgramChanged { id: u32, index: i32 },
    MidiProgramChanged { id: u32, index: i32 },
    NoteOn { id: u32, channel: u8, note: u8, velocity: u8 },
    NoteOff { id: u32, channel: u8, note: u8 },
    PatchbayConnectionAdded { connection_id: u32, description: String },
    PatchbayConnectionRemoved { connection_id: u32 },
}

/// Receiver of engine events (the outbound notifier, a GUI, ...)
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EngineEvent, origin: Origin);
}

/// Control surface of one loaded plugin
pub trait Plugin: Send + Sync {
    /// Index the plugin currently believes it has
    fn id(&self) -> u32;
    fn name(&self) -> String;

    fn set_active(&self, active: bool, origin: Origin);
    fn set_dry_wet(&self, value: f32, origin: Origin);
    fn set_volume(&self, value: f32, origin: Origin);
    fn set_balance_left(&self, value: f32, origin: Origin);
    fn set_balance_right(&self, value: f32, origin: Origin);
    fn set_panning(&self, value: f32, origin: Origin);
    fn set_parameter_value(&self, index: u32, value: f32, origin: Origin);
    fn set_parameter_midi_cc(&self, index: u32, cc: i16, origin: Origin);
    fn set_parameter_midi_channel(&self, index: u32, channel: u8, origin: Origin);
    /// `-1` selects no program
    fn set_program(&self, index: i32, origin: Origin);
    /// `-1` selects no program
    fn set_midi_program(&self, index: i32, origin: Origin);
    /// Velocity 0 is a note-off
    fn send_midi_single_note(&self, channel: u8, note: u8, velocity: u8, origin: Origin);

    /// Plugin-specific methods the dispatcher does not know about.
    /// Arguments are passed through untouched.
    fn handle_custom_message(&self, method: &str, args: &[OscType]);
}

/// Engine operations the dispatcher calls into
pub trait Engine: Send + Sync {
    fn plugin_count(&self) -> u32;

    /// Plugin stored at `index`, without checking it still reports that index
    fn plugin_unchecked(&self, index: u32) -> Option<Arc<dyn Plugin>>;

    /// Engine configuration plus the plugin list, taken atomically
    ///
    /// Called while a controller binding is write-locked, and event sinks
    /// take that lock to deliver notifications. Implementations must not
    /// wait on any lock that is held while events are emitted.
    fn snapshot(&self) -> EngineSnapshot;

    fn add_plugin(&self, request: AddPluginRequest, origin: Origin) -> ControlResult<()>;
    fn remove_plugin(&self, index: u32, origin: Origin) -> ControlResult<()>;
    fn remove_all_plugins(&self, origin: Origin) -> ControlResult<()>;
    fn rename_plugin(&self, index: u32, name: &str, origin: Origin) -> ControlResult<()>;
    fn clone_plugin(&self, index: u32, origin: Origin) -> ControlResult<()>;
    fn replace_plugin(&self, index: u32, origin: Origin) -> ControlResult<()>;
    fn switch_plugins(&self, a: u32, b: u32, origin: Origin) -> ControlResult<()>;

    fn patchbay_connect(
        &self,
        group_a: u32,
        port_a: u32,
        group_b: u32,
        port_b: u32,
        origin: Origin,
    ) -> ControlResult<()>;
    fn patchbay_disconnect(&self, connection_id: u32, origin: Origin) -> ControlResult<()>;
    fn patchbay_refresh(&self, external: bool, origin: Origin) -> ControlResult<()>;

    fn transport_play(&self, origin: Origin);
    fn transport_pause(&self, origin: Origin);
    fn transport_bpm(&self, bpm: f64, origin: Origin);
    fn transport_relocate(&self, frame: u64, origin: Origin);

    fn clear_xruns(&self);
    fn set_action_canceled(&self, canceled: bool);
}
