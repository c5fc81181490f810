//! In-memory engine for testing and headless runs
//!
//! Provides a deterministic [`Engine`] whose plugins only record what was
//! asked of them. The plugin list is swapped atomically on every edit, so
//! readers always see a consistent list without taking a lock.

use super::engine::{
    AddPluginRequest, Engine, EngineEvent, EngineInfo, EngineSnapshot, EventSink, Plugin,
};
use super::notifier::{OscSender, ReplyTarget};
use super::types::{ControlError, ControlResult, Origin};
use arc_swap::ArcSwap;
use rosc::{OscMessage, OscType};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

type SharedSink = Arc<RwLock<Option<Arc<dyn EventSink>>>>;

fn emit(sink: &SharedSink, event: EngineEvent, origin: Origin) {
    let sink = sink.read().unwrap_or_else(PoisonError::into_inner);
    if let Some(sink) = sink.as_ref() {
        sink.emit(&event, origin);
    }
}

/// A call received by a [`MockPlugin`]
#[derive(Clone, Debug, PartialEq)]
pub enum PluginCall {
    SetActive(bool, Origin),
    SetDryWet(f32, Origin),
    SetVolume(f32, Origin),
    SetBalanceLeft(f32, Origin),
    SetBalanceRight(f32, Origin),
    SetPanning(f32, Origin),
    SetParameterValue(u32, f32, Origin),
    SetParameterMidiCc(u32, i16, Origin),
    SetParameterMidiChannel(u32, u8, Origin),
    SetProgram(i32, Origin),
    SetMidiProgram(i32, Origin),
    Note {
        channel: u8,
        note: u8,
        velocity: u8,
        origin: Origin,
    },
    Custom {
        method: String,
        args: Vec<OscType>,
    },
}

/// Plugin that records every control call
pub struct MockPlugin {
    id: AtomicU32,
    name: Mutex<String>,
    calls: Mutex<Vec<PluginCall>>,
    sink: SharedSink,
}

impl MockPlugin {
    fn new(id: u32, name: &str, sink: SharedSink) -> Self {
        Self {
            id: AtomicU32::new(id),
            name: Mutex::new(name.to_string()),
            calls: Mutex::new(Vec::new()),
            sink,
        }
    }

    fn set_id(&self, id: u32) {
        self.id.store(id, Ordering::SeqCst);
    }

    fn set_name(&self, name: &str) {
        *self.name.lock().unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }

    fn record(&self, call: PluginCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<PluginCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Plugin for MockPlugin {
    fn id(&self) -> u32 {
        self.id.load(Ordering::SeqCst)
    }

    fn name(&self) -> String {
        self.name
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_active(&self, active: bool, origin: Origin) {
        self.record(PluginCall::SetActive(active, origin));
    }

    fn set_dry_wet(&self, value: f32, origin: Origin) {
        self.record(PluginCall::SetDryWet(value, origin));
    }

    fn set_volume(&self, value: f32, origin: Origin) {
        self.record(PluginCall::SetVolume(value, origin));
    }

    fn set_balance_left(&self, value: f32, origin: Origin) {
        self.record(PluginCall::SetBalanceLeft(value, origin));
    }

    fn set_balance_right(&self, value: f32, origin: Origin) {
        self.record(PluginCall::SetBalanceRight(value, origin));
    }

    fn set_panning(&self, value: f32, origin: Origin) {
        self.record(PluginCall::SetPanning(value, origin));
    }

    fn set_parameter_value(&self, index: u32, value: f32, origin: Origin) {
        self.record(PluginCall::SetParameterValue(index, value, origin));
        emit(
            &self.sink,
            EngineEvent::ParameterValueChanged {
                id: self.id(),
                index,
                value,
            },
            origin,
        );
    }

    fn set_parameter_midi_cc(&self, index: u32, cc: i16, origin: Origin) {
        self.record(PluginCall::SetParameterMidiCc(index, cc, origin));
    }

    fn set_parameter_midi_channel(&self, index: u32, channel: u8, origin: Origin) {
        self.record(PluginCall::SetParameterMidiChannel(index, channel, origin));
    }

    fn set_program(&self, index: i32, origin: Origin) {
        self.record(PluginCall::SetProgram(index, origin));
        emit(&self.sink, EngineEvent::ProgramChanged { id: self.id(), index }, origin);
    }

    fn set_midi_program(&self, index: i32, origin: Origin) {
        self.record(PluginCall::SetMidiProgram(index, origin));
        emit(
            &self.sink,
            EngineEvent::MidiProgramChanged { id: self.id(), index },
            origin,
        );
    }

    fn send_midi_single_note(&self, channel: u8, note: u8, velocity: u8, origin: Origin) {
        self.record(PluginCall::Note {
            channel,
            note,
            velocity,
            origin,
        });
        let id = self.id();
        let event = if velocity > 0 {
            EngineEvent::NoteOn {
                id,
                channel,
                note,
                velocity,
            }
        } else {
            EngineEvent::NoteOff { id, channel, note }
        };
        emit(&self.sink, event, origin);
    }

    fn handle_custom_message(&self, method: &str, args: &[OscType]) {
        self.record(PluginCall::Custom {
            method: method.to_string(),
            args: args.to_vec(),
        });
    }
}

/// A call received by a [`MemoryEngine`]
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    AddPlugin(AddPluginRequest, Origin),
    RemovePlugin(u32, Origin),
    RemoveAllPlugins(Origin),
    RenamePlugin(u32, String, Origin),
    ClonePlugin(u32, Origin),
    ReplacePlugin(u32, Origin),
    SwitchPlugins(u32, u32, Origin),
    PatchbayConnect([u32; 4], Origin),
    PatchbayDisconnect(u32, Origin),
    PatchbayRefresh(bool, Origin),
    TransportPlay(Origin),
    TransportPause(Origin),
    TransportBpm(f64, Origin),
    TransportRelocate(u64, Origin),
    ClearXruns,
    SetActionCanceled(bool),
}

/// Transport state kept by [`MemoryEngine`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportState {
    pub playing: bool,
    pub frame: u64,
    pub bpm: f64,
}

/// Engine holding a list of [`MockPlugin`]s
pub struct MemoryEngine {
    plugins: ArcSwap<Vec<Arc<MockPlugin>>>,
    /// Serializes edits of the plugin list
    edit: Mutex<()>,
    info: EngineInfo,
    external_patchbay: bool,
    pending_replace: Mutex<Option<u32>>,
    connections: Mutex<Vec<(u32, [u32; 4])>>,
    next_connection: AtomicU32,
    transport: Mutex<TransportState>,
    action_canceled: AtomicBool,
    xruns: AtomicU32,
    calls: Mutex<Vec<EngineCall>>,
    sink: SharedSink,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_info(EngineInfo {
            process_mode: 2,
            transport_mode: 0,
            buffer_size: 512,
            sample_rate: 48000.0,
            driver_name: "Dummy".to_string(),
        })
    }

    pub fn with_info(info: EngineInfo) -> Self {
        Self {
            plugins: ArcSwap::from_pointee(Vec::new()),
            edit: Mutex::new(()),
            info,
            external_patchbay: false,
            pending_replace: Mutex::new(None),
            connections: Mutex::new(Vec::new()),
            next_connection: AtomicU32::new(1),
            transport: Mutex::new(TransportState {
                playing: false,
                frame: 0,
                bpm: 120.0,
            }),
            action_canceled: AtomicBool::new(false),
            xruns: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            sink: Arc::new(RwLock::new(None)),
        }
    }

    /// Route engine and plugin events to `sink`
    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Load a plugin directly, as the host GUI would
    pub fn load_plugin(&self, name: &str) -> u32 {
        self.insert_plugin(name, Origin::Internal)
    }

    /// Concrete plugin at `index`
    pub fn plugin(&self, index: u32) -> Option<Arc<MockPlugin>> {
        self.plugins.load().get(index as usize).cloned()
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.load().iter().map(|p| p.name()).collect()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn transport(&self) -> TransportState {
        *self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn xrun_count(&self) -> u32 {
        self.xruns.load(Ordering::SeqCst)
    }

    /// Count an xrun, as the audio thread would
    pub fn report_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::SeqCst);
    }

    pub fn action_canceled(&self) -> bool {
        self.action_canceled.load(Ordering::SeqCst)
    }

    pub fn connection_ids(&self) -> Vec<u32> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    fn record(&self, call: EngineCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Apply an edit to a private copy of the list, renumber, then publish
    fn edit_plugins<T>(
        &self,
        edit: impl FnOnce(&mut Vec<Arc<MockPlugin>>) -> ControlResult<T>,
    ) -> ControlResult<T> {
        let _guard = self.edit.lock().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Arc<MockPlugin>> = self.plugins.load().iter().cloned().collect();
        let result = edit(&mut list)?;
        for (index, plugin) in list.iter().enumerate() {
            plugin.set_id(index as u32);
        }
        self.plugins.store(Arc::new(list));
        Ok(result)
    }

    fn check_index(list: &[Arc<MockPlugin>], index: u32) -> ControlResult<usize> {
        let index = index as usize;
        if index < list.len() {
            Ok(index)
        } else {
            Err(ControlError::Engine(format!("invalid plugin id {}", index)))
        }
    }

    fn insert_plugin(&self, name: &str, origin: Origin) -> u32 {
        let replace = self
            .pending_replace
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let sink = self.sink.clone();

        let (id, replaced) = self
            .edit_plugins(|list| {
                let plugin = Arc::new(MockPlugin::new(0, name, sink));
                match replace {
                    Some(index) if (index as usize) < list.len() => {
                        list[index as usize] = plugin;
                        Ok((index, true))
                    }
                    _ => {
                        list.push(plugin);
                        Ok((list.len() as u32 - 1, false))
                    }
                }
            })
            .unwrap_or((0, false));

        if replaced {
            emit(&self.sink, EngineEvent::PluginRemoved { id }, origin);
        }
        emit(
            &self.sink,
            EngineEvent::PluginAdded {
                id,
                name: name.to_string(),
            },
            origin,
        );
        id
    }
}

impl Engine for MemoryEngine {
    fn plugin_count(&self) -> u32 {
        self.plugins.load().len() as u32
    }

    fn plugin_unchecked(&self, index: u32) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .load()
            .get(index as usize)
            .map(|p| p.clone() as Arc<dyn Plugin>)
    }

    fn snapshot(&self) -> EngineSnapshot {
        let plugins = self.plugins.load();
        EngineSnapshot {
            info: self.info.clone(),
            plugins: plugins
                .iter()
                .enumerate()
                .map(|(i, p)| (i as u32, p.name()))
                .collect(),
            external_patchbay: self.external_patchbay,
        }
    }

    fn add_plugin(&self, request: AddPluginRequest, origin: Origin) -> ControlResult<()> {
        let name = request
            .name
            .clone()
            .unwrap_or_else(|| request.label.clone());
        self.record(EngineCall::AddPlugin(request, origin));
        self.insert_plugin(&name, origin);
        Ok(())
    }

    fn remove_plugin(&self, index: u32, origin: Origin) -> ControlResult<()> {
        self.record(EngineCall::RemovePlugin(index, origin));
        self.edit_plugins(|list| {
            let i = Self::check_index(list, index)?;
            list.remove(i);
            Ok(())
        })?;
        emit(&self.sink, EngineEvent::PluginRemoved { id: index }, origin);
        Ok(())
    }

    fn remove_all_plugins(&self, origin: Origin) -> ControlResult<()> {
        self.record(EngineCall::RemoveAllPlugins(origin));
        let count = self.edit_plugins(|list| {
            let count = list.len() as u32;
            list.clear();
            Ok(count)
        })?;
        for id in (0..count).rev() {
            emit(&self.sink, EngineEvent::PluginRemoved { id }, origin);
        }
        Ok(())
    }

    fn rename_plugin(&self, index: u32, name: &str, origin: Origin) -> ControlResult<()> {
        self.record(EngineCall::RenamePlugin(index, name.to_string(), origin));
        self.edit_plugins(|list| {
            let i = Self::check_index(list, index)?;
            list[i].set_name(name);
            Ok(())
        })?;
        emit(
            &self.sink,
            EngineEvent::PluginRenamed {
                id: index,
                name: name.to_string(),
            },
            origin,
        );
        Ok(())
    }

    fn clone_plugin(&self, index: u32, origin: Origin) -> ControlResult<()> {
        self.record(EngineCall::ClonePlugin(index, origin));
        let name = {
            let list = self.plugins.load();
            let i = Self::check_index(&list, index)?;
            list[i].name()
        };
        self.insert_plugin(&name, origin);
        Ok(())
    }

    fn replace_plugin(&self, index: u32, origin: Origin) -> ControlResult<()> {
        self.record(EngineCall::ReplacePlugin(index, origin));
        Self::check_index(&self.plugins.load(), index)?;
        *self
            .pending_replace
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(index);
        Ok(())
    }

    fn switch_plugins(&self, a: u32, b: u32, origin: Origin) -> ControlResult<()> {
        self.record(EngineCall::SwitchPlugins(a, b, origin));
        if a == b {
            return Err(ControlError::Engine(
                "cannot switch a plugin with itself".to_string(),
            ));
        }
        self.edit_plugins(|list| {
            let i = Self::check_index(list, a)?;
            let j = Self::check_index(list, b)?;
            list.swap(i, j);
            Ok(())
        })
    }

    fn patchbay_connect(
        &self,
        group_a: u32,
        port_a: u32,
        group_b: u32,
        port_b: u32,
        origin: Origin,
    ) -> ControlResult<()> {
        let ports = [group_a, port_a, group_b, port_b];
        self.record(EngineCall::PatchbayConnect(ports, origin));
        let connection_id = self.next_connection.fetch_add(1, Ordering::SeqCst);
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((connection_id, ports));
        emit(
            &self.sink,
            EngineEvent::PatchbayConnectionAdded {
                connection_id,
                description: format!("{}:{}:{}:{}", group_a, port_a, group_b, port_b),
            },
            origin,
        );
        Ok(())
    }

    fn patchbay_disconnect(&self, connection_id: u32, origin: Origin) -> ControlResult<()> {
        self.record(EngineCall::PatchbayDisconnect(connection_id, origin));
        {
            let mut connections = self
                .connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let before = connections.len();
            connections.retain(|(id, _)| *id != connection_id);
            if connections.len() == before {
                return Err(ControlError::Engine(format!(
                    "no connection with id {}",
                    connection_id
                )));
            }
        }
        emit(
            &self.sink,
            EngineEvent::PatchbayConnectionRemoved { connection_id },
            origin,
        );
        Ok(())
    }

    fn patchbay_refresh(&self, external: bool, origin: Origin) -> ControlResult<()> {
        self.record(EngineCall::PatchbayRefresh(external, origin));
        let connections = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for (connection_id, p) in connections {
            emit(
                &self.sink,
                EngineEvent::PatchbayConnectionAdded {
                    connection_id,
                    description: format!("{}:{}:{}:{}", p[0], p[1], p[2], p[3]),
                },
                origin,
            );
        }
        Ok(())
    }

    fn transport_play(&self, origin: Origin) {
        self.record(EngineCall::TransportPlay(origin));
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .playing = true;
    }

    fn transport_pause(&self, origin: Origin) {
        self.record(EngineCall::TransportPause(origin));
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .playing = false;
    }

    fn transport_bpm(&self, bpm: f64, origin: Origin) {
        self.record(EngineCall::TransportBpm(bpm, origin));
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bpm = bpm;
    }

    fn transport_relocate(&self, frame: u64, origin: Origin) {
        self.record(EngineCall::TransportRelocate(frame, origin));
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .frame = frame;
    }

    fn clear_xruns(&self) {
        self.record(EngineCall::ClearXruns);
        self.xruns.store(0, Ordering::SeqCst);
    }

    fn set_action_canceled(&self, canceled: bool) {
        self.record(EngineCall::SetActionCanceled(canceled));
        self.action_canceled.store(canceled, Ordering::SeqCst);
    }
}

/// Sender that keeps every message instead of putting it on the wire
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(ReplyTarget, OscMessage)>>,
    forgotten: Mutex<Vec<ReplyTarget>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(ReplyTarget, OscMessage)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Targets whose connection state was dropped, oldest first
    pub fn forgotten(&self) -> Vec<ReplyTarget> {
        self.forgotten
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.forgotten
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl OscSender for RecordingSender {
    fn send(&self, target: &ReplyTarget, message: OscMessage) -> ControlResult<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((*target, message));
        Ok(())
    }

    fn forget(&self, target: &ReplyTarget) {
        self.forgotten
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*target);
    }
}
