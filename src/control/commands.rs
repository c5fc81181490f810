//! Command tables
//!
//! Every command the dispatcher understands is described once, here: its
//! name, its exact argument signature and its handler. The tables are built
//! on first use and never change afterwards.

use super::engine::{AddPluginRequest, Engine, Plugin};
use super::signature::{ArgTag, Args};
use super::types::{
    ControlResult, Origin, MAX_MIDI_CHANNELS, MAX_MIDI_CONTROL, MAX_MIDI_NOTE, MAX_MIDI_VALUE,
};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Placeholder some controllers send for an absent string
pub const NULL_PLACEHOLDER: &str = "(null)";

const I: ArgTag = ArgTag::Int32;
const F: ArgTag = ArgTag::Float;
const S: ArgTag = ArgTag::Str;
const N: ArgTag = ArgTag::Integer;

/// What a global handler may touch
pub struct GlobalContext<'a> {
    pub engine: &'a dyn Engine,
    /// Read both `switch_plugins` indices from the first argument
    pub switch_plugins_first_slot: bool,
}

pub type GlobalHandler = fn(&GlobalContext<'_>, &Args<'_>) -> ControlResult<()>;
pub type PluginHandler = fn(&dyn Plugin, &Args<'_>) -> ControlResult<()>;

#[derive(Clone, Copy)]
pub enum Handler {
    Global(GlobalHandler),
    Plugin(PluginHandler),
    /// Accepted, validated, and deliberately ignored
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Global,
    Plugin,
}

/// One row of a dispatch table
#[derive(Clone, Copy)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub signature: &'static [ArgTag],
    pub scope: Scope,
    pub handler: Handler,
}

impl CommandDescriptor {
    pub fn arity(&self) -> usize {
        self.signature.len()
    }
}

const fn global(
    name: &'static str,
    signature: &'static [ArgTag],
    handler: GlobalHandler,
) -> CommandDescriptor {
    CommandDescriptor {
        name,
        signature,
        scope: Scope::Global,
        handler: Handler::Global(handler),
    }
}

const fn plugin(
    name: &'static str,
    signature: &'static [ArgTag],
    handler: PluginHandler,
) -> CommandDescriptor {
    CommandDescriptor {
        name,
        signature,
        scope: Scope::Plugin,
        handler: Handler::Plugin(handler),
    }
}

const fn unsupported(name: &'static str) -> CommandDescriptor {
    CommandDescriptor {
        name,
        signature: &[],
        scope: Scope::Plugin,
        handler: Handler::Unsupported,
    }
}

/// Commands under `/ctrl/`
pub const GLOBAL_COMMAND_LIST: &[CommandDescriptor] = &[
    global("clear_engine_xruns", &[], clear_engine_xruns),
    global("cancel_engine_action", &[], cancel_engine_action),
    global("patchbay_connect", &[I, I, I, I], patchbay_connect),
    global("patchbay_disconnect", &[I], patchbay_disconnect),
    global("patchbay_refresh", &[I], patchbay_refresh),
    global("transport_play", &[], transport_play),
    global("transport_pause", &[], transport_pause),
    global("transport_bpm", &[F], transport_bpm),
    global("transport_relocate", &[N], transport_relocate),
    global("add_plugin", &[I, I, S, S, S, N, I], add_plugin),
    global("remove_plugin", &[I], remove_plugin),
    global("remove_all_plugins", &[], remove_all_plugins),
    global("rename_plugin", &[I, S], rename_plugin),
    global("clone_plugin", &[I], clone_plugin),
    global("replace_plugin", &[I], replace_plugin),
    global("switch_plugins", &[I, I], switch_plugins),
];

/// Commands under `/<root>/<index>/`
pub const PLUGIN_COMMAND_LIST: &[CommandDescriptor] = &[
    unsupported("set_option"),
    plugin("set_active", &[I], set_active),
    plugin("set_drywet", &[F], set_drywet),
    plugin("set_volume", &[F], set_volume),
    plugin("set_balance_left", &[F], set_balance_left),
    plugin("set_balance_right", &[F], set_balance_right),
    plugin("set_panning", &[F], set_panning),
    unsupported("set_ctrl_channel"),
    plugin("set_parameter_value", &[I, F], set_parameter_value),
    plugin("set_parameter_midi_cc", &[I, I], set_parameter_midi_cc),
    plugin("set_parameter_midi_channel", &[I, I], set_parameter_midi_channel),
    plugin("set_program", &[I], set_program),
    plugin("set_midi_program", &[I], set_midi_program),
    unsupported("set_custom_data"),
    unsupported("set_chunk"),
    plugin("note_on", &[I, I, I], note_on),
    plugin("note_off", &[I, I], note_off),
];

fn table(list: &'static [CommandDescriptor]) -> HashMap<&'static str, CommandDescriptor> {
    list.iter().map(|d| (d.name, *d)).collect()
}

lazy_static! {
    pub static ref GLOBAL_COMMANDS: HashMap<&'static str, CommandDescriptor> =
        table(GLOBAL_COMMAND_LIST);
    pub static ref PLUGIN_COMMANDS: HashMap<&'static str, CommandDescriptor> =
        table(PLUGIN_COMMAND_LIST);
}

fn optional_string(value: &str) -> Option<String> {
    if value == NULL_PLACEHOLDER {
        None
    } else {
        Some(value.to_string())
    }
}

// Global handlers

fn clear_engine_xruns(ctx: &GlobalContext<'_>, _args: &Args<'_>) -> ControlResult<()> {
    ctx.engine.clear_xruns();
    Ok(())
}

fn cancel_engine_action(ctx: &GlobalContext<'_>, _args: &Args<'_>) -> ControlResult<()> {
    ctx.engine.set_action_canceled(true);
    Ok(())
}

fn patchbay_connect(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let group_a = args.index(0, "group_a")?;
    let port_a = args.index(1, "port_a")?;
    let group_b = args.index(2, "group_b")?;
    let port_b = args.index(3, "port_b")?;
    ctx.engine
        .patchbay_connect(group_a, port_a, group_b, port_b, Origin::External)
}

fn patchbay_disconnect(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let connection_id = args.index(0, "connection_id")?;
    ctx.engine.patchbay_disconnect(connection_id, Origin::External)
}

fn patchbay_refresh(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let external = args.int(0)? != 0;
    // The controller is asking for the graph, so it must come back over the wire
    ctx.engine.patchbay_refresh(external, Origin::Internal)
}

fn transport_play(ctx: &GlobalContext<'_>, _args: &Args<'_>) -> ControlResult<()> {
    ctx.engine.transport_play(Origin::External);
    Ok(())
}

fn transport_pause(ctx: &GlobalContext<'_>, _args: &Args<'_>) -> ControlResult<()> {
    ctx.engine.transport_pause(Origin::External);
    Ok(())
}

fn transport_bpm(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let bpm = f64::from(args.float(0)?);
    if bpm.is_nan() || bpm < 0.0 {
        return Err(args.out_of_range("bpm", bpm));
    }
    ctx.engine.transport_bpm(bpm, Origin::External);
    Ok(())
}

fn transport_relocate(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let frame = args.unsigned(0, "frame")?;
    ctx.engine.transport_relocate(frame, Origin::External);
    Ok(())
}

fn add_plugin(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let binary_type = args.index(0, "binary_type")?;
    let plugin_type = args.index(1, "plugin_type")?;
    let filename = optional_string(args.string(2)?);
    let name = optional_string(args.string(3)?);
    let label = args.label(4, "label")?.to_string();
    let unique_id = args.integer(5)?;
    let options = args.index(6, "options")?;

    ctx.engine.add_plugin(
        AddPluginRequest {
            binary_type,
            plugin_type,
            filename,
            name,
            label,
            unique_id,
            options,
        },
        Origin::External,
    )
}

fn remove_plugin(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let index = args.index(0, "index")?;
    ctx.engine.remove_plugin(index, Origin::External)
}

fn remove_all_plugins(ctx: &GlobalContext<'_>, _args: &Args<'_>) -> ControlResult<()> {
    ctx.engine.remove_all_plugins(Origin::External)
}

fn rename_plugin(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let index = args.index(0, "index")?;
    let name = args.label(1, "name")?;
    ctx.engine.rename_plugin(index, name, Origin::External)
}

fn clone_plugin(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let index = args.index(0, "index")?;
    ctx.engine.clone_plugin(index, Origin::External)
}

fn replace_plugin(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let index = args.index(0, "index")?;
    ctx.engine.replace_plugin(index, Origin::External)
}

fn switch_plugins(ctx: &GlobalContext<'_>, args: &Args<'_>) -> ControlResult<()> {
    let a = args.index(0, "index_a")?;
    let b = if ctx.switch_plugins_first_slot {
        a
    } else {
        args.index(1, "index_b")?
    };
    ctx.engine.switch_plugins(a, b, Origin::External)
}

// Plugin handlers

fn set_active(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    plugin.set_active(args.int(0)? != 0, Origin::External);
    Ok(())
}

fn set_drywet(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    plugin.set_dry_wet(args.float(0)?, Origin::External);
    Ok(())
}

fn set_volume(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    plugin.set_volume(args.float(0)?, Origin::External);
    Ok(())
}

fn set_balance_left(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    plugin.set_balance_left(args.float(0)?, Origin::External);
    Ok(())
}

fn set_balance_right(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    plugin.set_balance_right(args.float(0)?, Origin::External);
    Ok(())
}

fn set_panning(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    plugin.set_panning(args.float(0)?, Origin::External);
    Ok(())
}

fn set_parameter_value(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    let index = args.index(0, "index")?;
    let value = args.float(1)?;
    plugin.set_parameter_value(index, value, Origin::External);
    Ok(())
}

fn set_parameter_midi_cc(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    let index = args.index(0, "index")?;
    let cc = args.int_in(1, "cc", -1..MAX_MIDI_CONTROL)?;
    plugin.set_parameter_midi_cc(index, cc as i16, Origin::External);
    Ok(())
}

fn set_parameter_midi_channel(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    let index = args.index(0, "index")?;
    let channel = args.int_in(1, "channel", 0..MAX_MIDI_CHANNELS)?;
    plugin.set_parameter_midi_channel(index, channel as u8, Origin::External);
    Ok(())
}

/// Program index, where -1 means "no program"
fn program_index(args: &Args<'_>) -> ControlResult<i32> {
    let index = args.int(0)?;
    if index < -1 {
        return Err(args.out_of_range("index", index));
    }
    Ok(index)
}

fn set_program(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    plugin.set_program(program_index(args)?, Origin::External);
    Ok(())
}

fn set_midi_program(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    plugin.set_midi_program(program_index(args)?, Origin::External);
    Ok(())
}

fn note_on(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    let channel = args.int_in(0, "channel", 0..MAX_MIDI_CHANNELS)?;
    let note = args.int_in(1, "note", 0..MAX_MIDI_NOTE)?;
    let velocity = args.int_in(2, "velocity", 0..MAX_MIDI_VALUE)?;
    plugin.send_midi_single_note(channel as u8, note as u8, velocity as u8, Origin::External);
    Ok(())
}

fn note_off(plugin: &dyn Plugin, args: &Args<'_>) -> ControlResult<()> {
    let channel = args.int_in(0, "channel", 0..MAX_MIDI_CHANNELS)?;
    let note = args.int_in(1, "note", 0..MAX_MIDI_NOTE)?;
    plugin.send_midi_single_note(channel as u8, note as u8, 0, Origin::External);
    Ok(())
}
