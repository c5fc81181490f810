//! Tests for the OSC command dispatcher
//!
//! Drives `Dispatcher` against `MemoryEngine` and checks which engine and
//! plugin calls each message produces.

use plughost::control::mock_engine::{EngineCall, PluginCall};
use plughost::control::{
    AddPluginRequest, ClientRegistry, ControlError, ControlResult, Dispatched, Dispatcher,
    DispatcherOptions, Engine, EngineSnapshot, MemoryEngine, Origin, Plugin, RecordingSender,
    Transport,
};
use rosc::{OscMessage, OscType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

const TCP_OWNER: &str = "osc.tcp://127.0.0.1:19100/Remote";

struct Host {
    engine: Arc<MemoryEngine>,
    dispatcher: Dispatcher,
}

fn host_with(plugins: usize, options: DispatcherOptions) -> Host {
    let engine = Arc::new(MemoryEngine::new());
    for i in 0..plugins {
        engine.load_plugin(&format!("Plugin {}", i));
    }
    let registry = Arc::new(ClientRegistry::new(Arc::new(RecordingSender::new())));
    let dispatcher = Dispatcher::new(engine.clone(), registry, options);
    Host { engine, dispatcher }
}

fn host(plugins: usize) -> Host {
    host_with(plugins, DispatcherOptions::new("plughost"))
}

/// Host with a registered TCP controller, ready for `/ctrl/` commands
fn controlled_host(plugins: usize) -> Host {
    let host = host(plugins);
    host.send(Transport::Tcp, "/register", vec![s(TCP_OWNER)])
        .unwrap();
    host.engine.clear_calls();
    host
}

impl Host {
    fn send(&self, transport: Transport, addr: &str, args: Vec<OscType>) -> Result<Dispatched, ControlError> {
        self.dispatcher.handle_message(
            transport,
            &OscMessage {
                addr: addr.to_string(),
                args,
            },
        )
    }

    fn ctrl(&self, command: &str, args: Vec<OscType>) -> Result<Dispatched, ControlError> {
        self.send(Transport::Tcp, &format!("/ctrl/{}", command), args)
    }

    fn plugin_calls(&self, index: u32) -> Vec<PluginCall> {
        self.engine.plugin(index).unwrap().calls()
    }

    fn total_plugin_calls(&self) -> usize {
        (0..self.engine.plugin_names().len() as u32)
            .map(|i| self.plugin_calls(i).len())
            .sum()
    }
}

fn s(value: &str) -> OscType {
    OscType::String(value.to_string())
}

/// Counts WARN events
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Run `f` and count the warnings it logs
fn count_warnings<F: FnOnce()>(f: F) -> usize {
    let counter = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    tracing::subscriber::with_default(subscriber, f);
    counter.0.load(Ordering::SeqCst)
}

// ========== Plugin routing ==========

#[test]
fn test_each_index_reaches_its_own_plugin() {
    let host = host(5);

    for i in 0..5u32 {
        host.send(
            Transport::Udp,
            &format!("/plughost/{}/set_parameter_value", i),
            vec![OscType::Int(i as i32), OscType::Float(0.5)],
        )
        .unwrap();
    }

    for i in 0..5u32 {
        assert_eq!(
            host.plugin_calls(i),
            vec![PluginCall::SetParameterValue(i, 0.5, Origin::External)]
        );
    }
}

#[test]
fn test_out_of_range_index_is_noop_with_one_warning() {
    let host = host(3);

    for index in [3u32, 4, 999] {
        let warnings = count_warnings(|| {
            let result = host.send(
                Transport::Udp,
                &format!("/plughost/{}/set_volume", index),
                vec![OscType::Float(1.0)],
            );
            assert!(matches!(
                result,
                Err(ControlError::PluginIndexOutOfRange { count: 3, .. })
            ));
        });
        assert_eq!(warnings, 1);
    }
    assert_eq!(host.total_plugin_calls(), 0);
}

#[test]
fn test_empty_engine_rejects_index_zero() {
    let host = host(0);
    let result = host.send(Transport::Udp, "/plughost/0/set_active", vec![OscType::Int(1)]);
    assert!(matches!(
        result,
        Err(ControlError::PluginIndexOutOfRange { index: 0, count: 0 })
    ));
}

#[test]
fn test_three_digit_index_with_leading_zero() {
    let host = host(50);

    let result = host.send(Transport::Udp, "/plughost/042/set_drywet", vec![OscType::Float(0.3)]);
    assert_eq!(
        result.unwrap(),
        Dispatched::Plugin {
            index: 42,
            method: "set_drywet"
        }
    );
    assert_eq!(
        host.plugin_calls(42),
        vec![PluginCall::SetDryWet(0.3, Origin::External)]
    );
}

#[test]
fn test_four_digit_index_always_rejected() {
    let host = host(50);

    for path in ["/plughost/0001/set_volume", "/plughost/1000/set_volume"] {
        let result = host.send(Transport::Udp, path, vec![OscType::Float(1.0)]);
        assert!(matches!(result, Err(ControlError::MalformedPath { .. })));
    }
    assert_eq!(host.total_plugin_calls(), 0);
}

#[test]
fn test_foreign_root_name_is_ignored() {
    let host = host(1);
    let result = host.send(Transport::Udp, "/other/0/set_volume", vec![OscType::Float(1.0)]);
    assert!(matches!(result, Err(ControlError::NotAddressedToInstance { .. })));
    assert_eq!(host.total_plugin_calls(), 0);
}

#[test]
fn test_unknown_method_forwarded_with_raw_args() {
    let host = host(1);
    let args = vec![OscType::Int(7), s("blob"), OscType::Double(0.5)];

    let result = host.send(Transport::Udp, "/plughost/0/custom_thing", args.clone());
    assert_eq!(
        result.unwrap(),
        Dispatched::Forwarded {
            index: 0,
            method: "custom_thing".to_string()
        }
    );
    assert_eq!(
        host.plugin_calls(0),
        vec![PluginCall::Custom {
            method: "custom_thing".to_string(),
            args
        }]
    );
}

#[test]
fn test_long_method_name_truncated() {
    let host = host(1);
    let method = "m".repeat(40);

    host.send(Transport::Udp, &format!("/plughost/0/{}", method), vec![])
        .unwrap();
    match &host.plugin_calls(0)[0] {
        PluginCall::Custom { method, .. } => assert_eq!(method.len(), 32),
        other => panic!("unexpected call {:?}", other),
    }
}

#[test]
fn test_deliberately_unsupported_methods() {
    let host = host(1);

    for method in ["set_option", "set_ctrl_channel", "set_custom_data", "set_chunk"] {
        let result = host.send(
            Transport::Udp,
            &format!("/plughost/0/{}", method),
            vec![OscType::Int(0)],
        );
        assert!(matches!(result, Ok(Dispatched::Unsupported { index: 0, .. })));
    }
    assert!(host.plugin_calls(0).is_empty());
}

// ========== Signature validation ==========

#[test]
fn test_arity_violation_has_no_side_effects() {
    let host = host(1);

    let result = host.send(
        Transport::Udp,
        "/plughost/0/set_parameter_value",
        vec![OscType::Float(0.5)],
    );
    assert!(matches!(
        result,
        Err(ControlError::ArityMismatch {
            expected: 2,
            actual: 1,
            ..
        })
    ));
    assert!(host.plugin_calls(0).is_empty());
}

#[test]
fn test_type_violation_has_no_side_effects() {
    let host = host(1);

    let result = host.send(Transport::Udp, "/plughost/0/set_volume", vec![OscType::Int(1)]);
    assert!(matches!(
        result,
        Err(ControlError::TypeMismatch {
            position: 0,
            actual: 'i',
            ..
        })
    ));
    assert!(host.plugin_calls(0).is_empty());
}

#[test]
fn test_one_warning_per_rejection() {
    let host = host(1);

    let warnings = count_warnings(|| {
        let _ = host.send(Transport::Udp, "/plughost/0/set_volume", vec![]);
        let _ = host.send(Transport::Udp, "/elsewhere", vec![]);
        let _ = host.send(Transport::Udp, "/plughost/0/set_volume", vec![OscType::Float(0.1)]);
    });
    assert_eq!(warnings, 2);
}

// ========== MIDI bounds ==========

#[test]
fn test_note_on_velocity_boundary() {
    let host = host(1);

    let rejected = host.send(
        Transport::Udp,
        "/plughost/0/note_on",
        vec![OscType::Int(0), OscType::Int(60), OscType::Int(128)],
    );
    assert!(matches!(rejected, Err(ControlError::RangeViolation { .. })));
    assert!(host.plugin_calls(0).is_empty());

    host.send(
        Transport::Udp,
        "/plughost/0/note_on",
        vec![OscType::Int(0), OscType::Int(60), OscType::Int(127)],
    )
    .unwrap();
    assert_eq!(
        host.plugin_calls(0),
        vec![PluginCall::Note {
            channel: 0,
            note: 60,
            velocity: 127,
            origin: Origin::External
        }]
    );
}

#[test]
fn test_note_channel_and_pitch_bounds() {
    let host = host(1);

    for args in [
        vec![OscType::Int(16), OscType::Int(60), OscType::Int(100)],
        vec![OscType::Int(-1), OscType::Int(60), OscType::Int(100)],
        vec![OscType::Int(0), OscType::Int(128), OscType::Int(100)],
    ] {
        assert!(host.send(Transport::Udp, "/plughost/0/note_on", args).is_err());
    }
    assert!(host
        .send(Transport::Udp, "/plughost/0/note_off", vec![OscType::Int(16), OscType::Int(60)])
        .is_err());
    assert!(host.plugin_calls(0).is_empty());

    host.send(
        Transport::Udp,
        "/plughost/0/note_off",
        vec![OscType::Int(15), OscType::Int(127)],
    )
    .unwrap();
    assert_eq!(
        host.plugin_calls(0),
        vec![PluginCall::Note {
            channel: 15,
            note: 127,
            velocity: 0,
            origin: Origin::External
        }]
    );
}

#[test]
fn test_parameter_midi_cc_bounds() {
    let host = host(1);
    let path = "/plughost/0/set_parameter_midi_cc";

    assert!(host
        .send(Transport::Udp, path, vec![OscType::Int(0), OscType::Int(120)])
        .is_err());
    assert!(host
        .send(Transport::Udp, path, vec![OscType::Int(0), OscType::Int(-2)])
        .is_err());
    host.send(Transport::Udp, path, vec![OscType::Int(0), OscType::Int(-1)])
        .unwrap();
    host.send(Transport::Udp, path, vec![OscType::Int(0), OscType::Int(119)])
        .unwrap();

    assert_eq!(
        host.plugin_calls(0),
        vec![
            PluginCall::SetParameterMidiCc(0, -1, Origin::External),
            PluginCall::SetParameterMidiCc(0, 119, Origin::External),
        ]
    );
}

#[test]
fn test_program_accepts_minus_one() {
    let host = host(1);

    host.send(Transport::Udp, "/plughost/0/set_program", vec![OscType::Int(-1)])
        .unwrap();
    assert!(host
        .send(Transport::Udp, "/plughost/0/set_midi_program", vec![OscType::Int(-2)])
        .is_err());
    assert_eq!(
        host.plugin_calls(0),
        vec![PluginCall::SetProgram(-1, Origin::External)]
    );
}

// ========== Control commands ==========

#[test]
fn test_add_plugin_normalizes_null_placeholders() {
    let host = controlled_host(0);

    host.ctrl(
        "add_plugin",
        vec![
            OscType::Int(2),
            OscType::Int(1),
            s("(null)"),
            s("(null)"),
            s("Reverb"),
            OscType::Int(0),
            OscType::Int(0),
        ],
    )
    .unwrap();

    assert_eq!(
        host.engine.calls(),
        vec![EngineCall::AddPlugin(
            AddPluginRequest {
                binary_type: 2,
                plugin_type: 1,
                filename: None,
                name: None,
                label: "Reverb".to_string(),
                unique_id: 0,
                options: 0,
            },
            Origin::External
        )]
    );
    assert_eq!(host.engine.plugin_names(), vec!["Reverb".to_string()]);
}

#[test]
fn test_add_plugin_accepts_64bit_unique_id() {
    let host = controlled_host(0);

    host.ctrl(
        "add_plugin",
        vec![
            OscType::Int(2),
            OscType::Int(1),
            s("/usr/lib/lv2/synth.lv2"),
            s("Lead"),
            s("synth"),
            OscType::Long(0x1_0000_0001),
            OscType::Int(0),
        ],
    )
    .unwrap();

    match &host.engine.calls()[0] {
        EngineCall::AddPlugin(request, _) => {
            assert_eq!(request.unique_id, 0x1_0000_0001);
            assert_eq!(request.filename.as_deref(), Some("/usr/lib/lv2/synth.lv2"));
            assert_eq!(request.name.as_deref(), Some("Lead"));
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[test]
fn test_add_plugin_requires_label() {
    let host = controlled_host(0);

    let result = host.ctrl(
        "add_plugin",
        vec![
            OscType::Int(2),
            OscType::Int(1),
            s("(null)"),
            s("(null)"),
            s(""),
            OscType::Int(0),
            OscType::Int(0),
        ],
    );
    assert!(matches!(result, Err(ControlError::RangeViolation { .. })));
    assert!(host.engine.calls().is_empty());
}

#[test]
fn test_control_requires_tcp() {
    let host = controlled_host(0);

    let result = host.send(Transport::Udp, "/ctrl/transport_play", vec![]);
    assert!(matches!(result, Err(ControlError::TransportNotAllowed { .. })));
    assert!(host.engine.calls().is_empty());
}

#[test]
fn test_control_requires_registered_controller() {
    let host = host(0);

    let result = host.ctrl("transport_play", vec![]);
    assert!(matches!(
        result,
        Err(ControlError::NotRegistered {
            transport: Transport::Tcp
        })
    ));
    assert!(!host.engine.transport().playing);
}

#[test]
fn test_unknown_control_command() {
    let host = controlled_host(0);
    assert!(matches!(
        host.ctrl("set_volume", vec![OscType::Float(1.0)]),
        Err(ControlError::UnknownCommand { .. })
    ));
}

#[test]
fn test_transport_commands() {
    let host = controlled_host(0);

    host.ctrl("transport_play", vec![]).unwrap();
    host.ctrl("transport_bpm", vec![OscType::Float(98.0)]).unwrap();
    host.ctrl("transport_relocate", vec![OscType::Long(1 << 33)])
        .unwrap();
    assert!(host.ctrl("transport_bpm", vec![OscType::Float(-1.0)]).is_err());
    assert!(host.ctrl("transport_relocate", vec![OscType::Int(-5)]).is_err());

    let state = host.engine.transport();
    assert!(state.playing);
    assert_eq!(state.bpm, 98.0);
    assert_eq!(state.frame, 1 << 33);

    host.ctrl("transport_pause", vec![]).unwrap();
    assert!(!host.engine.transport().playing);
}

#[test]
fn test_engine_housekeeping() {
    let host = controlled_host(0);
    host.engine.report_xrun();
    host.engine.report_xrun();

    host.ctrl("clear_engine_xruns", vec![]).unwrap();
    host.ctrl("cancel_engine_action", vec![]).unwrap();

    assert_eq!(host.engine.xrun_count(), 0);
    assert!(host.engine.action_canceled());
}

#[test]
fn test_rename_plugin_uses_second_argument() {
    let host = controlled_host(2);

    host.ctrl("rename_plugin", vec![OscType::Int(1), s("Bass")])
        .unwrap();
    assert_eq!(
        host.engine.plugin_names(),
        vec!["Plugin 0".to_string(), "Bass".to_string()]
    );
}

#[test]
fn test_remove_plugins() {
    let host = controlled_host(3);

    host.ctrl("remove_plugin", vec![OscType::Int(0)]).unwrap();
    assert_eq!(
        host.engine.plugin_names(),
        vec!["Plugin 1".to_string(), "Plugin 2".to_string()]
    );

    // Indices shift down after a removal
    host.send(Transport::Udp, "/plughost/1/set_volume", vec![OscType::Float(0.2)])
        .unwrap();
    assert_eq!(host.engine.plugin(1).unwrap().name(), "Plugin 2");

    host.ctrl("remove_all_plugins", vec![]).unwrap();
    assert!(host.engine.plugin_names().is_empty());
}

#[test]
fn test_clone_and_replace_plugin() {
    let host = controlled_host(2);

    host.ctrl("clone_plugin", vec![OscType::Int(0)]).unwrap();
    assert_eq!(host.engine.plugin_names().len(), 3);
    assert_eq!(host.engine.plugin(2).unwrap().name(), "Plugin 0");

    host.ctrl("replace_plugin", vec![OscType::Int(1)]).unwrap();
    host.ctrl(
        "add_plugin",
        vec![
            OscType::Int(2),
            OscType::Int(1),
            s("(null)"),
            s("Delay"),
            s("delay"),
            OscType::Int(0),
            OscType::Int(0),
        ],
    )
    .unwrap();

    assert_eq!(
        host.engine.plugin_names(),
        vec![
            "Plugin 0".to_string(),
            "Delay".to_string(),
            "Plugin 0".to_string()
        ]
    );
}

#[test]
fn test_switch_plugins_reads_both_slots() {
    let host = controlled_host(3);

    host.ctrl("switch_plugins", vec![OscType::Int(0), OscType::Int(2)])
        .unwrap();
    assert_eq!(
        host.engine.calls(),
        vec![EngineCall::SwitchPlugins(0, 2, Origin::External)]
    );
    assert_eq!(host.engine.plugin(0).unwrap().name(), "Plugin 2");
}

#[test]
fn test_switch_plugins_first_slot_compat() {
    let mut options = DispatcherOptions::new("plughost");
    options.switch_plugins_first_slot = true;
    let host = host_with(3, options);
    host.send(Transport::Tcp, "/register", vec![s(TCP_OWNER)])
        .unwrap();
    host.engine.clear_calls();

    // Both indices come from the first argument, which the engine refuses
    let result = host.ctrl("switch_plugins", vec![OscType::Int(0), OscType::Int(2)]);
    assert!(matches!(result, Err(ControlError::Engine(_))));
    assert_eq!(
        host.engine.calls(),
        vec![EngineCall::SwitchPlugins(0, 0, Origin::External)]
    );
}

#[test]
fn test_patchbay_commands() {
    let host = controlled_host(0);

    host.ctrl(
        "patchbay_connect",
        vec![OscType::Int(1), OscType::Int(0), OscType::Int(2), OscType::Int(1)],
    )
    .unwrap();
    let ids = host.engine.connection_ids();
    assert_eq!(ids.len(), 1);

    host.ctrl("patchbay_refresh", vec![OscType::Int(1)]).unwrap();
    host.ctrl("patchbay_disconnect", vec![OscType::Int(ids[0] as i32)])
        .unwrap();
    assert!(host.engine.connection_ids().is_empty());

    assert!(matches!(
        host.ctrl("patchbay_disconnect", vec![OscType::Int(ids[0] as i32)]),
        Err(ControlError::Engine(_))
    ));
    assert!(matches!(
        host.ctrl(
            "patchbay_connect",
            vec![OscType::Int(-1), OscType::Int(0), OscType::Int(2), OscType::Int(1)],
        ),
        Err(ControlError::RangeViolation { .. })
    ));

    assert_eq!(
        host.engine.calls()[1],
        EngineCall::PatchbayRefresh(true, Origin::Internal)
    );
}

// ========== Stale plugin references ==========

/// Engine whose index lookup returns the plugin one slot further on, as if
/// the list shifted between checking the count and fetching the plugin
struct ShiftedEngine(Arc<MemoryEngine>);

impl Engine for ShiftedEngine {
    fn plugin_count(&self) -> u32 {
        self.0.plugin_count()
    }

    fn plugin_unchecked(&self, index: u32) -> Option<Arc<dyn Plugin>> {
        self.0.plugin_unchecked(index + 1)
    }

    fn snapshot(&self) -> EngineSnapshot {
        self.0.snapshot()
    }

    fn add_plugin(&self, request: AddPluginRequest, origin: Origin) -> ControlResult<()> {
        self.0.add_plugin(request, origin)
    }

    fn remove_plugin(&self, index: u32, origin: Origin) -> ControlResult<()> {
        self.0.remove_plugin(index, origin)
    }

    fn remove_all_plugins(&self, origin: Origin) -> ControlResult<()> {
        self.0.remove_all_plugins(origin)
    }

    fn rename_plugin(&self, index: u32, name: &str, origin: Origin) -> ControlResult<()> {
        self.0.rename_plugin(index, name, origin)
    }

    fn clone_plugin(&self, index: u32, origin: Origin) -> ControlResult<()> {
        self.0.clone_plugin(index, origin)
    }

    fn replace_plugin(&self, index: u32, origin: Origin) -> ControlResult<()> {
        self.0.replace_plugin(index, origin)
    }

    fn switch_plugins(&self, a: u32, b: u32, origin: Origin) -> ControlResult<()> {
        self.0.switch_plugins(a, b, origin)
    }

    fn patchbay_connect(
        &self,
        group_a: u32,
        port_a: u32,
        group_b: u32,
        port_b: u32,
        origin: Origin,
    ) -> ControlResult<()> {
        self.0
            .patchbay_connect(group_a, port_a, group_b, port_b, origin)
    }

    fn patchbay_disconnect(&self, connection_id: u32, origin: Origin) -> ControlResult<()> {
        self.0.patchbay_disconnect(connection_id, origin)
    }

    fn patchbay_refresh(&self, external: bool, origin: Origin) -> ControlResult<()> {
        self.0.patchbay_refresh(external, origin)
    }

    fn transport_play(&self, origin: Origin) {
        self.0.transport_play(origin)
    }

    fn transport_pause(&self, origin: Origin) {
        self.0.transport_pause(origin)
    }

    fn transport_bpm(&self, bpm: f64, origin: Origin) {
        self.0.transport_bpm(bpm, origin)
    }

    fn transport_relocate(&self, frame: u64, origin: Origin) {
        self.0.transport_relocate(frame, origin)
    }

    fn clear_xruns(&self) {
        self.0.clear_xruns()
    }

    fn set_action_canceled(&self, canceled: bool) {
        self.0.set_action_canceled(canceled)
    }
}

fn shifted_host(plugins: usize) -> (Arc<MemoryEngine>, Dispatcher) {
    let engine = Arc::new(MemoryEngine::new());
    for i in 0..plugins {
        engine.load_plugin(&format!("Plugin {}", i));
    }
    let registry = Arc::new(ClientRegistry::new(Arc::new(RecordingSender::new())));
    let dispatcher = Dispatcher::new(
        Arc::new(ShiftedEngine(engine.clone())),
        registry,
        DispatcherOptions::new("plughost"),
    );
    (engine, dispatcher)
}

#[test]
fn test_plugin_with_other_id_is_rejected() {
    let (engine, dispatcher) = shifted_host(2);
    let msg = OscMessage {
        addr: "/plughost/0/set_volume".to_string(),
        args: vec![OscType::Float(0.5)],
    };

    let warnings = count_warnings(|| {
        let result = dispatcher.handle_message(Transport::Udp, &msg);
        assert!(matches!(
            result,
            Err(ControlError::StalePluginReference { index: 0 })
        ));
    });

    assert_eq!(warnings, 1);
    assert!(engine.plugin(0).unwrap().calls().is_empty());
    assert!(engine.plugin(1).unwrap().calls().is_empty());
}

#[test]
fn test_vanished_plugin_is_rejected() {
    let (engine, dispatcher) = shifted_host(2);
    let msg = OscMessage {
        addr: "/plughost/1/set_active".to_string(),
        args: vec![OscType::Int(1)],
    };

    let warnings = count_warnings(|| {
        let result = dispatcher.handle_message(Transport::Udp, &msg);
        assert!(matches!(
            result,
            Err(ControlError::StalePluginReference { index: 1 })
        ));
    });

    assert_eq!(warnings, 1);
    assert!(engine.plugin(0).unwrap().calls().is_empty());
    assert!(engine.plugin(1).unwrap().calls().is_empty());
}
