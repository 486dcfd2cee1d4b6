mod common;

use common::utils::{HOST, NOW_MS, TAB, content_port, login_object};
use serde_json::json;
use vault_autofill::error::ErrorKind;
use vault_autofill::flows::fill_flow::{FillDecision, FillFlow, plan_fill};
use vault_autofill::flows::flow_model::{Effect, FlowEvent, FlowId, FlowState, SavePolicy};
use vault_autofill::flows::registry::FlowRegistry;
use vault_autofill::flows::save_flow::SaveFlow;
use vault_autofill::messages::message_model::{Action, FlowKind, Message, MessageType};
use vault_autofill::messages::port::{OverlayPurpose, PortRole};
use vault_autofill::vault::vault_model::LastUsedResult;

fn submitted() -> Vec<(String, String)> {
    vec![
        ("username".to_string(), "alice".to_string()),
        ("password".to_string(), "s3cret".to_string()),
    ]
}

fn save_flow() -> SaveFlow {
    SaveFlow::new(FlowId(1), &content_port(1, TAB), submitted(), SavePolicy::default()).unwrap()
}

fn post(port: u64, flow: FlowKind, action: Action) -> Effect {
    Effect::Post {
        port,
        message: Message::new(flow, action),
    }
}

fn reconnect(flow: &mut SaveFlow, port: u64, now_ms: u64) -> Vec<Effect> {
    flow.step(FlowEvent::ContentConnected { port, now_ms }).unwrap()
}

// ============================================================================
// Message vocabulary
// ============================================================================

#[test]
fn message_types_parse_flow_and_action() {
    let kind = MessageType::parse("save.submit").unwrap();
    assert_eq!(kind, MessageType::new(FlowKind::Save, Action::Submit));
    assert_eq!(kind.to_string(), "save.submit");

    for bad in ["save", "login.open", "fill.explode", ""] {
        let err = MessageType::parse(bad).unwrap_err();
        assert!(err.is(ErrorKind::Protocol), "{:?} should be a protocol error", bad);
    }
}

#[test]
fn port_names_map_to_roles() {
    assert_eq!(PortRole::parse("content_script"), Some(PortRole::Content));
    assert_eq!(
        PortRole::parse("save_connected"),
        Some(PortRole::Overlay {
            flow: FlowKind::Save,
            purpose: OverlayPurpose::Connected
        })
    );
    assert_eq!(
        PortRole::parse("fill_fill"),
        Some(PortRole::Overlay {
            flow: FlowKind::Fill,
            purpose: OverlayPurpose::Fill
        })
    );
    assert_eq!(PortRole::parse("save_fill"), None);
    assert_eq!(PortRole::parse("devtools"), None);
    assert_eq!(OverlayPurpose::Resize.port_name(FlowKind::Fill), "fill_resize");
}

// ============================================================================
// Save flow
// ============================================================================

#[test]
fn save_flow_opens_then_populates() {
    let mut flow = save_flow();
    assert_eq!(flow.state(), FlowState::Idle);

    let effects = flow.start(1, NOW_MS).unwrap();
    assert_eq!(
        effects,
        vec![
            Effect::ScheduleTimeout { after_ms: 10_000 },
            post(1, FlowKind::Save, Action::Open),
        ]
    );
    assert_eq!(flow.state(), FlowState::AwaitingChannel);
    assert_eq!(flow.prompt_count(), 1);

    let effects = flow
        .step(FlowEvent::OverlayConnected {
            port: 2,
            purpose: OverlayPurpose::Close,
        })
        .unwrap();
    assert!(effects.is_empty());
    assert_eq!(flow.state(), FlowState::PromptOpen);

    let effects = flow
        .step(FlowEvent::OverlayConnected {
            port: 3,
            purpose: OverlayPurpose::Connected,
        })
        .unwrap();
    let expected = Message::new(FlowKind::Save, Action::Populate).with_data(json!({
        "url": "https://www.example.com/login",
        "name": "Example login",
        "username": "alice",
        "password": "s3cret",
    }));
    assert_eq!(effects, vec![Effect::Post { port: 3, message: expected }]);
    assert_eq!(flow.state(), FlowState::Populated);
}

#[test]
fn save_flow_close_and_resize_from_overlay() {
    let mut flow = save_flow();
    flow.start(1, NOW_MS).unwrap();
    flow.step(FlowEvent::OverlayConnected {
        port: 2,
        purpose: OverlayPurpose::Resize,
    })
    .unwrap();

    let resize = Message::new(FlowKind::Save, Action::Resize).with_data(json!({"width": 320, "height": 200}));
    let effects = flow
        .step(FlowEvent::OverlayMessage {
            port: 2,
            message: resize.clone(),
        })
        .unwrap();
    assert_eq!(effects, vec![Effect::Post { port: 1, message: resize }]);

    let effects = flow
        .step(FlowEvent::OverlayMessage {
            port: 2,
            message: Message::new(FlowKind::Save, Action::Close),
        })
        .unwrap();
    assert_eq!(effects, vec![Effect::ClearTimeout, post(1, FlowKind::Save, Action::Close)]);
    assert!(flow.is_closed());

    // Closed flows ignore everything
    assert!(reconnect(&mut flow, 4, NOW_MS + 5_000).is_empty());
}

#[test]
fn save_flow_rejects_messages_on_foreign_ports() {
    let mut flow = save_flow();
    flow.start(1, NOW_MS).unwrap();
    let err = flow
        .step(FlowEvent::OverlayMessage {
            port: 9,
            message: Message::new(FlowKind::Save, Action::Close),
        })
        .unwrap_err();
    assert!(err.is(ErrorKind::Protocol));
    assert!(!flow.is_closed());
}

#[test]
fn save_flow_gives_up_after_retries() {
    let mut flow = save_flow();
    flow.start(1, NOW_MS).unwrap();

    assert_eq!(reconnect(&mut flow, 2, NOW_MS + 2_000), vec![post(2, FlowKind::Save, Action::Open)]);
    assert_eq!(flow.prompt_count(), 2);

    // A quick redirect is the same attempt
    assert_eq!(reconnect(&mut flow, 3, NOW_MS + 2_500), vec![post(3, FlowKind::Save, Action::Open)]);
    assert_eq!(flow.prompt_count(), 2);

    assert_eq!(reconnect(&mut flow, 4, NOW_MS + 4_000), vec![post(4, FlowKind::Save, Action::Open)]);
    assert_eq!(flow.prompt_count(), 3);

    assert_eq!(
        reconnect(&mut flow, 5, NOW_MS + 6_000),
        vec![Effect::ClearTimeout, post(5, FlowKind::Save, Action::Close)]
    );
    assert!(flow.is_closed());
}

#[test]
fn save_flow_closes_on_reconnect_after_timeout() {
    let mut flow = save_flow();
    flow.start(1, NOW_MS).unwrap();
    flow.step(FlowEvent::ContentDisconnected { port: 1 }).unwrap();
    assert_eq!(flow.content_port(), None);

    assert!(flow.step(FlowEvent::TimedOut).unwrap().is_empty());
    assert!(flow.has_timed_out());
    assert!(!flow.is_closed(), "a timeout alone closes nothing");

    assert_eq!(
        reconnect(&mut flow, 2, NOW_MS + 11_000),
        vec![Effect::ClearTimeout, post(2, FlowKind::Save, Action::Close)]
    );
    assert!(flow.is_closed());
}

#[test]
fn save_flow_resize_without_content_is_an_invariant_error() {
    let mut flow = save_flow();
    flow.start(1, NOW_MS).unwrap();
    flow.step(FlowEvent::OverlayConnected {
        port: 2,
        purpose: OverlayPurpose::Resize,
    })
    .unwrap();
    flow.step(FlowEvent::ContentDisconnected { port: 1 }).unwrap();

    let err = flow
        .step(FlowEvent::OverlayMessage {
            port: 2,
            message: Message::new(FlowKind::Save, Action::Resize).with_data(json!({"width": 1, "height": 1})),
        })
        .unwrap_err();
    assert!(err.is(ErrorKind::Invariant));
}

// ============================================================================
// Fill planning and fill flow
// ============================================================================

#[test]
fn plan_fill_by_result_count() {
    let a = login_object("1", "alice", "pw-a", "https://www.example.com/login");
    let b = login_object("2", "bob", "pw-b", "https://www.example.com/login");

    assert_eq!(plan_fill(&[], None), FillDecision::Nothing);
    assert_eq!(
        plan_fill(std::slice::from_ref(&a), None),
        FillDecision::FillNow {
            object: a.clone(),
            remember: true
        }
    );

    let both = vec![a.clone(), b.clone()];
    assert_eq!(plan_fill(&both, None), FillDecision::Prompt);

    let last = LastUsedResult {
        host: HOST.to_string(),
        object_id: "2".to_string(),
    };
    assert_eq!(
        plan_fill(&both, Some(&last)),
        FillDecision::FillNow {
            object: b,
            remember: false
        }
    );

    let elsewhere = LastUsedResult {
        host: "other.example.org".to_string(),
        object_id: "2".to_string(),
    };
    assert_eq!(plan_fill(&both, Some(&elsewhere)), FillDecision::Prompt);
}

#[test]
fn fill_flow_populates_and_relays_choice() {
    let results = vec![
        login_object("1", "alice", "pw-a", "https://www.example.com/login"),
        login_object("2", "bob", "pw-b", "https://www.example.com/login"),
    ];
    let mut flow = FillFlow::new(FlowId(7), TAB, 1, results.clone());

    assert_eq!(flow.start().unwrap(), vec![post(1, FlowKind::Fill, Action::Open)]);
    assert_eq!(flow.state(), FlowState::AwaitingChannel);

    let effects = flow
        .step(FlowEvent::OverlayConnected {
            port: 2,
            purpose: OverlayPurpose::Connected,
        })
        .unwrap();
    let Effect::Post { port, message } = &effects[0] else {
        panic!("expected a post, got {:?}", effects);
    };
    assert_eq!(*port, 2);
    assert!(message.is(FlowKind::Fill, Action::Populate));
    assert_eq!(message.data.as_ref().and_then(|d| d.as_array()).map(Vec::len), Some(2));

    flow.step(FlowEvent::OverlayConnected {
        port: 3,
        purpose: OverlayPurpose::Fill,
    })
    .unwrap();
    let choice = Message::new(FlowKind::Fill, Action::Fill).with_data(serde_json::to_value(&results[1]).unwrap());
    let effects = flow
        .step(FlowEvent::OverlayMessage {
            port: 3,
            message: choice,
        })
        .unwrap();
    assert_eq!(
        effects,
        vec![Effect::Fill {
            port: 1,
            object: results[1].clone(),
            remember: true
        }]
    );
}

#[test]
fn fill_flow_closes_when_page_goes_away() {
    let mut flow = FillFlow::new(FlowId(7), TAB, 1, vec![]);
    flow.start().unwrap();

    // Some other page's content script
    assert!(flow.step(FlowEvent::ContentDisconnected { port: 5 }).unwrap().is_empty());
    assert!(!flow.is_closed());

    assert!(flow.step(FlowEvent::ContentDisconnected { port: 1 }).unwrap().is_empty());
    assert!(flow.is_closed());
}

#[test]
fn fill_flow_cancel_closes_overlay() {
    let mut flow = FillFlow::new(FlowId(7), TAB, 1, vec![]);
    flow.start().unwrap();
    assert_eq!(
        flow.step(FlowEvent::Cancel).unwrap(),
        vec![post(1, FlowKind::Fill, Action::Close)]
    );
    assert!(flow.step(FlowEvent::Cancel).unwrap().is_empty());
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn registry_tracks_one_flow_per_kind_and_tab() {
    let mut registry = FlowRegistry::new();
    let first = registry.next_id();
    let second = registry.next_id();
    assert_ne!(first, second);

    let flow = SaveFlow::new(first, &content_port(1, TAB), submitted(), SavePolicy::default()).unwrap();
    registry.insert_save(flow);
    registry.insert_fill(FillFlow::new(second, TAB, 1, vec![]));
    assert_eq!(registry.len(), 2);

    assert!(registry.is_live(FlowKind::Save, TAB, first));
    assert!(!registry.is_live(FlowKind::Save, TAB, second));
    assert!(!registry.is_live(FlowKind::Save, TAB + 1, first));

    if let Some(fill) = registry.fill_mut(TAB) {
        fill.step(FlowEvent::Cancel).unwrap();
    }
    registry.purge_closed();
    assert!(registry.fill(TAB).is_none());
    assert!(registry.save(TAB).is_some());

    assert!(registry.take_save(TAB).is_some());
    assert!(registry.is_empty());
}
