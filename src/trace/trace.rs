use serde::Serialize;

use crate::flows::flow_model::{Effect, FlowId, FlowState};
use crate::messages::message_model::FlowKind;
use crate::messages::port::TabId;

/// One flow transition, written as a JSONL line.
#[derive(Debug, Clone, Serialize)]
pub struct FlowTraceEvent {
    pub timestamp_ms: u64,
    pub tab_id: TabId,
    pub flow_id: u64,
    pub flow: &'static str,

    pub state: String,
    pub event: String,

    pub effects: Vec<String>,

    pub note: Option<String>,
}

impl FlowTraceEvent {
    pub fn new(timestamp_ms: u64, tab_id: TabId, flow_id: FlowId, flow: FlowKind) -> Self {
        Self {
            timestamp_ms,
            tab_id,
            flow_id: flow_id.0,
            flow: flow.as_str(),
            state: String::new(),
            event: String::new(),
            effects: vec![],
            note: None,
        }
    }

    pub fn with_state(mut self, state: FlowState) -> Self {
        self.state = format!("{:?}", state);
        self
    }

    pub fn with_event(mut self, event: impl ToString) -> Self {
        self.event = event.to_string();
        self
    }

    pub fn with_effects(mut self, effects: &[Effect]) -> Self {
        self.effects = effects.iter().map(describe_effect).collect();
        self
    }

    pub fn with_note(mut self, note: impl ToString) -> Self {
        self.note = Some(note.to_string());
        self
    }
}

/// Short form without payloads; fill values never reach the trace.
fn describe_effect(effect: &Effect) -> String {
    match effect {
        Effect::Post { port, message } => format!("post {} -> {}", message.message_type, port),
        Effect::ScheduleTimeout { after_ms } => format!("schedule_timeout {}ms", after_ms),
        Effect::ClearTimeout => "clear_timeout".to_string(),
        Effect::Fill { port, remember, .. } => format!("fill -> {} (remember={})", port, remember),
    }
}
