use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::background::session_tools::simplify_url;
use crate::error::{AutofillError, Result};
use crate::flows::flow_model::{Effect, FlowEvent, FlowId, FlowState, SavePolicy};
use crate::messages::message_model::{Action, FlowKind, Message};
use crate::messages::port::{OverlayPurpose, PortId, PortInfo, TabId};

/// Prompts the user to save credentials submitted on a page.
///
/// The prompt is reopened on every content-script reconnect (redirects,
/// hasty navigation) until the attempt budget is spent or the timeout has
/// fired; after that the next reconnect cancels the flow instead.
#[derive(Debug, Clone)]
pub struct SaveFlow {
    id: FlowId,
    tab_id: TabId,
    state: FlowState,
    policy: SavePolicy,

    url: String,
    title: String,
    data: Vec<(String, String)>,

    content_port: Option<PortId>,
    overlay_ports: Vec<PortId>,

    prompt_count: u32,
    last_try: Option<u64>,
    timed_out: bool,
}

impl SaveFlow {
    pub fn new(id: FlowId, init_port: &PortInfo, data: Vec<(String, String)>, policy: SavePolicy) -> Result<Self> {
        let tab_id = init_port
            .tab_id()
            .ok_or_else(|| AutofillError::invariant("save_flow", "sender has no tab id"))?;
        Ok(Self {
            id,
            tab_id,
            state: FlowState::Idle,
            policy,
            url: init_port.url().to_string(),
            title: init_port.title().to_string(),
            data,
            content_port: None,
            overlay_ports: vec![],
            prompt_count: 0,
            last_try: None,
            timed_out: false,
        })
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == FlowState::Closed
    }

    pub fn prompt_count(&self) -> u32 {
        self.prompt_count
    }

    pub fn has_timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn content_port(&self) -> Option<PortId> {
        self.content_port
    }

    /// Arm the timeout and open the prompt on the initiating port.
    pub fn start(&mut self, init_port: PortId, now_ms: u64) -> Result<Vec<Effect>> {
        let mut effects = vec![Effect::ScheduleTimeout {
            after_ms: self.policy.timeout_ms,
        }];
        effects.extend(self.step(FlowEvent::ContentConnected {
            port: init_port,
            now_ms,
        })?);
        Ok(effects)
    }

    pub fn step(&mut self, event: FlowEvent) -> Result<Vec<Effect>> {
        if self.is_closed() {
            return Ok(vec![]);
        }

        match event {
            FlowEvent::ContentConnected { port, now_ms } => Ok(self.on_content_connect(port, now_ms)),
            FlowEvent::ContentDisconnected { port } => {
                if self.content_port == Some(port) {
                    self.content_port = None;
                }
                Ok(vec![])
            }
            FlowEvent::OverlayConnected { port, purpose } => Ok(self.on_overlay_connect(port, purpose)),
            FlowEvent::OverlayDisconnected { port } => {
                self.overlay_ports.retain(|&p| p != port);
                Ok(vec![])
            }
            FlowEvent::OverlayMessage { port, message } => self.on_overlay_message(port, message),
            FlowEvent::TimedOut => {
                debug!(tab_id = self.tab_id, "save flow timed out");
                self.timed_out = true;
                Ok(vec![])
            }
            FlowEvent::Cancel => Ok(self.cancel()),
        }
    }

    fn on_content_connect(&mut self, port: PortId, now_ms: u64) -> Vec<Effect> {
        self.content_port = Some(port);

        if self.prompt_count >= self.policy.retries || self.timed_out {
            info!(
                tab_id = self.tab_id,
                attempts = self.prompt_count,
                timed_out = self.timed_out,
                "save prompt exhausted"
            );
            return self.cancel();
        }

        let counts = self
            .last_try
            .is_none_or(|last| now_ms.saturating_sub(last) > self.policy.retry_time_ms);
        if counts {
            self.prompt_count += 1;
        }
        self.last_try = Some(now_ms);
        self.state = FlowState::AwaitingChannel;
        debug!(tab_id = self.tab_id, attempt = self.prompt_count, "opening save prompt");

        vec![Effect::Post {
            port,
            message: Message::new(FlowKind::Save, Action::Open),
        }]
    }

    fn on_overlay_connect(&mut self, port: PortId, purpose: OverlayPurpose) -> Vec<Effect> {
        match purpose {
            OverlayPurpose::Connected => {
                self.state = FlowState::Populated;
                vec![Effect::Post {
                    port,
                    message: Message::new(FlowKind::Save, Action::Populate)
                        .with_data(Value::Object(self.populate_values())),
                }]
            }
            OverlayPurpose::Close | OverlayPurpose::Resize => {
                if self.state == FlowState::AwaitingChannel {
                    self.state = FlowState::PromptOpen;
                }
                self.overlay_ports.push(port);
                vec![]
            }
            OverlayPurpose::Fill => vec![],
        }
    }

    fn on_overlay_message(&mut self, port: PortId, message: Message) -> Result<Vec<Effect>> {
        if !self.overlay_ports.contains(&port) {
            return Err(AutofillError::protocol(
                "save_flow",
                format!("message {} on a port the flow does not listen to", message.message_type),
            ));
        }
        let kind = message.kind()?;
        if kind.flow != FlowKind::Save {
            // Other flow on the same tab
            return Ok(vec![]);
        }

        match kind.action {
            Action::Close => Ok(self.cancel()),
            Action::Resize => {
                let content = self.content_port.ok_or_else(|| {
                    AutofillError::invariant("save_flow", "resize with no content channel")
                })?;
                Ok(vec![Effect::Post {
                    port: content,
                    message,
                }])
            }
            other => Err(AutofillError::protocol(
                "save_flow",
                format!("unexpected action save.{}", other.as_str()),
            )),
        }
    }

    fn cancel(&mut self) -> Vec<Effect> {
        self.state = FlowState::Closed;
        self.overlay_ports.clear();
        let mut effects = vec![Effect::ClearTimeout];
        if let Some(port) = self.content_port.take() {
            effects.push(Effect::Post {
                port,
                message: Message::new(FlowKind::Save, Action::Close),
            });
        }
        effects
    }

    /// `url` (query stripped) and `name` (tab title), then every submitted pair.
    pub fn populate_values(&self) -> Map<String, Value> {
        let mut values = Map::new();
        values.insert("url".to_string(), Value::String(simplify_url(&self.url).to_string()));
        values.insert("name".to_string(), Value::String(self.title.clone()));
        for (key, value) in &self.data {
            values.insert(key.clone(), Value::String(value.clone()));
        }
        values
    }
}
