use serde_json::Value;
use tracing::debug;

use crate::error::{AutofillError, Result};
use crate::flows::flow_model::{Effect, FlowEvent, FlowId, FlowState};
use crate::messages::message_model::{Action, FlowKind, Message};
use crate::messages::port::{OverlayPurpose, PortId, TabId};
use crate::vault::vault_model::{LastUsedResult, VaultObject};

/// What to do with the results found for a page.
#[derive(Debug, Clone, PartialEq)]
pub enum FillDecision {
    Nothing,
    /// Fill without an overlay
    FillNow { object: VaultObject, remember: bool },
    /// Let the user choose in an overlay
    Prompt,
}

/// No result: nothing. One result: fill it. Several: the last used one if it
/// is among them (not re-recorded), otherwise ask.
pub fn plan_fill(results: &[VaultObject], last_used: Option<&LastUsedResult>) -> FillDecision {
    match results {
        [] => FillDecision::Nothing,
        [only] => FillDecision::FillNow {
            object: only.clone(),
            remember: true,
        },
        _ => last_used
            .and_then(|lu| results.iter().find(|r| r.same_object(&lu.host, &lu.object_id)))
            .map(|object| FillDecision::FillNow {
                object: object.clone(),
                remember: false,
            })
            .unwrap_or(FillDecision::Prompt),
    }
}

/// Overlay session letting the user pick one of several results.
#[derive(Debug, Clone)]
pub struct FillFlow {
    id: FlowId,
    tab_id: TabId,
    state: FlowState,
    content_port: Option<PortId>,
    overlay_ports: Vec<PortId>,
    results: Vec<VaultObject>,
}

impl FillFlow {
    pub fn new(id: FlowId, tab_id: TabId, content_port: PortId, results: Vec<VaultObject>) -> Self {
        Self {
            id,
            tab_id,
            state: FlowState::Idle,
            content_port: Some(content_port),
            overlay_ports: vec![],
            results,
        }
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

    pub fn content_port(&self) -> Option<PortId> {
        self.content_port
    }

    /// Ask the content script to open the overlay.
    pub fn start(&mut self) -> Result<Vec<Effect>> {
        let port = self
            .content_port
            .ok_or_else(|| AutofillError::invariant("fill_flow", "started without a content channel"))?;
        self.state = FlowState::AwaitingChannel;
        Ok(vec![Effect::Post {
            port,
            message: Message::new(FlowKind::Fill, Action::Open),
        }])
    }

    pub fn step(&mut self, event: FlowEvent) -> Result<Vec<Effect>> {
        if self.is_closed() {
            return Ok(vec![]);
        }

        match event {
            // Reconnects are not retried for fills
            FlowEvent::ContentConnected { .. } | FlowEvent::TimedOut => Ok(vec![]),
            FlowEvent::ContentDisconnected { port } => {
                if self.content_port != Some(port) {
                    return Ok(vec![]);
                }
                self.content_port = None;
                Ok(self.cancel())
            }
            FlowEvent::OverlayConnected { port, purpose } => {
                Ok(self.on_overlay_connect(port, purpose))
            }
            FlowEvent::OverlayDisconnected { port } => {
                self.overlay_ports.retain(|&p| p != port);
                Ok(vec![])
            }
            FlowEvent::OverlayMessage { port, message } => self.on_overlay_message(port, message),
            FlowEvent::Cancel => Ok(self.cancel()),
        }
    }

    fn on_overlay_connect(&mut self, port: PortId, purpose: OverlayPurpose) -> Vec<Effect> {
        debug!(tab_id = self.tab_id, purpose = purpose.as_str(), "fill overlay connected");
        if purpose == OverlayPurpose::Connected {
            self.state = FlowState::Populated;
            let results = serde_json::to_value(&self.results).unwrap_or(Value::Array(vec![]));
            return vec![Effect::Post {
                port,
                message: Message::new(FlowKind::Fill, Action::Populate).with_data(results),
            }];
        }
        if self.state == FlowState::AwaitingChannel {
            self.state = FlowState::PromptOpen;
        }
        self.overlay_ports.push(port);
        vec![]
    }

    fn on_overlay_message(&mut self, port: PortId, message: Message) -> Result<Vec<Effect>> {
        if !self.overlay_ports.contains(&port) {
            return Err(AutofillError::protocol(
                "fill_flow",
                format!("message {} on a port the flow does not listen to", message.message_type),
            ));
        }
        let kind = message.kind()?;
        if kind.flow != FlowKind::Fill {
            return Ok(vec![]);
        }

        match kind.action {
            Action::Close => Ok(self.cancel()),
            Action::Resize => Ok(vec![Effect::Post {
                port: self.require_content("resize")?,
                message,
            }]),
            Action::Fill => {
                let object: VaultObject = message.data_as()?;
                Ok(vec![Effect::Fill {
                    port: self.require_content("fill")?,
                    object,
                    remember: true,
                }])
            }
            other => Err(AutofillError::protocol(
                "fill_flow",
                format!("unexpected action fill.{}", other.as_str()),
            )),
        }
    }

    fn require_content(&self, what: &str) -> Result<PortId> {
        self.content_port.ok_or_else(|| {
            AutofillError::invariant("fill_flow", format!("{} with no content channel", what))
        })
    }

    fn cancel(&mut self) -> Vec<Effect> {
        self.state = FlowState::Closed;
        self.overlay_ports.clear();
        match self.content_port.take() {
            Some(port) => vec![Effect::Post {
                port,
                message: Message::new(FlowKind::Fill, Action::Close),
            }],
            None => vec![],
        }
    }
}
