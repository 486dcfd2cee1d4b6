use serde::{Deserialize, Serialize};

use crate::messages::message_model::Message;
use crate::messages::port::{OverlayPurpose, PortId};
use crate::vault::vault_model::VaultObject;

/// Unique per created flow; timers and late results carry it so they can be
/// discarded once the flow is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlowState {
    /// Created, nothing sent yet
    Idle,
    /// `open` sent to the content script, overlay not connected yet
    AwaitingChannel,
    /// Overlay connected
    PromptOpen,
    /// Overlay received its data
    Populated,
    /// Cancelled; the flow is discarded
    Closed,
}

/// Inputs to a flow transition.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEvent {
    ContentConnected { port: PortId, now_ms: u64 },
    ContentDisconnected { port: PortId },
    OverlayConnected { port: PortId, purpose: OverlayPurpose },
    OverlayDisconnected { port: PortId },
    OverlayMessage { port: PortId, message: Message },
    TimedOut,
    Cancel,
}

impl FlowEvent {
    pub fn label(&self) -> &'static str {
        match self {
            FlowEvent::ContentConnected { .. } => "content_connected",
            FlowEvent::ContentDisconnected { .. } => "content_disconnected",
            FlowEvent::OverlayConnected { .. } => "overlay_connected",
            FlowEvent::OverlayDisconnected { .. } => "overlay_disconnected",
            FlowEvent::OverlayMessage { .. } => "overlay_message",
            FlowEvent::TimedOut => "timed_out",
            FlowEvent::Cancel => "cancel",
        }
    }
}

/// Side effects requested by a transition, executed by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Post { port: PortId, message: Message },
    ScheduleTimeout { after_ms: u64 },
    ClearTimeout,
    /// Resolve `object` into fill values and post `fill.fill` to `port`
    Fill { port: PortId, object: VaultObject, remember: bool },
}

/// Save flow retry/timeout policy (`flows` config section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePolicy {
    /// Stop reopening the prompt after this many attempts
    pub retries: u32,
    /// Stop reopening the prompt this long after the flow started
    pub timeout_ms: u64,
    /// Reconnects closer together than this count as one attempt
    pub retry_time_ms: u64,
}

impl Default for SavePolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout_ms: 10_000,
            retry_time_ms: 1_000,
        }
    }
}
